use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{self, Config, ConfigError};
use crate::contract::SearchResponse;
use crate::controller::{ControllerError, ControllerOptions, ResultsUpdate, SearchController};
use crate::desktop_registry::DesktopRegistry;
use crate::registry::{RegistryError, WindowRegistry};
use crate::search::match_positions;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

pub const USAGE: &str = "usage: windowwalker-core [--query <text> | --interactive] [--json] [--config <path>]

  --query <text>   print the windows matching <text> and exit
  --interactive    read queries from stdin, one per line, until EOF
  --json           print results as JSON
  --config <path>  config file (default: per-user app data dir)
  --help           show this message";

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("{0}")]
    Usage(String),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("search controller error: {0}")]
    Controller(#[from] ControllerError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Query(String),
    Interactive,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub mode: RunMode,
    pub json: bool,
    pub config_path: Option<PathBuf>,
}

pub fn parse_cli_args(args: &[String]) -> Result<RuntimeOptions, RuntimeError> {
    let mut mode = None;
    let mut json = false;
    let mut config_path = None;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--query" => {
                let text = iter
                    .next()
                    .ok_or_else(|| RuntimeError::Usage("--query requires a value".to_string()))?;
                set_mode(&mut mode, RunMode::Query(text.clone()))?;
            }
            "--interactive" => set_mode(&mut mode, RunMode::Interactive)?,
            "--json" => json = true,
            "--config" => {
                let path = iter
                    .next()
                    .ok_or_else(|| RuntimeError::Usage("--config requires a path".to_string()))?;
                config_path = Some(PathBuf::from(path));
            }
            "--help" | "-h" => {
                return Ok(RuntimeOptions {
                    mode: RunMode::Help,
                    json,
                    config_path,
                })
            }
            other => {
                return Err(RuntimeError::Usage(format!(
                    "unknown argument '{other}'\n{USAGE}"
                )))
            }
        }
    }

    Ok(RuntimeOptions {
        mode: mode.unwrap_or(RunMode::Query(String::new())),
        json,
        config_path,
    })
}

fn set_mode(slot: &mut Option<RunMode>, mode: RunMode) -> Result<(), RuntimeError> {
    if slot.is_some() {
        return Err(RuntimeError::Usage(
            "--query and --interactive are mutually exclusive".to_string(),
        ));
    }
    *slot = Some(mode);
    Ok(())
}

pub fn run_with_options(options: RuntimeOptions) -> Result<(), RuntimeError> {
    if options.mode == RunMode::Help {
        println!("{USAGE}");
        return Ok(());
    }

    let config = config::load(options.config_path.as_deref())?;
    match crate::logging::init(&config.log_level) {
        Ok(log_path) => tracing::info!(
            config_path = %config.config_path.display(),
            log_path = %log_path.display(),
            "windowwalker-core starting"
        ),
        Err(error) => eprintln!("[windowwalker-core] logging disabled: {error}"),
    }

    let registry = Arc::new(DesktopRegistry::new());
    match registry.refresh() {
        Ok(()) => {}
        Err(RegistryError::Unsupported) => {
            eprintln!("[windowwalker-core] window enumeration unsupported on this platform");
        }
        Err(error) => tracing::warn!(%error, "initial window enumeration failed"),
    }

    let controller = SearchController::new(
        Arc::clone(&registry) as Arc<dyn WindowRegistry>,
        ControllerOptions::from(&config),
    )?;

    match options.mode {
        RunMode::Query(query) => run_query(&controller, &config, &query, options.json),
        RunMode::Interactive => {
            let _poller = registry.spawn_poller(Duration::from_millis(config.poll_interval_ms))?;
            run_interactive(&controller, &config, options.json)
        }
        RunMode::Help => Ok(()),
    }
}

fn run_query(
    controller: &SearchController,
    config: &Config,
    query: &str,
    json: bool,
) -> Result<(), RuntimeError> {
    controller.set_query(query);
    if !controller.wait_until_settled(SETTLE_TIMEOUT) {
        tracing::warn!(query, "search did not settle in time; printing last results");
    }
    println!(
        "{}",
        render_results(&controller.current_results(), config.max_results as usize, json)?
    );
    Ok(())
}

fn run_interactive(
    controller: &SearchController,
    config: &Config,
    json: bool,
) -> Result<(), RuntimeError> {
    let limit = config.max_results as usize;
    controller.wait_until_settled(SETTLE_TIMEOUT);
    println!("{}", render_results(&controller.current_results(), limit, json)?);

    controller.subscribe(move |update| match render_results(update, limit, json) {
        Ok(rendered) => println!("{rendered}"),
        Err(error) => tracing::warn!(%error, "failed to render results"),
    });

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        controller.set_query(line.trim_end_matches('\r'));
    }

    controller.wait_until_settled(SETTLE_TIMEOUT);
    Ok(())
}

pub fn render_results(
    update: &ResultsUpdate,
    limit: usize,
    json: bool,
) -> Result<String, RuntimeError> {
    if json {
        return Ok(serde_json::to_string(&SearchResponse::from_update(update, limit))?);
    }

    if update.matches.is_empty() {
        return Ok(format!("no windows match '{}'", update.query));
    }

    let lines: Vec<String> = update
        .matches
        .iter()
        .take(limit)
        .map(|entry| {
            format!(
                "{:>10}  {}  ({})",
                entry.handle.to_string(),
                highlight(&entry.title, entry.normalized_title(), &update.query),
                entry.process_name
            )
        })
        .collect();
    Ok(lines.join("\n"))
}

/// Brackets the title chars consumed by the matcher. Titles whose lowercase
/// form has a different char count are printed as-is.
fn highlight(title: &str, normalized_title: &str, query: &str) -> String {
    if query.is_empty() || title.chars().count() != normalized_title.chars().count() {
        return title.to_string();
    }
    let Some(positions) = match_positions(query, normalized_title) else {
        return title.to_string();
    };

    let mut rendered = String::with_capacity(title.len() + positions.len() * 2);
    let mut next = positions.iter().peekable();
    for (index, ch) in title.chars().enumerate() {
        if next.peek() == Some(&&index) {
            next.next();
            rendered.push('[');
            rendered.push(ch);
            rendered.push(']');
        } else {
            rendered.push(ch);
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::{highlight, parse_cli_args, render_results, RunMode, RuntimeError};
    use crate::controller::ResultsUpdate;
    use crate::model::{WindowEntry, WindowHandle};

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn defaults_to_empty_query() {
        let options = parse_cli_args(&[]).unwrap();
        assert_eq!(options.mode, RunMode::Query(String::new()));
        assert!(!options.json);
        assert_eq!(options.config_path, None);
    }

    #[test]
    fn parses_query_json_and_config() {
        let options =
            parse_cli_args(&args(&["--query", "vsc", "--json", "--config", "ww.toml"])).unwrap();
        assert_eq!(options.mode, RunMode::Query("vsc".to_string()));
        assert!(options.json);
        assert_eq!(options.config_path, Some(PathBuf::from("ww.toml")));
    }

    #[test]
    fn rejects_conflicting_modes() {
        let result = parse_cli_args(&args(&["--query", "a", "--interactive"]));
        assert!(matches!(result, Err(RuntimeError::Usage(_))));
    }

    #[test]
    fn rejects_missing_query_value() {
        let result = parse_cli_args(&args(&["--query"]));
        assert!(matches!(result, Err(RuntimeError::Usage(message)) if message.contains("--query")));
    }

    #[test]
    fn rejects_unknown_argument() {
        assert!(parse_cli_args(&args(&["--fast"])).is_err());
    }

    #[test]
    fn highlight_brackets_matched_chars() {
        assert_eq!(
            highlight("Visual Studio Code", "visual studio code", "vsc"),
            "[V]isual [S]tudio [C]ode"
        );
        assert_eq!(highlight("Notepad", "notepad", ""), "Notepad");
        assert_eq!(highlight("Notepad", "notepad", "xyz"), "Notepad");
    }

    #[test]
    fn renders_json_with_limit() {
        let update = ResultsUpdate {
            generation: 3,
            query: "o".to_string(),
            matches: Arc::from(vec![
                WindowEntry::new(WindowHandle(1), "One", "one"),
                WindowEntry::new(WindowHandle(2), "Two", "two"),
            ]),
        };

        let rendered = render_results(&update, 1, true).unwrap();
        assert_eq!(
            rendered,
            r#"{"query":"o","matches":[{"handle":1,"title":"One","process_name":"one"}]}"#
        );
    }

    #[test]
    fn renders_empty_text_results() {
        let update = ResultsUpdate {
            generation: 1,
            query: "zzz".to_string(),
            matches: Arc::from(Vec::new()),
        };

        assert_eq!(
            render_results(&update, 10, false).unwrap(),
            "no windows match 'zzz'"
        );
    }
}
