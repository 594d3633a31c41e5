use serde::{Deserialize, Serialize};

/// Opaque identifier of a top-level window. On Windows this carries the HWND
/// value; the search core only compares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowHandle(pub isize);

impl std::fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Point-in-time view of one open window. Fields never change after
/// construction; a retitled window shows up as a new entry with the same
/// handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEntry {
    pub handle: WindowHandle,
    pub title: String,
    pub process_name: String,
    normalized_title: String,
    normalized_process_name: String,
}

impl WindowEntry {
    pub fn new(handle: WindowHandle, title: &str, process_name: &str) -> Self {
        Self::from_owned(handle, title.to_string(), process_name.to_string())
    }

    pub fn from_owned(handle: WindowHandle, title: String, process_name: String) -> Self {
        let normalized_title = normalize_for_search(&title);
        let normalized_process_name = normalize_for_search(&process_name);
        Self {
            handle,
            title,
            process_name,
            normalized_title,
            normalized_process_name,
        }
    }

    pub fn normalized_title(&self) -> &str {
        &self.normalized_title
    }

    pub fn normalized_process_name(&self) -> &str {
        &self.normalized_process_name
    }

    pub fn has_title(&self) -> bool {
        !self.title.is_empty()
    }
}

/// Canonical case-folded form used for both queries and candidates.
///
/// Only case is folded. Whitespace and punctuation are kept so that a query
/// like "q4 report" still has to find the space in the candidate.
pub fn normalize_for_search(input: &str) -> String {
    input.to_lowercase()
}
