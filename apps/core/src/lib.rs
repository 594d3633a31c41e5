// The perf test under tests/perf refers to this crate by name.
extern crate self as windowwalker_core;

pub mod config;
pub mod contract;
pub mod controller;
pub mod desktop_registry;
pub mod logging;
pub mod model;
pub mod registry;
pub mod runtime;
pub mod search;
