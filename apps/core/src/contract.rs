use serde::{Deserialize, Serialize};

use crate::controller::ResultsUpdate;
use crate::model::{WindowEntry, WindowHandle};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowMatchDto {
    pub handle: WindowHandle,
    pub title: String,
    pub process_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResponse {
    pub query: String,
    pub matches: Vec<WindowMatchDto>,
}

impl From<&WindowEntry> for WindowMatchDto {
    fn from(value: &WindowEntry) -> Self {
        Self {
            handle: value.handle,
            title: value.title.clone(),
            process_name: value.process_name.clone(),
        }
    }
}

impl SearchResponse {
    pub fn from_update(update: &ResultsUpdate, limit: usize) -> Self {
        Self {
            query: update.query.clone(),
            matches: update
                .matches
                .iter()
                .take(limit)
                .map(WindowMatchDto::from)
                .collect(),
        }
    }
}
