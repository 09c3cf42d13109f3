use crate::controller::BackupController;
use crate::store::SqliteRepository;
use chrono::FixedOffset;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub type Controller = BackupController<SqliteRepository>;

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub controller: Option<Arc<Controller>>,
    pub day_offset: FixedOffset,
}

impl AppState {
    pub fn new(day_offset: FixedOffset) -> Self {
        Self {
            workspace: None,
            controller: None,
            day_offset,
        }
    }
}
