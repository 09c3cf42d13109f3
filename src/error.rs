use thiserror::Error;

/// Failures at the repository seam.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("bundle not found: {0}")]
    NotFound(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// The single user-visible error channel of the lifecycle controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackupError {
    #[error("backup store unavailable: {0}")]
    RepositoryUnavailable(String),
    #[error("backup not found: {0}")]
    NotFound(String),
    #[error("backup {0} has no data to export")]
    NoData(String),
}

impl BackupError {
    pub fn code(&self) -> &'static str {
        match self {
            BackupError::RepositoryUnavailable(_) => "repository_unavailable",
            BackupError::NotFound(_) => "not_found",
            BackupError::NoData(_) => "no_data",
        }
    }
}

impl From<RepositoryError> for BackupError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound(id) => BackupError::NotFound(id),
            RepositoryError::Unavailable(msg) => BackupError::RepositoryUnavailable(msg),
        }
    }
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(value: rusqlite::Error) -> Self {
        RepositoryError::Unavailable(value.to_string())
    }
}
