use crate::error::BackupError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn backup_err_details(e: &BackupError) -> Option<serde_json::Value> {
    match e {
        BackupError::NotFound(backup_id) | BackupError::NoData(backup_id) => {
            Some(json!({ "backupId": backup_id }))
        }
        BackupError::RepositoryUnavailable(_) => None,
    }
}

pub fn backup_err(id: &str, e: &BackupError) -> serde_json::Value {
    err(id, e.code(), e.to_string(), backup_err_details(e))
}
