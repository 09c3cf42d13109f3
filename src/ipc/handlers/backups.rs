use crate::error::BackupError;
use crate::export;
use crate::filter::BackupFilter;
use crate::ipc::error::{backup_err_details, err, ok};
use crate::ipc::types::{AppState, Controller, Request};
use crate::model::Term;
use chrono::NaiveDate;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<BackupError> for HandlerErr {
    fn from(e: BackupError) -> Self {
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details: backup_err_details(&e),
        }
    }
}

fn bad_params(message: impl Into<String>) -> HandlerErr {
    HandlerErr {
        code: "bad_params",
        message: message.into(),
        details: None,
    }
}

fn controller(state: &AppState) -> Result<Arc<Controller>, HandlerErr> {
    state.controller.clone().ok_or_else(|| HandlerErr {
        code: "no_workspace",
        message: "select a workspace first".to_string(),
        details: None,
    })
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_params(format!("missing {}", key)))
}

fn optional_str(filter: &serde_json::Value, key: &str) -> Option<String> {
    filter
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Reads `params.filter`. Missing, null, blank or `"ALL"` fields impose no
/// constraint.
fn parse_filter(params: &serde_json::Value) -> Result<BackupFilter, HandlerErr> {
    let raw = params.get("filter").cloned().unwrap_or(serde_json::Value::Null);
    if !raw.is_null() && !raw.is_object() {
        return Err(bad_params("filter must be an object"));
    }
    let term = match optional_str(&raw, "term") {
        Some(t) if t.eq_ignore_ascii_case("all") => None,
        Some(t) => Some(t.parse::<Term>().map_err(|e| HandlerErr {
            code: "bad_params",
            message: e,
            details: Some(json!({ "term": t })),
        })?),
        None => None,
    };
    let date = match optional_str(&raw, "date") {
        Some(d) => Some(NaiveDate::parse_from_str(&d, "%Y-%m-%d").map_err(|_| HandlerErr {
            code: "bad_params",
            message: "date must be YYYY-MM-DD".to_string(),
            details: Some(json!({ "date": d })),
        })?),
        None => None,
    };
    Ok(BackupFilter {
        school_id: optional_str(&raw, "schoolId"),
        term,
        academic_year: optional_str(&raw, "academicYear"),
        date,
    })
}

async fn backups_list(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let controller = controller(state)?;
    let filter = parse_filter(&req.params)?;
    let rows = controller.list(filter).await?;
    Ok(json!({ "backups": rows }))
}

async fn backups_detail(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let controller = controller(state)?;
    let id = get_required_str(&req.params, "id")?;
    let detail = controller.detail(&id).await?;
    Ok(json!({ "detail": detail }))
}

fn backups_detail_close(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    controller(state)?.close_detail();
    Ok(json!({ "ok": true }))
}

async fn backups_export(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let controller = controller(state)?;
    let id = get_required_str(&req.params, "id")?;
    let out_dir = PathBuf::from(get_required_str(&req.params, "outDir")?);

    let artifact = controller.export(&id).await?;
    let summary = export::write_artifact(&out_dir, &artifact).map_err(|e| HandlerErr {
        code: "io_failed",
        message: format!("{e:#}"),
        details: Some(json!({ "path": out_dir.to_string_lossy() })),
    })?;

    Ok(json!({
        "ok": true,
        "fileName": artifact.file_name,
        "path": summary.path.to_string_lossy(),
        "bytes": summary.bytes,
        "sha256": summary.sha256
    }))
}

fn backups_delete_request(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let controller = controller(state)?;
    let id = get_required_str(&req.params, "id")?;
    controller.request_delete(&id);
    Ok(json!({ "pendingDelete": id }))
}

fn backups_delete_cancel(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    controller(state)?.cancel_delete();
    Ok(json!({ "pendingDelete": serde_json::Value::Null }))
}

async fn backups_delete_confirm(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let controller = controller(state)?;
    let deleted = controller.confirm_delete().await?;
    Ok(json!({
        "deleted": deleted,
        "backups": controller.state().rows()
    }))
}

fn backups_state(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let snapshot = controller(state)?.state();
    Ok(json!({
        "filter": snapshot.filter,
        "backups": snapshot.rows(),
        "schools": snapshot.schools,
        "detailId": snapshot.detail.as_ref().map(|d| d.bundle.id.clone()),
        "pendingDelete": snapshot.pending_delete
    }))
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backups.list" => backups_list(state, req).await,
        "backups.detail" => backups_detail(state, req).await,
        "backups.detail.close" => backups_detail_close(state),
        "backups.export" => backups_export(state, req).await,
        "backups.delete.request" => backups_delete_request(state, req),
        "backups.delete.cancel" => backups_delete_cancel(state),
        "backups.delete.confirm" => backups_delete_confirm(state).await,
        "backups.state" => backups_state(state),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
