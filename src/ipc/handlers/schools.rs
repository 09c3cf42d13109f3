use crate::ipc::error::{backup_err, err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

async fn handle_schools_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(controller) = state.controller.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match controller.schools().await {
        Ok(schools) => ok(&req.id, json!({ "schools": schools })),
        Err(e) => backup_err(&req.id, &e),
    }
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schools.list" => Some(handle_schools_list(state, req).await),
        _ => None,
    }
}
