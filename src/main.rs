use clap::Parser;
use snapshotd::config::Config;
use snapshotd::ipc;
use snapshotd::logging;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    logging::init_tracing(config.log_format);

    let mut state = ipc::AppState::new(config.day_offset()?);
    if let Some(path) = config.workspace.as_deref() {
        ipc::open_workspace(&mut state, path)?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.unwrap_or(None) {
        if line.trim().is_empty() {
            continue;
        }

        let out = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => {
                tracing::debug!(id = %req.id, method = %req.method, "request");
                let resp = ipc::handle_request(&mut state, req).await;
                serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
            }
            Err(e) => {
                // Can't reply without id.
                tracing::warn!(error = %e, "dropping malformed request");
                serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                })
                .to_string()
            }
        };

        stdout.write_all(out.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}
