use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::config::StorageBackend;
use crate::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let storage_ok = match state.config.storage.backend {
        StorageBackend::Memory => true,
        StorageBackend::File => data_dir_writable(&state.config.storage.data_dir).await,
    };

    let status = if storage_ok { "healthy" } else { "degraded" };
    Json(json!({
        "status": status,
        "storage": storage_ok,
        "timestamp": chrono::Utc::now(),
    }))
}

async fn data_dir_writable(dir: &std::path::Path) -> bool {
    let probe = dir.join(".health-probe");
    if tokio::fs::create_dir_all(dir).await.is_err() {
        return false;
    }
    let ok = tokio::fs::write(&probe, b"ok").await.is_ok();
    let _ = tokio::fs::remove_file(&probe).await;
    ok
}
