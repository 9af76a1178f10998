//! # Health Endpoint
//!
//! Liveness and a coarse operational snapshot: job counters, model slot
//! state, process memory, and the temp directories the pipeline depends on.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::process;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();
    let model = state.model_manager.status().await;

    // Both directories are created at startup; losing them means uploads
    // and artifacts have nowhere to go.
    let temp_dirs_ok = state.config.jobs.temp_input_dir.is_dir()
        && state.config.jobs.temp_output_dir.is_dir();

    let body = json!({
        "status": if temp_dirs_ok { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "whisper-jobs-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": state.config.server.host,
            "port": state.config.server.port
        },
        "jobs": {
            "submitted": metrics.submitted,
            "completed": metrics.completed,
            "failed": metrics.failed,
            "canceled": metrics.canceled,
            "active": metrics.active,
            "max_concurrent": state.config.jobs.max_concurrent,
            "tracked_records": state.registry.len().await
        },
        "model": {
            "loaded": model.loaded,
            "model_name": model.model_name,
            "device": model.device
        },
        "memory": get_memory_info(),
        "temp_dirs_ok": temp_dirs_ok
    });

    if temp_dirs_ok {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

fn get_memory_info() -> serde_json::Value {
    let pid = process::id();

    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            let mut vm_rss = 0;
            let mut vm_size = 0;

            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        vm_rss = kb_str.parse::<u64>().unwrap_or(0) * 1024;
                    }
                } else if line.starts_with("VmSize:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        vm_size = kb_str.parse::<u64>().unwrap_or(0) * 1024;
                    }
                }
            }

            return json!({
                "resident_memory_bytes": vm_rss,
                "virtual_memory_bytes": vm_size,
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "note": "Memory info not available on this platform"
    })
}
