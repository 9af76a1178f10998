//! # Model Management Handlers
//!
//! ## Available Endpoints:
//! - `GET /api/v1/models` - Known model variants and which one is resident
//! - `GET /api/v1/model/status` - Model slot snapshot
//! - `POST /api/v1/model/unload` - Force-evict the resident model

use crate::model::catalog::ModelSize;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// List the catalog with the resident model flagged.
pub async fn list_models(state: web::Data<AppState>) -> HttpResponse {
    let status = state.model_manager.status().await;

    let models: Vec<_> = ModelSize::ALL
        .iter()
        .map(|size| {
            json!({
                "name": size.to_string(),
                "description": size.description(),
                "size_mb": size.size_mb(),
                "loaded": status.model_name.as_deref() == Some(size.to_string().as_str())
            })
        })
        .collect();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "models": models,
        "current_loaded": status.model_name,
        "default_model": state.config.model.default_model
    }))
}

/// Snapshot of the model slot.
pub async fn model_status(state: web::Data<AppState>) -> HttpResponse {
    let status = state.model_manager.status().await;
    HttpResponse::Ok().json(status)
}

/// Forcibly evict the resident model. Refused (but not an error) while jobs
/// are using it.
pub async fn unload_model(state: web::Data<AppState>) -> HttpResponse {
    let was_unloaded = state.model_manager.unload().await;
    HttpResponse::Ok().json(json!({
        "success": true,
        "was_unloaded": was_unloaded,
        "message": if was_unloaded {
            "Model unloaded, memory freed"
        } else {
            "No model was loaded or jobs are still active"
        }
    }))
}
