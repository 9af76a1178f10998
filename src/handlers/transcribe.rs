//! # Transcription Submission Handler
//!
//! ## Endpoint: `POST /api/v1/transcribe`
//!
//! Multipart form with a `file` field carrying the audio and an optional
//! `model_name` text field. The upload is streamed to the temp input
//! directory, a job is created, and the job id is returned immediately with
//! status 202; progress is polled through the status endpoint.

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::{StreamExt, TryStreamExt};
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

pub async fn submit_transcription(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let mut model_name: Option<String> = None;
    let mut upload: Option<(PathBuf, u64)> = None;

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|err| AppError::BadRequest(format!("Multipart error: {}", err)))?;

        match field.name().unwrap_or("") {
            "file" => {
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .unwrap_or("upload")
                    .to_string();
                let saved = save_upload(&state, &mut field, &filename).await?;
                tracing::info!(
                    "Saved upload '{}' ({} bytes) to {}",
                    filename,
                    saved.1,
                    saved.0.display()
                );
                upload = Some(saved);
            }
            "model_name" => {
                let mut value = Vec::new();
                while let Some(chunk) = field
                    .try_next()
                    .await
                    .map_err(|err| AppError::BadRequest(format!("Multipart error: {}", err)))?
                {
                    value.extend_from_slice(&chunk);
                }
                model_name = Some(
                    String::from_utf8(value)
                        .map_err(|_| {
                            AppError::ValidationError("model_name must be UTF-8 text".to_string())
                        })?
                        .trim()
                        .to_string(),
                );
            }
            other => {
                tracing::debug!("Ignoring unexpected multipart field '{}'", other);
            }
        }
    }

    let (input_path, bytes_written) = upload
        .ok_or_else(|| AppError::ValidationError("missing 'file' field in upload".to_string()))?;

    if bytes_written == 0 {
        let _ = tokio::fs::remove_file(&input_path).await;
        return Err(AppError::ValidationError("uploaded file is empty".to_string()));
    }

    let model_name = model_name
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| state.config.model.default_model.clone());

    let job_id = match state.orchestrator.submit(input_path.clone(), &model_name).await {
        Ok(job_id) => job_id,
        Err(err) => {
            // The upload is orphaned if no job was created for it.
            let _ = tokio::fs::remove_file(&input_path).await;
            return Err(err.into());
        }
    };

    Ok(HttpResponse::Accepted().json(json!({
        "job_id": job_id,
        "message": "Transcription job queued"
    })))
}

/// Stream one multipart field to a uniquely named file in the temp input
/// directory. Returns the path and the number of bytes written.
async fn save_upload(
    state: &web::Data<AppState>,
    field: &mut actix_multipart::Field,
    filename: &str,
) -> AppResult<(PathBuf, u64)> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("tmp");
    let path = state
        .config
        .jobs
        .temp_input_dir
        .join(format!("{}.{}", Uuid::new_v4(), extension));

    let mut file = tokio::fs::File::create(&path).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|err| AppError::BadRequest(format!("Upload read error: {}", err)))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok((path, written))
}
