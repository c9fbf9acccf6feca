//! Ingredient photo upload
//!
//! Images are checked, parked in the temp directory, read back for both
//! detectors and removed again. Files left behind by an interrupted request
//! carry the upload id in their name and are removed by `DELETE /upload/:id`.

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::extract::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::models::MergedIngredient;
use crate::services::{ImageInput, ValidatedImage};
use crate::AppState;

/// Multipart field carrying the images
const FILES_FIELD: &str = "files";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub upload_id: Uuid,
    pub ingredients: Vec<MergedIngredient>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UploadStatusResponse {
    pub upload_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub message: String,
    pub removed: usize,
}

/// One `files` part as received
struct RawFile {
    filename: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::BadRequest(format!("Malformed multipart body: {}", e.body_text()))
    }
}

async fn read_files(multipart: &mut Multipart) -> ApiResult<Vec<RawFile>> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(multipart_error)?;
        files.push(RawFile {
            filename,
            content_type,
            data: data.to_vec(),
        });
    }
    Ok(files)
}

/// POST /upload
pub async fn upload_images(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let files = read_files(&mut multipart).await?;
    let policy = &state.upload_policy;

    if files.is_empty() {
        return Err(ApiError::BadRequest("No files uploaded".to_string()));
    }
    if files.len() > policy.max_images {
        return Err(ApiError::BadRequest(format!(
            "Maximum {} images allowed",
            policy.max_images
        )));
    }

    let images: Vec<ValidatedImage> = files
        .into_iter()
        .map(|f| policy.validate(f.filename.as_deref(), f.content_type.as_deref(), f.data))
        .collect::<Result<_, _>>()?;

    let upload_id = Uuid::new_v4();
    let mut saved = Vec::with_capacity(images.len());
    let mut mime_types = Vec::with_capacity(images.len());
    for image in images {
        match state.temp_store.save(upload_id, &image).await {
            Ok(path) => saved.push(path),
            Err(e) => {
                state.temp_store.discard(&saved).await;
                return Err(e.into());
            }
        }
        mime_types.push(image.mime_type);
    }

    // Detection reads the parked copies back
    let mut inputs = Vec::with_capacity(saved.len());
    for (path, mime_type) in saved.iter().zip(mime_types) {
        match state.temp_store.load(path).await {
            Ok(data) => inputs.push(ImageInput { data, mime_type }),
            Err(e) => {
                state.temp_store.discard(&saved).await;
                return Err(e.into());
            }
        }
    }
    let ingredients = state.recognizer.recognize(&inputs).await;

    state.temp_store.discard(&saved).await;

    info!(
        user_id = %user.id,
        %upload_id,
        images = inputs.len(),
        ingredients = ingredients.len(),
        "Upload processed"
    );

    Ok(Json(UploadResponse {
        upload_id,
        ingredients,
        message: "Images processed successfully".to_string(),
    }))
}

/// GET /upload/status/:upload_id
///
/// Uploads are processed synchronously, so any id reports completed.
pub async fn upload_status(
    AuthUser(_user): AuthUser,
    Path(upload_id): Path<String>,
) -> Json<UploadStatusResponse> {
    Json(UploadStatusResponse {
        upload_id,
        status: "completed".to_string(),
        message: "Processing completed".to_string(),
    })
}

/// DELETE /upload/:upload_id
pub async fn cleanup_upload(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<CleanupResponse>> {
    let upload_id = Uuid::parse_str(&upload_id)
        .map_err(|_| ApiError::BadRequest("Invalid upload ID".to_string()))?;

    let removed = state.temp_store.cleanup(upload_id).await?;
    if removed > 0 {
        info!(user_id = %user.id, %upload_id, removed, "Removed leftover upload files");
    }

    Ok(Json(CleanupResponse {
        message: "Upload cleaned up successfully".to_string(),
        removed,
    }))
}

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_images))
        .route("/upload/status/:upload_id", get(upload_status))
        .route("/upload/:upload_id", delete(cleanup_upload))
}
