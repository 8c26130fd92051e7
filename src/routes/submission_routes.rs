use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::path::Path as StdPath;
use tokio::fs;
use uuid::Uuid;

use crate::dto::submission_dto::{UploadFields, UploadResponse};
use crate::services::extraction_service::{MIME_DOC, MIME_DOCX, MIME_PDF};
use crate::services::submission_service::NewSubmission;
use crate::{error::Result, AppState};

// 1x1 transparent GIF served by the open-tracking endpoint.
const TRACKING_PIXEL: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "pdf" => Some(MIME_PDF),
        "docx" => Some(MIME_DOCX),
        "doc" => Some(MIME_DOC),
        _ => None,
    }
}

/// The browser-declared content type wins unless it is missing or the
/// generic octet-stream, in which case the extension decides.
fn resolve_mime(ext: &str, declared: Option<&str>) -> String {
    match declared {
        Some(mime) if !mime.is_empty() && mime != "application/octet-stream" => mime.to_string(),
        _ => mime_for_extension(ext).unwrap_or("application/octet-stream").to_string(),
    }
}

async fn save_cv_file(
    uploads_dir: &str,
    filename: &str,
    data: &bytes::Bytes,
) -> Result<(String, String)> {
    let ext = StdPath::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| "bin".to_string());

    let allowed_exts = ["pdf", "doc", "docx"];
    if !allowed_exts.contains(&ext.as_str()) {
        return Err(crate::error::Error::BadRequest(format!(
            "File type .{} is not allowed",
            ext
        )));
    }

    if ext == "pdf" && !data.starts_with(b"%PDF") {
        return Err(crate::error::Error::BadRequest(
            "Invalid PDF file content".into(),
        ));
    }
    // DOCX is a zip container.
    if ext == "docx" && !data.starts_with(&[0x50, 0x4B, 0x03, 0x04]) {
        return Err(crate::error::Error::BadRequest(
            "Invalid DOCX file content".into(),
        ));
    }

    let upload_dir = format!("{}/cv", uploads_dir.trim_end_matches('/'));
    fs::create_dir_all(&upload_dir)
        .await
        .map_err(|e| crate::error::Error::Internal(e.to_string()))?;

    let file_id = Uuid::new_v4();
    let file_path = format!("{}/{}.{}", upload_dir, file_id, ext);

    fs::write(&file_path, data).await.map_err(|e| {
        tracing::error!("Failed to write CV file: {}", e);
        crate::error::Error::Internal(format!("Failed to save file: {}", e))
    })?;

    Ok((file_path, ext))
}

pub async fn upload_submission(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut first_name = String::new();
    let mut last_name = String::new();
    let mut email = String::new();
    let mut phone = None;
    let mut cv_filename = None;
    let mut cv_declared_mime = None;
    let mut cv_data: Option<bytes::Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to get next field: {}", e);
        crate::error::Error::BadRequest(e.to_string())
    })? {
        let field_name = field.name().unwrap_or_default().to_string();

        match field_name.as_str() {
            "first_name" => first_name = field.text().await.unwrap_or_default(),
            "last_name" => last_name = field.text().await.unwrap_or_default(),
            "email" => email = field.text().await.unwrap_or_default(),
            "phone" => {
                let value = field.text().await.unwrap_or_default();
                if !value.is_empty() {
                    phone = Some(value);
                }
            }
            "cv" => {
                cv_filename = Some(field.file_name().unwrap_or("cv.bin").to_string());
                cv_declared_mime = field.content_type().map(|m| m.to_string());
                let data = field.bytes().await.map_err(|e| {
                    tracing::error!("Failed to read CV bytes: {}", e);
                    crate::error::Error::BadRequest("Failed to read file upload".into())
                })?;
                if !data.is_empty() {
                    cv_data = Some(data);
                }
            }
            _ => {}
        }
    }

    let fields = UploadFields {
        first_name,
        last_name,
        email,
        phone,
    };
    crate::utils::validation::validate(&fields)?;

    let (Some(filename), Some(data)) = (cv_filename, cv_data) else {
        return Err(crate::error::Error::BadRequest("CV file is required".into()));
    };

    let (file_path, ext) = save_cv_file(&state.uploads_dir, &filename, &data).await?;
    let mime_type = resolve_mime(&ext, cv_declared_mime.as_deref());

    // Extraction runs synchronously with the upload; a CV we cannot read is
    // the candidate's to fix, so the stored file is discarded and the error
    // surfaced as-is.
    let extracted_text = match state
        .extraction_service
        .extract_text(&file_path, &mime_type)
        .await
    {
        Ok(text) => text,
        Err(e) => {
            let _ = fs::remove_file(&file_path).await;
            return Err(e.into());
        }
    };

    let submission = state
        .submission_service
        .create(NewSubmission {
            first_name: fields.first_name,
            last_name: fields.last_name,
            email: fields.email,
            phone: fields.phone,
            file_path,
            original_filename: filename,
            mime_type,
            extracted_text,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            id: submission.public_id,
            status: submission.status,
        }),
    ))
}

/// Open-tracking pixel referenced from the result email. Always answers
/// with the GIF so mail clients never see an error, even for unknown ids.
pub async fn track_email_open(
    State(state): State<AppState>,
    Path(public_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.submission_service.mark_email_opened(public_id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, max-age=0"),
        ],
        TRACKING_PIXEL,
    ))
}
