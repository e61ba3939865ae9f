use std::future::Future;

use axum::{
    body::Bytes,
    extract::{Extension, Json, Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use crate::{
    AppState,
    storage::{BlobStore, StoredBlob},
    utils::{Claims, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{
    DeleteHazardRequest, Hazard, HazardCategory, HazardInfo, NewHazard, Position,
};
use super::validate::{HazardSubmission, authorize_delete, validate_submission};

struct ImageUpload {
    file_name: String,
    bytes: Bytes,
}

/// Submission form fields as read off the multipart body. Position and image
/// stay optional here; the validator decides what is missing.
#[derive(Default)]
struct ParsedSubmission {
    category: String,
    title: String,
    description: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    image: Option<ImageUpload>,
}

impl ParsedSubmission {
    fn position(&self) -> Option<Position> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(Position { lat, lng }),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum PersistError {
    Upload(std::io::Error),
    Write(sqlx::Error),
}

/// Stores the image blob, then runs the document write with the blob's URL.
/// The write never runs if the upload fails, and a failed write removes the
/// just-uploaded blob again so no orphan is left behind.
async fn store_image_then_write<F, Fut>(
    blobs: &BlobStore,
    user_id: &str,
    file_name: &str,
    bytes: &[u8],
    write: F,
) -> Result<Hazard, PersistError>
where
    F: FnOnce(StoredBlob) -> Fut,
    Fut: Future<Output = Result<Hazard, sqlx::Error>>,
{
    let blob = blobs
        .store(user_id, file_name, bytes)
        .await
        .map_err(PersistError::Upload)?;

    match write(blob.clone()).await {
        Ok(hazard) => Ok(hazard),
        Err(e) => {
            if let Err(remove_err) = blobs.remove(&blob.key).await {
                tracing::warn!(
                    "Failed to remove orphaned blob {}: {}",
                    blob.key,
                    remove_err
                );
            }
            Err(PersistError::Write(e))
        }
    }
}

async fn read_submission(mut multipart: Multipart) -> Result<ParsedSubmission, MultipartError> {
    let mut parsed = ParsedSubmission::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("category") => parsed.category = field.text().await?,
            Some("title") => parsed.title = field.text().await?,
            Some("description") => parsed.description = field.text().await?,
            Some("latitude") => parsed.latitude = field.text().await?.trim().parse().ok(),
            Some("longitude") => parsed.longitude = field.text().await?.trim().parse().ok(),
            Some("image") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "upload".to_string());
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    parsed.image = Some(ImageUpload { file_name, bytes });
                }
            }
            _ => {}
        }
    }

    Ok(parsed)
}

/// Full hazard list, for the map view. Public: the map is visible without an
/// account.
#[axum::debug_handler]
pub async fn list_hazards(State(state): State<AppState>) -> impl IntoResponse {
    match Hazard::list_all(&state.pool, &state.redis).await {
        Ok(hazards) => (StatusCode::OK, success_to_api_response(hazards)),
        Err(e) => {
            tracing::error!("Failed to fetch hazards: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(
                    error_codes::INTERNAL_ERROR,
                    "Failed to fetch hazards".to_string(),
                ),
            )
        }
    }
}

/// Hazard submission flow: validate against the user's existing markers,
/// store the image, then write the hazard document. The image upload must
/// succeed before anything is persisted; a failed document write removes the
/// just-uploaded blob again.
#[axum::debug_handler]
pub async fn create_hazard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> impl IntoResponse {
    let parsed = match read_submission(multipart).await {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("Malformed hazard submission: {}", e);
            return (
                StatusCode::OK,
                error_to_api_response(
                    error_codes::VALIDATION_ERROR,
                    "Malformed submission form".to_string(),
                ),
            );
        }
    };

    let existing = match Hazard::find_by_user(&state.pool, &claims.sub).await {
        Ok(existing) => existing,
        Err(e) => {
            tracing::error!("Failed to load user's hazards: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "Database error".to_string()),
            );
        }
    };

    let submission = HazardSubmission {
        user_id: Some(&claims.sub),
        position: parsed.position(),
        category: &parsed.category,
        title: &parsed.title,
        description: &parsed.description,
        has_image: parsed.image.is_some(),
    };

    if let Err(rejection) = validate_submission(
        &submission,
        &existing,
        Utc::now().date_naive(),
        state.config.daily_hazard_limit,
    ) {
        return (
            StatusCode::OK,
            error_to_api_response(rejection.code(), rejection.message()),
        );
    }

    // The validator accepted, so category, position and image are present.
    let (Some(category), Some(position), Some(image)) = (
        HazardCategory::parse(parsed.category.trim()),
        parsed.position(),
        parsed.image,
    ) else {
        return (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "Unknown hazard category".to_string(),
            ),
        );
    };

    // Image first; no hazard document may ever reference a missing blob.
    let pool = &state.pool;
    let redis = &state.redis;
    let user_id = claims.sub.clone();
    let title = parsed.title.trim().to_string();
    let description = parsed.description.trim().to_string();

    let persisted = store_image_then_write(
        &state.blobs,
        &claims.sub,
        &image.file_name,
        &image.bytes,
        |blob| async move {
            Hazard::create(
                pool,
                redis,
                NewHazard {
                    user_id,
                    category,
                    title,
                    description,
                    position,
                    image_url: blob.url,
                },
            )
            .await
        },
    )
    .await;

    match persisted {
        Ok(hazard) => (
            StatusCode::CREATED,
            success_to_api_response(HazardInfo::from(hazard)),
        ),
        Err(PersistError::Upload(e)) => {
            tracing::error!("Failed to store hazard image: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(
                    error_codes::UPLOAD_FAILED,
                    "Failed to upload image. Please try again".to_string(),
                ),
            )
        }
        Err(PersistError::Write(e)) => {
            tracing::error!("Failed to save hazard: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(
                    error_codes::INTERNAL_ERROR,
                    "Failed to save hazard. Please try again".to_string(),
                ),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn delete_hazard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DeleteHazardRequest>,
) -> impl IntoResponse {
    let hazard = match Hazard::find_by_id(&state.pool, &req.hazard_id).await {
        Ok(Some(hazard)) => hazard,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                error_to_api_response(error_codes::NOT_FOUND, "Hazard not found".to_string()),
            );
        }
        Err(e) => {
            tracing::error!("Failed to look up hazard: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "Database error".to_string()),
            );
        }
    };

    if !authorize_delete(&hazard, &claims.sub) {
        return (
            StatusCode::FORBIDDEN,
            error_to_api_response(
                error_codes::PERMISSION_DENIED,
                "You are not authorized to delete this hazard".to_string(),
            ),
        );
    }

    match Hazard::delete(&state.pool, &state.redis, &claims.sub, &req.hazard_id).await {
        Ok(()) => (
            StatusCode::OK,
            success_to_api_response(serde_json::json!({
                "success": true
            })),
        ),
        Err(sqlx::Error::RowNotFound) => (
            StatusCode::NOT_FOUND,
            error_to_api_response(error_codes::NOT_FOUND, "Hazard not found".to_string()),
        ),
        Err(e) => {
            tracing::error!("Failed to delete hazard: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(
                    error_codes::INTERNAL_ERROR,
                    "Failed to delete hazard".to_string(),
                ),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::Utc;

    use super::*;

    const USER: &str = "user@example.com";

    fn stored_hazard(image_url: &str) -> Hazard {
        Hazard {
            hazard_id: "h-1".to_string(),
            user_id: USER.to_string(),
            category: "weather".to_string(),
            title: "Ice".to_string(),
            description: "Black ice near bridge".to_string(),
            latitude: 43.65,
            longitude: -79.38,
            image_url: Some(image_url.to_string()),
            created_at: Utc::now(),
        }
    }

    fn blob_files(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir.join("hazard-images").join(USER))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn failed_upload_aborts_before_the_document_write() {
        // The media root is a plain file, so storing the blob cannot succeed.
        let root = tempfile::NamedTempFile::new().unwrap();
        let store = BlobStore::new(root.path(), "http://localhost:3000/media");
        let wrote = AtomicBool::new(false);

        let result = store_image_then_write(&store, USER, "ice.png", b"png-bytes", |_| {
            wrote.store(true, Ordering::SeqCst);
            async { Ok(stored_hazard("unused")) }
        })
        .await;

        assert!(matches!(result, Err(PersistError::Upload(_))));
        assert!(!wrote.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_document_write_removes_the_uploaded_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path(), "http://localhost:3000/media");

        let result =
            store_image_then_write(&store, USER, "ice.png", b"png-bytes", |_| async {
                Err::<Hazard, _>(sqlx::Error::Protocol("insert failed".into()))
            })
            .await;

        assert!(matches!(result, Err(PersistError::Write(_))));
        assert_eq!(blob_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn successful_write_receives_the_blob_url_and_keeps_the_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path(), "http://localhost:3000/media");

        let result =
            store_image_then_write(&store, USER, "ice.png", b"png-bytes", |blob| async move {
                Ok(stored_hazard(&blob.url))
            })
            .await;

        let hazard = result.unwrap();
        let image_url = hazard.image_url.unwrap();
        assert!(
            image_url.starts_with("http://localhost:3000/media/hazard-images/user@example.com/")
        );
        assert_eq!(blob_files(dir.path()), 1);
    }
}
