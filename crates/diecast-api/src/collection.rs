use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use diecast_db::models::CarRow;
use diecast_types::api::{CarInfoResponse, CarResponse, Claims};

use crate::error::{ApiError, ApiResult};
use crate::{AppState, join_err, parse_created_at};

/// Fallback display name when the upload form leaves it blank.
const PLACEHOLDER_NAME: &str = "Unnamed car";

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// GET /collection — the caller's cars, newest first, optionally filtered by
/// a case-insensitive substring match over name and notes.
pub async fn list_collection(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let uid = claims.sub.to_string();
    let rows = tokio::task::spawn_blocking(move || db.db.list_cars(&uid))
        .await
        .map_err(join_err)??;

    let q = query.q.trim().to_lowercase();
    let cars: Vec<CarResponse> = rows
        .into_iter()
        .filter(|row| q.is_empty() || matches_query(row, &q))
        .map(car_response)
        .collect();

    Ok(Json(cars))
}

/// POST /collection — multipart form with an `image` file part (required),
/// plus optional `name` and `notes` text parts.
///
/// The image is persisted before the row is inserted: a storage failure
/// means no row, while a row failure after the write leaves only an orphan
/// file, which is harmless.
pub async fn upload_car(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut image: Option<(Vec<u8>, String)> = None;
    let mut name = String::new();
    let mut notes = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidInput(format!("malformed multipart body: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "image" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::InvalidInput(format!("unreadable image part: {}", e)))?;
                image = Some((bytes.to_vec(), filename));
            }
            "name" => {
                name = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidInput(format!("unreadable name part: {}", e)))?;
            }
            "notes" => {
                notes = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidInput(format!("unreadable notes part: {}", e)))?;
            }
            _ => {}
        }
    }

    let (bytes, filename) = image.ok_or_else(|| ApiError::InvalidInput("no image".into()))?;
    if bytes.is_empty() {
        return Err(ApiError::InvalidInput("no image".into()));
    }

    let name = if name.trim().is_empty() {
        PLACEHOLDER_NAME.to_string()
    } else {
        name.trim().to_string()
    };

    // Storage write precedes the row commit so the row never references a
    // file that was never written.
    let stored = state.images.store(&bytes, &filename).await?;

    let car_id = Uuid::new_v4();
    let created_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);

    let db = state.clone();
    let cid = car_id.to_string();
    let uid = claims.sub.to_string();
    let row_name = name.clone();
    let row_notes = notes.clone();
    let row_image = stored.clone();
    let row_created = created_at.clone();
    let inserted = tokio::task::spawn_blocking(move || {
        db.db
            .insert_car(&cid, &uid, &row_name, &row_image, &row_notes, &row_created)
    })
    .await
    .map_err(join_err)?;

    if let Err(e) = inserted {
        // Orphan file on disk, to be reconciled out of band.
        warn!("Car row insert failed after storing image {}: {}", stored, e);
        return Err(ApiError::Internal(e));
    }

    Ok((
        StatusCode::CREATED,
        Json(CarResponse {
            id: car_id,
            name,
            image: stored,
            notes,
            created_at: parse_created_at(&created_at, "new car"),
        }),
    ))
}

/// GET /cars/{id} — owner-scoped; someone else's car is a plain 404.
pub async fn get_car(
    State(state): State<AppState>,
    Path(car_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let cid = car_id.to_string();
    let uid = claims.sub.to_string();
    let row = tokio::task::spawn_blocking(move || db.db.get_car(&cid, &uid))
        .await
        .map_err(join_err)??
        .ok_or(ApiError::NotFound)?;

    Ok(Json(car_response(row)))
}

/// DELETE /cars/{id} — cascade: posts and the row go in one transaction,
/// then the image file is removed best-effort.
pub async fn delete_car(
    State(state): State<AppState>,
    Path(car_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let cid = car_id.to_string();
    let uid = claims.sub.to_string();
    let image = tokio::task::spawn_blocking(move || db.db.delete_car(&cid, &uid))
        .await
        .map_err(join_err)??
        .ok_or(ApiError::NotFound)?;

    if let Err(e) = state.images.delete(&image).await {
        warn!("Failed to delete image {} for car {}: {}", image, car_id, e);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// GET /cars/{id}/info — best-effort enrichment lookup by car name. Always
/// 200 once ownership checks pass; upstream trouble is embedded as text.
pub async fn car_info(
    State(state): State<AppState>,
    Path(car_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let cid = car_id.to_string();
    let uid = claims.sub.to_string();
    let row = tokio::task::spawn_blocking(move || db.db.get_car(&cid, &uid))
        .await
        .map_err(join_err)??
        .ok_or(ApiError::NotFound)?;

    let info = state.enrich.describe(&row.name).await;

    Ok(Json(CarInfoResponse { info }))
}

/// GET /uploads/{name} — serve a stored image with a guessed content type.
pub async fn serve_image(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state.images.read(&name).await?.ok_or(ApiError::NotFound)?;

    let content_type = mime_guess::from_path(&name)
        .first_or_octet_stream()
        .to_string();

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

fn matches_query(row: &CarRow, q: &str) -> bool {
    row.name.to_lowercase().contains(q) || row.notes.to_lowercase().contains(q)
}

fn car_response(row: CarRow) -> CarResponse {
    CarResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt car id '{}': {}", row.id, e);
            Uuid::default()
        }),
        created_at: parse_created_at(&row.created_at, &format!("car '{}'", row.id)),
        name: row.name,
        image: row.image,
        notes: row.notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car(name: &str, notes: &str) -> CarRow {
        CarRow {
            id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            image: "img.jpg".to_string(),
            notes: notes.to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn search_matches_name_and_notes_case_insensitively() {
        let mustang = car("Mustang", "red");

        assert!(matches_query(&mustang, "mus"));
        assert!(matches_query(&mustang, "red"));
        assert!(matches_query(&mustang, "RED".to_lowercase().as_str()));
        assert!(!matches_query(&mustang, "blue"));
    }

    #[test]
    fn car_response_preserves_fields() {
        let row = car("GT40", "le mans");
        let id = row.id.clone();

        let resp = car_response(row);
        assert_eq!(resp.id.to_string(), id);
        assert_eq!(resp.name, "GT40");
        assert_eq!(resp.notes, "le mans");
        assert_eq!(resp.image, "img.jpg");
    }
}
