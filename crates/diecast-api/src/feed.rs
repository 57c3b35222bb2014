use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use diecast_db::models::FeedRow;
use diecast_types::api::{Claims, FeedEntryResponse, LikeResponse, PostResponse, ShareCarRequest};

use crate::error::{ApiError, ApiResult};
use crate::{AppState, join_err, parse_created_at};

/// POST /cars/{id}/share — publish one of the caller's own cars to the feed.
/// The ownership check and the insert share a transaction in the db layer,
/// so sharing a car that is not yours (or no longer exists) is a 404.
pub async fn share_car(
    State(state): State<AppState>,
    Path(car_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    body: Option<Json<ShareCarRequest>>,
) -> ApiResult<impl IntoResponse> {
    let req = body.map(|Json(r)| r).unwrap_or_default();

    let post_id = Uuid::new_v4();
    let created_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);

    let db = state.clone();
    let pid = post_id.to_string();
    let cid = car_id.to_string();
    let uid = claims.sub.to_string();
    let description = req.description.clone();
    let row_created = created_at.clone();
    let inserted = tokio::task::spawn_blocking(move || {
        db.db
            .create_post(&pid, &cid, &uid, &description, &row_created)
    })
    .await
    .map_err(join_err)??;

    if !inserted {
        return Err(ApiError::NotFound);
    }

    Ok((
        StatusCode::CREATED,
        Json(PostResponse {
            id: post_id,
            car_id,
            author_id: claims.sub,
            description: req.description,
            likes: 0,
            created_at: parse_created_at(&created_at, "new post"),
        }),
    ))
}

/// GET /feed — public. Every post, newest first, resolved together with its
/// source car and author in a single bulk query.
pub async fn list_feed(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let rows = tokio::task::spawn_blocking(move || db.db.list_feed())
        .await
        .map_err(join_err)??;

    let entries: Vec<FeedEntryResponse> = rows.into_iter().map(feed_entry_response).collect();

    Ok(Json(entries))
}

/// POST /feed/{post_id}/like — atomic increment, returns the new count.
/// Likes are not deduplicated per user; repeat likes keep counting.
pub async fn like_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let pid = post_id.to_string();
    let likes = tokio::task::spawn_blocking(move || db.db.like_post(&pid))
        .await
        .map_err(join_err)??
        .ok_or(ApiError::NotFound)?;

    Ok(Json(LikeResponse { likes }))
}

/// DELETE /feed/{post_id} — authors may retract their own posts. The source
/// car is untouched.
pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let pid = post_id.to_string();
    let uid = claims.sub.to_string();
    let deleted = tokio::task::spawn_blocking(move || db.db.delete_post(&pid, &uid))
        .await
        .map_err(join_err)??;

    if !deleted {
        return Err(ApiError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}

fn feed_entry_response(row: FeedRow) -> FeedEntryResponse {
    FeedEntryResponse {
        id: parse_id(&row.id, "post"),
        car_id: parse_id(&row.car_id, "car"),
        author_id: parse_id(&row.user_id, "author"),
        created_at: parse_created_at(&row.created_at, &format!("post '{}'", row.id)),
        author_username: row.author_username,
        car_name: row.car_name,
        image: row.image,
        description: row.description,
        likes: row.likes,
    }
}

fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} id '{}': {}", what, raw, e);
        Uuid::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_entry_carries_joined_fields() {
        let post_id = Uuid::new_v4();
        let row = FeedRow {
            id: post_id.to_string(),
            car_id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            author_username: "alice".to_string(),
            car_name: "Mustang".to_string(),
            image: "1_ab_mustang.jpg".to_string(),
            description: "my favorite".to_string(),
            likes: 3,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        };

        let entry = feed_entry_response(row);
        assert_eq!(entry.id, post_id);
        assert_eq!(entry.author_username, "alice");
        assert_eq!(entry.car_name, "Mustang");
        assert_eq!(entry.likes, 3);
    }

    #[test]
    fn corrupt_ids_degrade_to_nil_uuid() {
        assert_eq!(parse_id("not-a-uuid", "post"), Uuid::default());
    }
}
