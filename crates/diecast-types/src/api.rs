use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// JWT claims shared between the auth handlers (token minting) and the
/// middleware (token validation). Canonical definition lives here in
/// diecast-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Collection --

#[derive(Debug, Serialize)]
pub struct CarResponse {
    pub id: Uuid,
    pub name: String,
    pub image: String,
    pub notes: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct CarInfoResponse {
    pub info: String,
}

// -- Feed --

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ShareCarRequest {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: Uuid,
    pub car_id: Uuid,
    pub author_id: Uuid,
    pub description: String,
    pub likes: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A feed entry resolved together with its source car and author, so the
/// client never has to chase per-post lookups.
#[derive(Debug, Serialize)]
pub struct FeedEntryResponse {
    pub id: Uuid,
    pub car_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub car_name: String,
    pub image: String,
    pub description: String,
    pub likes: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub likes: i64,
}
