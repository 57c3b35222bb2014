use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};
use uuid::Uuid;

use diecast_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::{ApiError, ApiResult};
use crate::{AppState, join_err};

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::InvalidInput(
            "username must be 3-32 characters".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::InvalidInput(
            "password must be at least 8 characters".into(),
        ));
    }

    // Check if username is taken
    let db = state.clone();
    let username = req.username.clone();
    let existing = tokio::task::spawn_blocking(move || db.db.get_user_by_username(&username))
        .await
        .map_err(join_err)??;
    if existing.is_some() {
        return Err(ApiError::UsernameTaken);
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();

    let db = state.clone();
    let uid = user_id.to_string();
    let username = req.username.clone();
    tokio::task::spawn_blocking(move || db.db.create_user(&uid, &username, &password_hash))
        .await
        .map_err(join_err)??;

    info!("Registered user '{}'", req.username);

    let token = create_token(&state.jwt_secret, user_id, &req.username)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let username = req.username.clone();
    let user = tokio::task::spawn_blocking(move || db.db.get_user_by_username(&username))
        .await
        .map_err(join_err)??
        // Unknown user and wrong password are indistinguishable to the caller.
        .ok_or(ApiError::Unauthenticated)?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("Stored password hash is corrupt: {}", e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthenticated)?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("Corrupt user id '{}': {}", user.id, e))?;

    let token = create_token(&state.jwt_secret, user_id, &user.username)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

/// DELETE /auth/account — removes the caller's account and everything owned
/// by it: their posts, posts referencing their cars, the cars, and the user
/// row in one transaction, then the image files best-effort after commit.
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let uid = claims.sub.to_string();
    let images = tokio::task::spawn_blocking(move || db.db.delete_user(&uid))
        .await
        .map_err(join_err)??;

    for name in &images {
        if let Err(e) = state.images.delete(name).await {
            warn!("Failed to delete image {} for removed account: {}", name, e);
        }
    }

    info!(
        "Deleted account '{}' ({} images)",
        claims.username,
        images.len()
    );

    Ok(StatusCode::NO_CONTENT)
}

fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    #[test]
    fn minted_token_round_trips_claims() {
        let user_id = Uuid::new_v4();
        let token = create_token("test-secret", user_id, "alice").unwrap();

        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap();

        assert_eq!(data.claims.sub, user_id);
        assert_eq!(data.claims.username, "alice");
    }

    #[test]
    fn token_rejects_wrong_secret() {
        let token = create_token("secret-a", Uuid::new_v4(), "alice").unwrap();

        let result = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"secret-b"),
            &Validation::default(),
        );
        assert!(result.is_err());
    }
}
