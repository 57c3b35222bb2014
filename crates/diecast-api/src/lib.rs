pub mod auth;
pub mod collection;
pub mod enrich;
pub mod error;
pub mod feed;
pub mod middleware;
pub mod storage;

use std::sync::Arc;

use tracing::warn;

use crate::enrich::EnrichClient;
use crate::storage::ImageStore;
use diecast_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub images: ImageStore,
    pub enrich: EnrichClient,
    pub jwt_secret: String,
}

pub(crate) fn join_err(e: tokio::task::JoinError) -> crate::error::ApiError {
    crate::error::ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e))
}

/// Timestamps are written as RFC 3339, but rows created by hand or by older
/// tooling may carry SQLite's bare "YYYY-MM-DD HH:MM:SS" format. Parse both.
pub(crate) fn parse_created_at(raw: &str, context: &str) -> chrono::DateTime<chrono::Utc> {
    raw.parse::<chrono::DateTime<chrono::Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on {}: {}", raw, context, e);
            chrono::DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_and_sqlite_formats() {
        let a = parse_created_at("2026-03-01T12:00:00Z", "test");
        let b = parse_created_at("2026-03-01 12:00:00", "test");
        assert_eq!(a, b);
    }

    #[test]
    fn garbage_timestamp_falls_back_to_epoch() {
        let t = parse_created_at("not-a-date", "test");
        assert_eq!(t, chrono::DateTime::<chrono::Utc>::default());
    }
}
