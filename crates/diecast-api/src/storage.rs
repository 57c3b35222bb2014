use anyhow::{Result, bail};
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

/// On-disk store for uploaded car photos.
///
/// Each image lives as a single flat file at `{dir}/{stored_name}`. Stored
/// names are generated here and are the only names ever handed back out, so
/// lookups never touch caller-controlled paths directly.
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Image storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Persist image bytes under a collision-resistant generated name:
    /// unix timestamp + random fragment + sanitized original filename.
    /// Returns the stored name to reference in the database.
    pub async fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String> {
        if bytes.is_empty() {
            bail!("Refusing to store empty image");
        }

        let name = generate_name(suggested_name);
        fs::write(self.path(&name), bytes).await?;
        Ok(name)
    }

    /// Read a stored image back, or `None` when it is gone.
    pub async fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        if !is_safe_name(name) {
            return Ok(None);
        }

        match fs::read(self.path(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Idempotent delete: a file that is already gone is not an error.
    pub async fn delete(&self, name: &str) -> Result<()> {
        if !is_safe_name(name) {
            return Ok(());
        }

        match fs::remove_file(self.path(name)).await {
            Ok(()) => {
                info!("Deleted image {}", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Image {} already gone", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn generate_name(suggested: &str) -> String {
    let fragment: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!(
        "{}_{}_{}",
        chrono::Utc::now().timestamp(),
        fragment,
        sanitize(suggested)
    )
}

/// Keep only filename-safe characters and drop any path components the
/// client smuggled into the original filename.
fn sanitize(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches(['.', '_']).is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (tempfile::TempDir, ImageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("uploads")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn store_then_read_roundtrip() {
        let (_dir, store) = test_store().await;

        let name = store.store(b"jpeg bytes", "mustang.jpg").await.unwrap();
        assert!(name.ends_with("_mustang.jpg"));

        let bytes = store.read(&name).await.unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"jpeg bytes"[..]));
    }

    #[tokio::test]
    async fn empty_bytes_are_rejected() {
        let (_dir, store) = test_store().await;
        assert!(store.store(b"", "x.jpg").await.is_err());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, store) = test_store().await;

        let name = store.store(b"data", "car.png").await.unwrap();
        store.delete(&name).await.unwrap();
        // Second delete of the same name must also succeed.
        store.delete(&name).await.unwrap();
        assert!(store.read(&name).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn traversal_names_never_resolve() {
        let (_dir, store) = test_store().await;
        assert!(store.read("../etc/passwd").await.unwrap().is_none());
        store.delete("../../x").await.unwrap();
    }

    #[test]
    fn sanitize_strips_paths_and_odd_characters() {
        assert_eq!(sanitize("../../etc/passwd"), "passwd");
        assert_eq!(sanitize("my car photo!.jpg"), "my_car_photo_.jpg");
        assert_eq!(sanitize("..."), "upload");
        assert_eq!(sanitize(""), "upload");
    }

    #[test]
    fn generated_names_do_not_collide() {
        let a = generate_name("car.jpg");
        let b = generate_name("car.jpg");
        assert_ne!(a, b);
    }
}
