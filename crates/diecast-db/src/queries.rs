use crate::Database;
use crate::models::{CarRow, FeedRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, params};

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    /// Deletes the user together with everything hanging off them: posts
    /// they authored, posts referencing their cars, and the cars themselves,
    /// all in one transaction. Returns the stored image names of the deleted
    /// cars so the caller can remove the files after commit.
    pub fn delete_user(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let images: Vec<String> = {
                let mut stmt = tx.prepare("SELECT image FROM cars WHERE user_id = ?1")?;
                stmt.query_map([user_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            // Posts must go first so the foreign keys on cars/users hold.
            tx.execute(
                "DELETE FROM posts
                 WHERE user_id = ?1
                    OR car_id IN (SELECT id FROM cars WHERE user_id = ?1)",
                [user_id],
            )?;
            tx.execute("DELETE FROM cars WHERE user_id = ?1", [user_id])?;
            tx.execute("DELETE FROM users WHERE id = ?1", [user_id])?;

            tx.commit()?;
            Ok(images)
        })
    }

    // -- Cars --

    pub fn insert_car(
        &self,
        id: &str,
        user_id: &str,
        name: &str,
        image: &str,
        notes: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO cars (id, user_id, name, image, notes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, user_id, name, image, notes, created_at],
            )?;
            Ok(())
        })
    }

    pub fn list_cars(&self, user_id: &str) -> Result<Vec<CarRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, name, image, notes, created_at
                 FROM cars
                 WHERE user_id = ?1
                 ORDER BY created_at DESC",
            )?;

            let rows = stmt
                .query_map([user_id], map_car_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Owner-scoped lookup: a car belonging to someone else is
    /// indistinguishable from a car that does not exist.
    pub fn get_car(&self, id: &str, user_id: &str) -> Result<Option<CarRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, name, image, notes, created_at
                 FROM cars
                 WHERE id = ?1 AND user_id = ?2",
            )?;

            let row = stmt.query_row(params![id, user_id], map_car_row).optional()?;
            Ok(row)
        })
    }

    /// Cascade delete of a car: all posts referencing it, then the row
    /// itself, committed as one transaction. Returns the stored image name
    /// so the caller can remove the file after commit, or `None` when the
    /// car does not exist or is not owned by `user_id`.
    pub fn delete_car(&self, id: &str, user_id: &str) -> Result<Option<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let image: Option<String> = tx
                .query_row(
                    "SELECT image FROM cars WHERE id = ?1 AND user_id = ?2",
                    params![id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(image) = image else {
                return Ok(None);
            };

            tx.execute("DELETE FROM posts WHERE car_id = ?1", [id])?;
            tx.execute("DELETE FROM cars WHERE id = ?1", [id])?;

            tx.commit()?;
            Ok(Some(image))
        })
    }

    // -- Posts --

    /// Inserts a post for a car the user owns. The ownership check and the
    /// insert run in the same transaction so a concurrent car delete can
    /// never leave a post behind pointing at a missing car. Returns false
    /// when the car is absent or owned by someone else.
    pub fn create_post(
        &self,
        id: &str,
        car_id: &str,
        user_id: &str,
        description: &str,
        created_at: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let owned: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM cars WHERE id = ?1 AND user_id = ?2",
                    params![car_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            if owned.is_none() {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO posts (id, car_id, user_id, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, car_id, user_id, description, created_at],
            )?;

            tx.commit()?;
            Ok(true)
        })
    }

    /// The whole feed, newest first, each post joined with its source car
    /// and author username in a single query (eliminates N+1).
    pub fn list_feed(&self) -> Result<Vec<FeedRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.car_id, p.user_id, u.username, c.name, c.image,
                        p.description, p.likes, p.created_at
                 FROM posts p
                 JOIN cars c ON p.car_id = c.id
                 LEFT JOIN users u ON p.user_id = u.id
                 ORDER BY p.created_at DESC",
            )?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(FeedRow {
                        id: row.get(0)?,
                        car_id: row.get(1)?,
                        user_id: row.get(2)?,
                        author_username: row
                            .get::<_, Option<String>>(3)?
                            .unwrap_or_else(|| "unknown".to_string()),
                        car_name: row.get(4)?,
                        image: row.get(5)?,
                        description: row.get(6)?,
                        likes: row.get(7)?,
                        created_at: row.get(8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Atomic increment at the SQL layer, never read-then-write, so
    /// concurrent likes cannot lose updates. Returns the new count, or
    /// `None` when the post does not exist.
    pub fn like_post(&self, id: &str) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let likes = conn
                .query_row(
                    "UPDATE posts SET likes = likes + 1 WHERE id = ?1 RETURNING likes",
                    [id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(likes)
        })
    }

    /// Deletes the post only when `user_id` authored it. Returns whether a
    /// row was removed.
    pub fn delete_post(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM posts WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(n > 0)
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, created_at FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn map_car_row(row: &rusqlite::Row) -> std::result::Result<CarRow, rusqlite::Error> {
    Ok(CarRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        image: row.get(3)?,
        notes: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn add_user(db: &Database, id: &str, username: &str) {
        db.create_user(id, username, "hash").unwrap();
    }

    fn add_car(db: &Database, id: &str, user_id: &str, name: &str, notes: &str, ts: &str) {
        db.insert_car(id, user_id, name, &format!("{id}.jpg"), notes, ts)
            .unwrap();
    }

    fn post_count(db: &Database) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0))?)
        })
        .unwrap()
    }

    #[test]
    fn user_roundtrip() {
        let (_dir, db) = test_db();
        add_user(&db, "u1", "alice");

        let user = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.password, "hash");

        assert!(db.get_user_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn cars_listed_newest_first() {
        let (_dir, db) = test_db();
        add_user(&db, "u1", "alice");
        add_car(&db, "c1", "u1", "Mustang", "", "2026-01-01T00:00:00.000001Z");
        add_car(&db, "c2", "u1", "Camaro", "", "2026-01-01T00:00:00.000003Z");
        add_car(&db, "c3", "u1", "GT40", "", "2026-01-01T00:00:00.000002Z");

        let ids: Vec<String> = db.list_cars("u1").unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["c2", "c3", "c1"]);
    }

    #[test]
    fn get_car_is_owner_scoped() {
        let (_dir, db) = test_db();
        add_user(&db, "u1", "alice");
        add_user(&db, "u2", "bob");
        add_car(&db, "c1", "u1", "Mustang", "red", "2026-01-01T00:00:00Z");

        assert!(db.get_car("c1", "u1").unwrap().is_some());
        assert!(db.get_car("c1", "u2").unwrap().is_none());
        assert!(db.get_car("missing", "u1").unwrap().is_none());
    }

    #[test]
    fn delete_car_cascades_posts_and_returns_image() {
        let (_dir, db) = test_db();
        add_user(&db, "u1", "alice");
        add_car(&db, "c1", "u1", "Mustang", "", "2026-01-01T00:00:00Z");
        assert!(db.create_post("p1", "c1", "u1", "first", "2026-01-02T00:00:00Z").unwrap());
        assert!(db.create_post("p2", "c1", "u1", "again", "2026-01-03T00:00:00Z").unwrap());

        let image = db.delete_car("c1", "u1").unwrap();
        assert_eq!(image.as_deref(), Some("c1.jpg"));
        assert_eq!(post_count(&db), 0);
        assert!(db.get_car("c1", "u1").unwrap().is_none());
        assert!(db.list_feed().unwrap().is_empty());
    }

    #[test]
    fn delete_car_by_non_owner_is_a_no_op() {
        let (_dir, db) = test_db();
        add_user(&db, "u1", "alice");
        add_user(&db, "u2", "bob");
        add_car(&db, "c1", "u1", "Mustang", "", "2026-01-01T00:00:00Z");
        assert!(db.create_post("p1", "c1", "u1", "", "2026-01-02T00:00:00Z").unwrap());

        assert!(db.delete_car("c1", "u2").unwrap().is_none());
        assert!(db.get_car("c1", "u1").unwrap().is_some());
        assert_eq!(post_count(&db), 1);
    }

    #[test]
    fn create_post_requires_ownership() {
        let (_dir, db) = test_db();
        add_user(&db, "u1", "alice");
        add_user(&db, "u2", "bob");
        add_car(&db, "c1", "u1", "Mustang", "", "2026-01-01T00:00:00Z");

        assert!(!db.create_post("p1", "c1", "u2", "not mine", "2026-01-02T00:00:00Z").unwrap());
        assert_eq!(post_count(&db), 0);

        assert!(db.create_post("p1", "c1", "u1", "mine", "2026-01-02T00:00:00Z").unwrap());
        assert_eq!(post_count(&db), 1);
    }

    #[test]
    fn resharing_the_same_car_is_allowed() {
        let (_dir, db) = test_db();
        add_user(&db, "u1", "alice");
        add_car(&db, "c1", "u1", "Mustang", "", "2026-01-01T00:00:00Z");

        assert!(db.create_post("p1", "c1", "u1", "", "2026-01-02T00:00:00Z").unwrap());
        assert!(db.create_post("p2", "c1", "u1", "", "2026-01-03T00:00:00Z").unwrap());
        assert_eq!(db.list_feed().unwrap().len(), 2);
    }

    #[test]
    fn like_increments_by_exactly_one() {
        let (_dir, db) = test_db();
        add_user(&db, "u1", "alice");
        add_car(&db, "c1", "u1", "Mustang", "", "2026-01-01T00:00:00Z");
        assert!(db.create_post("p1", "c1", "u1", "", "2026-01-02T00:00:00Z").unwrap());

        assert_eq!(db.like_post("p1").unwrap(), Some(1));
        assert_eq!(db.like_post("p1").unwrap(), Some(2));
        assert_eq!(db.like_post("missing").unwrap(), None);
    }

    #[test]
    fn delete_post_only_by_author() {
        let (_dir, db) = test_db();
        add_user(&db, "u1", "alice");
        add_user(&db, "u2", "bob");
        add_car(&db, "c1", "u1", "Mustang", "", "2026-01-01T00:00:00Z");
        assert!(db.create_post("p1", "c1", "u1", "", "2026-01-02T00:00:00Z").unwrap());

        assert!(!db.delete_post("p1", "u2").unwrap());
        assert_eq!(post_count(&db), 1);

        assert!(db.delete_post("p1", "u1").unwrap());
        assert_eq!(post_count(&db), 0);
    }

    #[test]
    fn delete_user_cascades_cars_and_posts() {
        let (_dir, db) = test_db();
        add_user(&db, "u1", "alice");
        add_user(&db, "u2", "bob");
        add_car(&db, "c1", "u1", "Mustang", "", "2026-01-01T00:00:00Z");
        add_car(&db, "c2", "u1", "Camaro", "", "2026-01-02T00:00:00Z");
        add_car(&db, "c3", "u2", "GT40", "", "2026-01-03T00:00:00Z");
        assert!(db.create_post("p1", "c1", "u1", "", "2026-01-04T00:00:00Z").unwrap());
        assert!(db.create_post("p2", "c2", "u1", "", "2026-01-05T00:00:00Z").unwrap());
        assert!(db.create_post("p3", "c3", "u2", "", "2026-01-06T00:00:00Z").unwrap());
        db.like_post("p1").unwrap();

        let mut images = db.delete_user("u1").unwrap();
        images.sort();
        assert_eq!(images, vec!["c1.jpg", "c2.jpg"]);

        assert!(db.get_user_by_username("alice").unwrap().is_none());
        assert!(db.list_cars("u1").unwrap().is_empty());

        // Bob's car and post survive.
        let feed = db.list_feed().unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].id, "p3");
    }

    #[test]
    fn feed_resolves_author_and_car_in_one_pass() {
        let (_dir, db) = test_db();
        add_user(&db, "u1", "alice");
        add_car(&db, "c1", "u1", "Mustang", "red", "2026-01-01T00:00:00Z");
        assert!(db.create_post("p1", "c1", "u1", "my favorite", "2026-01-02T00:00:00.000001Z").unwrap());
        assert!(db.create_post("p2", "c1", "u1", "", "2026-01-02T00:00:00.000002Z").unwrap());

        let feed = db.list_feed().unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].id, "p2");
        assert_eq!(feed[1].id, "p1");
        assert_eq!(feed[1].author_username, "alice");
        assert_eq!(feed[1].car_name, "Mustang");
        assert_eq!(feed[1].image, "c1.jpg");
        assert_eq!(feed[1].description, "my favorite");
        assert_eq!(feed[1].likes, 0);
    }
}
