use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
    )?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE cars (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                name        TEXT NOT NULL,
                image       TEXT NOT NULL,
                notes       TEXT NOT NULL DEFAULT '',
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_cars_owner
                ON cars(user_id, created_at);

            CREATE TABLE posts (
                id          TEXT PRIMARY KEY,
                car_id      TEXT NOT NULL REFERENCES cars(id),
                user_id     TEXT NOT NULL REFERENCES users(id),
                description TEXT NOT NULL DEFAULT '',
                likes       INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_posts_created
                ON posts(created_at);

            CREATE INDEX idx_posts_car
                ON posts(car_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    Ok(())
}
