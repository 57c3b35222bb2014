/// Database row types — these map directly to SQLite rows.
/// Distinct from the diecast-types API models to keep the DB layer
/// independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct CarRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub image: String,
    pub notes: String,
    pub created_at: String,
}

/// One feed entry joined with its source car and author username.
pub struct FeedRow {
    pub id: String,
    pub car_id: String,
    pub user_id: String,
    pub author_username: String,
    pub car_name: String,
    pub image: String,
    pub description: String,
    pub likes: i64,
    pub created_at: String,
}
