use anyhow::Context;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
}

pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT id, email, password_hash FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(db)
        .await
        .context("find user by email")
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT id, email, password_hash FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find user by id")
}

/// Returns `None` when the email is already registered.
pub async fn create(db: &PgPool, email: &str, password_hash: &str) -> anyhow::Result<Option<User>> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, password_hash)
        VALUES ($1, $2)
        ON CONFLICT (email) DO NOTHING
        RETURNING id, email, password_hash
        "#,
    )
    .bind(email)
    .bind(password_hash)
    .fetch_optional(db)
    .await
    .context("create user")
}
