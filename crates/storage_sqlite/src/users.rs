use anyhow::Result;
use chrono::{DateTime, Utc};
use core_types::{SessionUser, UserId};
use sqlx::Row;
use uuid::Uuid;

use crate::{SqliteStorage, StorageError, parse_rfc3339, timestamp};

#[derive(Debug, Clone)]
pub struct StoredUser {
    pub user: SessionUser,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl SqliteStorage {
    pub async fn create_user(
        &self,
        name: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Result<StoredUser> {
        let now = Utc::now();
        let user = SessionUser {
            id: UserId::new_v4(),
            name: name.into(),
            email: email.into(),
        };
        let password_hash = password_hash.into();

        let inserted = sqlx::query(
            r#"
            INSERT INTO users(id, name, email, password_hash, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&password_hash)
        .bind(timestamp(now))
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(StorageError::EmailTaken.into());
            }
            Err(err) => return Err(err.into()),
        }

        Ok(StoredUser {
            user,
            password_hash,
            created_at: now,
        })
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<StoredUser>> {
        let row = sqlx::query(
            r#"SELECT id, name, email, password_hash, created_at FROM users WHERE email = ?1"#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<StoredUser> {
            Ok(StoredUser {
                user: map_user(&row)?,
                password_hash: row.get("password_hash"),
                created_at: parse_rfc3339(row.get::<String, _>("created_at"))?,
            })
        })
        .transpose()
    }

    pub async fn find_user_by_id(&self, id: UserId) -> Result<Option<SessionUser>> {
        let row = sqlx::query(r#"SELECT id, name, email FROM users WHERE id = ?1"#)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_user).transpose()
    }
}

fn map_user(row: &sqlx::sqlite::SqliteRow) -> Result<SessionUser> {
    Ok(SessionUser {
        id: Uuid::parse_str(row.get::<String, _>("id").as_str())?,
        name: row.get("name"),
        email: row.get("email"),
    })
}
