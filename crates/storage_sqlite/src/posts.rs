use anyhow::Result;
use chrono::{DateTime, Utc};
use core_types::UserId;
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::{SqliteStorage, parse_rfc3339, timestamp};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub name: String,
    pub created_by_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SqliteStorage {
    pub async fn create_post(&self, name: impl Into<String>, owner: UserId) -> Result<Post> {
        let name = name.into();
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO posts(name, created_by_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&name)
        .bind(owner.to_string())
        .bind(timestamp(now))
        .bind(timestamp(now))
        .execute(&self.pool)
        .await?;

        Ok(Post {
            id: result.last_insert_rowid(),
            name,
            created_by_id: owner.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Newest post owned by `owner`; ties on `created_at` go to the later insert.
    pub async fn latest_post_for(&self, owner: UserId) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, created_by_id, created_at, updated_at
            FROM posts
            WHERE created_by_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(owner.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(map_post_row).transpose()
    }
}

fn map_post_row(row: sqlx::sqlite::SqliteRow) -> Result<Post> {
    Ok(Post {
        id: row.get("id"),
        name: row.get("name"),
        created_by_id: row.get("created_by_id"),
        created_at: parse_rfc3339(row.get::<String, _>("created_at"))?,
        updated_at: parse_rfc3339(row.get::<String, _>("updated_at"))?,
    })
}
