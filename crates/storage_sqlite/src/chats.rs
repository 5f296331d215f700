use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use core_types::{ChatId, ChatRole, MessageFeedback, MessageId, UserId};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use crate::{SqliteStorage, parse_rfc3339, timestamp};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    pub user_id: UserId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub role: ChatRole,
    pub content: String,
    pub feedback: Option<MessageFeedback>,
    pub created_at: DateTime<Utc>,
}

impl SqliteStorage {
    pub async fn create_chat(&self, user_id: UserId, title: impl Into<String>) -> Result<Chat> {
        let now = Utc::now();
        let chat = Chat {
            id: ChatId::new_v4(),
            user_id,
            title: title.into(),
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            r#"
            INSERT INTO chats(id, user_id, title, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(chat.id.to_string())
        .bind(user_id.to_string())
        .bind(&chat.title)
        .bind(timestamp(now))
        .bind(timestamp(now))
        .execute(&self.pool)
        .await?;
        Ok(chat)
    }

    pub async fn get_chat(&self, chat_id: ChatId) -> Result<Option<Chat>> {
        let row = sqlx::query(
            r#"SELECT id, user_id, title, created_at, updated_at FROM chats WHERE id = ?1"#,
        )
        .bind(chat_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(map_chat_row).transpose()
    }

    pub async fn list_chats(&self, user_id: UserId) -> Result<Vec<Chat>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, created_at, updated_at
            FROM chats
            WHERE user_id = ?1
            ORDER BY updated_at DESC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_chat_row).collect()
    }

    pub async fn append_message(
        &self,
        chat_id: ChatId,
        role: ChatRole,
        content: impl Into<String>,
    ) -> Result<ChatMessage> {
        let now = Utc::now();
        let message = ChatMessage {
            id: MessageId::new_v4(),
            chat_id,
            role,
            content: content.into(),
            feedback: None,
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO messages(id, chat_id, role, content, feedback, created_at)
            VALUES (?1, ?2, ?3, ?4, NULL, ?5)
            "#,
        )
        .bind(message.id.to_string())
        .bind(chat_id.to_string())
        .bind(role.as_str())
        .bind(&message.content)
        .bind(timestamp(now))
        .execute(&self.pool)
        .await?;

        sqlx::query(r#"UPDATE chats SET updated_at = ?2 WHERE id = ?1"#)
            .bind(chat_id.to_string())
            .bind(timestamp(now))
            .execute(&self.pool)
            .await?;

        Ok(message)
    }

    pub async fn list_messages(&self, chat_id: ChatId) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, chat_id, role, content, feedback, created_at
            FROM messages
            WHERE chat_id = ?1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(chat_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_message_row).collect()
    }

    /// Owner of the chat a message belongs to.
    pub async fn message_owner(&self, message_id: MessageId) -> Result<Option<UserId>> {
        let row = sqlx::query(
            r#"
            SELECT c.user_id
            FROM messages m
            JOIN chats c ON c.id = m.chat_id
            WHERE m.id = ?1
            "#,
        )
        .bind(message_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| -> Result<UserId> {
            Ok(Uuid::parse_str(row.get::<String, _>("user_id").as_str())?)
        })
        .transpose()
    }

    pub async fn set_message_feedback(
        &self,
        message_id: MessageId,
        feedback: Option<MessageFeedback>,
    ) -> Result<bool> {
        let result = sqlx::query(r#"UPDATE messages SET feedback = ?2 WHERE id = ?1"#)
            .bind(message_id.to_string())
            .bind(feedback.map(MessageFeedback::as_str))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_messages_with_feedback(&self) -> Result<u64> {
        let row = sqlx::query(r#"SELECT COUNT(*) AS n FROM messages WHERE feedback IS NOT NULL"#)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    /// Clears the feedback of every message. Returns how many messages changed.
    pub async fn reset_all_message_feedback(&self) -> Result<u64> {
        let result =
            sqlx::query(r#"UPDATE messages SET feedback = NULL WHERE feedback IS NOT NULL"#)
                .execute(&self.pool)
                .await?;
        let cleared = result.rows_affected();
        info!(cleared, "message feedback reset");
        Ok(cleared)
    }
}

fn map_chat_row(row: sqlx::sqlite::SqliteRow) -> Result<Chat> {
    Ok(Chat {
        id: Uuid::parse_str(row.get::<String, _>("id").as_str())?,
        user_id: Uuid::parse_str(row.get::<String, _>("user_id").as_str())?,
        title: row.get("title"),
        created_at: parse_rfc3339(row.get::<String, _>("created_at"))?,
        updated_at: parse_rfc3339(row.get::<String, _>("updated_at"))?,
    })
}

fn map_message_row(row: sqlx::sqlite::SqliteRow) -> Result<ChatMessage> {
    let role = row
        .get::<String, _>("role")
        .parse::<ChatRole>()
        .context("invalid role in database")?;
    let feedback = row
        .get::<Option<String>, _>("feedback")
        .map(|raw| raw.parse::<MessageFeedback>())
        .transpose()
        .context("invalid feedback in database")?;
    Ok(ChatMessage {
        id: Uuid::parse_str(row.get::<String, _>("id").as_str())?,
        chat_id: Uuid::parse_str(row.get::<String, _>("chat_id").as_str())?,
        role,
        content: row.get("content"),
        feedback,
        created_at: parse_rfc3339(row.get::<String, _>("created_at"))?,
    })
}
