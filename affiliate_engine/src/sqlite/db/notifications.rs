use chrono::Utc;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Channel, MemberId, NewNotification, Notification, Recipient},
    traits::NotificationError,
};

pub async fn insert_notification(
    notification: NewNotification,
    conn: &mut SqliteConnection,
) -> Result<Notification, NotificationError> {
    let data = serde_json::to_string(&notification.data)?;
    let channels = Channel::join(&notification.channels);
    let rows: Vec<Notification> = sqlx::query_as(
        r#"
        INSERT INTO notifications (member_id, kind, title, body, data, channels, is_read, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, 0, $7)
        RETURNING *;
        "#,
    )
    .bind(notification.recipient.member_id())
    .bind(notification.kind)
    .bind(notification.title)
    .bind(notification.body)
    .bind(data)
    .bind(channels)
    .bind(Utc::now())
    .fetch_all(conn)
    .await?;
    rows.into_iter().next().ok_or_else(|| sqlx::Error::RowNotFound.into())
}

pub async fn fetch_notifications(
    recipient: Recipient,
    skip: i64,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Notification>, sqlx::Error> {
    match recipient {
        Recipient::Member(id) => {
            sqlx::query_as(
                "SELECT * FROM notifications WHERE member_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
            )
            .bind(id)
            .bind(limit)
            .bind(skip)
            .fetch_all(conn)
            .await
        },
        Recipient::Broadcast => {
            sqlx::query_as(
                "SELECT * FROM notifications WHERE member_id IS NULL ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET \
                 $2",
            )
            .bind(limit)
            .bind(skip)
            .fetch_all(conn)
            .await
        },
    }
}

pub async fn unread_count(recipient: Recipient, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    match recipient {
        Recipient::Member(id) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE member_id = $1 AND is_read = 0")
                .bind(id)
                .fetch_one(conn)
                .await
        },
        Recipient::Broadcast => {
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE member_id IS NULL AND is_read = 0")
                .fetch_one(conn)
                .await
        },
    }
}

pub async fn mark_read(
    member_id: MemberId,
    notification_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Notification>, sqlx::Error> {
    let rows: Vec<Notification> =
        sqlx::query_as("UPDATE notifications SET is_read = 1 WHERE id = $1 AND member_id = $2 RETURNING *")
            .bind(notification_id)
            .bind(member_id)
            .fetch_all(conn)
            .await?;
    Ok(rows.into_iter().next())
}

pub async fn mark_all_read(member_id: MemberId, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE member_id = $1 AND is_read = 0")
        .bind(member_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
