use thiserror::Error;

use crate::db_types::{MemberId, NewNotification, Notification, Recipient};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Notification #{0} does not exist")]
    NotificationNotFound(i64),
    #[error("Could not serialize notification data. {0}")]
    InvalidData(String),
}

impl NotificationError {
    pub fn code(&self) -> &'static str {
        match self {
            NotificationError::DatabaseError(_) => "DATABASE_ERROR",
            NotificationError::NotificationNotFound(_) => "NOTIF_NOT_FOUND",
            NotificationError::InvalidData(_) => "INVALID_DATA",
        }
    }
}

impl From<sqlx::Error> for NotificationError {
    fn from(e: sqlx::Error) -> Self {
        NotificationError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(e: serde_json::Error) -> Self {
        NotificationError::InvalidData(e.to_string())
    }
}

#[allow(async_fn_in_trait)]
pub trait NotificationManagement: Clone {
    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, NotificationError>;

    /// Notifications for the recipient, newest first.
    async fn fetch_notifications(
        &self,
        recipient: Recipient,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Notification>, NotificationError>;

    async fn unread_count(&self, recipient: Recipient) -> Result<i64, NotificationError>;

    /// Marks a single notification as read. Only the member that owns the notification may do this.
    async fn mark_read(&self, member_id: MemberId, notification_id: i64) -> Result<Notification, NotificationError>;

    /// Returns the number of notifications that changed.
    async fn mark_all_read(&self, member_id: MemberId) -> Result<u64, NotificationError>;
}
