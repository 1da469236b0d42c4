use serde::{Deserialize, Serialize};

use crate::db_types::{Commission, Member, Notification, Payment};

/// Published after a notification has been persisted.
///
/// Live transports (websocket push, email) subscribe to this. `email` is only filled in when the notification carries
/// the email channel and the recipient has an address on file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub notification: Notification,
    pub email: Option<String>,
}

impl NotificationEvent {
    pub fn new(notification: Notification, email: Option<String>) -> Self {
        Self { notification, email }
    }
}

/// Published after a confirmed payment has activated its owner and the commission waterfall has been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberActivatedEvent {
    pub member: Member,
    pub payment: Payment,
    pub commissions: Vec<Commission>,
}

impl MemberActivatedEvent {
    pub fn new(member: Member, payment: Payment, commissions: Vec<Commission>) -> Self {
        Self { member, payment, commissions }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    Notification(NotificationEvent),
    MemberActivated(MemberActivatedEvent),
}
