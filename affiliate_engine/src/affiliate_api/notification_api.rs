use std::fmt::Debug;

use log::*;
use serde_json::Value;

use crate::{
    db_types::{Channel, MemberId, NewNotification, Notification, NotificationKind, Recipient},
    events::{EventProducers, NotificationEvent},
    traits::{NotificationError, NotificationManagement, ReferralGraph},
};

/// `Notifier` persists notifications and hands them to the live transports registered through the event hooks.
///
/// Emitting is fire-and-forget from the caller's point of view: it always happens after the domain change has been
/// committed, and a failure to store or deliver a notification is logged but never propagated.
pub struct Notifier<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for Notifier<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Notifier")
    }
}

impl<B: Clone> Clone for Notifier<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone() }
    }
}

impl<B> Notifier<B>
where B: NotificationManagement + ReferralGraph
{
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    /// Stores a notification on every channel and publishes it. See [`Self::send`].
    pub async fn emit(
        &self,
        recipient: Recipient,
        kind: NotificationKind,
        title: &str,
        body: &str,
        data: Value,
    ) -> Option<Notification> {
        let notification = NewNotification::new(recipient, kind, title, body).with_data(data);
        self.send(notification).await
    }

    /// Stores the notification, then publishes a [`NotificationEvent`] to every notification hook.
    ///
    /// The recipient's email address is attached to the event only if the notification includes the email channel.
    /// Returns `None` if the notification could not be stored.
    pub async fn send(&self, notification: NewNotification) -> Option<Notification> {
        let notification = match self.db.insert_notification(notification).await {
            Ok(n) => n,
            Err(e) => {
                error!("📬️ Could not save notification. {e}");
                return None;
            },
        };
        trace!("📬️ Notification #{} ({}) saved for {:?}", notification.id, notification.title, notification.member_id);
        if self.producers.notification_producer.is_empty() {
            return Some(notification);
        }
        let email = self.email_for(&notification).await;
        for producer in &self.producers.notification_producer {
            let event = NotificationEvent::new(notification.clone(), email.clone());
            producer.publish_event(event).await;
        }
        Some(notification)
    }

    async fn email_for(&self, notification: &Notification) -> Option<String> {
        if !notification.has_channel(Channel::Email) {
            return None;
        }
        let member_id = notification.member_id?;
        match self.db.fetch_member(member_id).await {
            Ok(Some(member)) if !member.email.is_empty() => Some(member.email),
            Ok(_) => None,
            Err(e) => {
                warn!("📬️ Could not look up the email address of member #{member_id}. {e}");
                None
            },
        }
    }

    /// The member's notifications, newest first.
    pub async fn notifications(
        &self,
        member_id: MemberId,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Notification>, NotificationError> {
        self.db.fetch_notifications(Recipient::Member(member_id), skip, limit).await
    }

    /// Notifications sent to the operator channel, newest first.
    pub async fn broadcasts(&self, skip: i64, limit: i64) -> Result<Vec<Notification>, NotificationError> {
        self.db.fetch_notifications(Recipient::Broadcast, skip, limit).await
    }

    pub async fn unread_count(&self, member_id: MemberId) -> Result<i64, NotificationError> {
        self.db.unread_count(Recipient::Member(member_id)).await
    }

    /// Marks one of the member's notifications as read. Notifications that belong to someone else are reported as
    /// not found.
    pub async fn mark_read(
        &self,
        member_id: MemberId,
        notification_id: i64,
    ) -> Result<Notification, NotificationError> {
        self.db.mark_read(member_id, notification_id).await
    }

    pub async fn mark_all_read(&self, member_id: MemberId) -> Result<u64, NotificationError> {
        let count = self.db.mark_all_read(member_id).await?;
        debug!("📬️ {count} notifications marked as read for member #{member_id}");
        Ok(count)
    }
}
