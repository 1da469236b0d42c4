use std::{fmt::Display, str::FromStr};

use affiliate_common::{Percent, UsdCents};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

pub type MemberId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind} value: '{value}'")]
pub struct ConversionError {
    pub kind: &'static str,
    pub value: String,
}

impl ConversionError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

/// Generates `as_str`, `Display` and `FromStr` for the lowercase text enums stored in the database.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ConversionError::new($kind, s)),
                }
            }
        }
    };
}

//--------------------------------------     MemberStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Pending,
    Active,
    Suspended,
}

text_enum!(MemberStatus, "member status", { Pending => "pending", Active => "active", Suspended => "suspended" });

//--------------------------------------       ChildSide      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildSide {
    Left,
    Right,
}

text_enum!(ChildSide, "child side", { Left => "left", Right => "right" });

impl ChildSide {
    /// The `members` column that holds the child pointer for this side.
    pub fn column(&self) -> &'static str {
        match self {
            ChildSide::Left => "left_child_id",
            ChildSide::Right => "right_child_id",
        }
    }
}

//--------------------------------------        Member        ---------------------------------------------------------
/// A node in the affiliate network.
///
/// Two independent upward relations hang off every member:
/// * `sponsor_id` is the member whose referral code was used at signup. Commissions flow up this chain.
/// * `binary_parent_id` is the structural parent chosen by the placement engine. The binary tree shape is built from
///   this relation and the two child pointers.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub currency: String,
    pub referral_code: String,
    pub sponsor_id: Option<MemberId>,
    pub binary_parent_id: Option<MemberId>,
    pub left_child_id: Option<MemberId>,
    pub right_child_id: Option<MemberId>,
    pub status: MemberStatus,
    pub activation_expires_at: Option<DateTime<Utc>>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl Member {
    /// The next child slot to fill. Left is always filled before right.
    pub fn open_slot(&self) -> Option<ChildSide> {
        match (self.left_child_id, self.right_child_id) {
            (None, _) => Some(ChildSide::Left),
            (Some(_), None) => Some(ChildSide::Right),
            (Some(_), Some(_)) => None,
        }
    }

    pub fn children(&self) -> impl Iterator<Item = MemberId> {
        [self.left_child_id, self.right_child_id].into_iter().flatten()
    }

    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

/// A registration request. `referral_code` is the *sponsor's* code, if one was supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMember {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub currency: Option<String>,
    pub referral_code: Option<String>,
}

impl NewMember {
    pub fn new<S: Into<String>>(name: S, email: S) -> Self {
        Self { name: name.into(), email: email.into(), ..Default::default() }
    }

    pub fn with_phone<S: Into<String>>(mut self, phone: S) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_country<S: Into<String>>(mut self, country: S) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_referral_code<S: Into<String>>(mut self, code: S) -> Self {
        self.referral_code = Some(code.into());
        self
    }
}

/// The fully resolved member row that the storage layer inserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRecord {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub currency: String,
    pub referral_code: String,
    pub sponsor_id: Option<MemberId>,
    pub is_admin: bool,
}

//--------------------------------------       Gateway        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Gateway {
    Pesapal,
    Paypal,
}

text_enum!(Gateway, "gateway", { Pesapal => "pesapal", Paypal => "paypal" });

//--------------------------------------     PaymentStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Initiated,
    Pending,
    Confirmed,
    Failed,
    Reversed,
}

text_enum!(PaymentStatus, "payment status", {
    Initiated => "initiated",
    Pending => "pending",
    Confirmed => "confirmed",
    Failed => "failed",
    Reversed => "reversed",
});

impl PaymentStatus {
    /// Confirmed, failed and reversed payments never change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Confirmed | PaymentStatus::Failed | PaymentStatus::Reversed)
    }
}

//--------------------------------------        Payment       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub member_id: MemberId,
    pub gateway: Gateway,
    pub amount: UsdCents,
    /// Display-only projection of `amount` into the member's currency at the time the payment was created.
    pub amount_local: Option<f64>,
    pub currency: String,
    pub status: PaymentStatus,
    /// The gateway-assigned reference
    pub reference: Option<String>,
    /// The id of the last external event applied to this payment
    pub webhook_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub member_id: MemberId,
    pub gateway: Gateway,
    pub amount: UsdCents,
    pub amount_local: Option<f64>,
    pub currency: String,
    pub reference: Option<String>,
}

impl NewPayment {
    pub fn new(member_id: MemberId, gateway: Gateway, amount: UsdCents) -> Self {
        Self {
            member_id,
            gateway,
            amount,
            amount_local: None,
            currency: affiliate_common::USD_CURRENCY_CODE.to_string(),
            reference: None,
        }
    }

    pub fn with_reference<S: Into<String>>(mut self, reference: S) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_local_amount<S: Into<String>>(mut self, amount: f64, currency: S) -> Self {
        self.amount_local = Some(amount);
        self.currency = currency.into();
        self
    }
}

//--------------------------------------     PaymentEvent     ---------------------------------------------------------
/// The status reported by a gateway notification. Gateways never report `initiated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentEventStatus {
    Pending,
    Confirmed,
    Failed,
    Reversed,
}

text_enum!(PaymentEventStatus, "payment event status", {
    Pending => "pending",
    Confirmed => "confirmed",
    Failed => "failed",
    Reversed => "reversed",
});

impl From<PaymentEventStatus> for PaymentStatus {
    fn from(value: PaymentEventStatus) -> Self {
        match value {
            PaymentEventStatus::Pending => PaymentStatus::Pending,
            PaymentEventStatus::Confirmed => PaymentStatus::Confirmed,
            PaymentEventStatus::Failed => PaymentStatus::Failed,
            PaymentEventStatus::Reversed => PaymentStatus::Reversed,
        }
    }
}

/// A normalised notification from a payment gateway. `event_id` is the idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub event_id: String,
    pub reference: Option<String>,
    pub status: PaymentEventStatus,
    /// If present, overrides the amount recorded on the payment
    pub amount: Option<UsdCents>,
    /// Used to find the payment when the gateway does not echo back our reference
    pub member_id: Option<MemberId>,
    /// Tags the commission rows produced by this event. Defaults to `event_id`.
    pub correlation_id: Option<String>,
}

impl PaymentEvent {
    pub fn new<S: Into<String>>(event_id: S, status: PaymentEventStatus) -> Self {
        Self { event_id: event_id.into(), reference: None, status, amount: None, member_id: None, correlation_id: None }
    }

    pub fn with_reference<S: Into<String>>(mut self, reference: S) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_member_id(mut self, member_id: MemberId) -> Self {
        self.member_id = Some(member_id);
        self
    }

    pub fn with_amount(mut self, amount: UsdCents) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Tags the commission rows with `correlation_id` instead of the event id. The tag is the idempotency key of those
    /// rows, so reusing it for another member's activation is refused.
    pub fn with_correlation_id<S: Into<String>>(mut self, correlation_id: S) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn correlation_id(&self) -> &str {
        self.correlation_id.as_deref().unwrap_or(self.event_id.as_str())
    }
}

/// A row in the processed event log.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PaymentEventRecord {
    pub event_id: String,
    pub gateway: Gateway,
    pub payment_id: Option<i64>,
    pub outcome: Option<String>,
    pub processed_at: DateTime<Utc>,
}

//--------------------------------------      Commission      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Commission {
    pub id: i64,
    pub earner_id: MemberId,
    pub source_member_id: MemberId,
    /// Waterfall level (1 is the direct sponsor). Level 0 rows are task rewards.
    pub level: i64,
    pub amount: UsdCents,
    pub percent: Percent,
    pub description: Option<String>,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommission {
    pub earner_id: MemberId,
    pub source_member_id: MemberId,
    pub level: i64,
    pub amount: UsdCents,
    pub percent: Percent,
    pub description: Option<String>,
    pub correlation_id: String,
}

//--------------------------------------     PayoutRequest    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Rejected,
    Sent,
}

text_enum!(PayoutStatus, "payout status", {
    Pending => "pending",
    Rejected => "rejected",
    Sent => "sent",
});

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub id: i64,
    pub member_id: MemberId,
    pub amount: UsdCents,
    pub gateway: Gateway,
    pub destination: String,
    pub status: PayoutStatus,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayoutRequest {
    pub member_id: MemberId,
    pub amount: UsdCents,
    pub gateway: Gateway,
    pub destination: String,
    pub created_at: DateTime<Utc>,
}

impl NewPayoutRequest {
    pub fn new<S: Into<String>>(member_id: MemberId, amount: UsdCents, gateway: Gateway, destination: S) -> Self {
        Self { member_id, amount, gateway, destination: destination.into(), created_at: Utc::now() }
    }

    /// Overrides the request timestamp. The rate limit window is measured back from this time.
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

//--------------------------------------     Notifications    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Payment,
    Referral,
    Task,
    System,
}

text_enum!(NotificationKind, "notification kind", {
    Payment => "payment",
    Referral => "referral",
    Task => "task",
    System => "system",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Dashboard,
    Websocket,
}

text_enum!(Channel, "channel", { Email => "email", Dashboard => "dashboard", Websocket => "websocket" });

impl Channel {
    pub fn all() -> Vec<Channel> {
        vec![Channel::Email, Channel::Dashboard, Channel::Websocket]
    }

    pub fn join(channels: &[Channel]) -> String {
        channels.iter().map(Channel::as_str).collect::<Vec<_>>().join(",")
    }

    /// Parses a comma-separated channel list, ignoring unknown entries.
    pub fn split(channels: &str) -> Vec<Channel> {
        channels.split(',').filter_map(|c| c.parse().ok()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recipient {
    Member(MemberId),
    /// The operator / admin channel
    Broadcast,
}

impl Recipient {
    pub fn member_id(&self) -> Option<MemberId> {
        match self {
            Recipient::Member(id) => Some(*id),
            Recipient::Broadcast => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    /// `None` for broadcast notifications
    pub member_id: Option<MemberId>,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    /// JSON-encoded payload
    pub data: String,
    pub channels: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn recipient(&self) -> Recipient {
        match self.member_id {
            Some(id) => Recipient::Member(id),
            None => Recipient::Broadcast,
        }
    }

    pub fn channels(&self) -> Vec<Channel> {
        Channel::split(&self.channels)
    }

    pub fn has_channel(&self, channel: Channel) -> bool {
        self.channels().contains(&channel)
    }

    pub fn data(&self) -> serde_json::Value {
        serde_json::from_str(&self.data).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient: Recipient,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    pub channels: Vec<Channel>,
}

impl NewNotification {
    pub fn new<S: Into<String>>(recipient: Recipient, kind: NotificationKind, title: S, body: S) -> Self {
        Self {
            recipient,
            kind,
            title: title.into(),
            body: body.into(),
            data: serde_json::Value::Object(Default::default()),
            channels: Channel::all(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_channels(mut self, channels: &[Channel]) -> Self {
        self.channels = channels.to_vec();
        self
    }
}

//--------------------------------------         Tasks        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Video,
    Survey,
    Form,
}

text_enum!(TaskKind, "task kind", { Video => "video", Survey => "survey", Form => "form" });

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub kind: TaskKind,
    pub reward: UsdCents,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub kind: TaskKind,
    pub reward: UsdCents,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn new<S: Into<String>>(title: S, kind: TaskKind, reward: UsdCents) -> Self {
        Self { title: title.into(), description: None, kind, reward, expires_at: None }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Submitted,
    Approved,
    Rejected,
}

text_enum!(SubmissionStatus, "submission status", {
    Submitted => "submitted",
    Approved => "approved",
    Rejected => "rejected",
});

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub id: i64,
    pub task_id: i64,
    pub member_id: MemberId,
    /// JSON-encoded answers
    pub payload: String,
    pub status: SubmissionStatus,
    pub reward_granted: bool,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------       FraudLog       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct FraudLog {
    pub id: i64,
    pub member_id: Option<MemberId>,
    pub action: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn terminal_payment_statuses() {
        assert!(!PaymentStatus::Initiated.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Confirmed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Reversed.is_terminal());
    }

    #[test]
    fn text_enums() {
        assert_eq!("Confirmed".parse::<PaymentEventStatus>().unwrap(), PaymentEventStatus::Confirmed);
        assert_eq!(PayoutStatus::Sent.to_string(), "sent");
        assert!("bitcoin".parse::<Gateway>().is_err());
        assert_eq!(ChildSide::Right.column(), "right_child_id");
    }

    #[test]
    fn channel_lists() {
        let channels = Channel::split("email, websocket,carrier-pigeon");
        assert_eq!(channels, vec![Channel::Email, Channel::Websocket]);
        assert_eq!(Channel::join(&Channel::all()), "email,dashboard,websocket");
    }

    #[test]
    fn correlation_id_defaults_to_event_id() {
        let event = PaymentEvent::new("evt-1", PaymentEventStatus::Confirmed);
        assert_eq!(event.correlation_id(), "evt-1");
        let event = event.with_correlation_id("activation-7");
        assert_eq!(event.correlation_id(), "activation-7");
    }
}
