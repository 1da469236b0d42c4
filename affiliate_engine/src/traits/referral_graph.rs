use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{ChildSide, FraudLog, Member, MemberId, MemberRecord, MemberStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferralGraphError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Member #{0} does not exist")]
    MemberNotFound(MemberId),
    #[error("Member #{0} already has a place in the binary tree")]
    AlreadyPlaced(MemberId),
    #[error("Member #{0} cannot be placed beneath themselves")]
    SelfPlacement(MemberId),
    #[error("No open slot could be found beneath member #{0}")]
    NoOpenSlot(MemberId),
    #[error("A member with email {0} already exists")]
    EmailExists(String),
    #[error("A member with phone number {0} already exists")]
    PhoneExists(String),
    #[error("The referral code {0} is already taken")]
    ReferralCodeExists(String),
}

impl ReferralGraphError {
    pub fn code(&self) -> &'static str {
        match self {
            ReferralGraphError::DatabaseError(_) => "DATABASE_ERROR",
            ReferralGraphError::MemberNotFound(_) => "MEMBER_NOT_FOUND",
            ReferralGraphError::AlreadyPlaced(_) => "ALREADY_PLACED",
            ReferralGraphError::SelfPlacement(_) => "INVALID_PLACEMENT",
            ReferralGraphError::NoOpenSlot(_) => "NO_OPEN_SLOT",
            ReferralGraphError::EmailExists(_) => "EMAIL_EXISTS",
            ReferralGraphError::PhoneExists(_) => "PHONE_EXISTS",
            ReferralGraphError::ReferralCodeExists(_) => "REFERRAL_CODE_EXISTS",
        }
    }
}

impl From<sqlx::Error> for ReferralGraphError {
    fn from(e: sqlx::Error) -> Self {
        ReferralGraphError::DatabaseError(e.to_string())
    }
}

/// The `ReferralGraph` trait is the store for member nodes and the two relations between them: the sponsor link and
/// the binary tree pointers.
///
/// Pointer writes are compare-and-swap style. A child slot and a binary parent are only ever written while they are
/// still empty, and neither is ever cleared.
#[allow(async_fn_in_trait)]
pub trait ReferralGraph: Clone {
    async fn fetch_member(&self, id: MemberId) -> Result<Option<Member>, ReferralGraphError>;

    /// Fetches the members with the given ids. Missing ids are silently skipped.
    async fn fetch_members(&self, ids: &[MemberId]) -> Result<Vec<Member>, ReferralGraphError>;

    async fn fetch_member_by_email(&self, email: &str) -> Result<Option<Member>, ReferralGraphError>;

    async fn fetch_member_by_phone(&self, phone: &str) -> Result<Option<Member>, ReferralGraphError>;

    async fn fetch_member_by_referral_code(&self, code: &str) -> Result<Option<Member>, ReferralGraphError>;

    /// Members who signed up with this member's referral code, oldest first.
    async fn fetch_sponsored_members(&self, sponsor_id: MemberId) -> Result<Vec<Member>, ReferralGraphError>;

    /// Inserts a new, unplaced member with `pending` status.
    ///
    /// Unique constraint violations are mapped to [`ReferralGraphError::EmailExists`],
    /// [`ReferralGraphError::PhoneExists`] or [`ReferralGraphError::ReferralCodeExists`].
    async fn insert_member(&self, member: MemberRecord) -> Result<Member, ReferralGraphError>;

    /// Attaches `child_id` to the `side` slot of `parent_id` in a single atomic unit.
    ///
    /// Returns `Ok(false)` if the slot was already taken, in which case nothing is written. Returns
    /// [`ReferralGraphError::AlreadyPlaced`] if the child already has a binary parent.
    async fn attach_child(
        &self,
        parent_id: MemberId,
        child_id: MemberId,
        side: ChildSide,
    ) -> Result<bool, ReferralGraphError>;

    async fn set_member_status(
        &self,
        id: MemberId,
        status: MemberStatus,
        activation_expires_at: Option<DateTime<Utc>>,
    ) -> Result<Member, ReferralGraphError>;

    /// Moves every active member whose activation expired at or before `now` back to `pending`, returning the
    /// affected members.
    async fn expire_activations(&self, now: DateTime<Utc>) -> Result<Vec<Member>, ReferralGraphError>;

    async fn log_fraud(
        &self,
        member_id: Option<MemberId>,
        action: &str,
        reason: &str,
    ) -> Result<(), ReferralGraphError>;

    async fn fetch_fraud_logs(&self) -> Result<Vec<FraudLog>, ReferralGraphError>;
}
