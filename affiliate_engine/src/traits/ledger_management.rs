use affiliate_common::UsdCents;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::{
    db_types::{Commission, MemberId, NewPayoutRequest, PayoutRequest, PayoutStatus},
    traits::{data_objects::LedgerPage, ReferralGraphError},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Member #{0} does not exist")]
    MemberNotFound(MemberId),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::DatabaseError(_) => "DATABASE_ERROR",
            LedgerError::MemberNotFound(_) => "MEMBER_NOT_FOUND",
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayoutError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The minimum withdrawal is {minimum}, but {requested} was requested")]
    BelowMinimum { requested: UsdCents, minimum: UsdCents },
    #[error("Insufficient balance. Requested {requested}, but only {available} is available")]
    InsufficientBalance { requested: UsdCents, available: UsdCents },
    #[error("Only one payout request is allowed per rolling window. The last request was made at {last_request}")]
    RateLimited { last_request: DateTime<Utc> },
    #[error("Payout request #{0} does not exist")]
    PayoutNotFound(i64),
    #[error("Payout request #{id} is {status}, not pending")]
    PayoutNotPending { id: i64, status: PayoutStatus },
    #[error("Member #{0} does not exist")]
    MemberNotFound(MemberId),
    #[error("Member #{0} is not active and cannot request payouts")]
    AccountInactive(MemberId),
}

impl PayoutError {
    pub fn code(&self) -> &'static str {
        match self {
            PayoutError::DatabaseError(_) => "DATABASE_ERROR",
            PayoutError::BelowMinimum { .. } => "WITHDRAW_MINIMUM",
            PayoutError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            PayoutError::RateLimited { .. } => "PAYOUT_RATE_LIMIT",
            PayoutError::PayoutNotFound(_) => "PAYOUT_NOT_FOUND",
            PayoutError::PayoutNotPending { .. } => "PAYOUT_NOT_PENDING",
            PayoutError::MemberNotFound(_) => "MEMBER_NOT_FOUND",
            PayoutError::AccountInactive(_) => "ACCOUNT_INACTIVE",
        }
    }
}

impl From<ReferralGraphError> for LedgerError {
    fn from(e: ReferralGraphError) -> Self {
        match e {
            ReferralGraphError::MemberNotFound(id) => LedgerError::MemberNotFound(id),
            other => LedgerError::DatabaseError(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for PayoutError {
    fn from(e: sqlx::Error) -> Self {
        PayoutError::DatabaseError(e.to_string())
    }
}

impl From<LedgerError> for PayoutError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::DatabaseError(s) => PayoutError::DatabaseError(s),
            LedgerError::MemberNotFound(id) => PayoutError::MemberNotFound(id),
        }
    }
}

impl From<ReferralGraphError> for PayoutError {
    fn from(e: ReferralGraphError) -> Self {
        LedgerError::from(e).into()
    }
}

/// The limits applied when a member asks to withdraw funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutRules {
    pub minimum: UsdCents,
    /// Only one request of any status is allowed inside this trailing window
    pub window: Duration,
}

/// The `LedgerManagement` trait provides the read side of the ledger (balances and histories) and the payout request
/// lifecycle.
///
/// Balances are never stored. They are always derived from the append-only commission rows and the `sent` payout
/// requests.
#[allow(async_fn_in_trait)]
pub trait LedgerManagement: Clone {
    /// Sum of all commissions earned by the member, less the sum of their `sent` payouts.
    async fn balance(&self, member_id: MemberId) -> Result<UsdCents, LedgerError>;

    /// Commissions earned by the member, newest first.
    async fn fetch_commissions(
        &self,
        member_id: MemberId,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Commission>, LedgerError>;

    /// Merged commission credits, sent payout debits, and optionally the member's own payments, newest first.
    async fn fetch_ledger(
        &self,
        member_id: MemberId,
        skip: usize,
        limit: usize,
        include_payments: bool,
    ) -> Result<LedgerPage, LedgerError>;

    /// Validates and stores a payout request in a single atomic transaction. The checks run in this order:
    /// 1. `amount >= rules.minimum`
    /// 2. `0 < amount <= balance`
    /// 3. no other request (of any status) for the member in the trailing `rules.window`
    async fn insert_payout_request(
        &self,
        request: NewPayoutRequest,
        rules: &PayoutRules,
    ) -> Result<PayoutRequest, PayoutError>;

    /// Moves a `pending` payout request to `status`. Any other starting state is a
    /// [`PayoutError::PayoutNotPending`] error.
    async fn resolve_payout_request(
        &self,
        id: i64,
        status: PayoutStatus,
        note: Option<String>,
    ) -> Result<PayoutRequest, PayoutError>;

    async fn fetch_payout_request(&self, id: i64) -> Result<Option<PayoutRequest>, PayoutError>;

    async fn fetch_payouts_for_member(&self, member_id: MemberId) -> Result<Vec<PayoutRequest>, PayoutError>;

    async fn fetch_payouts(&self, status: Option<PayoutStatus>) -> Result<Vec<PayoutRequest>, PayoutError>;
}
