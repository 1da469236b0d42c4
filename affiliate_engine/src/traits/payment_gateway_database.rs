use chrono::Duration;
use thiserror::Error;

use crate::{
    affiliate_api::commission::CommissionSchedule,
    db_types::{Commission, Gateway, MemberId, NewPayment, Payment, PaymentEvent, PaymentEventRecord, PaymentStatus},
    traits::{data_objects::PaymentEventOutcome, ReferralGraph, ReferralGraphError},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("No payment could be matched to event {0}")]
    PaymentNotFound(String),
    #[error("Payment #{id} is already {status} and cannot change")]
    PaymentAlreadyFinal { id: i64, status: PaymentStatus },
    #[error("Cannot insert payment, since the reference {0} is already in use")]
    PaymentAlreadyExists(String),
    #[error("Member #{0} does not exist")]
    MemberNotFound(MemberId),
    #[error("Correlation id {correlation_id} already tags the level {level} commission for #{source_member_id}")]
    CorrelationConflict { correlation_id: String, level: i64, source_member_id: MemberId },
}

impl PaymentGatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            PaymentGatewayError::DatabaseError(_) => "DATABASE_ERROR",
            PaymentGatewayError::PaymentNotFound(_) => "PAYMENT_NOT_FOUND",
            PaymentGatewayError::PaymentAlreadyFinal { .. } => "PAYMENT_ALREADY_FINAL",
            PaymentGatewayError::PaymentAlreadyExists(_) => "PAYMENT_EXISTS",
            PaymentGatewayError::MemberNotFound(_) => "MEMBER_NOT_FOUND",
            PaymentGatewayError::CorrelationConflict { .. } => "CORRELATION_CONFLICT",
        }
    }
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}

impl From<ReferralGraphError> for PaymentGatewayError {
    fn from(e: ReferralGraphError) -> Self {
        match e {
            ReferralGraphError::MemberNotFound(id) => PaymentGatewayError::MemberNotFound(id),
            other => PaymentGatewayError::DatabaseError(other.to_string()),
        }
    }
}

/// What a confirmed payment does to its owner: the activation window, and the commission schedule that is paid up the
/// sponsor chain.
#[derive(Debug, Clone)]
pub struct ActivationPolicy {
    pub schedule: CommissionSchedule,
    pub activation_window: Duration,
}

/// This trait defines the highest level of behaviour for backends supporting the affiliate engine.
///
/// This behaviour includes:
/// * Recording the payments that members initiate
/// * Applying gateway events to payments as a single unit of work, including member activation and the commission
///   waterfall
/// * Running the commission waterfall on its own
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone + ReferralGraph {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new payment in the `initiated` state.
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, PaymentGatewayError>;

    async fn fetch_payment(&self, id: i64) -> Result<Option<Payment>, PaymentGatewayError>;

    async fn fetch_payment_by_reference(&self, reference: &str) -> Result<Option<Payment>, PaymentGatewayError>;

    /// All payments for the member, newest first.
    async fn fetch_payments_for_member(&self, member_id: MemberId) -> Result<Vec<Payment>, PaymentGatewayError>;

    async fn fetch_payment_event(&self, event_id: &str) -> Result<Option<PaymentEventRecord>, PaymentGatewayError>;

    /// Applies a gateway event in a single atomic transaction:
    /// * the event id is claimed in the processed-event log. If it was claimed before, the stored outcome is returned
    ///   and nothing else happens.
    /// * the payment is resolved by reference, or else the owner's most recent open payment.
    /// * the payment status is moved along a legal transition and the event id is recorded on it.
    /// * on confirmation, the owner is activated and the commission waterfall rows are written.
    ///
    /// If no payment can be resolved, the transaction is rolled back (so the event can be delivered again later) and
    /// [`PaymentGatewayError::PaymentNotFound`] is returned.
    async fn apply_payment_event(
        &self,
        gateway: Gateway,
        event: &PaymentEvent,
        policy: &ActivationPolicy,
    ) -> Result<PaymentEventOutcome, PaymentGatewayError>;

    /// Writes the commission waterfall for `member_id` tagged with `correlation_id`.
    ///
    /// Rows that already exist for the same correlation id and level are left untouched, so the returned list only
    /// contains newly written rows.
    async fn distribute_commissions(
        &self,
        member_id: MemberId,
        schedule: &CommissionSchedule,
        correlation_id: &str,
    ) -> Result<Vec<Commission>, PaymentGatewayError>;

    async fn fetch_commissions_for_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<Commission>, PaymentGatewayError>;
}
