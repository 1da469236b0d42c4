use std::{fmt::Display, str::FromStr};

use affiliate_common::UsdCents;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Commission, ConversionError, Member, Payment, PaymentStatus, PayoutRequest};

/// The machine-readable result of applying a payment event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOutcomeCode {
    PaymentConfirmed,
    PaymentFailed,
    PaymentReversed,
    PaymentPending,
    WebhookAlreadyProcessed,
}

impl PaymentOutcomeCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcomeCode::PaymentConfirmed => "PAYMENT_CONFIRMED",
            PaymentOutcomeCode::PaymentFailed => "PAYMENT_FAILED",
            PaymentOutcomeCode::PaymentReversed => "PAYMENT_REVERSED",
            PaymentOutcomeCode::PaymentPending => "PAYMENT_PENDING",
            PaymentOutcomeCode::WebhookAlreadyProcessed => "WEBHOOK_ALREADY_PROCESSED",
        }
    }

    /// The code that describes a payment that has just moved into `status`.
    pub fn for_status(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Confirmed => PaymentOutcomeCode::PaymentConfirmed,
            PaymentStatus::Failed => PaymentOutcomeCode::PaymentFailed,
            PaymentStatus::Reversed => PaymentOutcomeCode::PaymentReversed,
            PaymentStatus::Initiated | PaymentStatus::Pending => PaymentOutcomeCode::PaymentPending,
        }
    }
}

impl Display for PaymentOutcomeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentOutcomeCode {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAYMENT_CONFIRMED" => Ok(PaymentOutcomeCode::PaymentConfirmed),
            "PAYMENT_FAILED" => Ok(PaymentOutcomeCode::PaymentFailed),
            "PAYMENT_REVERSED" => Ok(PaymentOutcomeCode::PaymentReversed),
            "PAYMENT_PENDING" => Ok(PaymentOutcomeCode::PaymentPending),
            "WEBHOOK_ALREADY_PROCESSED" => Ok(PaymentOutcomeCode::WebhookAlreadyProcessed),
            _ => Err(ConversionError { kind: "payment outcome", value: s.to_string() }),
        }
    }
}

/// Everything that happened while a payment event was applied.
///
/// For a replayed event, `code` is [`PaymentOutcomeCode::WebhookAlreadyProcessed`], `original` holds the code that
/// was returned the first time, and no activation or commissions are reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEventOutcome {
    pub payment: Payment,
    pub code: PaymentOutcomeCode,
    pub original: Option<PaymentOutcomeCode>,
    /// The owner, if this event activated them
    pub activated: Option<Member>,
    /// Commission rows written by this event
    pub commissions: Vec<Commission>,
}

impl PaymentEventOutcome {
    pub fn applied(payment: Payment, code: PaymentOutcomeCode) -> Self {
        Self { payment, code, original: None, activated: None, commissions: Vec::new() }
    }

    pub fn replayed(payment: Payment, original: Option<PaymentOutcomeCode>) -> Self {
        Self {
            payment,
            code: PaymentOutcomeCode::WebhookAlreadyProcessed,
            original,
            activated: None,
            commissions: Vec::new(),
        }
    }

    pub fn is_replay(&self) -> bool {
        self.code == PaymentOutcomeCode::WebhookAlreadyProcessed
    }

    pub fn total_commissions(&self) -> UsdCents {
        self.commissions.iter().map(|c| c.amount).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEntryKind {
    /// A commission or task reward. Adds to the balance.
    Credit,
    /// A sent payout. Subtracts from the balance.
    Debit,
    /// A payment made by the member. Informational, no balance effect.
    Payment,
}

/// One line of a member's transaction history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub kind: LedgerEntryKind,
    pub source_id: i64,
    pub amount: UsdCents,
    pub description: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<Commission> for LedgerEntry {
    fn from(c: Commission) -> Self {
        let description = c.description.unwrap_or_else(|| format!("Level {} commission", c.level));
        Self {
            kind: LedgerEntryKind::Credit,
            source_id: c.id,
            amount: c.amount,
            description,
            status: "credited".to_string(),
            created_at: c.created_at,
        }
    }
}

impl From<PayoutRequest> for LedgerEntry {
    fn from(p: PayoutRequest) -> Self {
        Self {
            kind: LedgerEntryKind::Debit,
            source_id: p.id,
            amount: -p.amount,
            description: format!("Payout via {} to {}", p.gateway, p.destination),
            status: p.status.to_string(),
            created_at: p.updated_at,
        }
    }
}

impl From<Payment> for LedgerEntry {
    fn from(p: Payment) -> Self {
        Self {
            kind: LedgerEntryKind::Payment,
            source_id: p.id,
            amount: p.amount,
            description: format!("{} payment", p.gateway),
            status: p.status.to_string(),
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerPage {
    pub entries: Vec<LedgerEntry>,
    pub total: usize,
}
