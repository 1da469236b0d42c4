//! # Storage and collaborator contracts
//!
//! This module provides the interfaces that define the contracts of the affiliate engine *backends*.
//!
//! ## Members and the referral graph
//! Every member has two upward relations: the sponsor (who referred them) and the binary parent (where the placement
//! engine put them). The [`ReferralGraph`] trait stores both, plus the two child pointers of the binary tree.
//!
//! ## Traits
//! * [`ReferralGraph`] defines point lookups and compare-and-swap pointer writes for member nodes.
//! * [`PaymentGatewayDatabase`] defines the highest level of behaviour: applying gateway events as one unit of work,
//!   including activation and the commission waterfall.
//! * [`LedgerManagement`] derives balances and histories, and owns the payout request lifecycle.
//! * [`NotificationManagement`] persists notifications.
//! * [`TaskManagement`] stores tasks and their submissions.
//! * [`RateFeed`] is the external exchange rate source.
mod data_objects;
mod exchange_rates;
mod ledger_management;
mod notification_management;
mod payment_gateway_database;
mod referral_graph;
mod task_management;

pub use data_objects::{LedgerEntry, LedgerEntryKind, LedgerPage, PaymentEventOutcome, PaymentOutcomeCode};
pub use exchange_rates::{ExchangeRateError, RateFeed};
pub use ledger_management::{LedgerError, LedgerManagement, PayoutError, PayoutRules};
pub use notification_management::{NotificationError, NotificationManagement};
pub use payment_gateway_database::{ActivationPolicy, PaymentGatewayDatabase, PaymentGatewayError};
pub use referral_graph::{ReferralGraph, ReferralGraphError};
pub use task_management::{TaskError, TaskManagement};
