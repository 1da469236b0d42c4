//! Affiliate Engine
//!
//! The affiliate engine is the core of a binary-tree affiliate network. Members sign up with a sponsor's referral
//! code, pay a one-off activation fee through a payment gateway, and earn a decaying commission on every activation
//! further down their sponsor chain. This library contains that core logic. It is gateway- and transport-agnostic.
//!
//! The library is divided into these main sections:
//! 1. Storage contracts ([`mod@traits`]) and the SQLite backend that implements them ([`mod@sqlite`]). You should
//!    rarely need to access the database directly. Instead, use the public API provided by the engine. The exception is
//!    the data types used in the database. These are defined in the [`mod@db_types`] module and are public.
//! 2. The public API ([`mod@affiliate_api`]): registration and placement, the payment flow and commission waterfall,
//!    balances, payouts, tasks, notifications and exchange rates.
//!
//! The engine also provides a set of events that can be subscribed to. These events are emitted after certain actions
//! have been committed. For example, when a payment confirmation activates a member, a `MemberActivated` event is
//! emitted, and every stored notification is pushed out as a `Notification` event. A simple Actor framework is used so
//! that you can easily hook into these events and deliver them over email, websockets or anything else.
pub mod affiliate_api;
pub mod config;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use affiliate_api::{
    commission::{CommissionLevel, CommissionSchedule},
    exchange_rate_api::{FixedRateFeed, RateCache},
    ledger_api::{LedgerApi, WalletBalance},
    membership_api::{MembershipApi, Registration},
    notification_api::Notifier,
    payment_flow_api::PaymentFlowApi,
    payout_api::PayoutApi,
    placement_api::{Placement, PlacementApi, TreeNode},
    task_api::TaskApi,
};
pub use config::{ConfigError, EngineConfig};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    LedgerManagement,
    NotificationManagement,
    PaymentGatewayDatabase,
    RateFeed,
    ReferralGraph,
    TaskManagement,
};
