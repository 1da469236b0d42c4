//! # Affiliate engine public API
//!
//! The `affiliate_api` module exposes the programmatic API of the affiliate engine. The API is modular, so clients
//! pick the parts they need:
//!
//! * [`membership_api`] registers members and places them in their sponsor's binary subtree, and manages suspension
//!   and activation expiry.
//! * [`placement_api`] holds the placement algorithm itself, plus the tree read-models (subtree, downline per level,
//!   depth).
//! * [`payment_flow_api`] turns gateway events into activations and commission waterfalls, exactly once.
//! * [`ledger_api`] derives balances and transaction histories.
//! * [`payout_api`] is the withdrawal gate.
//! * [`task_api`] manages reward tasks.
//! * [`notification_api`] stores notifications and pushes them to the registered hooks.
//! * [`exchange_rate_api`] caches exchange rates for display-only local currency amounts.
//!
//! # API usage
//!
//! Every API is created from a backend that implements the traits it needs. [`crate::SqliteDatabase`] implements all
//! of them.
//!
//! ```rust,ignore
//! use affiliate_engine::{events::EventProducers, LedgerApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/affiliate.db", 5).await?;
//! let api = LedgerApi::new(db);
//! let balance = api.balance(member_id).await?;
//! ```
pub mod commission;
pub mod exchange_rate_api;
pub mod ledger_api;
pub mod membership_api;
pub mod notification_api;
pub mod payment_flow_api;
pub mod payout_api;
pub mod placement_api;
pub mod task_api;
