use std::fmt::Debug;

use affiliate_common::UsdCents;
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    affiliate_api::exchange_rate_api::RateCache,
    db_types::{Commission, Member, MemberId},
    traits::{LedgerError, LedgerManagement, LedgerPage, RateFeed, ReferralGraph},
};

/// A member's balance, with a display-only projection into their local currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub member_id: MemberId,
    pub usd: UsdCents,
    pub currency: String,
    /// `None` when no exchange rate is known for `currency`
    pub local: Option<f64>,
}

/// Read-only views of the ledger. Balances are derived from the commission and payout rows on every call; nothing
/// here writes.
pub struct LedgerApi<B> {
    db: B,
}

impl<B> Debug for LedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerApi")
    }
}

impl<B> LedgerApi<B>
where B: LedgerManagement + ReferralGraph
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Everything the member has earned, less everything that has been sent to them.
    pub async fn balance(&self, member_id: MemberId) -> Result<UsdCents, LedgerError> {
        self.member(member_id).await?;
        let balance = self.db.balance(member_id).await?;
        trace!("📒️ Balance of member #{member_id} is {balance}");
        Ok(balance)
    }

    pub async fn balance_with_local<F: RateFeed>(
        &self,
        member_id: MemberId,
        rates: &RateCache<F>,
    ) -> Result<WalletBalance, LedgerError> {
        let member = self.member(member_id).await?;
        let usd = self.db.balance(member_id).await?;
        let local = rates.usd_to_local(usd, &member.currency).await;
        Ok(WalletBalance { member_id, usd, currency: member.currency, local })
    }

    /// The member's commissions (including task rewards), newest first.
    pub async fn commissions(
        &self,
        member_id: MemberId,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Commission>, LedgerError> {
        self.db.fetch_commissions(member_id, skip, limit).await
    }

    /// The member's transaction history: commission credits and sent payouts, plus their own payments if
    /// `include_payments` is set. Newest first.
    pub async fn transactions(
        &self,
        member_id: MemberId,
        skip: usize,
        limit: usize,
        include_payments: bool,
    ) -> Result<LedgerPage, LedgerError> {
        self.db.fetch_ledger(member_id, skip, limit, include_payments).await
    }

    async fn member(&self, member_id: MemberId) -> Result<Member, LedgerError> {
        self.db.fetch_member(member_id).await?.ok_or(LedgerError::MemberNotFound(member_id))
    }
}
