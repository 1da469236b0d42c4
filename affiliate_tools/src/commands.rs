use affiliate_engine::{
    db_types::{MemberId, NewMember, PaymentEvent, PayoutStatus},
    events::EventProducers,
    EngineConfig,
    LedgerApi,
    MembershipApi,
    PaymentFlowApi,
    PayoutApi,
    SqliteDatabase,
};
use anyhow::{anyhow, Result};
use chrono::Utc;
use log::*;

use crate::{formatting, RegisterParams, WebhookParams};

async fn connect(config: &EngineConfig) -> Result<SqliteDatabase> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 5)
        .await
        .map_err(|e| anyhow!("Could not connect to {}. {e}", config.database_url))?;
    Ok(db)
}

pub async fn migrate(config: &EngineConfig) -> Result<()> {
    SqliteDatabase::create_if_missing(&config.database_url).await?;
    let db = connect(config).await?;
    db.run_migrations().await?;
    println!("Database {} is up to date", config.database_url);
    Ok(())
}

pub async fn register(config: &EngineConfig, params: RegisterParams) -> Result<()> {
    let db = connect(config).await?;
    let api = MembershipApi::new(db, EventProducers::default(), config.frontend_url.as_str());
    let mut new_member = NewMember::new(params.name, params.email);
    new_member.phone = params.phone;
    new_member.country = params.country;
    new_member.referral_code = params.referral_code;
    let registration = api.register_and_place(new_member).await.map_err(|e| anyhow!("[{}] {e}", e.code()))?;
    println!("{}", formatting::format_registration(&registration)?);
    Ok(())
}

pub async fn webhook(config: &EngineConfig, params: WebhookParams) -> Result<()> {
    let db = connect(config).await?;
    let api = PaymentFlowApi::new(db, config.activation_policy(), EventProducers::default());
    let mut event = PaymentEvent::new(params.event_id, params.status);
    event.reference = params.reference;
    event.member_id = params.member;
    event.amount = params.amount;
    if event.reference.is_none() && event.member_id.is_none() {
        return Err(anyhow!("Provide a payment reference, a member id, or both"));
    }
    let outcome = api.process_payment_event(params.gateway, event).await.map_err(|e| anyhow!("[{}] {e}", e.code()))?;
    println!("{}", formatting::format_payment_outcome(&outcome)?);
    Ok(())
}

pub async fn balance(config: &EngineConfig, member_id: MemberId, include_payments: bool) -> Result<()> {
    let db = connect(config).await?;
    let api = LedgerApi::new(db);
    let balance = api.balance(member_id).await?;
    let page = api.transactions(member_id, 0, 25, include_payments).await?;
    println!("Balance of member #{member_id}: {balance}");
    println!("{}", formatting::format_ledger(&page));
    Ok(())
}

pub async fn tree(config: &EngineConfig, member_id: MemberId, depth: u32) -> Result<()> {
    let db = connect(config).await?;
    let api = MembershipApi::new(db, EventProducers::default(), config.frontend_url.as_str());
    let tree = api.placement().build_subtree(member_id, depth).await?;
    let tree = tree.ok_or_else(|| anyhow!("Member #{member_id} does not exist"))?;
    print!("{}", formatting::format_tree(&tree));
    Ok(())
}

pub async fn downline(config: &EngineConfig, member_id: MemberId, levels: u32) -> Result<()> {
    let db = connect(config).await?;
    let api = MembershipApi::new(db, EventProducers::default(), config.frontend_url.as_str());
    let counts = api.placement().collect_downline_by_level(member_id, levels).await?;
    println!("{}", formatting::format_downline(&counts));
    Ok(())
}

pub async fn payouts(config: &EngineConfig, status: Option<String>) -> Result<()> {
    let status = status.map(|s| s.parse::<PayoutStatus>()).transpose()?;
    let db = connect(config).await?;
    let api = PayoutApi::new(db, config.payout_rules(), EventProducers::default());
    let payouts = api.all_payouts(status).await?;
    println!("{}", formatting::format_payouts(&payouts));
    Ok(())
}

pub async fn approve_payout(config: &EngineConfig, payout_id: i64) -> Result<()> {
    let db = connect(config).await?;
    let api = PayoutApi::new(db, config.payout_rules(), EventProducers::default());
    let payout = api.approve_payout(payout_id).await.map_err(|e| anyhow!("[{}] {e}", e.code()))?;
    println!("{}", formatting::format_payouts(&[payout]));
    Ok(())
}

pub async fn reject_payout(config: &EngineConfig, payout_id: i64, reason: Option<String>) -> Result<()> {
    let db = connect(config).await?;
    let api = PayoutApi::new(db, config.payout_rules(), EventProducers::default());
    let payout = api.reject_payout(payout_id, reason).await.map_err(|e| anyhow!("[{}] {e}", e.code()))?;
    println!("{}", formatting::format_payouts(&[payout]));
    Ok(())
}

pub async fn expire_activations(config: &EngineConfig) -> Result<()> {
    let db = connect(config).await?;
    let api = MembershipApi::new(db, EventProducers::default(), config.frontend_url.as_str());
    let expired = api.expire_activations(Utc::now()).await?;
    info!("{} activations expired", expired.len());
    println!("{}", formatting::format_members(&expired));
    Ok(())
}
