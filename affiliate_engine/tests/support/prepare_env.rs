use affiliate_engine::{
    db_types::{Gateway, Member, MemberStatus, NewMember, NewPayment, PaymentEvent, PaymentEventStatus},
    events::EventProducers,
    traits::PaymentEventOutcome,
    EngineConfig,
    MembershipApi,
    PaymentFlowApi,
    PaymentGatewayDatabase,
    ReferralGraph,
    SqliteDatabase,
};
use chrono::{Duration, Utc};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub fn random_db_path() -> String {
    let dir = std::env::temp_dir();
    format!("sqlite://{}/affiliate_test_{}.db", dir.display(), rand::random::<u64>())
}

/// Creates a fresh database at `url` and brings the schema up to date.
pub async fn prepare_test_env(url: &str) -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    if let Err(e) = Sqlite::drop_database(url).await {
        trace!("🚀️ Could not drop database {url}: {e:?}");
    }
    SqliteDatabase::create_if_missing(url).await.expect("Error creating database");
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    db.run_migrations().await.expect("Error running DB migrations");
    info!("🚀️ Created test database {url}");
    db
}

pub async fn setup() -> SqliteDatabase {
    prepare_test_env(&random_db_path()).await
}

pub async fn tear_down(db: SqliteDatabase) {
    let url = db.url().to_string();
    db.pool().close().await;
    if let Err(e) = Sqlite::drop_database(&url).await {
        warn!("🚀️ Failed to drop database {url}: {e}");
    }
}

pub fn membership(db: &SqliteDatabase) -> MembershipApi<SqliteDatabase> {
    MembershipApi::new(db.clone(), EventProducers::default(), "https://example.com")
}

/// Registers `name` (email `name@example.com`) under the member with `sponsor_code`, if any.
pub async fn register(api: &MembershipApi<SqliteDatabase>, name: &str, sponsor_code: Option<&str>) -> Member {
    let mut new_member = NewMember::new(name.to_string(), format!("{}@example.com", name.to_lowercase()));
    if let Some(code) = sponsor_code {
        new_member = new_member.with_referral_code(code);
    }
    api.register_and_place(new_member).await.expect("Error registering member").member
}

/// Registers a straight sponsor chain. The first name is the root, and each following name is sponsored by the one
/// before it.
pub async fn register_chain(api: &MembershipApi<SqliteDatabase>, names: &[&str]) -> Vec<Member> {
    let mut chain: Vec<Member> = Vec::with_capacity(names.len());
    for name in names {
        let sponsor_code = chain.last().map(|m| m.referral_code.clone());
        let member = register(api, name, sponsor_code.as_deref()).await;
        chain.push(member);
    }
    chain
}

pub async fn activate(db: &SqliteDatabase, member: &Member) -> Member {
    let expires = Utc::now() + Duration::days(150);
    db.set_member_status(member.id, MemberStatus::Active, Some(expires)).await.expect("Error activating member")
}

/// Runs a full activation for `member`: an initiated payment for the default fee, then a confirmation event.
pub async fn pay_activation(db: &SqliteDatabase, member: &Member, event_id: &str) -> PaymentEventOutcome {
    let config = EngineConfig::default();
    let api = PaymentFlowApi::new(db.clone(), config.activation_policy(), EventProducers::default());
    let reference = format!("ref-{event_id}");
    let payment = NewPayment::new(member.id, Gateway::Pesapal, config.activation_fee).with_reference(&reference);
    db.insert_payment(payment).await.expect("Error creating payment");
    let event = PaymentEvent::new(event_id, PaymentEventStatus::Confirmed).with_reference(reference);
    api.process_payment_event(Gateway::Pesapal, event).await.expect("Error confirming payment")
}
