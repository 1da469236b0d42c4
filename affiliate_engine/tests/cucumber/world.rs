use std::{collections::HashMap, time::Duration};

use affiliate_engine::{
    db_types::{Member, Payment},
    events::EventProducers,
    EngineConfig,
    FixedRateFeed,
    LedgerApi,
    MembershipApi,
    PaymentFlowApi,
    PayoutApi,
    RateCache,
    SqliteDatabase,
};
use cucumber::World;
use log::*;

use crate::support::prepare_env::{prepare_test_env, random_db_path};

#[derive(Default, Debug, World)]
pub struct AffiliateWorld {
    pub system: Option<AffiliateSystem>,
}

#[derive(Debug)]
pub struct AffiliateSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub members: MembershipApi<SqliteDatabase>,
    pub payments: PaymentFlowApi<SqliteDatabase>,
    pub payouts: PayoutApi<SqliteDatabase>,
    pub ledger: LedgerApi<SqliteDatabase>,
    pub rates: RateCache<FixedRateFeed>,
    /// Registered members, by name
    pub registered: HashMap<String, Member>,
    /// The most recent activation payment, by member name
    pub activations: HashMap<String, Payment>,
    pub last_error: Option<String>,
}

impl AffiliateWorld {
    pub fn system(&self) -> &AffiliateSystem {
        self.system.as_ref().expect("Affiliate system not initialised")
    }

    pub fn system_mut(&mut self) -> &mut AffiliateSystem {
        self.system.as_mut().expect("Affiliate system not initialised")
    }

    pub fn member(&self, name: &str) -> &Member {
        self.system().registered.get(name).unwrap_or_else(|| panic!("{name} has not registered"))
    }
}

impl AffiliateSystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        let db = prepare_test_env(&url).await;
        debug!("Created database: {url}");
        let config = EngineConfig::default();
        let producers = EventProducers::default();
        let members = MembershipApi::new(db.clone(), producers.clone(), "https://example.com");
        let payments = PaymentFlowApi::new(db.clone(), config.activation_policy(), producers.clone());
        let payouts = PayoutApi::new(db.clone(), config.payout_rules(), producers);
        let ledger = LedgerApi::new(db.clone());
        let rates = RateCache::new(FixedRateFeed::new([("KES", 129.5), ("UGX", 3700.0)]), Duration::from_secs(3600));
        Self {
            db_path: url,
            db,
            members,
            payments,
            payouts,
            ledger,
            rates,
            registered: HashMap::new(),
            activations: HashMap::new(),
            last_error: None,
        }
    }
}
