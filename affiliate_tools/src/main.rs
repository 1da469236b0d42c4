use affiliate_common::UsdCents;
use affiliate_engine::{
    db_types::{Gateway, MemberId, PaymentEventStatus},
    EngineConfig,
};
use clap::{Args, Parser, Subcommand};
use log::*;

mod commands;
mod formatting;

#[derive(Parser, Debug)]
#[command(version = "0.1.0", about = "Operator tools for the affiliate engine")]
pub struct Arguments {
    /// Overrides AFF_DATABASE_URL
    #[arg(short, long)]
    database: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[clap(name = "migrate", about = "Create the database if needed and bring the schema up to date")]
    Migrate,
    #[clap(name = "register", about = "Register a new member, optionally under a sponsor's referral code")]
    Register(RegisterParams),
    #[clap(name = "webhook", about = "Apply a payment gateway event, e.g. to replay a missed notification")]
    Webhook(WebhookParams),
    #[clap(name = "balance", about = "Show a member's balance and recent transactions")]
    Balance {
        member_id: MemberId,
        /// Also list the member's own payments
        #[arg(short = 'p', long = "payments")]
        include_payments: bool,
    },
    #[clap(name = "tree", about = "Print the binary subtree beneath a member")]
    Tree {
        member_id: MemberId,
        #[arg(short = 'd', long = "depth", default_value = "4")]
        depth: u32,
    },
    #[clap(name = "downline", about = "Count a member's binary descendants per level")]
    Downline {
        member_id: MemberId,
        #[arg(short = 'l', long = "levels", default_value = "10")]
        levels: u32,
    },
    #[clap(name = "payouts", about = "List payout requests")]
    Payouts {
        /// Only show requests with this status (pending, sent, rejected)
        #[arg(short, long)]
        status: Option<String>,
    },
    #[clap(name = "approve-payout", about = "Mark a pending payout request as sent")]
    ApprovePayout { payout_id: i64 },
    #[clap(name = "reject-payout", about = "Reject a pending payout request")]
    RejectPayout {
        payout_id: i64,
        #[arg(short, long)]
        reason: Option<String>,
    },
    #[clap(name = "expire-activations", about = "Move every expired activation back to pending")]
    ExpireActivations,
}

#[derive(Debug, Args)]
pub struct RegisterParams {
    #[arg(short, long)]
    pub name: String,
    #[arg(short, long)]
    pub email: String,
    #[arg(short, long)]
    pub phone: Option<String>,
    /// Two-letter code or English name. Used to pick the local currency.
    #[arg(short, long)]
    pub country: Option<String>,
    /// The sponsor's referral code
    #[arg(short = 'r', long = "ref")]
    pub referral_code: Option<String>,
}

#[derive(Debug, Args)]
pub struct WebhookParams {
    #[arg(short, long, default_value = "pesapal")]
    pub gateway: Gateway,
    /// The gateway's unique event id. Replaying the same id is a no-op.
    #[arg(short = 'i', long = "event-id")]
    pub event_id: String,
    /// pending, confirmed, failed or reversed
    #[arg(short, long)]
    pub status: PaymentEventStatus,
    /// The payment reference
    #[arg(short, long)]
    pub reference: Option<String>,
    /// Used to find the member's latest open payment when there is no reference
    #[arg(short, long)]
    pub member: Option<MemberId>,
    /// Overrides the amount on the payment, in USD
    #[arg(short, long)]
    pub amount: Option<UsdCents>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let _ = env_logger::try_init();
    let cli = Arguments::parse();
    let mut config = EngineConfig::from_env_or_default();
    if let Some(url) = cli.database {
        config.database_url = url;
    }
    let result = match cli.command {
        Command::Migrate => commands::migrate(&config).await,
        Command::Register(params) => commands::register(&config, params).await,
        Command::Webhook(params) => commands::webhook(&config, params).await,
        Command::Balance { member_id, include_payments } => {
            commands::balance(&config, member_id, include_payments).await
        },
        Command::Tree { member_id, depth } => commands::tree(&config, member_id, depth).await,
        Command::Downline { member_id, levels } => commands::downline(&config, member_id, levels).await,
        Command::Payouts { status } => commands::payouts(&config, status).await,
        Command::ApprovePayout { payout_id } => commands::approve_payout(&config, payout_id).await,
        Command::RejectPayout { payout_id, reason } => commands::reject_payout(&config, payout_id, reason).await,
        Command::ExpireActivations => commands::expire_activations(&config).await,
    };
    if let Err(e) = result {
        error!("{e}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
