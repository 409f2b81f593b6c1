//! payment-sync-demo: several contexts sharing one in-process sync channel.
//!
//! Each context opens payments in turn, peers apply the broadcasts, and
//! sessions are confirmed, failed or retried at random-looking but
//! deterministic points. The first context's analytics report is printed as
//! JSON at the end.

use clap::Parser;
use payment_runtime::{init_logging, PaymentContext, PaymentRuntimeConfig};
use payment_session::BroadcastHub;
use payment_types::{
    Clock, PaymentNetwork, PaymentSession, PaymentStatus, PaymentToken, SessionId, StatusDetails,
    SystemClock,
};
use rust_decimal::Decimal;
use tracing::info;

/// Payment session sync demo
#[derive(Parser)]
#[command(name = "payment-sync-demo")]
#[command(about = "Simulate payment contexts sharing session state", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PAYMENT_SYNC_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, env = "PAYMENT_SYNC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    json: bool,

    /// Number of contexts sharing the channel
    #[arg(long, default_value_t = 3)]
    contexts: usize,

    /// Payment sessions to open
    #[arg(long, default_value_t = 12)]
    sessions: usize,
}

const TOKENS: [(&str, &str, u8, PaymentNetwork); 4] = [
    ("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", "USDC", 6, PaymentNetwork::Ethereum),
    ("0x2791bca1f2de4661ed88a30c99a7a9449aa84174", "USDC", 6, PaymentNetwork::Polygon),
    ("0x55d398326f99059ff775485246999027b3197955", "USDT", 18, PaymentNetwork::Bsc),
    ("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", "USDC", 6, PaymentNetwork::Solana),
];

fn token_for(n: usize) -> PaymentToken {
    let (address, symbol, decimals, network) = TOKENS[n % TOKENS.len()];
    PaymentToken::new(address, symbol, decimals, network)
}

fn tx_hash(n: usize) -> String {
    format!("0x{n:064x}")
}

fn pump_all(contexts: &mut [PaymentContext]) {
    for ctx in contexts.iter_mut() {
        ctx.pump();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = PaymentRuntimeConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;
    init_logging(&config.logging)?;

    let hub = BroadcastHub::new(config.sync.hub_capacity);
    let mut contexts: Vec<PaymentContext> = (0..cli.contexts.max(1))
        .map(|_| PaymentContext::connect(&hub, &config))
        .collect();
    pump_all(&mut contexts);
    info!(contexts = contexts.len(), sessions = cli.sessions, "Demo started");

    let clock = SystemClock;
    for n in 0..cli.sessions {
        let owner = n % contexts.len();
        let id = SessionId::generate();
        let amount = Decimal::new(((n as i64) % 7 + 1) * 125, 2);
        let session = PaymentSession::new(
            id.clone(),
            format!("user-{}", n % 5),
            token_for(n),
            amount,
            clock.now_millis(),
        );
        contexts[owner].update_session(session);
        pump_all(&mut contexts);

        // Another context settles the payment.
        let settler = (owner + 1) % contexts.len();
        match n % 4 {
            0 | 1 => {
                contexts[settler].update_status_with(
                    &id,
                    PaymentStatus::Confirmed,
                    StatusDetails::confirmed(tx_hash(n)),
                );
            }
            2 => {
                contexts[settler].retry(&id);
                pump_all(&mut contexts);
                contexts[owner].update_status_with(
                    &id,
                    PaymentStatus::Confirmed,
                    StatusDetails::confirmed(tx_hash(n)),
                );
            }
            _ => {
                contexts[settler].update_status_with(
                    &id,
                    PaymentStatus::Failed,
                    StatusDetails::failed("Insufficient balance"),
                );
            }
        }
        pump_all(&mut contexts);
    }

    for (i, ctx) in contexts.iter().enumerate() {
        info!(
            context = i,
            context_id = ctx.context_id(),
            stats = ?ctx.stats(),
            "Context finished"
        );
    }

    let report = contexts[0].report_json()?;
    let pretty: serde_json::Value = serde_json::from_str(&report)?;
    println!("{}", serde_json::to_string_pretty(&pretty)?);

    for ctx in &mut contexts {
        ctx.cleanup();
    }
    Ok(())
}
