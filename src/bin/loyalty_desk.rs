//! loyalty-desk: operator console
//!
//! Reads one command per line from stdin, typically a scan followed by an action:
//! ```text
//! award BB:1234
//! redeem ana@example.com 67e55044-10b1-426f-9247-bb680e5fe0c8
//! ```
//!
//! ## Configuration
//! - First argument: optional YAML configuration file
//! - LOYALTY_CONFIG: YAML configuration file
//! - LOYALTY__*: configuration overrides, e.g. `LOYALTY__LEDGER__AWARD_POINTS=20`
//! - LOYALTY_LOG: log filter (default: info)

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use loyalty_ledger::{
    adapters::{database::memory::MemoryDatabase, session::StaticSession},
    commands::DomainLogic,
    config::Config,
    desk::{Desk, DeskCommand},
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = std::env::args().nth(1);
    let config = Config::load(path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let session = match &config.session.operator {
        Some(operator) => {
            info!("Operator {} signed in", operator);
            StaticSession::authenticated(operator.clone())
        }
        None => {
            warn!("No operator configured, every command will be rejected");
            StaticSession::anonymous()
        }
    };

    let database = Arc::new(MemoryDatabase::default());
    let logic = DomainLogic::new(
        database.clone(),
        database,
        Arc::new(session),
        config.ledger.clone(),
    );
    let desk = Desk::new(logic, config.retry.clone());
    desk.seed(&config.seed).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match DeskCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        if command == DeskCommand::Quit {
            break;
        }

        match desk.execute(command).await {
            Ok(output) => println!("{output}"),
            Err(err) => println!("error: {err}"),
        }
    }

    Ok(())
}
