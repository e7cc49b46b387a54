//! One-shot trust bootstrap runner.
//!
//! Runs the startup sequence (CA material, user identity and
//! certificate, trust store, client config wiring), then optionally
//! issues a sandbox identity or probes a hostname:
//!
//! ```text
//! sandbox-trust                   # bootstrap only
//! sandbox-trust issue <hostname>  # bootstrap, then print a KeyBundle as JSON
//! sandbox-trust probe <hostname>  # bootstrap, then check SSH reachability
//! ```

use sandbox_trust::{DiskStore, LocalTrustService, OsKeyGenerator, TrustConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    setup_log();

    if let Err(err) = run().await {
        error!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = TrustConfig::load()?;
    let service =
        LocalTrustService::bootstrap(config, Box::new(DiskStore), Box::new(OsKeyGenerator))?;

    let mut args = std::env::args().skip(1);
    match (args.next(), args.next()) {
        (None, _) => {}
        (Some(command), Some(hostname)) if command == "issue" => {
            let bundle = service.issue_sandbox_identity(&hostname)?;
            println!("{}", serde_json::to_string_pretty(&bundle)?);
        }
        (Some(command), Some(hostname)) if command == "probe" => {
            service.check_reachability(&hostname).await?;
            info!("{hostname} is reachable");
        }
        _ => {
            return Err("usage: sandbox-trust [issue <hostname> | probe <hostname>]".into());
        }
    }

    Ok(())
}

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};
    if tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .is_err()
    {}
}
