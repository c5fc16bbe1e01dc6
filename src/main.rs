use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;

use riotbot::channels::{ChatClient, CliChannel, CliClient, MatrixClient};
use riotbot::config::ServiceConfig;
use riotbot::tutorial::{FlowDefinition, TutorialService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServiceConfig::from_env().context("invalid configuration")?;

    // No tutorial without a valid script.
    let flow = FlowDefinition::load(&config.flow_path).with_context(|| {
        format!(
            "failed to load tutorial flow from {}",
            config.flow_path.display()
        )
    })?;

    eprintln!("🤖 riotbot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Flow: {} ({} steps)", config.flow_path.display(), flow.len());

    let service = TutorialService::new(flow);

    let client: Arc<dyn ChatClient> = match config.matrix.clone() {
        Some(matrix) => {
            eprintln!("   Delivery: matrix ({})", matrix.homeserver_url);
            Arc::new(MatrixClient::new(matrix))
        }
        None => {
            eprintln!("   Delivery: cli");
            Arc::new(CliClient)
        }
    };

    let _reaper = config.reap_interval.map(|interval| {
        eprintln!(
            "   Reaper: every {}s (retention {}s)",
            interval.as_secs(),
            config.completed_retention.as_secs()
        );
        service.spawn_reaper(interval, config.completed_retention)
    });

    eprintln!("   Type !start to begin the tutorial. Ctrl-D to exit.\n");

    // Command replies always go back to the terminal that typed them.
    let cli: Arc<dyn ChatClient> = Arc::new(CliClient);
    let mut incoming = CliChannel::new().start();

    while let Some(msg) = incoming.next().await {
        let reply = service
            .handle_command(&msg.room_id, &msg.user_id, &msg.body, Arc::clone(&client))
            .await;
        match reply {
            Some(reply) => {
                if let Err(e) = cli.send_message(&msg.room_id, &reply).await {
                    tracing::warn!("Failed to post command reply: {}", e);
                }
            }
            None => eprint!("Unknown command. Supported: !start\n> "),
        }
    }

    Ok(())
}
