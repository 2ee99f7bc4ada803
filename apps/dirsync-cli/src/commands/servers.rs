//! Servers command - List configured directory servers

use clap::Args;
use serde::Serialize;

use crate::context::Context;

/// Arguments for the servers command
#[derive(Args)]
pub struct ServersArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// JSON output for one server
#[derive(Serialize)]
struct ServerOutput {
    id: String,
    name: String,
    url: String,
    base_dn: String,
    anonymous: bool,
}

/// Execute the servers command
pub async fn execute(ctx: &Context, args: ServersArgs) -> anyhow::Result<()> {
    let servers: Vec<ServerOutput> = ctx
        .service
        .engine()
        .registry()
        .list()
        .await
        .into_iter()
        .map(|s| ServerOutput {
            id: s.id().to_string(),
            url: s.url(),
            anonymous: s.is_anonymous(),
            name: s.name,
            base_dn: s.base_dn,
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&servers)?);
        return Ok(());
    }

    if servers.is_empty() {
        println!("No servers configured.");
        return Ok(());
    }

    for server in servers {
        println!(
            "{}  {}  {}  {}{}",
            server.id,
            server.name,
            server.url,
            server.base_dn,
            if server.anonymous { "  (anonymous)" } else { "" }
        );
    }
    Ok(())
}
