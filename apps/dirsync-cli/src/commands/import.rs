//! Import command - Pull a server's accounts into the local store

use anyhow::bail;
use clap::Args;
use serde::Serialize;

use dirsync_engine::ServerSelection;

use crate::context::Context;

/// Arguments for the import command
#[derive(Args)]
pub struct ImportArgs {
    /// Server name or id
    pub server: String,

    /// Bind password, used when none is configured
    #[arg(long)]
    pub password: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// JSON output for one imported account
#[derive(Serialize)]
struct AccountOutput {
    name: String,
    display_name: String,
    email: String,
    uid_number: Option<u32>,
    login_enabled: bool,
}

/// Execute the import command
pub async fn execute(ctx: &Context, args: ImportArgs) -> anyhow::Result<()> {
    let server_id = ctx.resolve_server(&args.server)?;

    let selection = ctx
        .service
        .select_server(server_id, args.password.as_deref())
        .await?;

    let imported = match selection {
        ServerSelection::ShowPasswordPrompt => {
            bail!("no working bind password for '{}'; pass --password", args.server)
        }
        ServerSelection::OpenManagerView { imported, .. } => imported,
    };

    let accounts: Vec<AccountOutput> = ctx
        .service
        .list(server_id)
        .await?
        .into_iter()
        .map(|a| AccountOutput {
            name: a.name,
            display_name: a.display_name,
            email: a.email,
            uid_number: a.numeric_id,
            login_enabled: a.login_enabled,
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&accounts)?);
        return Ok(());
    }

    println!("Imported {imported} account(s)");
    for account in accounts {
        println!(
            "{:>8}  {:<20}  {:<30}  {}{}",
            account
                .uid_number
                .map(|n| n.to_string())
                .unwrap_or_default(),
            account.name,
            account.display_name,
            account.email,
            if account.login_enabled { "" } else { "  (no login)" }
        );
    }
    Ok(())
}
