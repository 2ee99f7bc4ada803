//! Test-connection command - Check the bind credentials of a server

use clap::Args;

use crate::context::Context;

/// Arguments for the test-connection command
#[derive(Args)]
pub struct TestConnectionArgs {
    /// Server name or id
    pub server: String,

    /// Bind password, used when none is configured
    #[arg(long)]
    pub password: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the test-connection command
pub async fn execute(ctx: &Context, args: TestConnectionArgs) -> anyhow::Result<()> {
    let server_id = ctx.resolve_server(&args.server)?;

    let report = ctx
        .service
        .test_connection(server_id, args.password.as_deref())
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }

    if !report.success {
        anyhow::bail!("connection test failed");
    }
    Ok(())
}
