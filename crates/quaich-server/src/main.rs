//! Quaich: application entry point.

mod cli;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let action = cli::start()?;

    action.execute().await?;

    Ok(())
}
