// SppCom - Bluetooth SPP command console
use anyhow::Context;
use clap::Parser;
use sppcom::cli::{execute_command, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    execute_command(args).await.context("sppcom")?;
    Ok(())
}
