use anyhow::Result;
use clap::Parser;
use ta_pool::Args;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let summary = ta_pool::run(&args).await?;
    print!("{}", ta_pool::render(&summary, args.json)?);

    Ok(())
}
