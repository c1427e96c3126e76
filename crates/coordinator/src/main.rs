mod arguments;
mod collaborators;
mod health;
mod run;
mod shutdown;

use clap::Parser;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = arguments::Arguments::parse();
    init_tracing();
    tracing::info!("starting coordinator");
    run::run(args).await
}
