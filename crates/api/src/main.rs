use gatehouse_api::app::{self, services};
use gatehouse_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApiConfig::from_env()?;
    gatehouse_observability::init(config.log_format);

    let (router, services) = app::build_app(&config)?;
    let _sweeper = services::spawn_revocation_sweeper(
        services.ledger.clone(),
        services.clock.clone(),
        config.revocation_sweep,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router).await?;
    Ok(())
}
