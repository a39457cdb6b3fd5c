use anyhow::{Context, Result};
use refinery::{embed_migrations, Report};
use refinery_core::tokio_postgres::{Config, NoTls};
use tokio::sync::oneshot;
use tracing::Instrument;

embed_migrations!(".");

#[tracing::instrument(skip(config))]
async fn migrate(config: Config) -> Result<Report> {
    log::debug!("config: {:?}", config);

    let (mut client, conn) = config
        .connect(NoTls)
        .await
        .context("Unable to connect to database")?;

    let (tx, rx) = oneshot::channel();

    tokio::spawn(
        async move {
            if let Err(e) = conn.await {
                log::error!("connection error: {}", e)
            }

            tx.send(()).expect("Channel unexpectedly dropped");
        }
        .instrument(tracing::Span::current()),
    );

    let report = migrations::runner().run_async(&mut client).await?;

    drop(client);

    // wait for the connection to close
    rx.await?;

    Ok(report)
}

pub async fn migrate_from_url(url: &str) -> Result<Report> {
    let config = url.parse::<Config>()?;
    migrate(config).await
}
