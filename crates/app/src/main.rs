use tracing::info;

use stockbook_app::{Settings, StoreKind};
use stockbook_infra::PostgresStore;

/// Apply the Postgres schema for the configured store.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockbook_observability::init();

    let settings = Settings::from_env()?;

    match settings.store {
        StoreKind::Memory => {
            info!("in-memory store selected; nothing to migrate");
        }
        StoreKind::Postgres => {
            let store = PostgresStore::connect(settings.database_url()?, settings.max_connections).await?;
            store.migrate().await?;
            info!("schema applied");
        }
    }

    Ok(())
}
