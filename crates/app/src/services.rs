//! Service wiring: pick a store from [`Settings`] and attach the change feed.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::info;

use stockbook_events::{EventEnvelope, InMemoryEventBus};
use stockbook_infra::{InMemoryStore, InventoryStore, PostgresStore, Stockbook};

use crate::actions::Actions;
use crate::settings::{Settings, StoreKind};

/// Change feed every committed event is published on.
pub type ChangeFeed = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

pub type AppStockbook = Stockbook<Arc<dyn InventoryStore>, ChangeFeed>;

pub struct AppServices {
    pub actions: Actions<Arc<dyn InventoryStore>, ChangeFeed>,
    pub feed: ChangeFeed,
    /// Set for the memory store, which has no catalog of its own to read from.
    pub memory_store: Option<Arc<InMemoryStore>>,
}

pub async fn build_services(settings: &Settings) -> anyhow::Result<AppServices> {
    let feed: ChangeFeed = Arc::new(InMemoryEventBus::new());

    let (store, memory_store) = match settings.store {
        StoreKind::Memory => {
            info!("using in-memory store");
            let memory = Arc::new(InMemoryStore::new());
            let store: Arc<dyn InventoryStore> = memory.clone();
            (store, Some(memory))
        }
        StoreKind::Postgres => {
            let postgres = PostgresStore::connect(settings.database_url()?, settings.max_connections).await?;
            info!(max_connections = settings.max_connections, "connected to postgres");
            let store: Arc<dyn InventoryStore> = Arc::new(postgres);
            (store, None)
        }
    };

    let stockbook: AppStockbook =
        Stockbook::new(store, feed.clone()).with_code_attempts(settings.code_attempts);

    Ok(AppServices {
        actions: Actions::new(stockbook),
        feed,
        memory_store,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockbook_events::EventBus;
    use stockbook_inventory::MovementType;
    use stockbook_infra::PostMovementInput;

    #[tokio::test]
    async fn memory_services_share_the_seeded_store() {
        let services = build_services(&Settings::default()).await.unwrap();
        let memory = services.memory_store.clone().unwrap();
        let product = memory.insert_product("Tea", None, 4).unwrap();
        let subscription = services.feed.subscribe();

        let result = services
            .actions
            .create_stock_movement(PostMovementInput {
                product_id: product,
                variant_id: None,
                movement_type: MovementType::Out,
                quantity: 1,
                reference: None,
                notes: None,
            })
            .await;

        assert!(result.success);
        assert_eq!(subscription.drain().len(), 1);
    }
}
