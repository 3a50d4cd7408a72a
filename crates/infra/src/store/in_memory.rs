use std::collections::HashMap;
use std::sync::RwLock;

use stockbook_core::{ExpectedVersion, ProductId, SupplierId, VariantId};
use stockbook_inventory::{MovementId, StockMovement, StockTarget};
use stockbook_purchasing::{PurchaseOrderId, PurchaseOrderRecord};

use super::{CatalogEntry, ChangeSet, InventoryStore, MovementFilter, StoreError};

#[derive(Debug, Clone)]
struct ProductRow {
    name: String,
    sku: Option<String>,
    stock: i64,
    stock_version: u64,
}

#[derive(Debug, Clone)]
struct VariantRow {
    product_id: ProductId,
    name: String,
    sku: Option<String>,
    stock: i64,
    stock_version: u64,
}

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, ProductRow>,
    variants: HashMap<VariantId, VariantRow>,
    suppliers: HashMap<SupplierId, String>,
    /// Insertion order is chronological order.
    movements: Vec<StockMovement>,
    /// Insertion order is creation order.
    orders: Vec<PurchaseOrderRecord>,
}

impl State {
    fn entry(&self, target: StockTarget) -> Option<CatalogEntry> {
        let product = self.products.get(&target.product_id)?;
        match target.variant_id {
            None => Some(CatalogEntry {
                target,
                product_name: product.name.clone(),
                sku: product.sku.clone(),
                variant_name: None,
                stock: product.stock,
                stock_version: product.stock_version,
            }),
            Some(variant_id) => {
                let variant = self.variants.get(&variant_id)?;
                if variant.product_id != target.product_id {
                    return None;
                }
                Some(CatalogEntry {
                    target,
                    product_name: product.name.clone(),
                    sku: variant.sku.clone(),
                    variant_name: Some(variant.name.clone()),
                    stock: variant.stock,
                    stock_version: variant.stock_version,
                })
            }
        }
    }

    fn order_version(&self, id: PurchaseOrderId) -> u64 {
        self.orders
            .iter()
            .find(|o| o.id == id)
            .map(|o| o.version)
            .unwrap_or(0)
    }

    /// Check every precondition of a change set without mutating anything.
    fn validate(&self, changes: &ChangeSet) -> Result<(), StoreError> {
        for write in changes.stock_writes() {
            let entry = self
                .entry(write.target)
                .ok_or_else(|| StoreError::NotFound(write.target.to_string()))?;
            if !write.expected_version.matches(entry.stock_version) {
                return Err(StoreError::Conflict(format!(
                    "stock of {} is at version {}, expected {:?}",
                    write.target, entry.stock_version, write.expected_version
                )));
            }
        }

        for movement in changes.inserted_movements() {
            if self.movements.iter().any(|m| m.id == movement.id) {
                return Err(StoreError::Conflict(format!(
                    "movement {} already exists",
                    movement.id
                )));
            }
        }

        for id in changes.deleted_movements() {
            if !self.movements.iter().any(|m| m.id == *id) {
                return Err(StoreError::Conflict(format!(
                    "movement {id} was removed concurrently"
                )));
            }
        }

        for write in changes.saved_orders() {
            let current = self.order_version(write.record.id);
            if !write.expected_version.matches(current) {
                return Err(StoreError::Conflict(format!(
                    "purchase order {} is at version {current}, expected {:?}",
                    write.record.id, write.expected_version
                )));
            }
            let code_taken = self
                .orders
                .iter()
                .any(|o| o.code == write.record.code && o.id != write.record.id);
            if code_taken {
                return Err(StoreError::DuplicateCode(write.record.code.clone()));
            }
        }

        for id in changes.deleted_orders() {
            if !self.orders.iter().any(|o| o.id == *id) {
                return Err(StoreError::Conflict(format!(
                    "purchase order {id} was removed concurrently"
                )));
            }
        }

        Ok(())
    }

    fn set_stock(&mut self, target: StockTarget, stock: i64) {
        match target.variant_id {
            None => {
                if let Some(product) = self.products.get_mut(&target.product_id) {
                    product.stock = stock;
                    product.stock_version += 1;
                }
            }
            Some(variant_id) => {
                if let Some(variant) = self.variants.get_mut(&variant_id) {
                    variant.stock = stock;
                    variant.stock_version += 1;
                }
            }
        }
    }
}

/// In-memory store with the catalog tables it reads counters from.
///
/// Intended for tests/dev. Commits are serialized behind one lock and validated
/// in full before anything is mutated, which makes them atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    /// Seed a simple product with an opening stock.
    pub fn insert_product(
        &self,
        name: impl Into<String>,
        sku: Option<String>,
        stock: i64,
    ) -> Result<ProductId, StoreError> {
        let id = ProductId::new();
        self.write()?.products.insert(
            id,
            ProductRow {
                name: name.into(),
                sku,
                stock,
                stock_version: 0,
            },
        );
        Ok(id)
    }

    /// Seed a variant of an existing product.
    pub fn insert_variant(
        &self,
        product_id: ProductId,
        name: impl Into<String>,
        sku: Option<String>,
        stock: i64,
    ) -> Result<VariantId, StoreError> {
        let mut state = self.write()?;
        if !state.products.contains_key(&product_id) {
            return Err(StoreError::NotFound(format!("product {product_id}")));
        }
        let id = VariantId::new();
        state.variants.insert(
            id,
            VariantRow {
                product_id,
                name: name.into(),
                sku,
                stock,
                stock_version: 0,
            },
        );
        Ok(id)
    }

    pub fn insert_supplier(&self, name: impl Into<String>) -> Result<SupplierId, StoreError> {
        let id = SupplierId::new();
        self.write()?.suppliers.insert(id, name.into());
        Ok(id)
    }

    /// Remove a product (and its variants) from the catalog.
    pub fn remove_product(&self, product_id: ProductId) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.products.remove(&product_id);
        state.variants.retain(|_, v| v.product_id != product_id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl InventoryStore for InMemoryStore {
    async fn stock_level(&self, target: StockTarget) -> Result<Option<CatalogEntry>, StoreError> {
        Ok(self.read()?.entry(target))
    }

    async fn supplier_name(&self, supplier_id: SupplierId) -> Result<Option<String>, StoreError> {
        Ok(self.read()?.suppliers.get(&supplier_id).cloned())
    }

    async fn movement(&self, id: MovementId) -> Result<Option<StockMovement>, StoreError> {
        Ok(self.read()?.movements.iter().find(|m| m.id == id).cloned())
    }

    async fn movements(&self, filter: MovementFilter) -> Result<Vec<StockMovement>, StoreError> {
        Ok(self
            .read()?
            .movements
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect())
    }

    async fn order(&self, id: PurchaseOrderId) -> Result<Option<PurchaseOrderRecord>, StoreError> {
        Ok(self.read()?.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn orders(&self) -> Result<Vec<PurchaseOrderRecord>, StoreError> {
        let mut orders = self.read()?.orders.clone();
        orders.reverse();
        // Stable sort keeps later inserts first among equal timestamps.
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn order_code_exists(&self, code: &str) -> Result<bool, StoreError> {
        Ok(self.read()?.orders.iter().any(|o| o.code == code))
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.validate(&changes)?;

        for write in changes.stock_writes() {
            state.set_stock(write.target, write.stock);
        }

        state
            .movements
            .extend(changes.inserted_movements().iter().cloned());

        let deleted = changes.deleted_movements();
        if !deleted.is_empty() {
            state.movements.retain(|m| !deleted.contains(&m.id));
        }

        for write in changes.saved_orders() {
            match state.orders.iter_mut().find(|o| o.id == write.record.id) {
                Some(existing) => *existing = write.record.clone(),
                None => state.orders.push(write.record.clone()),
            }
        }

        let deleted = changes.deleted_orders();
        if !deleted.is_empty() {
            state.orders.retain(|o| !deleted.contains(&o.id));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockbook_inventory::MovementType;

    fn movement(target: StockTarget, before: i64, after: i64) -> StockMovement {
        StockMovement {
            id: MovementId::generate(),
            product_id: target.product_id,
            variant_id: target.variant_id,
            movement_type: MovementType::Adjustment,
            quantity: after,
            stock_before: before,
            stock_after: after,
            reference: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn commit_writes_counter_and_movement_together() {
        let store = InMemoryStore::new();
        let product = store.insert_product("Tea", None, 5).unwrap();
        let target = StockTarget::product(product);

        let mut changes = ChangeSet::new();
        changes.write_stock(target, ExpectedVersion::Exact(0), 9);
        changes.insert_movement(movement(target, 5, 9));
        store.commit(changes).await.unwrap();

        let entry = store.stock_level(target).await.unwrap().unwrap();
        assert_eq!(entry.stock, 9);
        assert_eq!(entry.stock_version, 1);
        assert_eq!(store.movements(MovementFilter::All).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_version_fails_and_writes_nothing() {
        let store = InMemoryStore::new();
        let product = store.insert_product("Tea", None, 5).unwrap();
        let target = StockTarget::product(product);

        let mut changes = ChangeSet::new();
        changes.write_stock(target, ExpectedVersion::Exact(7), 9);
        changes.insert_movement(movement(target, 5, 9));
        let err = store.commit(changes).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.stock_level(target).await.unwrap().unwrap().stock, 5);
        assert!(store.movements(MovementFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn variant_of_another_product_is_not_found() {
        let store = InMemoryStore::new();
        let a = store.insert_product("Shirt", None, 0).unwrap();
        let b = store.insert_product("Mug", None, 0).unwrap();
        let variant = store.insert_variant(a, "Size M", None, 3).unwrap();

        assert!(store
            .stock_level(StockTarget::variant(a, variant))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .stock_level(StockTarget::variant(b, variant))
            .await
            .unwrap()
            .is_none());
    }
}
