use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::value_objects::{
    normalize_tags, validate_product, NewProduct, Product, ProductFilter, ProductPatch,
};
use crate::domain::page::{Page, Paged};
use crate::error::{CoreError, CoreResult};
use crate::store::{DeleteOutcome, PatchOutcome, ProductRepository};

// ============================================================================
// Catalog Store
// ============================================================================

pub struct CatalogStore {
    products: Arc<dyn ProductRepository>,
    search_limit: u32,
}

impl CatalogStore {
    pub fn new(products: Arc<dyn ProductRepository>, search_limit: u32) -> Self {
        Self {
            products,
            search_limit: search_limit.max(1),
        }
    }

    pub async fn create(&self, input: NewProduct) -> CoreResult<Product> {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            category: input.category,
            name: input.name.trim().to_string(),
            brand: input.brand.trim().to_string(),
            model: input.model.trim().to_string(),
            price: input.price,
            attributes: input.attributes,
            compatibility_tags: normalize_tags(input.compatibility_tags),
            stock: input.stock,
            created_at: now,
            updated_at: now,
        };
        validate_product(&product)?;

        self.products.insert_product(&product).await?;

        tracing::info!(
            product_id = %product.id,
            category = %product.category,
            price = %product.price,
            stock = product.stock,
            "📦 Product created"
        );
        Ok(product)
    }

    pub async fn get(&self, id: Uuid) -> CoreResult<Product> {
        self.products
            .find_product(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Product", id))
    }

    /// Apply a partial update against the current row. Stock is never part
    /// of the patch, and a product sitting in a saved configuration keeps
    /// its category.
    pub async fn update(&self, id: Uuid, patch: ProductPatch) -> CoreResult<Product> {
        let patch = patch.normalized();
        patch.validate()?;
        if patch.is_empty() {
            return self.get(id).await;
        }

        match self.products.patch_product(id, &patch).await? {
            PatchOutcome::Updated(updated) => {
                tracing::info!(product_id = %id, price = %updated.price, "✏️ Product updated");
                Ok(updated)
            }
            PatchOutcome::Missing => Err(CoreError::not_found("Product", id)),
            PatchOutcome::CategoryLocked { configurations } => {
                tracing::warn!(
                    product_id = %id,
                    configurations = configurations,
                    "⚠️ Refusing category change of configured product"
                );
                Err(CoreError::conflict(format!(
                    "Product {} is used by {} configuration(s) and cannot change category",
                    id, configurations
                )))
            }
        }
    }

    pub async fn delete(&self, id: Uuid) -> CoreResult<()> {
        match self.products.delete_product(id).await? {
            DeleteOutcome::Deleted => {
                tracing::info!(product_id = %id, "🗑️ Product deleted");
                Ok(())
            }
            DeleteOutcome::Missing => Err(CoreError::not_found("Product", id)),
            DeleteOutcome::Referenced { orders, configurations } => {
                tracing::warn!(
                    product_id = %id,
                    orders = orders,
                    configurations = configurations,
                    "⚠️ Refusing to delete referenced product"
                );
                Err(CoreError::conflict(format!(
                    "Product {} is referenced by {} open order(s) and {} configuration(s)",
                    id, orders, configurations
                )))
            }
        }
    }

    pub async fn list(&self, filter: ProductFilter, page: Page) -> CoreResult<Paged<Product>> {
        let filter = ProductFilter {
            search: filter
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            category: filter.category,
        };
        self.products.list_products(&filter, page).await
    }

    pub async fn search(&self, term: &str) -> CoreResult<Vec<Product>> {
        let term = term.trim();
        if term.is_empty() {
            return Err(CoreError::validation("Search term cannot be empty"));
        }
        self.products.search_products(term, self.search_limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::Category;
    use crate::store::InMemoryStore;
    use crate::test_support::new_product;
    use rust_decimal::Decimal;

    fn catalog() -> CatalogStore {
        CatalogStore::new(Arc::new(InMemoryStore::new()), 50)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let catalog = catalog();
        let created = catalog
            .create(new_product(Category::Cpu, "  Ryzen 5 7600 ", Decimal::new(19900, 2), 12))
            .await
            .unwrap();

        assert_eq!(created.name, "Ryzen 5 7600");
        let fetched = catalog.get(created.id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_rejects_negative_price_and_stock() {
        let catalog = catalog();

        let err = catalog
            .create(new_product(Category::Cpu, "Bad", Decimal::new(-100, 2), 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = catalog
            .create(new_product(Category::Cpu, "Bad", Decimal::new(100, 2), -1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn test_update_missing_product_is_not_found() {
        let err = catalog()
            .update(
                Uuid::new_v4(),
                ProductPatch {
                    name: Some("x".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_update_revalidates_price() {
        let catalog = catalog();
        let product = catalog
            .create(new_product(Category::Gpu, "RX 7800 XT", Decimal::new(49900, 2), 4))
            .await
            .unwrap();

        let err = catalog
            .update(
                product.id,
                ProductPatch {
                    price: Some(Decimal::new(-1, 0)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(catalog.get(product.id).await.unwrap().price, Decimal::new(49900, 2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_patches_of_different_fields_both_land() {
        let catalog = Arc::new(catalog());
        let product = catalog
            .create(new_product(Category::Gpu, "RX 7700 XT", Decimal::new(44900, 2), 4))
            .await
            .unwrap();
        let id = product.id;

        for round in 0..20 {
            let price = Decimal::new(40000 + round, 2);
            let name = format!("RX 7700 XT rev {}", round);
            let reprice = {
                let catalog = catalog.clone();
                tokio::spawn(async move {
                    catalog
                        .update(
                            id,
                            ProductPatch {
                                price: Some(price),
                                ..Default::default()
                            },
                        )
                        .await
                })
            };
            let rename = {
                let catalog = catalog.clone();
                let name = name.clone();
                tokio::spawn(async move {
                    catalog
                        .update(
                            id,
                            ProductPatch {
                                name: Some(name),
                                ..Default::default()
                            },
                        )
                        .await
                })
            };
            reprice.await.unwrap().unwrap();
            rename.await.unwrap().unwrap();

            let stored = catalog.get(id).await.unwrap();
            assert_eq!(stored.price, price);
            assert_eq!(stored.name, name);
            assert_eq!(stored.stock, 4);
        }
    }

    #[tokio::test]
    async fn test_update_rejects_blank_fields_before_lookup() {
        let catalog = catalog();
        let product = catalog
            .create(new_product(Category::Case, "North", Decimal::new(10900, 2), 2))
            .await
            .unwrap();

        let err = catalog
            .update(
                product.id,
                ProductPatch {
                    brand: Some("  ".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(catalog.get(product.id).await.unwrap().brand, "Acme");
    }

    #[tokio::test]
    async fn test_list_newest_first_with_category_filter() {
        let catalog = catalog();
        let first = catalog
            .create(new_product(Category::Ram, "DDR5 32GB", Decimal::new(11900, 2), 5))
            .await
            .unwrap();
        let second = catalog
            .create(new_product(Category::Ram, "DDR5 64GB", Decimal::new(21900, 2), 5))
            .await
            .unwrap();
        catalog
            .create(new_product(Category::Case, "Meshify 2", Decimal::new(16900, 2), 5))
            .await
            .unwrap();

        let page = catalog
            .list(
                ProductFilter {
                    search: Some("  ".to_string()),
                    category: Some(Category::Ram),
                },
                Page::new(1, 10),
            )
            .await
            .unwrap();

        assert_eq!(page.total, 2);
        let ids: Vec<Uuid> = page.items.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let catalog = catalog();
        catalog
            .create(new_product(Category::Psu, "Focus GX-850", Decimal::new(12900, 2), 3))
            .await
            .unwrap();

        let found = catalog.search("focus").await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(catalog.search("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_unreferenced_then_missing() {
        let catalog = catalog();
        let product = catalog
            .create(new_product(Category::Cooling, "NH-D15", Decimal::new(10995, 2), 2))
            .await
            .unwrap();

        catalog.delete(product.id).await.unwrap();
        assert_eq!(catalog.delete(product.id).await.unwrap_err().kind(), "not_found");
    }
}
