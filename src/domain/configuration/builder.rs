use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::value_objects::{Configuration, ResolvedConfiguration, ResolvedSlots, SlotMap};
use crate::domain::catalog::Product;
use crate::error::{CoreError, CoreResult};
use crate::store::{ConfigurationRepository, ProductRepository};

// ============================================================================
// Configuration Builder
// ============================================================================
//
// build / update:  SlotMap → resolve products → check slot categories
//                  → sum prices → persist snapshot
//
// The stored total is always recomputed from the catalog; a client-supplied
// total is never accepted.
//
// ============================================================================

const MAX_NAME_LEN: usize = 120;

pub struct ConfigurationBuilder {
    products: Arc<dyn ProductRepository>,
    configurations: Arc<dyn ConfigurationRepository>,
}

impl ConfigurationBuilder {
    pub fn new(products: Arc<dyn ProductRepository>, configurations: Arc<dyn ConfigurationRepository>) -> Self {
        Self {
            products,
            configurations,
        }
    }

    pub async fn build(&self, user_id: Uuid, name: &str, slots: SlotMap) -> CoreResult<ResolvedConfiguration> {
        let name = validate_name(name)?;
        let (resolved, total_price) = self.resolve(&slots).await?;

        let now = Utc::now();
        let configuration = Configuration {
            id: Uuid::new_v4(),
            user_id,
            name,
            slots,
            total_price,
            created_at: now,
            updated_at: now,
        };
        self.configurations.insert_configuration(&configuration).await?;

        tracing::info!(
            configuration_id = %configuration.id,
            user_id = %user_id,
            parts = slots.filled().len(),
            total_price = %total_price,
            "🧩 Configuration built"
        );
        Ok(into_resolved(configuration, resolved))
    }

    /// Full slot replacement. The new total is summed from scratch.
    pub async fn update(&self, id: Uuid, name: Option<&str>, slots: SlotMap) -> CoreResult<ResolvedConfiguration> {
        let existing = self.find(id).await?;
        let name = match name {
            Some(name) => validate_name(name)?,
            None => existing.name.clone(),
        };
        let (resolved, total_price) = self.resolve(&slots).await?;

        let configuration = Configuration {
            name,
            slots,
            total_price,
            updated_at: Utc::now(),
            ..existing
        };
        if !self.configurations.replace_configuration(&configuration).await? {
            return Err(CoreError::not_found("Configuration", id));
        }

        tracing::info!(
            configuration_id = %id,
            parts = slots.filled().len(),
            total_price = %total_price,
            "🔁 Configuration replaced"
        );
        Ok(into_resolved(configuration, resolved))
    }

    pub async fn get(&self, id: Uuid) -> CoreResult<ResolvedConfiguration> {
        let configuration = self.find(id).await?;
        let products = self.load_products(&configuration.slots.product_ids()).await?;
        Ok(display(configuration, &products))
    }

    /// Stored configuration without resolving products.
    pub async fn find(&self, id: Uuid) -> CoreResult<Configuration> {
        self.configurations
            .find_configuration(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Configuration", id))
    }

    pub async fn list_by_user(&self, user_id: Uuid) -> CoreResult<Vec<ResolvedConfiguration>> {
        let configurations = self.configurations.configurations_for_user(user_id).await?;

        let mut ids: Vec<Uuid> = configurations
            .iter()
            .flat_map(|c| c.slots.product_ids())
            .collect();
        ids.sort();
        ids.dedup();
        let products = self.load_products(&ids).await?;

        Ok(configurations
            .into_iter()
            .map(|configuration| display(configuration, &products))
            .collect())
    }

    /// Stock is untouched: nothing was ever held for a configuration.
    pub async fn delete(&self, id: Uuid) -> CoreResult<()> {
        if !self.configurations.delete_configuration(id).await? {
            return Err(CoreError::not_found("Configuration", id));
        }
        tracing::info!(configuration_id = %id, "🗑️ Configuration deleted");
        Ok(())
    }

    async fn load_products(&self, ids: &[Uuid]) -> CoreResult<HashMap<Uuid, Product>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .products
            .find_products(ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect())
    }

    async fn resolve(&self, slots: &SlotMap) -> CoreResult<(ResolvedSlots, Decimal)> {
        let products = self.load_products(&slots.product_ids()).await?;

        let mut resolved = ResolvedSlots::default();
        let mut total = Decimal::ZERO;
        for (slot, product_id) in slots.filled() {
            let product = products
                .get(&product_id)
                .ok_or_else(|| CoreError::not_found("Product", product_id))?;
            if product.category != slot.category() {
                return Err(CoreError::validation(format!(
                    "Slot {} expects a {} product, got {} ({})",
                    slot.as_str(),
                    slot.category(),
                    product.category,
                    product.name
                )));
            }
            total += product.price;
            resolved.set(slot, product.clone());
        }
        Ok((resolved, total))
    }
}

fn validate_name(name: &str) -> CoreResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::validation("Configuration name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(CoreError::validation(format!(
            "Configuration name exceeds {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn display(configuration: Configuration, products: &HashMap<Uuid, Product>) -> ResolvedConfiguration {
    let mut resolved = ResolvedSlots::default();
    for (slot, product_id) in configuration.slots.filled() {
        if let Some(product) = products.get(&product_id) {
            resolved.set(slot, product.clone());
        }
    }
    into_resolved(configuration, resolved)
}

fn into_resolved(configuration: Configuration, components: ResolvedSlots) -> ResolvedConfiguration {
    ResolvedConfiguration {
        id: configuration.id,
        user_id: configuration.user_id,
        name: configuration.name,
        total_price: configuration.total_price,
        components,
        created_at: configuration.created_at,
        updated_at: configuration.updated_at,
    }
}
