use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::catalog::{Category, NewProduct, Product, ProductAttributes};
use crate::domain::order::ShippingAddress;
use crate::domain::user::UserSummary;
use crate::store::{InMemoryStore, ProductRepository};

// ============================================================================
// Shared test fixtures
// ============================================================================

pub fn new_product(category: Category, name: &str, price: Decimal, stock: i32) -> NewProduct {
    NewProduct {
        category,
        name: name.to_string(),
        brand: "Acme".to_string(),
        model: format!("{}-X", name.trim()),
        price,
        attributes: ProductAttributes::default(),
        compatibility_tags: vec![],
        stock,
    }
}

/// Insert a product directly through the repository.
pub async fn seed_product(store: &InMemoryStore, category: Category, name: &str, price: Decimal, stock: i32) -> Product {
    let now = Utc::now();
    let product = Product {
        id: Uuid::new_v4(),
        category,
        name: name.to_string(),
        brand: "Acme".to_string(),
        model: format!("{}-X", name),
        price,
        attributes: ProductAttributes::default(),
        compatibility_tags: vec![],
        stock,
        created_at: now,
        updated_at: now,
    };
    store.insert_product(&product).await.unwrap();
    product
}

pub async fn seed_user(store: &InMemoryStore, name: &str, email: &str, created_at: DateTime<Utc>) -> UserSummary {
    let user = UserSummary {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: email.to_string(),
        created_at,
    };
    store.insert_user(user.clone()).await;
    user
}

pub fn shipping() -> ShippingAddress {
    ShippingAddress {
        full_name: "Ada Lovelace".to_string(),
        street: "12 Analytical Way".to_string(),
        city: "London".to_string(),
        state: "Greater London".to_string(),
        postal_code: "N1 9GU".to_string(),
        country: "UK".to_string(),
        phone: None,
    }
}
