use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

// ============================================================================
// Catalog Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "CPU")]
    Cpu,
    #[serde(rename = "GPU")]
    Gpu,
    Motherboard,
    #[serde(rename = "RAM")]
    Ram,
    Storage,
    #[serde(rename = "PSU")]
    Psu,
    Case,
    Cooling,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Cpu,
        Category::Gpu,
        Category::Motherboard,
        Category::Ram,
        Category::Storage,
        Category::Psu,
        Category::Case,
        Category::Cooling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cpu => "CPU",
            Category::Gpu => "GPU",
            Category::Motherboard => "Motherboard",
            Category::Ram => "RAM",
            Category::Storage => "Storage",
            Category::Psu => "PSU",
            Category::Case => "Case",
            Category::Cooling => "Cooling",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::validation(format!("Unknown category: {}", s)))
    }
}

/// Category-specific attributes. Which ones are set depends on the part.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_factor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wattage: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub category: Category,
    pub name: String,
    pub brand: String,
    pub model: String,
    pub price: Decimal,
    pub attributes: ProductAttributes,
    pub compatibility_tags: Vec<String>,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            id: self.id,
            category: self.category,
            name: self.name.clone(),
            brand: self.brand.clone(),
            price: self.price,
        }
    }

    /// Case-insensitive match over name, brand and model.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        [&self.name, &self.brand, &self.model]
            .iter()
            .any(|field| field.to_lowercase().contains(&term))
    }
}

/// Compact product view attached to order lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: Uuid,
    pub category: Category,
    pub name: String,
    pub brand: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub category: Category,
    pub name: String,
    pub brand: String,
    pub model: String,
    pub price: Decimal,
    #[serde(default)]
    pub attributes: ProductAttributes,
    #[serde(default)]
    pub compatibility_tags: Vec<String>,
    #[serde(default)]
    pub stock: i32,
}

/// Partial update. Stock is deliberately absent: it belongs to the ledger.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub category: Option<Category>,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub price: Option<Decimal>,
    pub attributes: Option<ProductAttributes>,
    pub compatibility_tags: Option<Vec<String>>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self == &ProductPatch::default()
    }

    /// Trim text fields and canonicalize tags so the patch can be written
    /// column by column.
    pub fn normalized(self) -> Self {
        let trim = |value: Option<String>| value.map(|v| v.trim().to_string());
        Self {
            category: self.category,
            name: trim(self.name),
            brand: trim(self.brand),
            model: trim(self.model),
            price: self.price,
            attributes: self.attributes,
            compatibility_tags: self.compatibility_tags.map(normalize_tags),
        }
    }

    /// Check the fields that are present. Absent fields keep their stored,
    /// already valid values.
    pub fn validate(&self) -> CoreResult<()> {
        for (field, value) in [("name", &self.name), ("brand", &self.brand), ("model", &self.model)] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(CoreError::validation(format!("Product {} cannot be empty", field)));
            }
        }
        match self.price {
            Some(price) => validate_price(price),
            None => Ok(()),
        }
    }

    pub fn apply(self, product: &mut Product) {
        if let Some(category) = self.category {
            product.category = category;
        }
        if let Some(name) = self.name {
            product.name = name.trim().to_string();
        }
        if let Some(brand) = self.brand {
            product.brand = brand.trim().to_string();
        }
        if let Some(model) = self.model {
            product.model = model.trim().to_string();
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(attributes) = self.attributes {
            product.attributes = attributes;
        }
        if let Some(tags) = self.compatibility_tags {
            product.compatibility_tags = normalize_tags(tags);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category: Option<Category>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        let category_ok = self.category.map_or(true, |c| c == product.category);
        let search_ok = self.search.as_deref().map_or(true, |term| product.matches(term));
        category_ok && search_ok
    }
}

// ============================================================================
// Validation
// ============================================================================

pub fn validate_price(price: Decimal) -> CoreResult<()> {
    if price < Decimal::ZERO {
        return Err(CoreError::validation(format!("Price cannot be negative: {}", price)));
    }
    if price.normalize().scale() > 2 {
        return Err(CoreError::validation(format!(
            "Price has more than two decimal places: {}",
            price
        )));
    }
    Ok(())
}

pub fn validate_stock(stock: i32) -> CoreResult<()> {
    if stock < 0 {
        return Err(CoreError::validation(format!("Stock cannot be negative: {}", stock)));
    }
    Ok(())
}

pub(crate) fn validate_product(product: &Product) -> CoreResult<()> {
    for (field, value) in [("name", &product.name), ("brand", &product.brand), ("model", &product.model)] {
        if value.trim().is_empty() {
            return Err(CoreError::validation(format!("Product {} cannot be empty", field)));
        }
    }
    validate_price(product.price)?;
    validate_stock(product.stock)
}

pub(crate) fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}
