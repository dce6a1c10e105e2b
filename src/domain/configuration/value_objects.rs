use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::{Category, Product};

// ============================================================================
// Configuration Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Cpu,
    Motherboard,
    Ram,
    Storage,
    Gpu,
    Psu,
    Case,
}

impl Slot {
    pub const ALL: [Slot; 7] = [
        Slot::Cpu,
        Slot::Motherboard,
        Slot::Ram,
        Slot::Storage,
        Slot::Gpu,
        Slot::Psu,
        Slot::Case,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Cpu => "cpu",
            Slot::Motherboard => "motherboard",
            Slot::Ram => "ram",
            Slot::Storage => "storage",
            Slot::Gpu => "gpu",
            Slot::Psu => "psu",
            Slot::Case => "case",
        }
    }

    /// The only product category a slot accepts.
    pub fn category(&self) -> Category {
        match self {
            Slot::Cpu => Category::Cpu,
            Slot::Motherboard => Category::Motherboard,
            Slot::Ram => Category::Ram,
            Slot::Storage => Category::Storage,
            Slot::Gpu => Category::Gpu,
            Slot::Psu => Category::Psu,
            Slot::Case => Category::Case,
        }
    }
}

/// Product reference per slot, each optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotMap {
    pub cpu: Option<Uuid>,
    pub motherboard: Option<Uuid>,
    pub ram: Option<Uuid>,
    pub storage: Option<Uuid>,
    pub gpu: Option<Uuid>,
    pub psu: Option<Uuid>,
    pub case: Option<Uuid>,
}

impl SlotMap {
    pub fn get(&self, slot: Slot) -> Option<Uuid> {
        match slot {
            Slot::Cpu => self.cpu,
            Slot::Motherboard => self.motherboard,
            Slot::Ram => self.ram,
            Slot::Storage => self.storage,
            Slot::Gpu => self.gpu,
            Slot::Psu => self.psu,
            Slot::Case => self.case,
        }
    }

    /// Filled slots in declaration order.
    pub fn filled(&self) -> Vec<(Slot, Uuid)> {
        Slot::ALL
            .into_iter()
            .filter_map(|slot| self.get(slot).map(|id| (slot, id)))
            .collect()
    }

    pub fn product_ids(&self) -> Vec<Uuid> {
        self.filled().into_iter().map(|(_, id)| id).collect()
    }

    pub fn references(&self, product_id: Uuid) -> bool {
        Slot::ALL.into_iter().any(|slot| self.get(slot) == Some(product_id))
    }

    pub fn is_empty(&self) -> bool {
        self.filled().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub slots: SlotMap,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Slots resolved to full product data for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedSlots {
    pub cpu: Option<Product>,
    pub motherboard: Option<Product>,
    pub ram: Option<Product>,
    pub storage: Option<Product>,
    pub gpu: Option<Product>,
    pub psu: Option<Product>,
    pub case: Option<Product>,
}

impl ResolvedSlots {
    pub fn set(&mut self, slot: Slot, product: Product) {
        let target = match slot {
            Slot::Cpu => &mut self.cpu,
            Slot::Motherboard => &mut self.motherboard,
            Slot::Ram => &mut self.ram,
            Slot::Storage => &mut self.storage,
            Slot::Gpu => &mut self.gpu,
            Slot::Psu => &mut self.psu,
            Slot::Case => &mut self.case,
        };
        *target = Some(product);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfiguration {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub total_price: Decimal,
    pub components: ResolvedSlots,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
