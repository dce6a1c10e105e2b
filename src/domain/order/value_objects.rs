use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::ProductSummary;
use crate::domain::user::UserSummary;
use crate::error::{CoreError, CoreResult};

// ============================================================================
// Order Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

/// Outcome of checking a requested status against the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Requested status already holds.
    Unchanged,
    Apply,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Position in the fulfilment workflow. Cancelled sits outside it.
    fn workflow_rank(&self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Processing => Some(1),
            OrderStatus::Shipped => Some(2),
            OrderStatus::Delivered => Some(3),
            OrderStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self.workflow_rank(), next.workflow_rank()) {
            // Forward along the workflow, skipping allowed.
            (Some(from), Some(to)) => to > from,
            (Some(_), None) => matches!(self, OrderStatus::Pending | OrderStatus::Processing),
            (None, _) => false,
        }
    }

    pub fn transition_to(&self, next: OrderStatus) -> CoreResult<Transition> {
        if *self == next {
            return Ok(Transition::Unchanged);
        }
        if self.can_transition_to(next) {
            Ok(Transition::Apply)
        } else {
            Err(CoreError::InvalidTransition {
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::validation(format!("Unknown order status: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [
        PaymentStatus::Pending,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Completed) | (Pending, Failed) | (Failed, Pending) | (Failed, Completed) | (Completed, Refunded)
        )
    }

    pub fn transition_to(&self, next: PaymentStatus) -> CoreResult<Transition> {
        if *self == next {
            return Ok(Transition::Unchanged);
        }
        if self.can_transition_to(next) {
            Ok(Transition::Apply)
        } else {
            Err(CoreError::InvalidTransition {
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::validation(format!("Unknown payment status: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Paypal,
    BankTransfer,
    CashOnDelivery,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Card,
        PaymentMethod::Paypal,
        PaymentMethod::BankTransfer,
        PaymentMethod::CashOnDelivery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|method| method.as_str() == s.trim())
            .ok_or_else(|| CoreError::validation(format!("Unknown payment method: {}", s)))
    }
}

/// Shipping destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub full_name: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ShippingAddress {
    pub fn validate(&self) -> CoreResult<()> {
        let required = [
            ("fullName", &self.full_name),
            ("street", &self.street),
            ("city", &self.city),
            ("state", &self.state),
            ("postalCode", &self.postal_code),
            ("country", &self.country),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CoreError::validation(format!("Shipping {} is required", field)));
            }
        }
        Ok(())
    }
}

/// Cart line as requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub shipping: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub tracking_number: Option<String>,
    pub stock_reserved: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable line of an order, priced at order time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub price: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

pub fn items_total(items: &[OrderItem]) -> Decimal {
    items.iter().map(OrderItem::line_total).sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemDetails {
    #[serde(flatten)]
    pub item: OrderItem,
    /// `None` once the product has left the catalog.
    pub product: Option<ProductSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItemDetails>,
    pub owner: Option<UserSummary>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    /// Matched against owner name or email.
    pub search: Option<String>,
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    const LEGAL: [(OrderStatus, OrderStatus); 8] = [
        (Pending, Processing),
        (Pending, Shipped),
        (Pending, Delivered),
        (Processing, Shipped),
        (Processing, Delivered),
        (Shipped, Delivered),
        (Pending, Cancelled),
        (Processing, Cancelled),
    ];

    #[test]
    fn test_transition_table_is_exhaustive() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                let result = from.transition_to(to);
                if from == to {
                    assert_eq!(result.unwrap(), Transition::Unchanged, "{} -> {}", from, to);
                } else if LEGAL.contains(&(from, to)) {
                    assert_eq!(result.unwrap(), Transition::Apply, "{} -> {}", from, to);
                } else {
                    assert!(
                        matches!(result, Err(CoreError::InvalidTransition { .. })),
                        "{} -> {} should be rejected",
                        from,
                        to
                    );
                }
            }
        }
    }

    #[test]
    fn test_backward_and_late_cancel_rejected() {
        assert!(!Delivered.can_transition_to(Pending));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Processing));
        assert!(Delivered.is_terminal());
        assert!(!Shipped.is_terminal());
    }

    #[test]
    fn test_invalid_transition_names_both_states() {
        let err = Delivered.transition_to(Pending).unwrap_err();
        assert_eq!(err.to_string(), "Invalid status transition from delivered to pending");
    }

    #[test]
    fn test_payment_transitions() {
        use PaymentStatus as P;
        assert!(P::Pending.can_transition_to(P::Completed));
        assert!(P::Failed.can_transition_to(P::Completed));
        assert!(P::Completed.can_transition_to(P::Refunded));
        assert!(!P::Refunded.can_transition_to(P::Completed));
        assert!(!P::Pending.can_transition_to(P::Refunded));
        assert_eq!(P::Completed.transition_to(P::Completed).unwrap(), Transition::Unchanged);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&Processing).unwrap(), "\"processing\"");
        assert_eq!("SHIPPED".parse::<OrderStatus>().unwrap(), Shipped);
        assert!("lost".parse::<OrderStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&PaymentMethod::CashOnDelivery).unwrap(),
            "\"cash_on_delivery\""
        );
    }

    #[test]
    fn test_items_total() {
        let order_id = Uuid::new_v4();
        let items = vec![
            OrderItem {
                id: Uuid::new_v4(),
                order_id,
                product_id: Uuid::new_v4(),
                product_name: "P1".to_string(),
                quantity: 2,
                price: Decimal::new(1000, 2),
            },
            OrderItem {
                id: Uuid::new_v4(),
                order_id,
                product_id: Uuid::new_v4(),
                product_name: "P2".to_string(),
                quantity: 1,
                price: Decimal::new(2500, 2),
            },
        ];
        assert_eq!(items_total(&items), Decimal::new(4500, 2));
    }

    #[test]
    fn test_shipping_requires_fields() {
        let mut address = ShippingAddress {
            full_name: "Ada Lovelace".to_string(),
            street: "12 Analytical Row".to_string(),
            city: "London".to_string(),
            state: "LDN".to_string(),
            postal_code: "N1 9GU".to_string(),
            country: "UK".to_string(),
            phone: None,
        };
        assert!(address.validate().is_ok());

        address.city = "  ".to_string();
        assert!(matches!(address.validate(), Err(CoreError::Validation(_))));
    }
}
