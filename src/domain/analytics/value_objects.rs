use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::Category;
use crate::domain::order::{OrderDetails, OrderStatus};
use crate::error::CoreError;

// ============================================================================
// Analytics Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateRange {
    #[serde(rename = "7d")]
    Week,
    #[default]
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
    #[serde(rename = "1y")]
    Year,
}

impl DateRange {
    pub fn days(&self) -> i64 {
        match self {
            DateRange::Week => 7,
            DateRange::Month => 30,
            DateRange::Quarter => 90,
            DateRange::Year => 365,
        }
    }

    /// Start of the first calendar day inside the range, counting today.
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        window_start(now, self.days())
    }
}

impl std::str::FromStr for DateRange {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "7d" => Ok(DateRange::Week),
            "30d" => Ok(DateRange::Month),
            "90d" => Ok(DateRange::Quarter),
            "1y" => Ok(DateRange::Year),
            other => Err(CoreError::validation(format!(
                "Unknown date range: {} (expected 7d, 30d, 90d or 1y)",
                other
            ))),
        }
    }
}

/// Midnight UTC `days - 1` days before `now`, so the window holds `days` dates.
pub fn window_start(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    let first_day = now.date_naive() - Duration::days(days.max(1) - 1);
    first_day
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBucket {
    pub date: NaiveDate,
    pub total: Decimal,
    pub orders: i64,
}

/// Counters computed in one pass by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreTotals {
    pub products: i64,
    pub orders: i64,
    pub users: i64,
    pub revenue: Decimal,
    pub pending_orders: i64,
    pub low_stock: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopProduct {
    pub product_id: Uuid,
    pub name: String,
    pub quantity_sold: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStat {
    pub category: Category,
    pub count: i64,
    pub average_price: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    pub new_users: i64,
    pub returning_users: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_products: i64,
    pub total_orders: i64,
    pub total_users: i64,
    pub total_revenue: Decimal,
    pub pending_order_count: i64,
    pub low_stock_count: i64,
    pub recent_orders: Vec<OrderDetails>,
    pub daily_sales: Vec<DailyBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub date_range: DateRange,
    pub revenue_by_day: Vec<DailyBucket>,
    pub order_status_counts: Vec<StatusCount>,
    pub top_products: Vec<TopProduct>,
    pub category_stats: Vec<CategoryStat>,
    pub new_vs_returning_users: UserActivity,
}
