use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use super::value_objects::{
    window_start, AnalyticsReport, CategoryStat, DailyBucket, DashboardSummary, DateRange, StatusCount,
};
use crate::config::AnalyticsConfig;
use crate::domain::order::OrderStatus;
use crate::error::CoreResult;
use crate::store::AnalyticsRepository;

// ============================================================================
// Analytics Aggregator
// ============================================================================

pub struct AnalyticsAggregator {
    analytics: Arc<dyn AnalyticsRepository>,
    low_stock_threshold: i32,
    recent_orders: u32,
    top_products: u32,
    dashboard_days: i64,
}

impl AnalyticsAggregator {
    pub fn new(analytics: Arc<dyn AnalyticsRepository>, config: &AnalyticsConfig, low_stock_threshold: i32) -> Self {
        Self {
            analytics,
            low_stock_threshold,
            recent_orders: config.recent_orders,
            top_products: config.top_products,
            dashboard_days: config.dashboard_days.max(1) as i64,
        }
    }

    pub async fn dashboard_summary(&self) -> CoreResult<DashboardSummary> {
        let now = Utc::now();
        let since = window_start(now, self.dashboard_days);

        let (totals, recent_orders, daily) = tokio::try_join!(
            self.analytics.totals(self.low_stock_threshold),
            self.analytics.recent_orders(self.recent_orders),
            self.analytics.daily_sales(since, false),
        )?;

        tracing::debug!(
            orders = totals.orders,
            revenue = %totals.revenue,
            days = self.dashboard_days,
            "📊 Dashboard summary computed"
        );

        Ok(DashboardSummary {
            total_products: totals.products,
            total_orders: totals.orders,
            total_users: totals.users,
            total_revenue: totals.revenue,
            pending_order_count: totals.pending_orders,
            low_stock_count: totals.low_stock,
            recent_orders,
            daily_sales: zero_fill(daily, since, now),
        })
    }

    pub async fn analytics(&self, range: DateRange) -> CoreResult<AnalyticsReport> {
        let now = Utc::now();
        let since = range.since(now);

        let (revenue, statuses, top_products, mut category_stats, users) = tokio::try_join!(
            self.analytics.daily_sales(since, true),
            self.analytics.status_counts(since),
            self.analytics.top_products(since, self.top_products),
            self.analytics.category_stats(),
            self.analytics.user_activity(since),
        )?;

        category_stats.sort_by_key(|stat: &CategoryStat| stat.category);

        tracing::debug!(range = ?range, since = %since, "📈 Analytics report computed");

        Ok(AnalyticsReport {
            date_range: range,
            revenue_by_day: zero_fill(revenue, since, now),
            order_status_counts: every_status(statuses),
            top_products,
            category_stats,
            new_vs_returning_users: users,
        })
    }
}

/// One bucket per calendar date from `since` through `now`, inclusive.
fn zero_fill(buckets: Vec<DailyBucket>, since: DateTime<Utc>, now: DateTime<Utc>) -> Vec<DailyBucket> {
    let mut by_date: HashMap<NaiveDate, DailyBucket> = buckets.into_iter().map(|b| (b.date, b)).collect();

    let last = now.date_naive();
    let mut date = since.date_naive();
    let mut filled = Vec::new();
    while date <= last {
        filled.push(by_date.remove(&date).unwrap_or(DailyBucket {
            date,
            total: Decimal::ZERO,
            orders: 0,
        }));
        date += Duration::days(1);
    }
    filled
}

/// Every status in workflow order, zero when absent.
fn every_status(counts: Vec<StatusCount>) -> Vec<StatusCount> {
    let counts: HashMap<OrderStatus, i64> = counts.into_iter().map(|c| (c.status, c.count)).collect();
    OrderStatus::ALL
        .into_iter()
        .map(|status| StatusCount {
            status,
            count: counts.get(&status).copied().unwrap_or(0),
        })
        .collect()
}
