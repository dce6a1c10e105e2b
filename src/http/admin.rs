use actix_web::{web, HttpResponse};
use serde::Deserialize;

use super::{read, AdminIdentity, ApiError, AppState};
use crate::domain::analytics::DateRange;
use crate::domain::order::{OrderFilter, OrderStatus};

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    status: Option<String>,
    search: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    #[serde(rename = "dateRange")]
    date_range: Option<String>,
}

pub async fn orders(
    state: web::Data<AppState>,
    _admin: AdminIdentity,
    query: web::Query<OrdersQuery>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty() && *s != "all")
        .map(str::parse::<OrderStatus>)
        .transpose()?;
    let filter = OrderFilter {
        status,
        search: query.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
    };
    let page = state.page(query.page, query.per_page);

    let orders = read(&state, "list_orders", || state.services.orders.get_all(filter.clone(), page)).await?;
    Ok(HttpResponse::Ok().json(orders))
}

pub async fn dashboard(state: web::Data<AppState>, _admin: AdminIdentity) -> Result<HttpResponse, ApiError> {
    let summary = read(&state, "dashboard", || state.services.analytics.dashboard_summary()).await?;
    Ok(HttpResponse::Ok().json(summary))
}

pub async fn analytics(
    state: web::Data<AppState>,
    _admin: AdminIdentity,
    query: web::Query<AnalyticsQuery>,
) -> Result<HttpResponse, ApiError> {
    let range = match query.date_range.as_deref() {
        Some(raw) => raw.parse::<DateRange>()?,
        None => DateRange::default(),
    };
    let report = read(&state, "analytics", || state.services.analytics.analytics(range)).await?;
    Ok(HttpResponse::Ok().json(report))
}

#[cfg(test)]
mod tests {
    use crate::domain::catalog::Category;
    use crate::http::configure;
    use crate::http::testing::{admin_role, error_kind, state, user};
    use crate::store::InMemoryStore;
    use crate::test_support::{seed_product, seed_user, shipping};
    use actix_web::{test, App};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use uuid::Uuid;

    use crate::domain::order::{OrderLine, OrderRequest, PaymentMethod};

    #[actix_web::test]
    async fn test_dashboard_requires_admin() {
        let store = Arc::new(InMemoryStore::new());
        let app = test::init_service(App::new().app_data(state(store)).configure(configure)).await;

        let req = test::TestRequest::get().uri("/admin/dashboard").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);

        let req = test::TestRequest::get()
            .uri("/admin/dashboard")
            .insert_header(user(Uuid::new_v4()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::get()
            .uri("/admin/dashboard")
            .insert_header(user(Uuid::new_v4()))
            .insert_header(admin_role())
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["totalOrders"], 0);
        assert_eq!(body["dailySales"].as_array().map(Vec::len), Some(30));
    }

    #[actix_web::test]
    async fn test_analytics_range_validation() {
        let store = Arc::new(InMemoryStore::new());
        let app = test::init_service(App::new().app_data(state(store)).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/admin/analytics?dateRange=7d")
            .insert_header(user(Uuid::new_v4()))
            .insert_header(admin_role())
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["dateRange"], "7d");
        assert_eq!(body["revenueByDay"].as_array().map(Vec::len), Some(7));
        assert_eq!(body["orderStatusCounts"].as_array().map(Vec::len), Some(5));

        let req = test::TestRequest::get()
            .uri("/admin/analytics?dateRange=2w")
            .insert_header(user(Uuid::new_v4()))
            .insert_header(admin_role())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        assert_eq!(error_kind(resp).await, "validation");
    }

    #[actix_web::test]
    async fn test_orders_listing_filters_by_owner_search() {
        let store = Arc::new(InMemoryStore::new());
        let part = seed_product(&store, Category::Cpu, "Core i3", Decimal::new(9900, 2), 10).await;
        let grace = seed_user(&store, "Grace Hopper", "grace@navy.mil", Utc::now()).await;
        let alan = seed_user(&store, "Alan Turing", "alan@bletchley.uk", Utc::now()).await;
        let data = state(store);
        for owner in [grace.id, alan.id] {
            data.services
                .orders
                .create(OrderRequest {
                    user_id: Some(owner),
                    items: vec![OrderLine { product_id: part.id, quantity: 1 }],
                    shipping: shipping(),
                    payment_method: PaymentMethod::Card,
                })
                .await
                .unwrap();
        }
        let app = test::init_service(App::new().app_data(data).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/admin/orders?search=GRACE&status=pending")
            .insert_header(user(Uuid::new_v4()))
            .insert_header(admin_role())
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["items"][0]["owner"]["name"], "Grace Hopper");

        let req = test::TestRequest::get()
            .uri("/admin/orders?status=lost")
            .insert_header(user(Uuid::new_v4()))
            .insert_header(admin_role())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn test_store_outage_is_generic_500() {
        let store = Arc::new(InMemoryStore::new());
        let app = test::init_service(App::new().app_data(state(store.clone())).configure(configure)).await;
        store.set_unavailable(true);

        let req = test::TestRequest::get()
            .uri("/admin/dashboard")
            .insert_header(user(Uuid::new_v4()))
            .insert_header(admin_role())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 500);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["kind"], "store_unavailable");
        assert_eq!(body["error"]["message"], "The service is temporarily unavailable");
    }
}
