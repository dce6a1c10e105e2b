use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use super::{instrument, read, AdminIdentity, ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct AdjustBody {
    delta: i32,
}

#[derive(Debug, Deserialize)]
pub struct SetStockBody {
    stock: i32,
}

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    threshold: Option<i32>,
}

pub async fn adjust(
    state: web::Data<AppState>,
    _admin: AdminIdentity,
    path: web::Path<Uuid>,
    body: web::Json<AdjustBody>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let stock = instrument(&state, "adjust_stock", state.services.ledger.adjust(id, body.delta)).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "productId": id, "stock": stock })))
}

pub async fn set(
    state: web::Data<AppState>,
    _admin: AdminIdentity,
    path: web::Path<Uuid>,
    body: web::Json<SetStockBody>,
) -> Result<HttpResponse, ApiError> {
    let product = instrument(
        &state,
        "set_stock",
        state.services.ledger.set_absolute(path.into_inner(), body.stock),
    )
    .await?;
    Ok(HttpResponse::Ok().json(product))
}

pub async fn low_stock(
    state: web::Data<AppState>,
    _admin: AdminIdentity,
    query: web::Query<LowStockQuery>,
) -> Result<HttpResponse, ApiError> {
    let threshold = query.threshold.unwrap_or(state.low_stock_threshold);
    let products = read(&state, "low_stock", || state.services.ledger.list_below_threshold(threshold)).await?;
    Ok(HttpResponse::Ok().json(products))
}
