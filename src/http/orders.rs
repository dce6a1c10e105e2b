use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use super::{instrument, read, AdminIdentity, ApiError, AppState, Identity, MaybeIdentity};
use crate::domain::order::{OrderRequest, OrderStatus, PaymentStatus};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    status: OrderStatus,
    #[serde(default)]
    tracking_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentBody {
    #[serde(alias = "status")]
    payment_status: PaymentStatus,
}

/// Guests may order; a signed-in caller always orders as themselves.
pub async fn create(
    state: web::Data<AppState>,
    identity: MaybeIdentity,
    body: web::Json<OrderRequest>,
) -> Result<HttpResponse, ApiError> {
    let mut request = body.into_inner();
    request.user_id = identity.0.map(|actor| actor.user_id);

    let order = instrument(&state, "create_order", state.services.orders.create(request)).await?;
    Ok(HttpResponse::Created().json(order))
}

pub async fn get(state: web::Data<AppState>, identity: Identity, path: web::Path<Uuid>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let order = read(&state, "get_order", || state.services.orders.get(id)).await?;

    match order.order.user_id {
        Some(owner) => identity.require_access(owner)?,
        None if identity.0.is_admin() => {}
        None => return Err(ApiError::forbidden()),
    }
    Ok(HttpResponse::Ok().json(order))
}

pub async fn list_by_user(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    identity.require_access(user_id)?;

    let orders = read(&state, "list_user_orders", || state.services.orders.get_for_user(user_id)).await?;
    Ok(HttpResponse::Ok().json(orders))
}

pub async fn update_status(
    state: web::Data<AppState>,
    _admin: AdminIdentity,
    path: web::Path<Uuid>,
    body: web::Json<StatusBody>,
) -> Result<HttpResponse, ApiError> {
    let StatusBody { status, tracking_number } = body.into_inner();
    let order = instrument(
        &state,
        "update_order_status",
        state.services.orders.update_status(path.into_inner(), status, tracking_number),
    )
    .await?;
    Ok(HttpResponse::Ok().json(order))
}

pub async fn update_payment(
    state: web::Data<AppState>,
    _admin: AdminIdentity,
    path: web::Path<Uuid>,
    body: web::Json<PaymentBody>,
) -> Result<HttpResponse, ApiError> {
    let order = instrument(
        &state,
        "update_payment_status",
        state.services.orders.update_payment_status(path.into_inner(), body.payment_status),
    )
    .await?;
    Ok(HttpResponse::Ok().json(order))
}
