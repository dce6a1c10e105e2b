use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use super::{instrument, read, AdminIdentity, ApiError, AppState};
use crate::domain::catalog::{validate_stock, Category, NewProduct, ProductFilter, ProductPatch};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    search: Option<String>,
    category: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
}

/// Product fields plus an optional absolute stock value for the ledger.
#[derive(Debug, Deserialize)]
pub struct UpdateProductBody {
    #[serde(flatten)]
    patch: ProductPatch,
    #[serde(default)]
    stock: Option<i32>,
}

pub async fn list(state: web::Data<AppState>, query: web::Query<ListQuery>) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    let category = query
        .category
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(str::parse::<Category>)
        .transpose()?;
    let filter = ProductFilter {
        search: query.search,
        category,
    };
    let page = state.page(query.page, query.per_page);

    let products = read(&state, "list_products", || state.services.catalog.list(filter.clone(), page)).await?;
    Ok(HttpResponse::Ok().json(products))
}

pub async fn search(state: web::Data<AppState>, query: web::Query<SearchQuery>) -> Result<HttpResponse, ApiError> {
    let products = read(&state, "search_products", || state.services.catalog.search(&query.q)).await?;
    Ok(HttpResponse::Ok().json(products))
}

pub async fn get(state: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let product = read(&state, "get_product", || state.services.catalog.get(id)).await?;
    Ok(HttpResponse::Ok().json(product))
}

pub async fn create(
    state: web::Data<AppState>,
    _admin: AdminIdentity,
    body: web::Json<NewProduct>,
) -> Result<HttpResponse, ApiError> {
    let product = instrument(&state, "create_product", state.services.catalog.create(body.into_inner())).await?;
    Ok(HttpResponse::Created().json(product))
}

pub async fn update(
    state: web::Data<AppState>,
    _admin: AdminIdentity,
    path: web::Path<Uuid>,
    body: web::Json<UpdateProductBody>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let UpdateProductBody { patch, stock } = body.into_inner();

    // Reject a bad stock value before any field is written.
    if let Some(stock) = stock {
        validate_stock(stock)?;
    }

    let product = instrument(&state, "update_product", async {
        let product = state.services.catalog.update(id, patch).await?;
        match stock {
            Some(stock) if stock != product.stock => state.services.ledger.set_absolute(id, stock).await,
            _ => Ok(product),
        }
    })
    .await?;
    Ok(HttpResponse::Ok().json(product))
}

pub async fn delete(
    state: web::Data<AppState>,
    _admin: AdminIdentity,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    instrument(&state, "delete_product", state.services.catalog.delete(id)).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "id": id, "deleted": true })))
}
