use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use super::{instrument, read, ApiError, AppState, Identity};
use crate::domain::configuration::SlotMap;

#[derive(Debug, Deserialize)]
pub struct BuildBody {
    name: String,
    #[serde(default, alias = "slots")]
    components: SlotMap,
}

/// Slots are replaced wholesale, so they are required here.
#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    name: Option<String>,
    #[serde(alias = "slots")]
    components: SlotMap,
}

pub async fn build(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<BuildBody>,
) -> Result<HttpResponse, ApiError> {
    let BuildBody { name, components } = body.into_inner();
    let configuration = instrument(
        &state,
        "build_configuration",
        state.services.configurations.build(identity.0.user_id, &name, components),
    )
    .await?;
    Ok(HttpResponse::Created().json(configuration))
}

pub async fn get(state: web::Data<AppState>, identity: Identity, path: web::Path<Uuid>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let configuration = read(&state, "get_configuration", || state.services.configurations.get(id)).await?;
    identity.require_access(configuration.user_id)?;
    Ok(HttpResponse::Ok().json(configuration))
}

pub async fn update(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<UpdateBody>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let UpdateBody { name, components } = body.into_inner();

    let existing = read(&state, "find_configuration", || state.services.configurations.find(id)).await?;
    identity.require_access(existing.user_id)?;

    let configuration = instrument(
        &state,
        "update_configuration",
        state.services.configurations.update(id, name.as_deref(), components),
    )
    .await?;
    Ok(HttpResponse::Ok().json(configuration))
}

pub async fn delete(state: web::Data<AppState>, identity: Identity, path: web::Path<Uuid>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();

    let existing = read(&state, "find_configuration", || state.services.configurations.find(id)).await?;
    identity.require_access(existing.user_id)?;

    instrument(&state, "delete_configuration", state.services.configurations.delete(id)).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "id": id, "deleted": true })))
}

pub async fn list_by_user(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    identity.require_access(user_id)?;

    let configurations = read(&state, "list_configurations", || {
        state.services.configurations.list_by_user(user_id)
    })
    .await?;
    Ok(HttpResponse::Ok().json(configurations))
}
