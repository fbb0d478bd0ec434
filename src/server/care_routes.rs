//! Baby and care-record endpoints. Every route needs an authenticated owner.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::care::{FeedingKind, NewAllergy, NewBaby, NewFeeding, NewGrowth, NewTooth, NewVaccine};
use crate::error::{AppError, AppResult};

use super::extract::{AuthUser, JsonBody};
use super::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/baby/create", post(create_baby))
        .route("/baby/list", get(list_babies))
        .route("/baby/{id}", get(get_baby).delete(delete_baby))
        .route("/baby/{id}/vaccines", post(add_vaccine))
        .route("/baby/{id}/vaccines/{entry_id}", delete(remove_vaccine))
        .route("/baby/{id}/allergies", post(add_allergy))
        .route("/baby/{id}/allergies/{entry_id}", delete(remove_allergy))
        .route("/baby/{id}/teeth", post(add_tooth))
        .route("/baby/{id}/teeth/{entry_id}", delete(remove_tooth))
        .route("/growth/add", post(add_growth))
        .route("/growth/{baby_id}", get(list_growth))
        .route("/growth/{baby_id}/{record_id}", delete(remove_growth))
        .route("/feeding/create", post(create_feeding))
        .route("/feeding/list", get(list_feedings))
        .route("/feeding/breast-milk/stats", get(breast_milk_stats))
        .route("/feeding/{baby_id}/{feeding_id}", delete(remove_feeding))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrowthBody {
    baby_id: String,
    #[serde(flatten)]
    record: NewGrowth,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedingBody {
    baby_id: String,
    #[serde(flatten)]
    feeding: NewFeeding,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedingQuery {
    #[serde(default)]
    baby_id: Option<String>,
    #[serde(default)]
    kind: Option<String>,
}

fn require_baby_id(id: Option<String>) -> AppResult<String> {
    id.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::user("missing_baby_id", "babyId query parameter is required"))
}

fn created(key: &str, value: impl serde::Serialize) -> AppResult<Response> {
    let mut body = json!({ "success": true });
    body[key] = serde_json::to_value(value)?;
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

fn removed(what: &str) -> Json<Value> {
    Json(json!({ "success": true, "message": format!("{} deleted successfully", what) }))
}

async fn create_baby(State(state): State<AppState>, AuthUser(user): AuthUser, JsonBody(body): JsonBody<NewBaby>) -> AppResult<Response> {
    let baby = state.care.create_baby(&user, body).await?;
    created("baby", baby)
}

async fn list_babies(State(state): State<AppState>, AuthUser(user): AuthUser) -> AppResult<Json<Value>> {
    let babies = state.care.list_babies(&user).await?;
    Ok(Json(json!({ "success": true, "babies": babies })))
}

async fn get_baby(State(state): State<AppState>, AuthUser(user): AuthUser, Path(id): Path<String>) -> AppResult<Json<Value>> {
    let baby = state.care.get_baby(&user, &id).await?;
    Ok(Json(json!({ "success": true, "baby": baby })))
}

async fn delete_baby(State(state): State<AppState>, AuthUser(user): AuthUser, Path(id): Path<String>) -> AppResult<Json<Value>> {
    state.care.delete_baby(&user, &id).await?;
    Ok(removed("Baby"))
}

async fn add_vaccine(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<NewVaccine>,
) -> AppResult<Response> {
    created("vaccine", state.care.add_vaccine(&user, &id, body).await?)
}

async fn remove_vaccine(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, entry_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    state.care.remove_vaccine(&user, &id, &entry_id).await?;
    Ok(removed("Vaccine"))
}

async fn add_allergy(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<NewAllergy>,
) -> AppResult<Response> {
    created("allergy", state.care.add_allergy(&user, &id, body).await?)
}

async fn remove_allergy(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, entry_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    state.care.remove_allergy(&user, &id, &entry_id).await?;
    Ok(removed("Allergy"))
}

async fn add_tooth(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<NewTooth>,
) -> AppResult<Response> {
    created("tooth", state.care.add_tooth(&user, &id, body).await?)
}

async fn remove_tooth(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, entry_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    state.care.remove_tooth(&user, &id, &entry_id).await?;
    Ok(removed("Tooth"))
}

async fn add_growth(State(state): State<AppState>, AuthUser(user): AuthUser, JsonBody(body): JsonBody<GrowthBody>) -> AppResult<Response> {
    let record = state.care.add_growth(&user, &body.baby_id, body.record).await?;
    created("growth", record)
}

async fn list_growth(State(state): State<AppState>, AuthUser(user): AuthUser, Path(baby_id): Path<String>) -> AppResult<Json<Value>> {
    let records = state.care.list_growth(&user, &baby_id).await?;
    Ok(Json(json!({ "success": true, "growth": records })))
}

async fn remove_growth(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((baby_id, record_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    state.care.remove_growth(&user, &baby_id, &record_id).await?;
    Ok(removed("Growth record"))
}

async fn create_feeding(State(state): State<AppState>, AuthUser(user): AuthUser, JsonBody(body): JsonBody<FeedingBody>) -> AppResult<Response> {
    let event = state.care.add_feeding(&user, &body.baby_id, body.feeding).await?;
    created("feeding", event)
}

async fn list_feedings(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(q): Query<FeedingQuery>,
) -> AppResult<Json<Value>> {
    let baby_id = require_baby_id(q.baby_id)?;
    let kind = match q.kind.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        Some(k) => Some(k.parse::<FeedingKind>()?),
        None => None,
    };
    let feedings = state.care.list_feedings(&user, &baby_id, kind).await?;
    Ok(Json(json!({ "success": true, "feedings": feedings })))
}

async fn remove_feeding(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((baby_id, feeding_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    state.care.remove_feeding(&user, &baby_id, &feeding_id).await?;
    Ok(removed("Feeding"))
}

async fn breast_milk_stats(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(q): Query<FeedingQuery>,
) -> AppResult<Json<Value>> {
    let baby_id = require_baby_id(q.baby_id)?;
    let stats = state.care.breast_milk_stats(&user, &baby_id).await?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}
