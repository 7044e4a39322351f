use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{ItemInput, ReorderRequest, ReorderResponse, TripDetails, TripInput},
    services,
};
use crate::{
    auth::extractors::AuthUser,
    error::AppError,
    state::AppState,
    store::{Item, Trip},
};

pub fn trip_routes() -> Router<AppState> {
    Router::new()
        .route("/trips", get(list_trips).post(create_trip))
        .route("/trips/reorder", post(reorder_trips))
        .route(
            "/trips/:trip_id",
            get(get_trip).put(update_trip).delete(delete_trip),
        )
}

pub fn item_routes() -> Router<AppState> {
    Router::new()
        .route("/trips/:trip_id/items", post(create_item))
        .route("/trips/:trip_id/items/reorder", post(reorder_items))
        .route(
            "/trips/:trip_id/items/:item_id",
            put(update_item).delete(delete_item),
        )
}

#[instrument(skip(state, user), fields(user_id = user.id))]
pub async fn list_trips(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Trip>>, AppError> {
    Ok(Json(services::list_trips(&state, user.id).await?))
}

#[instrument(skip(state, user, body), fields(user_id = user.id))]
pub async fn create_trip(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<TripInput>,
) -> Result<impl IntoResponse, AppError> {
    let trip = services::create_trip(&state, user.id, body).await?;
    let location = format!("/api/v1/trips/{}", trip.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(trip)))
}

#[instrument(skip(state, user), fields(user_id = user.id))]
pub async fn get_trip(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(trip_id): Path<i64>,
) -> Result<Json<TripDetails>, AppError> {
    Ok(Json(services::get_trip(&state, user.id, trip_id).await?))
}

#[instrument(skip(state, user, body), fields(user_id = user.id))]
pub async fn update_trip(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(trip_id): Path<i64>,
    Json(body): Json<TripInput>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(
        services::update_trip(&state, user.id, trip_id, body).await?,
    ))
}

#[instrument(skip(state, user), fields(user_id = user.id))]
pub async fn delete_trip(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(trip_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    services::delete_trip(&state, user.id, trip_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, user, body), fields(user_id = user.id))]
pub async fn reorder_trips(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<ReorderRequest>,
) -> Result<Json<ReorderResponse>, AppError> {
    let ids = services::reorder_trips(&state, user.id, &body.ids).await?;
    Ok(Json(ReorderResponse { ok: true, ids }))
}

#[instrument(skip(state, user, body), fields(user_id = user.id))]
pub async fn create_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(trip_id): Path<i64>,
    Json(body): Json<ItemInput>,
) -> Result<(StatusCode, Json<Item>), AppError> {
    let item = services::create_item(&state, user.id, trip_id, body).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[instrument(skip(state, user, body), fields(user_id = user.id))]
pub async fn update_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((trip_id, item_id)): Path<(i64, i64)>,
    Json(body): Json<ItemInput>,
) -> Result<Json<Item>, AppError> {
    Ok(Json(
        services::update_item(&state, user.id, trip_id, item_id, body).await?,
    ))
}

#[instrument(skip(state, user), fields(user_id = user.id))]
pub async fn delete_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((trip_id, item_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    services::delete_item(&state, user.id, trip_id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, user, body), fields(user_id = user.id))]
pub async fn reorder_items(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(trip_id): Path<i64>,
    Json(body): Json<ReorderRequest>,
) -> Result<Json<ReorderResponse>, AppError> {
    let ids = services::reorder_items(&state, user.id, trip_id, &body.ids).await?;
    Ok(Json(ReorderResponse { ok: true, ids }))
}
