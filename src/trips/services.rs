use time::{macros::format_description, Date};
use tracing::{debug, info};

use super::dto::{ItemInput, TripDetails, TripInput};
use crate::{
    error::{AppError, ValidationKind},
    state::AppState,
    store::{Item, ItemFields, Scope, Trip, TripFields},
};

/// Column widths in `migrations/0001_init.sql`, in characters.
pub(crate) const TITLE_MAX_CHARS: usize = 200;
pub(crate) const TIME_MAX_CHARS: usize = 20;

fn required_title(raw: &str) -> Result<String, AppError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(AppError::Validation(ValidationKind::TitleRequired));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(AppError::Validation(ValidationKind::TitleTooLong));
    }
    Ok(title.to_string())
}

fn optional_text(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn optional_time(raw: Option<String>) -> Result<Option<String>, AppError> {
    match optional_text(raw) {
        Some(t) if t.chars().count() > TIME_MAX_CHARS => {
            Err(AppError::Validation(ValidationKind::TimeTooLong))
        }
        time => Ok(time),
    }
}

pub(crate) fn parse_date(raw: Option<&str>) -> Result<Option<Date>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map(Some)
        .map_err(|_| AppError::Validation(ValidationKind::InvalidDate))
}

impl TryFrom<TripInput> for TripFields {
    type Error = AppError;

    fn try_from(input: TripInput) -> Result<Self, Self::Error> {
        Ok(Self {
            title: required_title(&input.title)?,
            start_date: parse_date(input.start_date.as_deref())?,
            end_date: parse_date(input.end_date.as_deref())?,
            description: optional_text(input.description),
        })
    }
}

impl TryFrom<ItemInput> for ItemFields {
    type Error = AppError;

    fn try_from(input: ItemInput) -> Result<Self, Self::Error> {
        Ok(Self {
            title: required_title(&input.title)?,
            date: parse_date(input.date.as_deref())?,
            time: optional_time(input.time)?,
            note: optional_text(input.note),
        })
    }
}

/// The trip if `user_id` owns it; missing and foreign look the same.
async fn owned_trip(state: &AppState, user_id: i64, trip_id: i64) -> Result<Trip, AppError> {
    state
        .store
        .get_trip(user_id, trip_id)
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn list_trips(state: &AppState, user_id: i64) -> Result<Vec<Trip>, AppError> {
    Ok(state.store.list_trips(user_id).await?)
}

pub async fn create_trip(
    state: &AppState,
    user_id: i64,
    input: TripInput,
) -> Result<Trip, AppError> {
    let fields = TripFields::try_from(input)?;
    let trip = state.store.append_trip(user_id, fields).await?;
    info!(user_id, trip_id = trip.id, sort_order = trip.sort_order, "trip created");
    Ok(trip)
}

pub async fn get_trip(
    state: &AppState,
    user_id: i64,
    trip_id: i64,
) -> Result<TripDetails, AppError> {
    let trip = owned_trip(state, user_id, trip_id).await?;
    let items = state.store.list_items(trip.id).await?;
    Ok(TripDetails { trip, items })
}

pub async fn update_trip(
    state: &AppState,
    user_id: i64,
    trip_id: i64,
    input: TripInput,
) -> Result<Trip, AppError> {
    let fields = TripFields::try_from(input)?;
    state
        .store
        .update_trip(user_id, trip_id, fields)
        .await?
        .ok_or(AppError::NotFound)
}

/// Removes the trip and its items. Remaining trips keep their order values.
pub async fn delete_trip(state: &AppState, user_id: i64, trip_id: i64) -> Result<(), AppError> {
    if !state.store.delete_trip(user_id, trip_id).await? {
        return Err(AppError::NotFound);
    }
    info!(user_id, trip_id, "trip deleted");
    Ok(())
}

pub async fn reorder_trips(
    state: &AppState,
    user_id: i64,
    ids: &[i64],
) -> Result<Vec<i64>, AppError> {
    let order = state.store.reorder(Scope::UserTrips(user_id), ids).await?;
    debug!(user_id, requested = ids.len(), total = order.len(), "trips reordered");
    Ok(order)
}

pub async fn create_item(
    state: &AppState,
    user_id: i64,
    trip_id: i64,
    input: ItemInput,
) -> Result<Item, AppError> {
    let trip = owned_trip(state, user_id, trip_id).await?;
    let fields = ItemFields::try_from(input)?;
    let item = state.store.append_item(trip.id, fields).await?;
    info!(trip_id, item_id = item.id, sort_order = item.sort_order, "item created");
    Ok(item)
}

pub async fn update_item(
    state: &AppState,
    user_id: i64,
    trip_id: i64,
    item_id: i64,
    input: ItemInput,
) -> Result<Item, AppError> {
    let trip = owned_trip(state, user_id, trip_id).await?;
    let fields = ItemFields::try_from(input)?;
    state
        .store
        .update_item(trip.id, item_id, fields)
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn delete_item(
    state: &AppState,
    user_id: i64,
    trip_id: i64,
    item_id: i64,
) -> Result<(), AppError> {
    let trip = owned_trip(state, user_id, trip_id).await?;
    if !state.store.delete_item(trip.id, item_id).await? {
        return Err(AppError::NotFound);
    }
    Ok(())
}

pub async fn reorder_items(
    state: &AppState,
    user_id: i64,
    trip_id: i64,
    ids: &[i64],
) -> Result<Vec<i64>, AppError> {
    let trip = owned_trip(state, user_id, trip_id).await?;
    let order = state.store.reorder(Scope::TripItems(trip.id), ids).await?;
    debug!(trip_id, requested = ids.len(), total = order.len(), "items reordered");
    Ok(order)
}
