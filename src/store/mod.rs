mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use time::{Date, OffsetDateTime};

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub login_id: String,
    pub login_id_norm: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, never exposed
    pub email: Option<String>,
    pub email_verified: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Trip {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Item {
    pub id: i64,
    pub trip_id: i64,
    pub title: String,
    pub date: Option<Date>,
    pub time: Option<String>,
    pub note: Option<String>,
    pub sort_order: i32,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub login_id: String,
    pub login_id_norm: String,
    pub password_hash: String,
    pub email: String,
}

/// Editable trip fields; also used for creation.
#[derive(Debug, Clone, Default)]
pub struct TripFields {
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
}

/// Editable item fields; also used for creation.
#[derive(Debug, Clone, Default)]
pub struct ItemFields {
    pub title: String,
    pub date: Option<Date>,
    pub time: Option<String>,
    pub note: Option<String>,
}

/// Trip plus its items, inserted together with a new user.
#[derive(Debug, Clone)]
pub struct SeedTrip {
    pub trip: TripFields,
    pub items: Vec<ItemFields>,
}

/// Owning key of an ordered collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    UserTrips(i64),
    TripItems(i64),
}

impl Scope {
    pub fn table(&self) -> &'static str {
        match self {
            Scope::UserTrips(_) => "trips",
            Scope::TripItems(_) => "items",
        }
    }

    pub fn parent_column(&self) -> &'static str {
        match self {
            Scope::UserTrips(_) => "user_id",
            Scope::TripItems(_) => "trip_id",
        }
    }

    pub fn parent_id(&self) -> i64 {
        match self {
            Scope::UserTrips(id) | Scope::TripItems(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    LoginId,
    Email,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0:?}")]
    Conflict(UniqueField),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence collaborator. Every trip query is scoped by owner, every
/// item query by parent trip; callers check trip ownership before item calls.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user_by_login(&self, login_id_norm: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    async fn email_exists(&self, email: &str) -> StoreResult<bool>;

    /// Inserts the user and its seed trip in one transaction.
    async fn create_user_with_seed(&self, user: NewUser, seed: &SeedTrip) -> StoreResult<User>;

    async fn list_trips(&self, user_id: i64) -> StoreResult<Vec<Trip>>;
    async fn get_trip(&self, user_id: i64, trip_id: i64) -> StoreResult<Option<Trip>>;
    async fn append_trip(&self, user_id: i64, fields: TripFields) -> StoreResult<Trip>;
    async fn update_trip(
        &self,
        user_id: i64,
        trip_id: i64,
        fields: TripFields,
    ) -> StoreResult<Option<Trip>>;
    async fn delete_trip(&self, user_id: i64, trip_id: i64) -> StoreResult<bool>;

    async fn list_items(&self, trip_id: i64) -> StoreResult<Vec<Item>>;
    async fn append_item(&self, trip_id: i64, fields: ItemFields) -> StoreResult<Item>;
    async fn update_item(
        &self,
        trip_id: i64,
        item_id: i64,
        fields: ItemFields,
    ) -> StoreResult<Option<Item>>;
    async fn delete_item(&self, trip_id: i64, item_id: i64) -> StoreResult<bool>;

    /// Renumbers the scope in one transaction and returns the resulting id order.
    async fn reorder(&self, scope: Scope, ids: &[i64]) -> StoreResult<Vec<i64>>;
}
