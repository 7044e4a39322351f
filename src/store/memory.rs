use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::{
    Item, ItemFields, NewUser, Scope, SeedTrip, Store, StoreError, StoreResult, Trip, TripFields,
    UniqueField, User,
};
use crate::ordering::{next_sort_order, plan_reorder, sort_by_position};

/// In-process store with the same contract as [`super::PgStore`].
/// Each call holds the lock for its whole duration, which makes every
/// multi-row write atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
    unavailable: AtomicBool,
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    trips: BTreeMap<i64, Trip>,
    items: BTreeMap<i64, Item>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn max_order(&self, scope: Scope) -> Option<i32> {
        match scope {
            Scope::UserTrips(user_id) => self
                .trips
                .values()
                .filter(|t| t.user_id == user_id)
                .map(|t| t.sort_order)
                .max(),
            Scope::TripItems(trip_id) => self
                .items
                .values()
                .filter(|i| i.trip_id == trip_id)
                .map(|i| i.sort_order)
                .max(),
        }
    }

    fn append_trip(&mut self, user_id: i64, fields: TripFields) -> Trip {
        let trip = Trip {
            id: self.next_id(),
            user_id,
            title: fields.title,
            description: fields.description,
            start_date: fields.start_date,
            end_date: fields.end_date,
            sort_order: next_sort_order(self.max_order(Scope::UserTrips(user_id))),
        };
        self.trips.insert(trip.id, trip.clone());
        trip
    }

    fn append_item(&mut self, trip_id: i64, fields: ItemFields) -> Item {
        let item = Item {
            id: self.next_id(),
            trip_id,
            title: fields.title,
            date: fields.date,
            time: fields.time,
            note: fields.note,
            sort_order: next_sort_order(self.max_order(Scope::TripItems(trip_id))),
        };
        self.items.insert(item.id, item.clone());
        item
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail as if the backing store were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    async fn tables(&self) -> StoreResult<tokio::sync::MutexGuard<'_, Tables>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(self.inner.lock().await)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user_by_login(&self, login_id_norm: &str) -> StoreResult<Option<User>> {
        let t = self.tables().await?;
        Ok(t.users
            .values()
            .find(|u| u.login_id_norm == login_id_norm)
            .cloned())
    }

    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let t = self.tables().await?;
        Ok(t.users.get(&id).cloned())
    }

    async fn email_exists(&self, email: &str) -> StoreResult<bool> {
        let t = self.tables().await?;
        Ok(t.users.values().any(|u| u.email.as_deref() == Some(email)))
    }

    async fn create_user_with_seed(&self, user: NewUser, seed: &SeedTrip) -> StoreResult<User> {
        let mut t = self.tables().await?;
        if t.users.values().any(|u| u.login_id_norm == user.login_id_norm) {
            return Err(StoreError::Conflict(UniqueField::LoginId));
        }
        if t.users
            .values()
            .any(|u| u.email.as_deref() == Some(user.email.as_str()))
        {
            return Err(StoreError::Conflict(UniqueField::Email));
        }

        let row = User {
            id: t.next_id(),
            login_id: user.login_id,
            login_id_norm: user.login_id_norm,
            password_hash: user.password_hash,
            email: Some(user.email),
            email_verified: true,
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.insert(row.id, row.clone());

        let trip = t.append_trip(row.id, seed.trip.clone());
        for item in &seed.items {
            t.append_item(trip.id, item.clone());
        }
        Ok(row)
    }

    async fn list_trips(&self, user_id: i64) -> StoreResult<Vec<Trip>> {
        let t = self.tables().await?;
        let mut trips: Vec<Trip> = t
            .trips
            .values()
            .filter(|trip| trip.user_id == user_id)
            .cloned()
            .collect();
        sort_by_position(&mut trips, |trip| (trip.id, trip.sort_order));
        Ok(trips)
    }

    async fn get_trip(&self, user_id: i64, trip_id: i64) -> StoreResult<Option<Trip>> {
        let t = self.tables().await?;
        Ok(t.trips
            .get(&trip_id)
            .filter(|trip| trip.user_id == user_id)
            .cloned())
    }

    async fn append_trip(&self, user_id: i64, fields: TripFields) -> StoreResult<Trip> {
        let mut t = self.tables().await?;
        Ok(t.append_trip(user_id, fields))
    }

    async fn update_trip(
        &self,
        user_id: i64,
        trip_id: i64,
        fields: TripFields,
    ) -> StoreResult<Option<Trip>> {
        let mut t = self.tables().await?;
        let Some(trip) = t
            .trips
            .get_mut(&trip_id)
            .filter(|trip| trip.user_id == user_id)
        else {
            return Ok(None);
        };
        trip.title = fields.title;
        trip.description = fields.description;
        trip.start_date = fields.start_date;
        trip.end_date = fields.end_date;
        Ok(Some(trip.clone()))
    }

    async fn delete_trip(&self, user_id: i64, trip_id: i64) -> StoreResult<bool> {
        let mut t = self.tables().await?;
        let owned = t
            .trips
            .get(&trip_id)
            .is_some_and(|trip| trip.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        t.trips.remove(&trip_id);
        t.items.retain(|_, item| item.trip_id != trip_id);
        Ok(true)
    }

    async fn list_items(&self, trip_id: i64) -> StoreResult<Vec<Item>> {
        let t = self.tables().await?;
        let mut items: Vec<Item> = t
            .items
            .values()
            .filter(|item| item.trip_id == trip_id)
            .cloned()
            .collect();
        sort_by_position(&mut items, |item| (item.id, item.sort_order));
        Ok(items)
    }

    async fn append_item(&self, trip_id: i64, fields: ItemFields) -> StoreResult<Item> {
        let mut t = self.tables().await?;
        Ok(t.append_item(trip_id, fields))
    }

    async fn update_item(
        &self,
        trip_id: i64,
        item_id: i64,
        fields: ItemFields,
    ) -> StoreResult<Option<Item>> {
        let mut t = self.tables().await?;
        let Some(item) = t
            .items
            .get_mut(&item_id)
            .filter(|item| item.trip_id == trip_id)
        else {
            return Ok(None);
        };
        item.title = fields.title;
        item.date = fields.date;
        item.time = fields.time;
        item.note = fields.note;
        Ok(Some(item.clone()))
    }

    async fn delete_item(&self, trip_id: i64, item_id: i64) -> StoreResult<bool> {
        let mut t = self.tables().await?;
        let owned = t
            .items
            .get(&item_id)
            .is_some_and(|item| item.trip_id == trip_id);
        if owned {
            t.items.remove(&item_id);
        }
        Ok(owned)
    }

    async fn reorder(&self, scope: Scope, ids: &[i64]) -> StoreResult<Vec<i64>> {
        let mut t = self.tables().await?;
        let members: Vec<(i64, i32)> = match scope {
            Scope::UserTrips(user_id) => t
                .trips
                .values()
                .filter(|trip| trip.user_id == user_id)
                .map(|trip| (trip.id, trip.sort_order))
                .collect(),
            Scope::TripItems(trip_id) => t
                .items
                .values()
                .filter(|item| item.trip_id == trip_id)
                .map(|item| (item.id, item.sort_order))
                .collect(),
        };

        let plan = plan_reorder(&members, ids);
        for (id, sort_order) in &plan.updates {
            match scope {
                Scope::UserTrips(_) => {
                    if let Some(trip) = t.trips.get_mut(id) {
                        trip.sort_order = *sort_order;
                    }
                }
                Scope::TripItems(_) => {
                    if let Some(item) = t.items.get_mut(id) {
                        item.sort_order = *sort_order;
                    }
                }
            }
        }
        Ok(plan.order)
    }
}
