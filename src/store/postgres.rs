use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use tracing::debug;

use super::{
    Item, ItemFields, NewUser, Scope, SeedTrip, Store, StoreError, StoreResult, Trip, TripFields,
    UniqueField, User,
};
use crate::ordering::plan_reorder;

const USER_COLUMNS: &str =
    "id, login_id, login_id_norm, password_hash, email, email_verified, created_at";
const TRIP_COLUMNS: &str = "id, user_id, title, description, start_date, end_date, sort_order";
const ITEM_COLUMNS: &str = "id, trip_id, title, date, time, note, sort_order";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps unique violations on the users table to [`StoreError::Conflict`].
fn map_unique(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            match db.constraint() {
                Some("users_login_id_norm_key") => {
                    return StoreError::Conflict(UniqueField::LoginId)
                }
                Some("users_email_key") => return StoreError::Conflict(UniqueField::Email),
                _ => {}
            }
        }
    }
    StoreError::Database(err)
}

/// Appends with `COALESCE(MAX(sort_order) + 1, 0)` evaluated in the same
/// statement as the insert; concurrent appends may tie.
async fn insert_trip(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    fields: &TripFields,
) -> StoreResult<Trip> {
    let sql = format!(
        r#"
        INSERT INTO trips (user_id, title, description, start_date, end_date, sort_order)
        SELECT $1, $2, $3, $4, $5, COALESCE(MAX(sort_order) + 1, 0)
          FROM trips
         WHERE user_id = $1
        RETURNING {TRIP_COLUMNS}
        "#
    );
    let trip = sqlx::query_as::<_, Trip>(&sql)
        .bind(user_id)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.start_date)
        .bind(fields.end_date)
        .fetch_one(&mut **tx)
        .await?;
    Ok(trip)
}

async fn insert_item(
    tx: &mut Transaction<'_, Postgres>,
    trip_id: i64,
    fields: &ItemFields,
) -> StoreResult<Item> {
    let sql = format!(
        r#"
        INSERT INTO items (trip_id, title, date, time, note, sort_order)
        SELECT $1, $2, $3, $4, $5, COALESCE(MAX(sort_order) + 1, 0)
          FROM items
         WHERE trip_id = $1
        RETURNING {ITEM_COLUMNS}
        "#
    );
    let item = sqlx::query_as::<_, Item>(&sql)
        .bind(trip_id)
        .bind(&fields.title)
        .bind(fields.date)
        .bind(&fields.time)
        .bind(&fields.note)
        .fetch_one(&mut **tx)
        .await?;
    Ok(item)
}

#[async_trait]
impl Store for PgStore {
    async fn find_user_by_login(&self, login_id_norm: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE login_id_norm = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(login_id_norm)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn email_exists(&self, email: &str) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn create_user_with_seed(&self, user: NewUser, seed: &SeedTrip) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO users (login_id, login_id_norm, password_hash, email, email_verified)
            VALUES ($1, $2, $3, $4, TRUE)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, User>(&sql)
            .bind(&user.login_id)
            .bind(&user.login_id_norm)
            .bind(&user.password_hash)
            .bind(&user.email)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_unique)?;

        let trip = insert_trip(&mut tx, row.id, &seed.trip).await?;
        for item in &seed.items {
            insert_item(&mut tx, trip.id, item).await?;
        }

        tx.commit().await.map_err(map_unique)?;
        debug!(user_id = row.id, trip_id = trip.id, "user created with seed trip");
        Ok(row)
    }

    async fn list_trips(&self, user_id: i64) -> StoreResult<Vec<Trip>> {
        let sql = format!(
            "SELECT {TRIP_COLUMNS} FROM trips WHERE user_id = $1 ORDER BY sort_order, id"
        );
        let rows = sqlx::query_as::<_, Trip>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_trip(&self, user_id: i64, trip_id: i64) -> StoreResult<Option<Trip>> {
        let sql = format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = $1 AND user_id = $2");
        let row = sqlx::query_as::<_, Trip>(&sql)
            .bind(trip_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn append_trip(&self, user_id: i64, fields: TripFields) -> StoreResult<Trip> {
        let mut tx = self.pool.begin().await?;
        let trip = insert_trip(&mut tx, user_id, &fields).await?;
        tx.commit().await?;
        Ok(trip)
    }

    async fn update_trip(
        &self,
        user_id: i64,
        trip_id: i64,
        fields: TripFields,
    ) -> StoreResult<Option<Trip>> {
        let sql = format!(
            r#"
            UPDATE trips
               SET title = $3, description = $4, start_date = $5, end_date = $6
             WHERE id = $1 AND user_id = $2
            RETURNING {TRIP_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Trip>(&sql)
            .bind(trip_id)
            .bind(user_id)
            .bind(&fields.title)
            .bind(&fields.description)
            .bind(fields.start_date)
            .bind(fields.end_date)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn delete_trip(&self, user_id: i64, trip_id: i64) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM trips WHERE id = $1 AND user_id = $2")
            .bind(trip_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_items(&self, trip_id: i64) -> StoreResult<Vec<Item>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE trip_id = $1 ORDER BY sort_order, id"
        );
        let rows = sqlx::query_as::<_, Item>(&sql)
            .bind(trip_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn append_item(&self, trip_id: i64, fields: ItemFields) -> StoreResult<Item> {
        let mut tx = self.pool.begin().await?;
        let item = insert_item(&mut tx, trip_id, &fields).await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn update_item(
        &self,
        trip_id: i64,
        item_id: i64,
        fields: ItemFields,
    ) -> StoreResult<Option<Item>> {
        let sql = format!(
            r#"
            UPDATE items
               SET title = $3, date = $4, time = $5, note = $6
             WHERE id = $1 AND trip_id = $2
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Item>(&sql)
            .bind(item_id)
            .bind(trip_id)
            .bind(&fields.title)
            .bind(fields.date)
            .bind(&fields.time)
            .bind(&fields.note)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn delete_item(&self, trip_id: i64, item_id: i64) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM items WHERE id = $1 AND trip_id = $2")
            .bind(item_id)
            .bind(trip_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn reorder(&self, scope: Scope, ids: &[i64]) -> StoreResult<Vec<i64>> {
        let table = scope.table();
        let parent = scope.parent_column();
        let mut tx = self.pool.begin().await?;

        let select = format!(
            "SELECT id, sort_order FROM {table} WHERE {parent} = $1 ORDER BY sort_order, id FOR UPDATE"
        );
        let members: Vec<(i64, i32)> = sqlx::query_as(&select)
            .bind(scope.parent_id())
            .fetch_all(&mut *tx)
            .await?;

        let plan = plan_reorder(&members, ids);
        if !plan.updates.is_empty() {
            let (update_ids, orders): (Vec<i64>, Vec<i32>) = plan.updates.iter().copied().unzip();
            let update = format!(
                r#"
                UPDATE {table} AS t
                   SET sort_order = v.sort_order
                  FROM UNNEST($1::BIGINT[], $2::INT[]) AS v(id, sort_order)
                 WHERE t.id = v.id AND t.{parent} = $3
                "#
            );
            sqlx::query(&update)
                .bind(&update_ids)
                .bind(&orders)
                .bind(scope.parent_id())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(
            table,
            parent_id = scope.parent_id(),
            updated = plan.updates.len(),
            ignored = plan.ignored,
            "scope reordered"
        );
        Ok(plan.order)
    }
}
