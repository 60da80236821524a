use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::models::{LunchOffer, LunchOfferRow, NewLunchOffer, ProviderId};
use crate::utils::error::Result;

const SELECT_OFFERS: &str =
    "SELECT id, name, day, price_amount, price_currency, provider FROM lunch_offers";

/// Storage of lunch offers. Every operation is atomic on its own.
#[async_trait]
pub trait LunchOfferRepository: Send + Sync {
    async fn find_all(&self) -> Result<Vec<LunchOffer>>;

    async fn find_by_day(&self, day: NaiveDate) -> Result<Vec<LunchOffer>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<LunchOffer>>;

    /// Offers of `provider` dated on or after `day`.
    async fn find_all_by_provider_from(&self, day: NaiveDate, provider: &ProviderId) -> Result<Vec<LunchOffer>>;

    /// Deletes every offer dated strictly before `day`.
    async fn delete_before(&self, day: NaiveDate) -> Result<u64>;

    /// Deletes every offer of `provider` dated on or after `day`.
    async fn delete_from(&self, day: NaiveDate, provider: &ProviderId) -> Result<u64>;

    /// Inserts all offers, assigning ids.
    async fn save_all(&self, offers: Vec<NewLunchOffer>) -> Result<Vec<LunchOffer>>;

    /// `delete_from` followed by `save_all` as one unit: readers see either the old or the
    /// new offers of the window, never a mix and never neither.
    async fn replace_from(
        &self,
        day: NaiveDate,
        provider: &ProviderId,
        offers: Vec<NewLunchOffer>,
    ) -> Result<Replacement>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub deleted: u64,
    pub inserted: Vec<LunchOffer>,
}

#[derive(Clone)]
pub struct SqliteOfferRepository {
    pool: SqlitePool,
}

impl SqliteOfferRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let filename = options.clone().get_filename();
        if let Some(parent) = filename.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout))
            .connect_with(options)
            .await?;

        let repo = Self::new(pool);
        repo.migrate().await?;
        Ok(repo)
    }

    /// A private in-memory database on a single connection that is never recycled.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self::new(pool);
        repo.migrate().await?;
        Ok(repo)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn into_offers(rows: Vec<LunchOfferRow>) -> Result<Vec<LunchOffer>> {
        rows.into_iter().map(LunchOffer::try_from).collect()
    }

    async fn insert_all(tx: &mut Transaction<'_, Sqlite>, offers: Vec<NewLunchOffer>) -> Result<Vec<LunchOffer>> {
        let mut saved = Vec::with_capacity(offers.len());

        for offer in offers {
            let result = sqlx::query(
                "INSERT INTO lunch_offers (name, day, price_amount, price_currency, provider) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&offer.name)
            .bind(offer.day)
            .bind(offer.price.amount.to_string())
            .bind(&offer.price.currency)
            .bind(&offer.provider)
            .execute(&mut **tx)
            .await?;

            saved.push(offer.with_id(result.last_insert_rowid()));
        }

        Ok(saved)
    }

    async fn delete_from_in(tx: &mut Transaction<'_, Sqlite>, day: NaiveDate, provider: &ProviderId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM lunch_offers WHERE provider = ? AND day >= ?")
            .bind(provider)
            .bind(day)
            .execute(&mut **tx)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LunchOfferRepository for SqliteOfferRepository {
    async fn find_all(&self) -> Result<Vec<LunchOffer>> {
        let sql = format!("{} ORDER BY day, provider, id", SELECT_OFFERS);
        let rows: Vec<LunchOfferRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Self::into_offers(rows)
    }

    async fn find_by_day(&self, day: NaiveDate) -> Result<Vec<LunchOffer>> {
        let sql = format!("{} WHERE day = ? ORDER BY provider, id", SELECT_OFFERS);
        let rows: Vec<LunchOfferRow> = sqlx::query_as(&sql).bind(day).fetch_all(&self.pool).await?;
        Self::into_offers(rows)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<LunchOffer>> {
        let sql = format!("{} WHERE id = ?", SELECT_OFFERS);
        let row: Option<LunchOfferRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(LunchOffer::try_from).transpose()
    }

    async fn find_all_by_provider_from(&self, day: NaiveDate, provider: &ProviderId) -> Result<Vec<LunchOffer>> {
        let sql = format!("{} WHERE provider = ? AND day >= ? ORDER BY day, id", SELECT_OFFERS);
        let rows: Vec<LunchOfferRow> = sqlx::query_as(&sql)
            .bind(provider)
            .bind(day)
            .fetch_all(&self.pool)
            .await?;
        Self::into_offers(rows)
    }

    async fn delete_before(&self, day: NaiveDate) -> Result<u64> {
        let result = sqlx::query("DELETE FROM lunch_offers WHERE day < ?")
            .bind(day)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_from(&self, day: NaiveDate, provider: &ProviderId) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let deleted = Self::delete_from_in(&mut tx, day, provider).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    async fn save_all(&self, offers: Vec<NewLunchOffer>) -> Result<Vec<LunchOffer>> {
        let mut tx = self.pool.begin().await?;
        let saved = Self::insert_all(&mut tx, offers).await?;
        tx.commit().await?;
        Ok(saved)
    }

    async fn replace_from(
        &self,
        day: NaiveDate,
        provider: &ProviderId,
        offers: Vec<NewLunchOffer>,
    ) -> Result<Replacement> {
        // dropping the transaction on error rolls it back
        let mut tx = self.pool.begin().await?;
        let deleted = Self::delete_from_in(&mut tx, day, provider).await?;
        let inserted = Self::insert_all(&mut tx, offers).await?;
        tx.commit().await?;

        debug!(%provider, from = %day, deleted, inserted = inserted.len(), "replaced offers");
        Ok(Replacement { deleted, inserted })
    }
}
