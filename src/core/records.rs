//! Read access the validators depend on.
//!
//! The validators never talk to the database directly; they read through
//! [`ChronologySource`] and [`SettlementSource`]. [`DbRecords`] implements both over
//! any `SeaORM` connection or transaction, so a write operation can run its
//! read-validate-write sequence inside one database transaction.

use crate::{
    core::validation::{RecordKind, RecordRef},
    entities::{
        MeterReading, TokenPurchase, UserContribution, meter_reading, token_purchase,
        user_contribution,
    },
    errors::Result,
};
use sea_orm::{PaginatorTrait, QueryOrder, prelude::*, sea_query::Query};
use serde::Serialize;
use tracing::debug;

/// A dated meter reading taken from either a purchase or an independent reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChronologyRecord {
    /// Where the reading came from
    pub record: RecordRef,
    /// When the reading was taken
    pub date: DateTimeUtc,
    /// Cumulative meter value
    pub reading: f64,
    /// Tokens bought with this record; only purchases carry tokens
    pub total_tokens: Option<f64>,
}

impl From<&token_purchase::Model> for ChronologyRecord {
    fn from(purchase: &token_purchase::Model) -> Self {
        Self {
            record: RecordRef::purchase(purchase.id),
            date: purchase.purchase_date,
            reading: purchase.meter_reading,
            total_tokens: Some(purchase.total_tokens),
        }
    }
}

impl From<&meter_reading::Model> for ChronologyRecord {
    fn from(reading: &meter_reading::Model) -> Self {
        Self {
            record: RecordRef::meter_reading(reading.id),
            date: reading.reading_date,
            reading: reading.reading,
            total_tokens: None,
        }
    }
}

/// Looks up the records surrounding a date.
#[allow(async_fn_in_trait)]
pub trait ChronologySource {
    /// Latest record dated strictly before `date`, skipping `exclude`.
    async fn nearest_before(
        &self,
        date: DateTimeUtc,
        exclude: Option<RecordRef>,
    ) -> Result<Option<ChronologyRecord>>;

    /// Earliest record dated strictly after `date`, skipping `exclude`.
    async fn nearest_after(
        &self,
        date: DateTimeUtc,
        exclude: Option<RecordRef>,
    ) -> Result<Option<ChronologyRecord>>;

    /// Latest purchase dated strictly before `date`, skipping `exclude`.
    async fn previous_purchase(
        &self,
        date: DateTimeUtc,
        exclude: Option<RecordRef>,
    ) -> Result<Option<ChronologyRecord>>;

    /// Earliest purchase dated strictly after `date`, skipping `exclude`.
    async fn next_purchase(
        &self,
        date: DateTimeUtc,
        exclude: Option<RecordRef>,
    ) -> Result<Option<ChronologyRecord>>;
}

/// Looks up which purchases still lack a contribution.
#[allow(async_fn_in_trait)]
pub trait SettlementSource {
    /// Oldest purchase without a contribution, optionally only those dated strictly before `before`.
    async fn oldest_unsettled_before(
        &self,
        before: Option<DateTimeUtc>,
    ) -> Result<Option<token_purchase::Model>>;

    /// Whether the purchase already has its contribution.
    async fn is_settled(&self, purchase_id: i64) -> Result<bool>;
}

/// `SeaORM` implementation of the record sources.
#[derive(Debug, Clone, Copy)]
pub struct DbRecords<'a, C> {
    db: &'a C,
}

impl<'a, C> DbRecords<'a, C>
where
    C: ConnectionTrait,
{
    /// Wraps a connection or an open transaction.
    #[must_use]
    pub const fn new(db: &'a C) -> Self {
        Self { db }
    }
}

fn excluded_id(exclude: Option<RecordRef>, kind: RecordKind) -> Option<i64> {
    exclude.filter(|r| r.kind == kind).map(|r| r.id)
}

/// Later date wins; on the same date the higher reading wins.
fn latest(records: [Option<ChronologyRecord>; 2]) -> Option<ChronologyRecord> {
    records
        .into_iter()
        .flatten()
        .max_by(|a, b| a.date.cmp(&b.date).then(a.reading.total_cmp(&b.reading)))
}

/// Earlier date wins; on the same date the lower reading wins.
fn earliest(records: [Option<ChronologyRecord>; 2]) -> Option<ChronologyRecord> {
    records
        .into_iter()
        .flatten()
        .min_by(|a, b| a.date.cmp(&b.date).then(a.reading.total_cmp(&b.reading)))
}

impl<C> DbRecords<'_, C>
where
    C: ConnectionTrait,
{
    async fn purchase_before(
        &self,
        date: DateTimeUtc,
        exclude: Option<RecordRef>,
    ) -> Result<Option<token_purchase::Model>> {
        let mut query = TokenPurchase::find().filter(token_purchase::Column::PurchaseDate.lt(date));
        if let Some(id) = excluded_id(exclude, RecordKind::Purchase) {
            query = query.filter(token_purchase::Column::Id.ne(id));
        }
        query
            .order_by_desc(token_purchase::Column::PurchaseDate)
            .order_by_desc(token_purchase::Column::MeterReading)
            .one(self.db)
            .await
            .map_err(Into::into)
    }

    async fn purchase_after(
        &self,
        date: DateTimeUtc,
        exclude: Option<RecordRef>,
    ) -> Result<Option<token_purchase::Model>> {
        let mut query = TokenPurchase::find().filter(token_purchase::Column::PurchaseDate.gt(date));
        if let Some(id) = excluded_id(exclude, RecordKind::Purchase) {
            query = query.filter(token_purchase::Column::Id.ne(id));
        }
        query
            .order_by_asc(token_purchase::Column::PurchaseDate)
            .order_by_asc(token_purchase::Column::MeterReading)
            .one(self.db)
            .await
            .map_err(Into::into)
    }

    async fn reading_before(
        &self,
        date: DateTimeUtc,
        exclude: Option<RecordRef>,
    ) -> Result<Option<meter_reading::Model>> {
        let mut query = MeterReading::find().filter(meter_reading::Column::ReadingDate.lt(date));
        if let Some(id) = excluded_id(exclude, RecordKind::MeterReading) {
            query = query.filter(meter_reading::Column::Id.ne(id));
        }
        query
            .order_by_desc(meter_reading::Column::ReadingDate)
            .order_by_desc(meter_reading::Column::Reading)
            .one(self.db)
            .await
            .map_err(Into::into)
    }

    async fn reading_after(
        &self,
        date: DateTimeUtc,
        exclude: Option<RecordRef>,
    ) -> Result<Option<meter_reading::Model>> {
        let mut query = MeterReading::find().filter(meter_reading::Column::ReadingDate.gt(date));
        if let Some(id) = excluded_id(exclude, RecordKind::MeterReading) {
            query = query.filter(meter_reading::Column::Id.ne(id));
        }
        query
            .order_by_asc(meter_reading::Column::ReadingDate)
            .order_by_asc(meter_reading::Column::Reading)
            .one(self.db)
            .await
            .map_err(Into::into)
    }
}

impl<C> ChronologySource for DbRecords<'_, C>
where
    C: ConnectionTrait,
{
    async fn nearest_before(
        &self,
        date: DateTimeUtc,
        exclude: Option<RecordRef>,
    ) -> Result<Option<ChronologyRecord>> {
        let purchase = self.purchase_before(date, exclude).await?;
        let reading = self.reading_before(date, exclude).await?;

        let prior = latest([
            purchase.as_ref().map(ChronologyRecord::from),
            reading.as_ref().map(ChronologyRecord::from),
        ]);
        debug!("Nearest record before {date}: {prior:?}");
        Ok(prior)
    }

    async fn nearest_after(
        &self,
        date: DateTimeUtc,
        exclude: Option<RecordRef>,
    ) -> Result<Option<ChronologyRecord>> {
        let purchase = self.purchase_after(date, exclude).await?;
        let reading = self.reading_after(date, exclude).await?;

        let next = earliest([
            purchase.as_ref().map(ChronologyRecord::from),
            reading.as_ref().map(ChronologyRecord::from),
        ]);
        debug!("Nearest record after {date}: {next:?}");
        Ok(next)
    }

    async fn previous_purchase(
        &self,
        date: DateTimeUtc,
        exclude: Option<RecordRef>,
    ) -> Result<Option<ChronologyRecord>> {
        let purchase = self.purchase_before(date, exclude).await?;
        Ok(purchase.as_ref().map(ChronologyRecord::from))
    }

    async fn next_purchase(
        &self,
        date: DateTimeUtc,
        exclude: Option<RecordRef>,
    ) -> Result<Option<ChronologyRecord>> {
        let purchase = self.purchase_after(date, exclude).await?;
        Ok(purchase.as_ref().map(ChronologyRecord::from))
    }
}

impl<C> SettlementSource for DbRecords<'_, C>
where
    C: ConnectionTrait,
{
    async fn oldest_unsettled_before(
        &self,
        before: Option<DateTimeUtc>,
    ) -> Result<Option<token_purchase::Model>> {
        let settled = Query::select()
            .column(user_contribution::Column::PurchaseId)
            .from(UserContribution)
            .to_owned();

        let mut query =
            TokenPurchase::find().filter(token_purchase::Column::Id.not_in_subquery(settled));
        if let Some(date) = before {
            query = query.filter(token_purchase::Column::PurchaseDate.lt(date));
        }

        query
            .order_by_asc(token_purchase::Column::PurchaseDate)
            .order_by_asc(token_purchase::Column::Id)
            .one(self.db)
            .await
            .map_err(Into::into)
    }

    async fn is_settled(&self, purchase_id: i64) -> Result<bool> {
        let count = UserContribution::find()
            .filter(user_contribution::Column::PurchaseId.eq(purchase_id))
            .count(self.db)
            .await?;
        Ok(count > 0)
    }
}
