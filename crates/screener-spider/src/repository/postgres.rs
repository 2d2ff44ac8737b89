use super::{sql, Repository};
use crate::error::PersistenceError;
use crate::fetcher::RawPage;
use crate::snapshot::{
    DataScope, FundamentalsSnapshot, LineItem, Period, Ratio, Sections, SnapshotMetadata,
};
use crate::ticker::Ticker;
use async_trait::async_trait;
use deadpool_postgres::{ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::collections::BTreeMap;
use tokio_postgres::{IsolationLevel, NoTls};
use tracing::{debug, error, trace};

/// PostgreSQL-backed repository (the `screener` schema of the findump database).
#[derive(Clone)]
pub struct PgRepository {
    pool: Pool,
}

impl PgRepository {
    /// Build a connection pool for `url`.
    pub fn connect(url: &str) -> Result<Self, PersistenceError> {
        trace!("creating postgres connection pool config");
        let mut pg_config = deadpool_postgres::Config::new();
        pg_config.url = Some(url.to_string());
        pg_config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = pg_config.create_pool(Some(Runtime::Tokio1), NoTls)?;
        debug!("findump connection pool established");
        Ok(Self { pool })
    }

    /// Create the `screener` schema and its tables, if missing.
    pub async fn migrate(&self) -> Result<(), PersistenceError> {
        let client = self.pool.get().await?;
        client.batch_execute(sql::CREATE_SCHEMA).await?;
        debug!("screener schema ready");
        Ok(())
    }

    async fn write(&self, snapshot: &FundamentalsSnapshot, page: &RawPage) -> Result<(), WriteError> {
        let time = std::time::Instant::now();
        let ticker = snapshot.ticker.as_str();

        let mut pg_client = self.pool.get().await?;
        let transaction = pg_client.transaction().await?;

        // another process replacing the same ticker waits here, not on the primary key
        transaction.execute(sql::LOCK_TICKER, &[&ticker]).await?;

        // the cascade clears every section of the old snapshot, and its page
        transaction.execute(sql::DELETE_SNAPSHOT, &[&ticker]).await?;
        transaction
            .execute(
                sql::INSERT_SNAPSHOT,
                &[
                    &ticker,
                    &snapshot.scope.as_str(),
                    &snapshot.source_version,
                    &snapshot.last_ingested_at,
                ],
            )
            .await?;

        let query = transaction.prepare_cached(sql::INSERT_RATIO).await?;
        for (metric, ratio) in &snapshot.sections.ratios {
            transaction
                .execute(&query, &[&ticker, metric, &ratio.raw, &ratio.value])
                .await?;
        }

        let query = transaction.prepare_cached(sql::INSERT_DERIVED).await?;
        for (metric, val) in &snapshot.derived {
            transaction.execute(&query, &[&ticker, metric, val]).await?;
        }

        let period_query = transaction.prepare_cached(sql::INSERT_PERIOD).await?;
        let item_query = transaction.prepare_cached(sql::INSERT_LINE_ITEM).await?;
        for (section, periods) in tables(&snapshot.sections) {
            for (period_idx, period) in periods.iter().enumerate() {
                let period_idx = period_idx as i16;
                transaction
                    .execute(&period_query, &[&ticker, &section, &period_idx, &period.label])
                    .await?;
                for (item_idx, item) in period.items.iter().enumerate() {
                    let item_idx = item_idx as i16;
                    transaction
                        .execute(
                            &item_query,
                            &[
                                &ticker,
                                &section,
                                &period_idx,
                                &item_idx,
                                &item.metric,
                                &item.value,
                            ],
                        )
                        .await?;
                }
            }
        }

        transaction
            .execute(
                sql::INSERT_RAW_PAGE,
                &[
                    &ticker,
                    &page.scope.as_str(),
                    &page.url,
                    &snapshot.source_version,
                    &page.html,
                ],
            )
            .await?;

        transaction.commit().await?;
        debug!(
            "snapshot committed for [{ticker}], {}",
            crate::time_elapsed(time)
        );

        Ok(())
    }
}

/// Sections stored as line items, with their `section` column value.
fn tables(sections: &Sections) -> [(&'static str, &Vec<Period>); 5] {
    [
        ("quarterly", &sections.quarterly),
        ("profit_loss", &sections.profit_loss),
        ("balance_sheet", &sections.balance_sheet),
        ("cash_flow", &sections.cash_flow),
        ("shareholding", &sections.shareholding),
    ]
}

fn section_mut<'a>(
    sections: &'a mut Sections,
    section: &str,
    ticker: &Ticker,
) -> Result<&'a mut Vec<Period>, PersistenceError> {
    match section {
        "quarterly" => Ok(&mut sections.quarterly),
        "profit_loss" => Ok(&mut sections.profit_loss),
        "balance_sheet" => Ok(&mut sections.balance_sheet),
        "cash_flow" => Ok(&mut sections.cash_flow),
        "shareholding" => Ok(&mut sections.shareholding),
        other => {
            error!("unexpected section `{other}` stored for [{ticker}]");
            Err(PersistenceError::ReadFailed(format!(
                "unknown section `{other}` for [{ticker}]"
            )))
        }
    }
}

/// Append a stored period; rows must arrive in `period_idx` order.
fn place_period(
    sections: &mut Sections,
    ticker: &Ticker,
    section: &str,
    period_idx: i16,
    label: String,
) -> Result<(), PersistenceError> {
    let periods = section_mut(sections, section, ticker)?;
    if period_idx as usize != periods.len() {
        return Err(PersistenceError::ReadFailed(format!(
            "gap in stored periods of `{section}` for [{ticker}]"
        )));
    }
    periods.push(Period {
        label,
        items: Vec::new(),
    });
    Ok(())
}

fn place_item(
    sections: &mut Sections,
    ticker: &Ticker,
    section: &str,
    period_idx: i16,
    item: LineItem,
) -> Result<(), PersistenceError> {
    let periods = section_mut(sections, section, ticker)?;
    let Some(period) = periods.get_mut(period_idx as usize) else {
        return Err(PersistenceError::ReadFailed(format!(
            "line item of missing period {period_idx} in `{section}` for [{ticker}]"
        )));
    };
    period.items.push(item);
    Ok(())
}

#[async_trait]
impl Repository for PgRepository {
    async fn get_metadata(
        &self,
        ticker: &Ticker,
    ) -> Result<Option<SnapshotMetadata>, PersistenceError> {
        let pg_client = self.pool.get().await?;
        let row = pg_client
            .query_opt(sql::GET_METADATA, &[&ticker.as_str()])
            .await?;

        Ok(row.map(|row| SnapshotMetadata {
            last_ingested_at: row.get(0),
            source_version: row.get(1),
        }))
    }

    async fn get_snapshot(
        &self,
        ticker: &Ticker,
    ) -> Result<Option<FundamentalsSnapshot>, PersistenceError> {
        let mut pg_client = self.pool.get().await?;

        // one consistent view across the five reads
        let transaction = pg_client
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .read_only(true)
            .start()
            .await?;

        let key = ticker.as_str();
        let Some(header) = transaction.query_opt(sql::GET_SNAPSHOT, &[&key]).await? else {
            return Ok(None);
        };
        let scope: String = header.get(0);
        let scope = DataScope::from_str_opt(&scope).ok_or_else(|| {
            PersistenceError::ReadFailed(format!("unknown scope `{scope}` for [{ticker}]"))
        })?;

        let ratios: BTreeMap<String, Ratio> = transaction
            .query(sql::GET_RATIOS, &[&key])
            .await?
            .into_iter()
            .map(|row| {
                (
                    row.get(0),
                    Ratio {
                        raw: row.get(1),
                        value: row.get(2),
                    },
                )
            })
            .collect();

        let derived: BTreeMap<String, f64> = transaction
            .query(sql::GET_DERIVED, &[&key])
            .await?
            .into_iter()
            .map(|row| (row.get(0), row.get(1)))
            .collect();

        let mut sections = Sections {
            ratios,
            ..Default::default()
        };
        for row in transaction.query(sql::GET_PERIODS, &[&key]).await? {
            let section: String = row.get(0);
            place_period(&mut sections, ticker, &section, row.get(1), row.get(2))?;
        }
        for row in transaction.query(sql::GET_LINE_ITEMS, &[&key]).await? {
            let section: String = row.get(0);
            let item = LineItem {
                metric: row.get(2),
                value: row.get(3),
            };
            place_item(&mut sections, ticker, &section, row.get(1), item)?;
        }

        transaction.commit().await?;

        Ok(Some(FundamentalsSnapshot {
            ticker: ticker.clone(),
            scope,
            sections,
            derived,
            last_ingested_at: header.get(2),
            source_version: header.get(1),
        }))
    }

    async fn get_raw_page(&self, ticker: &Ticker) -> Result<Option<RawPage>, PersistenceError> {
        let pg_client = self.pool.get().await?;
        let Some(row) = pg_client
            .query_opt(sql::GET_RAW_PAGE, &[&ticker.as_str()])
            .await?
        else {
            return Ok(None);
        };

        let scope: String = row.get(0);
        let scope = DataScope::from_str_opt(&scope).ok_or_else(|| {
            PersistenceError::ReadFailed(format!("unknown page scope `{scope}` for [{ticker}]"))
        })?;
        Ok(Some(RawPage {
            ticker: ticker.clone(),
            scope,
            url: row.get(1),
            html: row.get(2),
        }))
    }

    async fn put_snapshot(
        &self,
        snapshot: &FundamentalsSnapshot,
        page: &RawPage,
    ) -> Result<(), PersistenceError> {
        self.write(snapshot, page).await.map_err(|err| {
            error!(
                "failed to commit snapshot for [{}], error({err})",
                snapshot.ticker
            );
            PersistenceError::WriteFailed {
                ticker: snapshot.ticker.to_string(),
                reason: err.to_string(),
            }
        })
    }
}

// The write path folds both failure sources into `PersistenceError::WriteFailed`.
#[derive(Debug, thiserror::Error)]
enum WriteError {
    #[error(transparent)]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////
