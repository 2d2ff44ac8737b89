//////////////////////////////////////////////////////////////////
// schema
//////////////////////////////////////////////////////////////////

/// `screener.snapshots` holds one row per ticker: the snapshot header. Every other table hangs
/// off it with `ON DELETE CASCADE`, so replacing a snapshot is a delete + insert in one
/// TRANSACTION.
pub(crate) static CREATE_SCHEMA: &str = "
    CREATE SCHEMA IF NOT EXISTS screener;

    CREATE TABLE IF NOT EXISTS screener.snapshots (
        ticker            VARCHAR(32) PRIMARY KEY,
        scope             VARCHAR(16) NOT NULL,
        source_version    CHAR(64) NOT NULL,
        last_ingested_at  TIMESTAMPTZ NOT NULL
    );

    CREATE TABLE IF NOT EXISTS screener.ratios (
        ticker     VARCHAR(32) NOT NULL REFERENCES screener.snapshots (ticker) ON DELETE CASCADE,
        metric     VARCHAR NOT NULL,
        raw_value  VARCHAR NOT NULL,
        val        DOUBLE PRECISION,
        PRIMARY KEY (ticker, metric)
    );

    CREATE TABLE IF NOT EXISTS screener.derived (
        ticker  VARCHAR(32) NOT NULL REFERENCES screener.snapshots (ticker) ON DELETE CASCADE,
        metric  VARCHAR NOT NULL,
        val     DOUBLE PRECISION NOT NULL,
        PRIMARY KEY (ticker, metric)
    );

    CREATE TABLE IF NOT EXISTS screener.periods (
        ticker      VARCHAR(32) NOT NULL REFERENCES screener.snapshots (ticker) ON DELETE CASCADE,
        section     VARCHAR(16) NOT NULL,
        period_idx  SMALLINT NOT NULL,
        period      VARCHAR NOT NULL,
        PRIMARY KEY (ticker, section, period_idx)
    );

    CREATE TABLE IF NOT EXISTS screener.line_items (
        ticker      VARCHAR(32) NOT NULL,
        section     VARCHAR(16) NOT NULL,
        period_idx  SMALLINT NOT NULL,
        item_idx    SMALLINT NOT NULL,
        metric      VARCHAR NOT NULL,
        val         DOUBLE PRECISION,
        PRIMARY KEY (ticker, section, period_idx, item_idx),
        FOREIGN KEY (ticker, section, period_idx)
            REFERENCES screener.periods (ticker, section, period_idx) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS screener.raw_pages (
        ticker          VARCHAR(32) PRIMARY KEY REFERENCES screener.snapshots (ticker) ON DELETE CASCADE,
        scope           VARCHAR(16) NOT NULL,
        url             VARCHAR NOT NULL,
        source_version  CHAR(64) NOT NULL,
        html            TEXT NOT NULL
    );
";

//////////////////////////////////////////////////////////////////
// writes
//////////////////////////////////////////////////////////////////

/// Serialises writers of one ticker across processes until the transaction ends.
pub(crate) static LOCK_TICKER: &str = "
    SELECT pg_advisory_xact_lock(hashtext($1))
";

pub(crate) static DELETE_SNAPSHOT: &str = "
    DELETE FROM screener.snapshots WHERE ticker = $1
";

pub(crate) static INSERT_SNAPSHOT: &str = "
    INSERT INTO screener.snapshots (ticker, scope, source_version, last_ingested_at)
    VALUES ($1, $2, $3, $4)
";

pub(crate) static INSERT_RATIO: &str = "
    INSERT INTO screener.ratios (ticker, metric, raw_value, val)
    VALUES ($1, $2, $3, $4)
";

pub(crate) static INSERT_DERIVED: &str = "
    INSERT INTO screener.derived (ticker, metric, val)
    VALUES ($1, $2, $3)
";

/// Periods and line items keep their position (`period_idx`, `item_idx`) so sections read back
/// in page order; a period is stored even when it has no items.
pub(crate) static INSERT_PERIOD: &str = "
    INSERT INTO screener.periods (ticker, section, period_idx, period)
    VALUES ($1, $2, $3, $4)
";

pub(crate) static INSERT_LINE_ITEM: &str = "
    INSERT INTO screener.line_items (ticker, section, period_idx, item_idx, metric, val)
    VALUES ($1, $2, $3, $4, $5, $6)
";

pub(crate) static INSERT_RAW_PAGE: &str = "
    INSERT INTO screener.raw_pages (ticker, scope, url, source_version, html)
    VALUES ($1, $2, $3, $4, $5)
";

//////////////////////////////////////////////////////////////////
// reads
//////////////////////////////////////////////////////////////////

pub(crate) static GET_METADATA: &str = "
    SELECT last_ingested_at, source_version
    FROM screener.snapshots
    WHERE ticker = $1
";

pub(crate) static GET_SNAPSHOT: &str = "
    SELECT scope, source_version, last_ingested_at
    FROM screener.snapshots
    WHERE ticker = $1
";

pub(crate) static GET_RATIOS: &str = "
    SELECT metric, raw_value, val
    FROM screener.ratios
    WHERE ticker = $1
";

pub(crate) static GET_DERIVED: &str = "
    SELECT metric, val
    FROM screener.derived
    WHERE ticker = $1
";

pub(crate) static GET_PERIODS: &str = "
    SELECT section, period_idx, period
    FROM screener.periods
    WHERE ticker = $1
    ORDER BY section, period_idx
";

pub(crate) static GET_LINE_ITEMS: &str = "
    SELECT section, period_idx, metric, val
    FROM screener.line_items
    WHERE ticker = $1
    ORDER BY section, period_idx, item_idx
";

pub(crate) static GET_RAW_PAGE: &str = "
    SELECT scope, url, html
    FROM screener.raw_pages
    WHERE ticker = $1
";
