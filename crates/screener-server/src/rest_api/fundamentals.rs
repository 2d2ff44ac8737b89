use super::{bad_request, internal_error, ForceQuery};
use actix_web::{get, post, web, HttpResponse, Responder};
use screener_spider::query::{self, FundamentalsView};
use screener_spider::ticker::parse_all;
use screener_spider::{bulk, Coordinator, Ticker};
use tracing::{debug, error};

/// Fundamentals
///
/// Serves the stored snapshot when it is fresh. Otherwise an ingestion is triggered (or the
/// running one reused) and its status is returned with `202 Accepted`; poll
/// `/fundamentals/{ticker}/status` until it completes.
///
/// ```json
/// {
///     "status": "ingesting",
///     "ingestion": { "ticker": "SUZLON", "attempt": 7, "state": "queued", ... }
/// }
/// ```
#[utoipa::path(
    get,
    path = "/fundamentals/{ticker}",
    params(
        ("ticker" = String, Path, description = "Stock symbol, e.g. SUZLON"),
        ForceQuery
    ),
    responses(
        (
            status = 200,
            description = "Fresh snapshot with its ingestion status",
            content_type = "application/json",
            example = json!({
                "status": "ready",
                "snapshot": {
                    "ticker": "SUZLON",
                    "scope": "consolidated",
                    "ratios": { "Market Cap": { "raw": "₹ 81,923 Cr.", "value": 81923.0 } },
                    "derived": { "Sales": 6497.0 },
                    "source_version": "9f2c...",
                    "last_ingested_at": "2024-06-01T10:00:00Z"
                },
                "ingestion": { "ticker": "SUZLON", "state": "completed" }
            })
        ),
        (status = 202, description = "Ingestion triggered or already running"),
        (status = 400, description = "Invalid ticker symbol"),
        (status = 500, description = "Repository unavailable")
    )
)]
#[get("/fundamentals/{ticker}")]
pub(crate) async fn fundamentals(
    coordinator: web::Data<Coordinator>,
    ticker: web::Path<String>,
    params: web::Query<ForceQuery>,
) -> impl Responder {
    let ticker = match Ticker::parse(&ticker) {
        Ok(ticker) => ticker,
        Err(err) => return bad_request(err),
    };

    match query::fundamentals(&coordinator, &ticker, params.force).await {
        Ok(view @ FundamentalsView::Ready { .. }) => HttpResponse::Ok().json(view),
        Ok(view @ FundamentalsView::Ingesting { .. }) => HttpResponse::Accepted().json(view),
        Err(err) => {
            error!("failed to serve fundamentals for [{ticker}], error({err})");
            internal_error(err)
        }
    }
}

/// Ingestion status
///
/// `not_started` when the ticker has never been ingested by this process.
///
/// ```json
/// { "ticker": "SUZLON", "state": "in_progress", "progress_pct": 33, "progress": "fetch", ... }
/// ```
#[utoipa::path(
    get,
    path = "/fundamentals/{ticker}/status",
    params(("ticker" = String, Path, description = "Stock symbol, e.g. SUZLON")),
    responses(
        (
            status = 200,
            description = "Latest ingestion status of the ticker",
            content_type = "application/json",
            example = json!({ "ticker": "ZZZFAKE", "state": "not_started", "progress_pct": 0 })
        ),
        (status = 400, description = "Invalid ticker symbol")
    )
)]
#[get("/fundamentals/{ticker}/status")]
pub(crate) async fn status(
    coordinator: web::Data<Coordinator>,
    ticker: web::Path<String>,
) -> impl Responder {
    match Ticker::parse(&ticker) {
        Ok(ticker) => HttpResponse::Ok().json(query::status(coordinator.tracker(), &ticker)),
        Err(err) => bad_request(err),
    }
}

/// Bulk ingestion status
///
/// Statuses for a JSON array of tickers, in request order.
#[utoipa::path(
    post,
    path = "/fundamentals/status/bulk",
    request_body(
        content = Vec<String>,
        description = "Stock symbols",
        example = json!(["SUZLON", "TCS"])
    ),
    responses(
        (status = 200, description = "One status per ticker, in request order"),
        (status = 400, description = "Invalid ticker symbol")
    )
)]
#[post("/fundamentals/status/bulk")]
pub(crate) async fn status_bulk(
    coordinator: web::Data<Coordinator>,
    tickers: web::Json<Vec<String>>,
) -> impl Responder {
    match parse_all(tickers.into_inner()) {
        Ok(tickers) => {
            HttpResponse::Ok().json(bulk::status_many(coordinator.tracker(), &tickers))
        }
        Err(err) => bad_request(err),
    }
}

/// Bulk ingestion
///
/// Triggers ingestion for every ticker of a JSON array; repeated tickers are ingested once.
///
/// ```json
/// [
///     { "ticker": "SUZLON", "outcome": "triggered", "status": { ... } },
///     { "ticker": "TCS", "outcome": "skipped_fresh", "status": { ... } }
/// ]
/// ```
#[utoipa::path(
    post,
    path = "/fundamentals/ingest/bulk",
    params(ForceQuery),
    request_body(
        content = Vec<String>,
        description = "Stock symbols",
        example = json!(["SUZLON", "TCS"])
    ),
    responses(
        (status = 202, description = "One outcome per distinct ticker, in request order"),
        (status = 400, description = "Invalid ticker symbol")
    )
)]
#[post("/fundamentals/ingest/bulk")]
pub(crate) async fn ingest_bulk(
    coordinator: web::Data<Coordinator>,
    tickers: web::Json<Vec<String>>,
    params: web::Query<ForceQuery>,
) -> impl Responder {
    let tickers = match parse_all(tickers.into_inner()) {
        Ok(tickers) => tickers,
        Err(err) => return bad_request(err),
    };
    debug!("bulk ingest of {} tickers, force: {}", tickers.len(), params.force);

    let entries = bulk::ingest_many(&coordinator, tickers, params.force).await;
    HttpResponse::Accepted().json(entries)
}

pub(crate) fn configure(cfg: &mut web::ServiceConfig) {
    // the literal bulk paths go before `/fundamentals/{ticker}`
    cfg.service(status_bulk)
        .service(ingest_bulk)
        .service(status)
        .service(fundamentals);
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////
