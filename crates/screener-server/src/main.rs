mod rest_api;

use actix_web::{middleware::Logger, web, App, HttpServer};
use screener_spider::fetcher::HttpFetcher;
use screener_spider::repository::{MemoryRepository, PgRepository, Repository};
use screener_spider::{Config, Coordinator};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_redoc::{Redoc, Servable};

// create API documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        rest_api::fundamentals::fundamentals,
        rest_api::fundamentals::status,
        rest_api::fundamentals::status_bulk,
        rest_api::fundamentals::ingest_bulk,
    ),
    info(title = "screener fundamentals")
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;

    // postgres when configured, memory otherwise
    let repository: Arc<dyn Repository> = match &config.database_url {
        Some(url) => {
            let repository = PgRepository::connect(url)?;
            repository.migrate().await?;
            Arc::new(repository)
        }
        None => {
            warn!("FINDUMP_URL is not set, snapshots are kept in memory only");
            Arc::new(MemoryRepository::new())
        }
    };
    let fetcher = Arc::new(HttpFetcher::new(&config)?);
    let coordinator = web::Data::new(Coordinator::new(&config, fetcher, repository));

    // run server
    info!("serving fundamentals on {}", config.server_addr);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(coordinator.clone())
            .configure(rest_api::fundamentals::configure)
            .service(Redoc::with_url("/redoc", ApiDoc::openapi()))
    })
    .bind(config.server_addr.as_str())?
    .run()
    .await?;

    Ok(())
}
