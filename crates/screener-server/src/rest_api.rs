pub(crate) mod fundamentals;

use actix_web::HttpResponse;
use serde::Deserialize;
use serde_json::json;

/// `?force=true` re-ingests even when the stored data is fresh.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct ForceQuery {
    /// Bypass the freshness check.
    #[serde(default)]
    pub force: bool,
}

pub(crate) fn bad_request(error: impl ToString) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({ "error": error.to_string() }))
}

pub(crate) fn internal_error(error: impl ToString) -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({ "error": error.to_string() }))
}
