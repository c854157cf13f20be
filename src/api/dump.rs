//! `GET|POST /api/dump` (§6): a single seed's raw or lightly-filtered
//! neighbor list.

use crate::api::response;
use crate::config::Settings;
use crate::engine::Engine;
use crate::error::ApiError;
use crate::recommend::dump::dump;
use crate::recommend::options::RawDumpOptions;
use actix_web::{get, post, web, HttpResponse};

fn handle(raw: RawDumpOptions) -> Result<HttpResponse, ApiError> {
    if raw.track.is_empty() {
        return Err(ApiError::MissingParam("track"));
    }
    let opts = raw.normalize();

    let engine = Engine::get().ok_or(ApiError::Internal)?;
    let settings = Settings::global();
    let settings = settings.read();

    let entries = dump(&engine, &settings, &opts);
    Ok(response::dump_entries(&opts.format, entries))
}

#[get("/dump")]
pub async fn get_dump(query: web::Query<RawDumpOptions>) -> Result<HttpResponse, ApiError> {
    handle(query.into_inner())
}

#[post("/dump")]
pub async fn post_dump(body: web::Json<RawDumpOptions>) -> Result<HttpResponse, ApiError> {
    handle(body.into_inner())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_dump).service(post_dump);
}
