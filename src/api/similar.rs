//! `GET|POST /api/similar` (§6): the main recommendation endpoint.

use crate::api::response;
use crate::config::Settings;
use crate::engine::Engine;
use crate::error::ApiError;
use crate::recommend::options::RawSimilarOptions;
use crate::recommend::similar::similar;
use actix_web::{get, post, web, HttpResponse};

fn handle(raw: RawSimilarOptions) -> Result<HttpResponse, ApiError> {
    let opts = raw.normalize();
    if opts.tracks.is_empty() {
        return Err(ApiError::MissingParam("track"));
    }

    let engine = Engine::get().ok_or(ApiError::Internal)?;
    let settings = Settings::global();
    let settings = settings.read();

    let paths = similar(&engine, &settings, &opts);
    Ok(response::paths(&opts.format, paths))
}

#[get("/similar")]
pub async fn get_similar(query: web::Query<RawSimilarOptions>) -> Result<HttpResponse, ApiError> {
    handle(query.into_inner())
}

#[post("/similar")]
pub async fn post_similar(body: web::Json<RawSimilarOptions>) -> Result<HttpResponse, ApiError> {
    handle(body.into_inner())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_similar).service(post_similar);
}
