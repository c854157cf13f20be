//! `GET /api/config`, `/api/features`, `/api/genres` (§6): read-only
//! introspection of the effective configuration, active analyzers, and the
//! catalog's genre universe.

use crate::config::Settings;
use crate::engine::Engine;
use crate::error::ApiError;
use actix_web::{get, web, HttpResponse};

#[get("/config")]
pub async fn get_config() -> HttpResponse {
    let settings = Settings::global();
    let settings = settings.read();
    HttpResponse::Ok().json(&*settings)
}

#[get("/features")]
pub async fn get_features() -> HttpResponse {
    let settings = Settings::global();
    let settings = settings.read();
    HttpResponse::Ok().body(settings.features_string())
}

#[get("/genres")]
pub async fn get_genres() -> Result<HttpResponse, ApiError> {
    let engine = Engine::get().ok_or(ApiError::Internal)?;
    let genres = engine.catalog().all_genres_sorted().await.map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(genres))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_config).service(get_features).service(get_genres);
}
