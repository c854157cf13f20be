//! `GET|POST /api/attrmix` (§4.7/§6): the scalar/attribute playlist builder.

use crate::api::response;
use crate::config::Settings;
use crate::engine::Engine;
use crate::error::ApiError;
use crate::recommend::attrmix::attrmix;
use crate::recommend::options::RawAttrmixOptions;
use actix_web::{get, post, web, HttpResponse};

fn handle(raw: RawAttrmixOptions) -> Result<HttpResponse, ApiError> {
    let opts = raw.normalize();

    let engine = Engine::get().ok_or(ApiError::Internal)?;
    let settings = Settings::global();
    let settings = settings.read();

    let paths = attrmix(&engine, &settings, &opts).ok_or(ApiError::InvalidParam {
        name: "attribs",
        reason: "no usable filter supplied, or the hl-attribute analyzer is unavailable".to_string(),
    })?;
    Ok(response::paths(&opts.format, paths))
}

#[get("/attrmix")]
pub async fn get_attrmix(query: web::Query<RawAttrmixOptions>) -> Result<HttpResponse, ApiError> {
    handle(query.into_inner())
}

#[post("/attrmix")]
pub async fn post_attrmix(body: web::Json<RawAttrmixOptions>) -> Result<HttpResponse, ApiError> {
    handle(body.into_inner())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_attrmix).service(post_attrmix);
}
