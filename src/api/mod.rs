//! Query API routes (§6): `similar`, `dump`, `attrmix`, plus the `config`,
//! `features`, `genres` introspection endpoints. Every endpoint accepts GET
//! with repeated query params or POST with a JSON body carrying the same
//! field names; both extractors deserialize into the same `Raw*Options`
//! type from `recommend::options`.

pub mod attrmix;
pub mod dump;
pub mod introspect;
pub mod response;
pub mod similar;

use actix_web::web;

/// Configure the `/api` scope onto an actix app (§6).
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(similar::configure)
            .configure(dump::configure)
            .configure(attrmix::configure)
            .configure(introspect::configure),
    );
}
