//! Shared `format=text` vs JSON response rendering (§6), grounded in the
//! source system's trailing `if format=='text': '\n'.join(...) else:
//! json.dumps(...)` branch repeated across `similar_api`/`dump_api`/
//! `attrmix_api` (`examples/original_source/lib/app.py`).

use crate::recommend::dump::DumpEntry;
use actix_web::HttpResponse;

/// A plain encoded-path list (`similar`, `attrmix`): JSON array by default,
/// newline-joined text when `format == "text"`.
pub fn paths(format: &str, paths: Vec<String>) -> HttpResponse {
    if format == "text" {
        HttpResponse::Ok().content_type("text/plain").body(paths.join("\n"))
    } else {
        HttpResponse::Ok().json(paths)
    }
}

/// `dump`'s `{file, sim}` list: JSON array of objects by default,
/// tab-separated `file\tsim` lines when `format == "text"`.
pub fn dump_entries(format: &str, entries: Vec<DumpEntry>) -> HttpResponse {
    if format == "text" {
        let body = entries
            .iter()
            .map(|e| format!("{}\t{}", e.file, e.sim))
            .collect::<Vec<_>>()
            .join("\n");
        HttpResponse::Ok().content_type("text/plain").body(body)
    } else {
        HttpResponse::Ok().json(entries)
    }
}
