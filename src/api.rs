//! Ambient HTTP surface: `/health`, `/stats`, and `/version`.
//!
//! The relay's primary interface is the WebSocket protocol in [`crate::relay`];
//! this module documents and serves the small amount of plain HTTP a load
//! balancer or operator dashboard needs, via `utoipa`/`utoipa-swagger-ui`.

use std::time::Instant;

use actix::Addr;
use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;
use utoipa::OpenApi;

use crate::relay::{RoomRegistry, REQUIRED_VERSION};
use crate::storage::GameStorage;

/// Shared application state: the persistence layer plus the server start
/// time used for `/health`'s `uptime` field. Room and connection counts
/// live on the [`RoomRegistry`] actor and are fetched per-request via
/// [`crate::relay::RegistrySnapshot`].
pub struct AppState {
    pub storage: GameStorage,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(storage: GameStorage) -> Self {
        Self { storage, started_at: Instant::now() }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub rooms: usize,
    pub clients: usize,
    pub uptime: u64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct VersionResponse {
    pub protocol_version: &'static str,
    pub server_version: &'static str,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Draughts Relay — operator surface",
        version = "0.1.0",
        description = "Liveness, capacity, and version endpoints for the draughts relay server. \
            Gameplay itself happens over the WebSocket protocol at /ws.",
        license(name = "MIT")
    ),
    paths(health, version),
    components(schemas(HealthResponse, VersionResponse)),
    tags((name = "operations", description = "Liveness and capacity endpoints"))
)]
pub struct ApiDoc;

/// Liveness and room/connection counts.
#[utoipa::path(
    get,
    path = "/health",
    tag = "operations",
    responses((status = 200, description = "Server is alive", body = HealthResponse))
)]
pub async fn health(data: web::Data<AppState>, registry: web::Data<Addr<RoomRegistry>>) -> impl Responder {
    let snapshot = registry.send(crate::relay::RegistrySnapshot).await.unwrap_or_default();
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        rooms: snapshot.room_count,
        clients: snapshot.session_count,
        uptime: data.started_at.elapsed().as_secs(),
    })
}

/// Protocol and server version, mirroring the handshake's required version.
#[utoipa::path(
    get,
    path = "/version",
    tag = "operations",
    responses((status = 200, description = "Version info", body = VersionResponse))
)]
pub async fn version() -> impl Responder {
    HttpResponse::Ok().json(VersionResponse { protocol_version: REQUIRED_VERSION, server_version: env!("CARGO_PKG_VERSION") })
}

/// A small HTML dashboard rendering the same counters as `/health` in a
/// human-readable page for an operator's browser.
pub async fn stats(data: web::Data<AppState>, registry: web::Data<Addr<RoomRegistry>>) -> impl Responder {
    let snapshot = registry.send(crate::relay::RegistrySnapshot).await.unwrap_or_default();
    let storage_stats = data.storage.stats().unwrap_or_default();
    let body = format!(
        "<!doctype html><html><head><title>draughts relay stats</title></head><body>\
         <h1>draughts relay</h1>\
         <ul>\
         <li>uptime: {}s</li>\
         <li>rooms open: {}</li>\
         <li>clients connected: {}</li>\
         <li>connections ever: {}</li>\
         <li>peak concurrent games: {}</li>\
         <li>archived games: {}</li>\
         <li>active games on disk: {}</li>\
         </ul></body></html>",
        data.started_at.elapsed().as_secs(),
        snapshot.room_count,
        snapshot.session_count,
        snapshot.connections_ever,
        snapshot.peak_concurrent_games,
        storage_stats.archived_count,
        storage_stats.active_count,
    );
    HttpResponse::Ok().content_type("text/html").body(body)
}

/// Configures the ambient HTTP routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health)).route("/stats", web::get().to(stats)).route("/version", web::get().to(version));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_response_matches_the_required_handshake_version() {
        let resp = VersionResponse { protocol_version: REQUIRED_VERSION, server_version: "0.1.0" };
        assert_eq!(resp.protocol_version, REQUIRED_VERSION);
    }
}
