//! Demo API that the client calls, protected by Entra ID bearer tokens.

pub mod auth;
pub mod handlers;

use std::time::Instant;

use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{web, App, HttpServer};
use log::{info, warn};

use crate::config::ServerConfig;
use auth::EntraIdAuth;

/// Shared state handed to every handler.
pub struct AppState {
    pub auth: EntraIdAuth,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            auth: EntraIdAuth::new(config),
            started_at: Instant::now(),
        }
    }
}

fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add(("Access-Control-Allow-Methods", "GET, POST, OPTIONS"))
        .add(("Access-Control-Allow-Headers", "Authorization, Content-Type"))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .wrap(cors_headers())
            .route("/{endpoint}", web::route().to(handlers::api_endpoint)),
    );
}

pub async fn run(config: ServerConfig) -> std::io::Result<()> {
    let state = web::Data::new(AppState::new(&config));
    if state.auth.is_enabled() {
        info!("Token validation enabled for tenant {:?}", config.tenant_id);
    } else {
        warn!("AZURE_TENANT_ID or AZURE_CLIENT_ID not set, serving without authentication");
    }

    info!("Listening on {}", config.bind_addr);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(routes)
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}
