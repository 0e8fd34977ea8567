use actix_web::http::Method;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Local;
use log::debug;
use serde_json::{json, Value};

use super::auth::AuthError;
use super::AppState;

pub const AVAILABLE_ENDPOINTS: [&str; 3] = ["/api/hello", "/api/status", "/api/time"];

// Protected API endpoint
pub async fn api_endpoint(
    req: HttpRequest,
    endpoint: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AuthError> {
    // Preflight requests carry no credentials.
    if req.method() == Method::OPTIONS {
        return Ok(HttpResponse::NoContent().finish());
    }

    let principal = state.auth.authenticate(&req).await?;
    debug!("Principal: {:#?}", principal);

    let body = match endpoint.as_str() {
        "hello" => hello(&req),
        "status" => status(&state),
        "time" => time(),
        other => {
            debug!("Unknown endpoint {}", other);
            return Ok(HttpResponse::NotFound().json(json!({
                "success": false,
                "error": "Endpoint not found",
                "available_endpoints": AVAILABLE_ENDPOINTS,
            })));
        }
    };

    Ok(HttpResponse::Ok().json(body))
}

fn hello(req: &HttpRequest) -> Value {
    json!({
        "success": true,
        "message": "Hello! Welcome to the demo API!",
        "endpoint": "/api/hello",
        "method": req.method().as_str(),
    })
}

fn status(state: &AppState) -> Value {
    json!({
        "success": true,
        "status": "online",
        "server": concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
        "auth_enabled": state.auth.is_enabled(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    })
}

fn time() -> Value {
    let now = Local::now();
    json!({
        "success": true,
        "timestamp": now.timestamp(),
        "datetime": now.format("%Y-%m-%d %H:%M:%S").to_string(),
        "timezone": now.offset().to_string(),
        "iso8601": now.to_rfc3339(),
    })
}
