//! HTTP surface: the JSON API under `/api` and the interactive HTML flows.
//!
//! Every endpoint resolves the tenant from the auth proxy's identity header,
//! case-folded to lowercase. JSON endpoints answer with the
//! `{Status, Result|Error}` envelope; HTML endpoints render the same outcomes
//! through the page writer with identical status codes.

use crate::config::Config;
use crate::error::Error;
use crate::lifecycle::Lifecycle;
use crate::pages::{PageOpts, PageWriter, ROBOTS_TXT};
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Identity header populated by the authenticating reverse proxy.
pub const AUTH_USER_HEADER: &str = "x-auth-request-user";

/// Session cookie assigned on successful create.
pub const SESSION_COOKIE: &str = "codespace_user";

pub struct AppState {
    pub config: Arc<Config>,
    pub lifecycle: Lifecycle,
    pub pages: PageWriter,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_page))
        .route("/create", get(create_page).post(create_page))
        .route("/delete-space", get(confirm_delete_page))
        .route("/delete", get(delete_page).post(delete_page))
        .route("/robots.txt", get(robots_txt))
        .route("/health", get(health))
        .route("/api/create", get(api_create).post(api_create))
        .route("/api/delete", get(api_delete).post(api_delete))
        .route("/api/exists", get(api_exists).post(api_exists))
        .route("/api/ready", get(api_ready).post(api_ready))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorObject {
    code: u16,
    reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorResponse {
    status: i32,
    error: ErrorObject,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ApiResponse<T: Serialize> {
    status: i32,
    result: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ExistsObject {
    codespace: String,
    exists: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReadyObject {
    codespace: String,
    ready: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeletedObject {
    codespace: String,
    deleted: bool,
}

fn ok_body<T: Serialize>(result: T) -> Response {
    (StatusCode::OK, Json(ApiResponse { status: 0, result })).into_response()
}

fn error_body(err: &Error) -> Response {
    let status = err.status_code();
    (
        status,
        Json(ErrorResponse {
            status: -1,
            error: ErrorObject {
                code: status.as_u16(),
                reason: err.to_string(),
            },
        }),
    )
        .into_response()
}

fn missing_user_body() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            status: -1,
            error: ErrorObject {
                code: StatusCode::NOT_FOUND.as_u16(),
                reason: "Missing X-Auth-Request-User".to_string(),
            },
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Tenant name from the identity header, case-folded to lowercase.
fn request_user(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTH_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_lowercase)
}

fn request_host(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost")
        .to_string()
}

fn request_scheme(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http")
        .to_string()
}

fn referer(headers: &HeaderMap) -> String {
    headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .filter(|r| !r.is_empty())
        .unwrap_or("/")
        .to_string()
}

/// Pick the cookie domain: longest configured suffix matching the request
/// host, falling back to the last configured domain.
fn cookie_domain<'a>(host: &str, domains: &'a [String]) -> Option<&'a str> {
    let host = host.split(':').next().unwrap_or(host);

    let best = domains
        .iter()
        .map(String::as_str)
        .filter(|domain| {
            let bare = domain.trim_start_matches('.');
            host == bare || host.ends_with(&format!(".{bare}"))
        })
        .max_by_key(|domain| domain.trim_start_matches('.').len());

    if best.is_none() && !domains.is_empty() {
        warn!(
            "request host {host:?} did not match any configured cookie domain, using {:?}",
            domains[domains.len() - 1]
        );
    }

    best.or_else(|| domains.last().map(String::as_str))
}

fn session_cookie(config: &Config, headers: &HeaderMap, tenant: &str) -> Option<HeaderValue> {
    let cookie = match cookie_domain(&request_host(headers), &config.cookie_domains) {
        Some(domain) => format!("{SESSION_COOKIE}={tenant}; Path=/; Domain={domain}"),
        None => format!("{SESSION_COOKIE}={tenant}; Path=/"),
    };
    HeaderValue::from_str(&cookie).ok()
}

fn with_session_cookie(mut response: Response, state: &AppState, headers: &HeaderMap, tenant: &str) -> Response {
    if let Some(cookie) = session_cookie(&state.config, headers, tenant) {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}

// ---------------------------------------------------------------------------
// JSON API handlers
// ---------------------------------------------------------------------------

async fn api_create(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(tenant) = request_user(&headers) else {
        return missing_user_body();
    };

    match state.lifecycle.create(&tenant).await {
        Ok(()) => {
            let body = ok_body(ExistsObject {
                codespace: tenant.clone(),
                exists: true,
            });
            with_session_cookie(body, &state, &headers, &tenant)
        }
        Err(err) => error_body(&err),
    }
}

async fn api_delete(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(tenant) = request_user(&headers) else {
        return missing_user_body();
    };

    match state.lifecycle.delete(&tenant).await {
        Ok(()) => ok_body(DeletedObject {
            codespace: tenant,
            deleted: true,
        }),
        Err(err) => error_body(&err),
    }
}

async fn api_exists(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(tenant) = request_user(&headers) else {
        return missing_user_body();
    };

    match state.lifecycle.exists(&tenant).await {
        Ok(exists) => ok_body(ExistsObject {
            codespace: tenant,
            exists,
        }),
        Err(err) => error_body(&err),
    }
}

async fn api_ready(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(tenant) = request_user(&headers) else {
        return missing_user_body();
    };

    match state.lifecycle.ready(&tenant).await {
        Ok(ready) => ok_body(ReadyObject {
            codespace: tenant,
            ready,
        }),
        Err(err) => error_body(&err),
    }
}

// ---------------------------------------------------------------------------
// HTML handlers
// ---------------------------------------------------------------------------

fn page(state: &AppState, opts: &PageOpts) -> Response {
    let status =
        StatusCode::from_u16(opts.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Html(state.pages.render(opts))).into_response()
}

fn error_page(state: &AppState, err: &Error) -> Response {
    page(state, &PageOpts::from_error(err))
}

fn missing_user_page(state: &AppState) -> Response {
    page(
        state,
        &PageOpts {
            status: StatusCode::PRECONDITION_REQUIRED.as_u16(),
            app_error: "Missing header: X-Auth-Request-User".to_string(),
            ..PageOpts::default()
        },
    )
}

/// Landing page: redirect straight into an existing codespace, otherwise ask
/// whether one should be created.
async fn root_page(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(tenant) = request_user(&headers) else {
        return missing_user_page(&state);
    };

    match state.lifecycle.exists(&tenant).await {
        Ok(true) => {
            let url =
                state
                    .config
                    .workspace_url(&tenant, &request_scheme(&headers), &request_host(&headers));
            Redirect::temporary(&url).into_response()
        }
        Ok(false) => page(
            &state,
            &PageOpts {
                status: StatusCode::OK.as_u16(),
                app_error: format!("Create codespace for user {tenant} ?"),
                redirect_url: referer(&headers),
                button_text: "Create".to_string(),
                button_cancel: "Cancel".to_string(),
                button_action: "/create".to_string(),
                button_method: "GET".to_string(),
                ..PageOpts::default()
            },
        ),
        Err(err) => error_page(&state, &err),
    }
}

/// Interactive create: provision, then hand the browser over to the codespace.
async fn create_page(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(tenant) = request_user(&headers) else {
        return missing_user_page(&state);
    };

    if let Err(err) = state.lifecycle.create(&tenant).await {
        return error_page(&state, &err);
    }

    let url = state
        .config
        .workspace_url(&tenant, &request_scheme(&headers), &request_host(&headers));
    let redirect = Redirect::temporary(&url).into_response();
    with_session_cookie(redirect, &state, &headers, &tenant)
}

async fn confirm_delete_page(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(tenant) = request_user(&headers) else {
        return missing_user_page(&state);
    };

    match state.lifecycle.exists(&tenant).await {
        Ok(true) => page(
            &state,
            &PageOpts {
                status: StatusCode::OK.as_u16(),
                app_error: format!("Delete codespace of user {tenant} ?"),
                redirect_url: referer(&headers),
                button_text: "Delete".to_string(),
                button_cancel: "Cancel".to_string(),
                button_action: "/delete".to_string(),
                button_method: "POST".to_string(),
                ..PageOpts::default()
            },
        ),
        Ok(false) => error_page(&state, &Error::NotFound(tenant)),
        Err(err) => error_page(&state, &err),
    }
}

async fn delete_page(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(tenant) = request_user(&headers) else {
        return missing_user_page(&state);
    };

    match state.lifecycle.delete(&tenant).await {
        Ok(()) => page(
            &state,
            &PageOpts {
                status: StatusCode::OK.as_u16(),
                app_error: format!("Codespace of user {tenant} deleted"),
                redirect_url: state.config.signout_url.clone(),
                button_text: "Sign out".to_string(),
                button_action: state.config.signout_url.clone(),
                button_method: "GET".to_string(),
                ..PageOpts::default()
            },
        ),
        Err(err) => error_page(&state, &err),
    }
}

async fn robots_txt() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        ROBOTS_TXT,
    )
        .into_response()
}

async fn health() -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
}
