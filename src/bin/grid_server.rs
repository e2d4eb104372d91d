#![forbid(unsafe_code)]

//! Axum server for the uploads grid.
//!
//! Serves rendered pages (template tags expanded server side), the admin
//! settings form and a small JSON API. Feed fetches are blocking and run on
//! tokio's blocking pool.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use tokio::signal;
use tracing::{error, info, warn};
use uploads_grid::{
    admin::{SETTINGS_SAVED_NOTICE, render_settings_page},
    cache::FileCache,
    channel::normalize,
    config::{CacheBackend, RuntimeOverrides, RuntimeSettings, resolve_runtime_settings},
    logging::init_tracing,
    render::{instance_id, render_page, render_uploads},
    settings::{ChannelSettings, SettingsStore},
    shortcode::expand_shortcodes,
    uploads::{CACHE_SUBDIR, FeedItem, UploadsError, UploadsFetcher},
};

const HOME_CONTENT: &str = "[youtube_uploads]";
const PAGE_TITLE: &str = "Latest uploads";

#[derive(Debug, Clone)]
struct ServerArgs {
    data_root: Option<PathBuf>,
    port: Option<u16>,
    host: Option<IpAddr>,
    env_file: Option<PathBuf>,
}

impl ServerArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(std::env::args().skip(1))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self {
            data_root: None,
            port: None,
            host: None,
            env_file: None,
        };
        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--data-root=") {
                parsed.data_root = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--port=") {
                parsed.port = Some(parse_port_arg(value)?);
                continue;
            }
            if let Some(value) = arg.strip_prefix("--host=") {
                parsed.host = Some(parse_host_arg(value)?);
                continue;
            }
            if let Some(value) = arg.strip_prefix("--env-file=") {
                parsed.env_file = Some(PathBuf::from(value));
                continue;
            }

            match arg.as_str() {
                "--data-root" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--data-root requires a value"))?;
                    parsed.data_root = Some(PathBuf::from(value));
                }
                "--port" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--port requires a value"))?;
                    parsed.port = Some(parse_port_arg(&value)?);
                }
                "--host" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--host requires a value"))?;
                    parsed.host = Some(parse_host_arg(&value)?);
                }
                "--env-file" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--env-file requires a value"))?;
                    parsed.env_file = Some(PathBuf::from(value));
                }
                _ => return Err(anyhow!("unknown argument: {arg}")),
            }
        }
        Ok(parsed)
    }

    fn into_overrides(self) -> RuntimeOverrides {
        RuntimeOverrides {
            data_root: self.data_root,
            uploads_port: self.port,
            uploads_host: self.host.map(|host| host.to_string()),
            env_path: self.env_file,
        }
    }
}

fn parse_port_arg(value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .context("expected a numeric port between 0 and 65535")
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/UPLOADS_HOST")
}

/// Shared state injected into every handler.
#[derive(Clone)]
struct AppState {
    fetcher: UploadsFetcher,
    settings: Arc<SettingsStore>,
}

impl AppState {
    fn new(runtime: &RuntimeSettings) -> Result<Self> {
        if runtime.cache_backend == CacheBackend::File {
            let cache = FileCache::new(runtime.data_root.join(CACHE_SUBDIR));
            match cache.purge_expired(Utc::now()) {
                Ok(0) => {}
                Ok(removed) => info!(removed, dir = %cache.dir().display(), "purged expired feed cache"),
                Err(err) => warn!(error = %format!("{err:#}"), "could not purge feed cache"),
            }
        }
        let settings = SettingsStore::load(&runtime.data_root, &runtime.default_channel)
            .context("loading channel settings")?;
        Ok(Self {
            fetcher: UploadsFetcher::from_runtime(runtime),
            settings: Arc::new(settings),
        })
    }

    /// Expands template tags in `content` on the blocking pool.
    async fn expand(&self, content: String) -> ApiResult<String> {
        let fetcher = self.fetcher.clone();
        let saved = self.settings.channel();
        tokio::task::spawn_blocking(move || expand_shortcodes(&content, &saved, &fetcher))
            .await
            .map_err(|err| ApiError::internal(err.to_string()))
    }

    /// Latest uploads for `channel`, or for the saved channel when the query
    /// leaves it out or blank.
    async fn latest(
        &self,
        channel: Option<String>,
    ) -> ApiResult<Result<Vec<FeedItem>, UploadsError>> {
        let fetcher = self.fetcher.clone();
        let channel = channel
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| self.settings.channel());
        tokio::task::spawn_blocking(move || fetcher.latest(&normalize(&channel)))
            .await
            .map_err(|err| ApiError::internal(err.to_string()))
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, headers, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
struct ChannelQuery {
    channel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SettingsForm {
    #[serde(default)]
    channel_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsPayload {
    channel_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("uploads_grid=info,grid_server=info");

    let runtime = resolve_runtime_settings(ServerArgs::parse()?.into_overrides())?;
    let host = parse_host_arg(&runtime.uploads_host)?;
    let state = AppState::new(&runtime)?;

    let addr = SocketAddr::new(host, runtime.uploads_port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!(%addr, data_root = %runtime.data_root.display(), "uploads grid listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running uploads grid server")?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home_page))
        .route("/uploads", get(uploads_page))
        .route("/render", post(render_content))
        .route("/api/uploads", get(list_uploads))
        .route("/api/settings", get(get_settings).put(update_settings))
        .route(
            "/admin/settings",
            get(settings_page).post(submit_settings_form),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!(error = %err, "failed to install Ctrl+C handler");
    }
}

async fn home_page(State(state): State<AppState>) -> ApiResult<Html<String>> {
    let body = state.expand(HOME_CONTENT.to_string()).await?;
    Ok(Html(render_page(PAGE_TITLE, &body)))
}

async fn uploads_page(
    State(state): State<AppState>,
    Query(query): Query<ChannelQuery>,
) -> ApiResult<Html<String>> {
    let result = state.latest(query.channel).await?;
    let body = render_uploads(
        &result,
        state.fetcher.display().column_count,
        &instance_id(1),
    );
    Ok(Html(render_page(PAGE_TITLE, &body)))
}

async fn render_content(State(state): State<AppState>, content: String) -> ApiResult<Html<String>> {
    Ok(Html(state.expand(content).await?))
}

async fn list_uploads(
    State(state): State<AppState>,
    Query(query): Query<ChannelQuery>,
) -> ApiResult<Json<Vec<FeedItem>>> {
    let items = state
        .latest(query.channel)
        .await?
        .map_err(|err| ApiError::bad_gateway(err.to_string()))?;
    Ok(Json(items))
}

async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<ChannelSettings>> {
    Ok(Json(state.settings.get()))
}

async fn update_settings(
    State(state): State<AppState>,
    Json(payload): Json<SettingsPayload>,
) -> ApiResult<Json<ChannelSettings>> {
    let updated = state
        .settings
        .update(&payload.channel_id)
        .map_err(|err| ApiError::internal(format!("{err:#}")))?;
    Ok(Json(updated))
}

async fn settings_page(State(state): State<AppState>) -> Html<String> {
    Html(settings_html(&state, None))
}

async fn submit_settings_form(
    State(state): State<AppState>,
    Form(form): Form<SettingsForm>,
) -> ApiResult<Html<String>> {
    state
        .settings
        .update(&form.channel_id)
        .map_err(|err| ApiError::internal(format!("{err:#}")))?;
    Ok(Html(settings_html(&state, Some(SETTINGS_SAVED_NOTICE))))
}

fn settings_html(state: &AppState, notice: Option<&str>) -> String {
    let saved = state.settings.channel();
    let feed_url = state.fetcher.feed_url(&normalize(&saved));
    render_settings_page(&saved, &feed_url, notice)
}
