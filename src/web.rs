use crate::config::{Link, RegistryConfig};
use crate::{Manifest, PackageIndex, SEARCH_MODES, VersionData};
use askama::Html as HtmlEscaper;
use askama::{MarkupDisplay, Template};
use axum::{
    Json, Router,
    extract::{Path, Query, RawQuery, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use markdown::{Options as MarkdownOptions, to_html_with_options};
use parking_lot::RwLock;
use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::info;

type SharedState = Arc<AppState>;
const HOME_HISTORY_LIMIT: usize = 10;
const DEFAULT_SEARCH_MODE: &str = "name";
type SafeMarkup = MarkupDisplay<HtmlEscaper, String>;

pub struct AppState {
    pub index: RwLock<PackageIndex>,
    pub registry: RegistryConfig,
    pub theme: WebTheme,
    pub base_url: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum WebTheme {
    #[default]
    Bootstrap,
    Tailwind,
}

impl fmt::Display for WebTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebTheme::Bootstrap => write!(f, "bootstrap"),
            WebTheme::Tailwind => write!(f, "tailwind"),
        }
    }
}

impl std::str::FromStr for WebTheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bootstrap" => Ok(WebTheme::Bootstrap),
            "tailwind" => Ok(WebTheme::Tailwind),
            other => Err(format!("unknown theme {other:?}, expected `bootstrap` or `tailwind`")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Chrome {
    use_tailwind: bool,
    use_bootstrap: bool,
    body_class: &'static str,
    main_class: &'static str,
    card_class: &'static str,
    eyebrow_class: &'static str,
    headline_class: &'static str,
    lede_class: &'static str,
    button_class: &'static str,
    table_row_class: &'static str,
}

impl Chrome {
    fn new(theme: WebTheme) -> Self {
        match theme {
            WebTheme::Tailwind => Self {
                use_tailwind: true,
                use_bootstrap: false,
                body_class: "bg-slate-50 text-slate-900",
                main_class: "min-h-screen flex flex-col items-center justify-start py-10 px-4",
                card_class: "max-w-5xl w-full space-y-6",
                eyebrow_class: "uppercase tracking-wide text-sm text-slate-500",
                headline_class: "text-4xl font-extrabold tracking-tight",
                lede_class: "text-lg text-slate-600",
                button_class: "inline-flex items-center rounded-md bg-slate-900 px-4 py-2 text-white font-semibold shadow hover:bg-slate-800 transition-colors",
                table_row_class: "border-b border-slate-200",
            },
            WebTheme::Bootstrap => Self {
                use_tailwind: false,
                use_bootstrap: true,
                body_class: "bg-light text-dark",
                main_class: "container py-5",
                card_class: "mx-auto col-lg-10",
                eyebrow_class: "text-uppercase text-muted mb-2",
                headline_class: "display-5 fw-bold",
                lede_class: "lead mb-4",
                button_class: "btn btn-primary px-4 py-2",
                table_row_class: "",
            },
        }
    }
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub theme: WebTheme,
    pub base_url: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            theme: WebTheme::default(),
            base_url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

pub async fn serve(
    config: WebConfig,
    registry: RegistryConfig,
    index: PackageIndex,
) -> Result<(), WebError> {
    let state = Arc::new(AppState {
        index: RwLock::new(index),
        registry,
        theme: config.theme,
        base_url: config.base_url.clone(),
    });
    let router = build_router(state);
    info!(
        %config.addr,
        theme = ?config.theme,
        base = %config.base_url,
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

/// Route table. The fallback guarantees total coverage: every path resolves
/// to some page, unmatched ones to the not-found view.
fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(home_html))
        .route("/search", get(search_html))
        .route("/404", get(not_found_html))
        .route("/api/search", get(api_search))
        .route("/healthz", get(health))
        .route("/:category/:name/:version", get(details_html))
        .fallback(not_found_html)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

/// Returns the decoded value of `key` within a raw query string.
///
/// Splits on `&`, then on the first `=` of each segment; the first matching
/// key wins and its value is percent-decoded. A segment that carries the key
/// without any `=` yields the empty string. Keys are compared undecoded.
pub fn first_query_value(raw_query: &str, key: &str) -> Option<String> {
    for segment in raw_query.split('&') {
        let (seg_key, value) = match segment.split_once('=') {
            Some((seg_key, value)) => (seg_key, value),
            None => (segment, ""),
        };
        if seg_key == key {
            return Some(percent_decode_str(value).decode_utf8_lossy().into_owned());
        }
    }
    None
}

/// Builds the navigation target for a search submission: the mode label is
/// lowercased, then both components are percent-encoded.
pub fn search_url(text: &str, mode_label: &str) -> String {
    format!(
        "/search?q={}&search_by={}",
        encode_component(text),
        encode_component(&mode_label.to_lowercase())
    )
}

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

/// Per-request searchbar state, derived from the URL the page was loaded
/// with. Exactly one dropdown entry is active when `search_by` is absent
/// (the `name` default) or names a known mode; an unknown value is accepted
/// and simply activates nothing.
#[derive(Debug, Clone)]
pub struct SearchbarState {
    pub query: String,
    pub selected: String,
    pub entries: Vec<SearchbarEntry>,
}

#[derive(Debug, Clone)]
pub struct SearchbarEntry {
    pub slug: &'static str,
    pub label: &'static str,
    pub href: String,
    pub active: bool,
}

impl SearchbarState {
    pub fn from_raw_query(raw_query: Option<&str>) -> Self {
        let raw = raw_query.unwrap_or("");
        let query = first_query_value(raw, "q").unwrap_or_default();
        let selected = first_query_value(raw, "search_by")
            .unwrap_or_else(|| DEFAULT_SEARCH_MODE.to_string());
        let entries = SEARCH_MODES
            .iter()
            .map(|mode| SearchbarEntry {
                slug: mode.slug(),
                label: mode.label(),
                href: search_url(&query, mode.label()),
                active: mode.slug() == selected,
            })
            .collect();
        Self {
            query,
            selected,
            entries,
        }
    }
}

#[derive(Template)]
#[template(
    source = r#"<form class="searchbar d-flex flex gap-2" action="/search" method="get" role="search">
  <input class="form-control rounded border px-3 py-2" type="text" name="q" value="{{ state.query }}" placeholder="Search packages" aria-label="Search">
  <input type="hidden" name="search_by" value="{{ state.selected }}">
  <div class="dropdown">
    <button class="btn btn-outline-secondary dropdown-toggle px-3 py-2" type="button" data-bs-toggle="dropdown">Search by</button>
    <div class="dropdown-menu">
      {% for entry in state.entries %}
      <a class="dropdown-item search-{{ entry.slug }}{% if entry.active %} active bg-accent{% endif %}" href="{{ entry.href }}">{{ entry.label }}</a>
      {% endfor %}
    </div>
  </div>
  <button class="searchbar-search btn btn-primary px-3 py-2" type="submit">Search</button>
</form>"#,
    ext = "html"
)]
struct SearchbarTemplate<'a> {
    state: &'a SearchbarState,
}

fn render_searchbar(raw_query: Option<&str>) -> SafeMarkup {
    let state = SearchbarState::from_raw_query(raw_query);
    let html = SearchbarTemplate { state: &state }
        .render()
        .unwrap_or_default();
    MarkupDisplay::new_safe(html, HtmlEscaper)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "depot-web" }))
}

async fn home_html(State(state): State<SharedState>, RawQuery(raw): RawQuery) -> impl IntoResponse {
    let index = state.index.read();
    let history = index
        .history(HOME_HISTORY_LIMIT)
        .into_iter()
        .map(|row| HistoryRow {
            href: details_path(&row.category, &row.name, &row.version),
            short_name: format!("{}/{}", row.category, row.name),
            version: row.version.to_string(),
            published: row.published.format("%Y-%m-%d %H:%M UTC").to_string(),
        })
        .collect::<Vec<_>>();
    let template = HomeTemplate {
        chrome: Chrome::new(state.theme),
        pretty_name: &state.registry.pretty_name,
        links: &state.registry.links,
        searchbar: render_searchbar(raw.as_deref()),
        canonical_url: format!("{}/", state.base_url),
        manifests_count: index.manifests_count(),
        history,
    };
    Html(
        template
            .render()
            .unwrap_or_else(|err| render_error_page(state.theme, err.to_string())),
    )
}

async fn details_html(
    State(state): State<SharedState>,
    Path((category, name, version)): Path<(String, String, String)>,
    RawQuery(raw): RawQuery,
) -> Response {
    let Some(version) = parse_lenient_version(&version) else {
        return not_found_response(&state, raw.as_deref());
    };
    let index = state.index.read();
    let Some((manifest, data)) = index.version_of(&category, &name, &version) else {
        drop(index);
        return not_found_response(&state, raw.as_deref());
    };
    let payload = DetailsPayload::new(manifest, &version, data);
    let template = DetailsTemplate {
        chrome: Chrome::new(state.theme),
        pretty_name: &state.registry.pretty_name,
        links: &state.registry.links,
        searchbar: render_searchbar(raw.as_deref()),
        canonical_url: format!(
            "{}{}",
            state.base_url,
            details_path(&category, &name, &version)
        ),
        payload: &payload,
    };
    let html = template
        .render()
        .unwrap_or_else(|err| render_error_page(state.theme, err.to_string()));
    Html(html).into_response()
}

async fn search_html(
    State(state): State<SharedState>,
    RawQuery(raw): RawQuery,
) -> impl IntoResponse {
    let raw_query = raw.as_deref().unwrap_or("");
    let query = first_query_value(raw_query, "q").unwrap_or_default();
    let search_by = first_query_value(raw_query, "search_by")
        .unwrap_or_else(|| DEFAULT_SEARCH_MODE.to_string());
    let index = state.index.read();
    let results = index
        .search(&query, &search_by, false)
        .into_iter()
        .map(ResultRow::new)
        .collect::<Vec<_>>();
    let template = SearchTemplate {
        chrome: Chrome::new(state.theme),
        pretty_name: &state.registry.pretty_name,
        links: &state.registry.links,
        searchbar: render_searchbar(raw.as_deref()),
        query: &query,
        search_by: &search_by,
        results,
    };
    Html(
        template
            .render()
            .unwrap_or_else(|err| render_error_page(state.theme, err.to_string())),
    )
}

async fn not_found_html(
    State(state): State<SharedState>,
    RawQuery(raw): RawQuery,
) -> Response {
    not_found_response(&state, raw.as_deref())
}

fn not_found_response(state: &AppState, raw_query: Option<&str>) -> Response {
    let template = ErrorTemplate {
        chrome: Chrome::new(state.theme),
        pretty_name: &state.registry.pretty_name,
        links: &state.registry.links,
        searchbar: render_searchbar(raw_query),
        code: 404,
        error: "Page Not Found",
    };
    let html = template
        .render()
        .unwrap_or_else(|err| render_error_page(state.theme, err.to_string()));
    (StatusCode::NOT_FOUND, Html(html)).into_response()
}

#[derive(Debug, Deserialize)]
struct ApiSearchParams {
    q: Option<String>,
    search_by: Option<String>,
    exact_match: Option<bool>,
}

async fn api_search(
    State(state): State<SharedState>,
    Query(params): Query<ApiSearchParams>,
) -> Result<Json<SearchResponsePayload>, ApiError> {
    let query = params
        .q
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("Query parameter `q` is required"))?;
    let search_by = params
        .search_by
        .unwrap_or_else(|| DEFAULT_SEARCH_MODE.to_string());
    let exact_match = params.exact_match.unwrap_or_default();
    let index = state.index.read();
    let results = index
        .search(&query, &search_by, exact_match)
        .into_iter()
        .map(ManifestPayload::from_manifest)
        .collect();
    Ok(Json(SearchResponsePayload {
        query,
        search_by,
        exact_match,
        results,
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SearchResponsePayload {
    query: String,
    search_by: String,
    exact_match: bool,
    results: Vec<ManifestPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestPayload {
    category: String,
    name: String,
    description: String,
    tags: Vec<String>,
    latest_version: Option<String>,
    versions: Vec<String>,
}

impl ManifestPayload {
    fn from_manifest(manifest: &Manifest) -> Self {
        Self {
            category: manifest.category.clone(),
            name: manifest.name.clone(),
            description: manifest.metadata.description.clone(),
            tags: manifest.metadata.tags.clone(),
            latest_version: manifest.latest_version().map(|v| v.to_string()),
            versions: manifest
                .sorted_versions()
                .into_iter()
                .map(|(version, _)| version.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct HistoryRow {
    href: String,
    short_name: String,
    version: String,
    published: String,
}

#[derive(Debug, Clone)]
struct ResultRow {
    href: String,
    short_name: String,
    description: String,
    tags: String,
    latest_version: String,
}

impl ResultRow {
    fn new(manifest: &Manifest) -> Self {
        let latest = manifest.latest_version();
        let href = latest
            .map(|version| details_path(&manifest.category, &manifest.name, version))
            .unwrap_or_else(|| "/404".to_string());
        Self {
            href,
            short_name: manifest.short_name(),
            description: manifest.metadata.description.clone(),
            tags: manifest.metadata.tags.join(", "),
            latest_version: latest.map(|v| v.to_string()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
struct VersionRow {
    version: String,
    href: String,
    current: bool,
    published: String,
}

#[derive(Debug, Clone)]
struct DetailsPayload {
    short_name: String,
    version: String,
    description_html: Option<String>,
    tags: Vec<String>,
    maintainer: Option<String>,
    licenses: String,
    upstream_url: Option<String>,
    download_size: Option<String>,
    dependencies: Vec<(String, String)>,
    published: String,
    versions: Vec<VersionRow>,
}

impl DetailsPayload {
    fn new(manifest: &Manifest, version: &Version, data: &VersionData) -> Self {
        let versions = manifest
            .sorted_versions()
            .into_iter()
            .map(|(v, vdata)| VersionRow {
                version: v.to_string(),
                href: details_path(&manifest.category, &manifest.name, v),
                current: v == version,
                published: vdata.published.format("%Y-%m-%d").to_string(),
            })
            .collect();
        Self {
            short_name: manifest.short_name(),
            version: version.to_string(),
            description_html: render_markdown(&manifest.metadata.description),
            tags: manifest.metadata.tags.clone(),
            maintainer: manifest.metadata.maintainer.clone(),
            licenses: manifest.metadata.licenses.join(", "),
            upstream_url: manifest.metadata.upstream_url.clone(),
            download_size: data.download_size.map(format_size),
            dependencies: data
                .dependencies
                .iter()
                .map(|(name, req)| (name.clone(), req.clone()))
                .collect(),
            published: data.published.format("%Y-%m-%d %H:%M UTC").to_string(),
            versions,
        }
    }
}

fn details_path(category: &str, name: &str, version: &Version) -> String {
    format!(
        "/{}/{}/{}",
        encode_component(category),
        encode_component(name),
        encode_component(&version.to_string())
    )
}

/// Accepts `1`, `1.2` and `1.2.3` path segments; missing components are
/// zero-padded before the semver parse.
fn parse_lenient_version(raw: &str) -> Option<Version> {
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }
    let padded = match raw.split('.').count() {
        1 => format!("{raw}.0.0"),
        2 => format!("{raw}.0"),
        _ => return None,
    };
    Version::parse(&padded).ok()
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn render_markdown(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let options = MarkdownOptions::gfm();
    let html = to_html_with_options(trimmed, &options).unwrap_or_else(|_| trimmed.to_string());
    Some(html)
}

fn render_error_page(theme: WebTheme, message: impl Into<String>) -> String {
    let chrome = Chrome::new(theme);
    let message = message.into();
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Depot • Error</title>
  </head>
  <body class="{body_class}">
    <main class="{main_class}">
      <div class="{card_class}">
        <h1 class="{headline_class}">Something went wrong</h1>
        <p class="{lede_class}">{message}</p>
        <a href="/" class="{button_class}">Back to home</a>
      </div>
    </main>
  </body>
</html>"#,
        body_class = chrome.body_class,
        main_class = chrome.main_class,
        card_class = chrome.card_class,
        headline_class = chrome.headline_class,
        lede_class = chrome.lede_class,
        button_class = chrome.button_class,
        message = message,
    )
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{{ pretty_name }}</title>
    <link rel="canonical" href="{{ canonical_url }}">
    {% if chrome.use_tailwind %}
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
    {% endif %}
    {% if chrome.use_bootstrap %}
    <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/css/bootstrap.min.css" rel="stylesheet" crossorigin="anonymous">
    <script src="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/js/bootstrap.bundle.min.js" crossorigin="anonymous"></script>
    {% endif %}
  </head>
  <body class="{{ chrome.body_class }}">
    <main class="{{ chrome.main_class }}">
      <div class="{{ chrome.card_class }} space-y-6">
        <header class="flex d-flex flex-wrap justify-between align-items-center gap-3">
          <nav class="flex d-flex gap-3">
            {% for link in links %}
            <a href="{{ link.url }}" class="{% if link.active %}fw-bold font-semibold{% endif %}">{{ link.name }}</a>
            {% endfor %}
          </nav>
          {{ searchbar }}
        </header>
        <div>
          <p class="{{ chrome.eyebrow_class }}">{{ manifests_count }} package{% if manifests_count != 1 %}s{% endif %} available</p>
          <h1 class="{{ chrome.headline_class }}">{{ pretty_name }}</h1>
          <p class="{{ chrome.lede_class }}">Browse and search the packages served by this depot.</p>
        </div>
        <section id="history">
          <h2 class="text-xl font-semibold mb-2">Recently published</h2>
          {% if history.len() == 0 %}
          <p>No packages have been published yet.</p>
          {% else %}
          <div class="bg-white shadow rounded overflow-hidden">
            <table class="min-w-full table">
              <thead class="bg-slate-100 text-left">
                <tr>
                  <th class="px-4 py-2">Package</th>
                  <th class="px-4 py-2">Version</th>
                  <th class="px-4 py-2">Published</th>
                </tr>
              </thead>
              <tbody>
                {% for row in history %}
                <tr class="{{ chrome.table_row_class }}">
                  <td class="px-4 py-2"><a href="{{ row.href }}" class="text-blue-700 hover:underline">{{ row.short_name }}</a></td>
                  <td class="px-4 py-2">{{ row.version }}</td>
                  <td class="px-4 py-2">{{ row.published }}</td>
                </tr>
                {% endfor %}
              </tbody>
            </table>
          </div>
          {% endif %}
        </section>
      </div>
    </main>
  </body>
</html>"#,
    ext = "html"
)]
struct HomeTemplate<'a> {
    chrome: Chrome,
    pretty_name: &'a str,
    links: &'a [Link],
    searchbar: SafeMarkup,
    canonical_url: String,
    manifests_count: usize,
    history: Vec<HistoryRow>,
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{{ pretty_name }} • {{ payload.short_name }} {{ payload.version }}</title>
    <link rel="canonical" href="{{ canonical_url }}">
    {% if chrome.use_tailwind %}
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
    {% endif %}
    {% if chrome.use_bootstrap %}
    <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/css/bootstrap.min.css" rel="stylesheet" crossorigin="anonymous">
    <script src="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/js/bootstrap.bundle.min.js" crossorigin="anonymous"></script>
    {% endif %}
  </head>
  <body class="{{ chrome.body_class }}">
    <main class="{{ chrome.main_class }}">
      <div class="{{ chrome.card_class }} space-y-6">
        <header class="flex d-flex flex-wrap justify-between align-items-center gap-3">
          <nav class="flex d-flex gap-3">
            {% for link in links %}
            <a href="{{ link.url }}" class="{% if link.active %}fw-bold font-semibold{% endif %}">{{ link.name }}</a>
            {% endfor %}
          </nav>
          {{ searchbar }}
        </header>
        <div>
          <p class="{{ chrome.eyebrow_class }}">Published {{ payload.published }}</p>
          <h1 class="{{ chrome.headline_class }}">{{ payload.short_name }} {{ payload.version }}</h1>
          {% if payload.tags.len() > 0 %}
          <div class="flex flex-wrap gap-2 d-flex mt-2">
            {% for tag in payload.tags %}
            <span class="badge bg-secondary px-3 py-1 rounded-full bg-slate-200 text-sm">{{ tag }}</span>
            {% endfor %}
          </div>
          {% endif %}
        </div>

        {% if payload.description_html.is_some() %}
        <section id="description">
          <h2 class="text-xl font-semibold mb-2">Description</h2>
          <div class="bg-white shadow rounded p-4 prose prose-slate max-w-none">{{ payload.description_html.as_ref().unwrap()|safe }}</div>
        </section>
        {% endif %}

        <section id="facts">
          <h2 class="text-xl font-semibold mb-2">Details</h2>
          <ul class="space-y-1 list-unstyled">
            {% if payload.maintainer.is_some() %}
            <li><strong>Maintainer:</strong> {{ payload.maintainer.as_ref().unwrap() }}</li>
            {% endif %}
            {% if payload.licenses.len() > 0 %}
            <li><strong>Licenses:</strong> {{ payload.licenses }}</li>
            {% endif %}
            {% if payload.upstream_url.is_some() %}
            <li><strong>Upstream:</strong> <a href="{{ payload.upstream_url.as_ref().unwrap() }}">{{ payload.upstream_url.as_ref().unwrap() }}</a></li>
            {% endif %}
            {% if payload.download_size.is_some() %}
            <li><strong>Download size:</strong> {{ payload.download_size.as_ref().unwrap() }}</li>
            {% endif %}
          </ul>
        </section>

        {% if payload.dependencies.len() > 0 %}
        <section id="dependencies">
          <h2 class="text-xl font-semibold mb-2">Dependencies</h2>
          <ul class="list-disc pl-6 space-y-1">
            {% for dep in payload.dependencies %}
            <li><code>{{ dep.0 }}</code> {{ dep.1 }}</li>
            {% endfor %}
          </ul>
        </section>
        {% endif %}

        <section id="versions">
          <h2 class="text-xl font-semibold mb-2">Versions</h2>
          <ul class="space-y-1 list-unstyled">
            {% for row in payload.versions %}
            <li>
              {% if row.current %}
              <span class="fw-bold font-semibold">{{ row.version }}</span>
              {% else %}
              <a href="{{ row.href }}" class="text-blue-700 hover:underline">{{ row.version }}</a>
              {% endif %}
              <span class="text-muted text-slate-500">({{ row.published }})</span>
            </li>
            {% endfor %}
          </ul>
        </section>
      </div>
    </main>
  </body>
</html>"#,
    ext = "html"
)]
struct DetailsTemplate<'a> {
    chrome: Chrome,
    pretty_name: &'a str,
    links: &'a [Link],
    searchbar: SafeMarkup,
    canonical_url: String,
    payload: &'a DetailsPayload,
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{{ pretty_name }} • Search</title>
    {% if chrome.use_tailwind %}
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
    {% endif %}
    {% if chrome.use_bootstrap %}
    <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/css/bootstrap.min.css" rel="stylesheet" crossorigin="anonymous">
    <script src="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/js/bootstrap.bundle.min.js" crossorigin="anonymous"></script>
    {% endif %}
  </head>
  <body class="{{ chrome.body_class }}">
    <main class="{{ chrome.main_class }}">
      <div class="{{ chrome.card_class }} space-y-4">
        <header class="flex d-flex flex-wrap justify-between align-items-center gap-3">
          <nav class="flex d-flex gap-3">
            {% for link in links %}
            <a href="{{ link.url }}" class="{% if link.active %}fw-bold font-semibold{% endif %}">{{ link.name }}</a>
            {% endfor %}
          </nav>
          {{ searchbar }}
        </header>
        <div>
          <p class="{{ chrome.eyebrow_class }}">Searched by {{ search_by }}</p>
          <h1 class="{{ chrome.headline_class }}">Search results for “{{ query }}”</h1>
          <p class="{{ chrome.lede_class }}">{{ results.len() }} match{% if results.len() != 1 %}es{% endif %}.</p>
        </div>
        {% if results.len() == 0 %}
          <p>No packages found.</p>
        {% else %}
        <div class="bg-white shadow rounded overflow-hidden">
          <table class="min-w-full table">
            <thead class="bg-slate-100 text-left">
              <tr>
                <th class="px-4 py-2">Package</th>
                <th class="px-4 py-2">Latest</th>
                <th class="px-4 py-2">Description</th>
                <th class="px-4 py-2">Tags</th>
              </tr>
            </thead>
            <tbody>
              {% for row in results %}
              <tr class="{{ chrome.table_row_class }}">
                <td class="px-4 py-2"><a href="{{ row.href }}" class="text-blue-700 hover:underline">{{ row.short_name }}</a></td>
                <td class="px-4 py-2">{{ row.latest_version }}</td>
                <td class="px-4 py-2">{{ row.description }}</td>
                <td class="px-4 py-2">{{ row.tags }}</td>
              </tr>
              {% endfor %}
            </tbody>
          </table>
        </div>
        {% endif %}
      </div>
    </main>
  </body>
</html>"#,
    ext = "html"
)]
struct SearchTemplate<'a> {
    chrome: Chrome,
    pretty_name: &'a str,
    links: &'a [Link],
    searchbar: SafeMarkup,
    query: &'a str,
    search_by: &'a str,
    results: Vec<ResultRow>,
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{{ pretty_name }} • {{ code }}</title>
    {% if chrome.use_tailwind %}
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
    {% endif %}
    {% if chrome.use_bootstrap %}
    <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/css/bootstrap.min.css" rel="stylesheet" crossorigin="anonymous">
    <script src="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/js/bootstrap.bundle.min.js" crossorigin="anonymous"></script>
    {% endif %}
  </head>
  <body class="{{ chrome.body_class }}">
    <main class="{{ chrome.main_class }}">
      <div class="{{ chrome.card_class }} space-y-4">
        <header class="flex d-flex flex-wrap justify-between align-items-center gap-3">
          <nav class="flex d-flex gap-3">
            {% for link in links %}
            <a href="{{ link.url }}" class="{% if link.active %}fw-bold font-semibold{% endif %}">{{ link.name }}</a>
            {% endfor %}
          </nav>
          {{ searchbar }}
        </header>
        <div>
          <p class="{{ chrome.eyebrow_class }}">Error {{ code }}</p>
          <h1 class="{{ chrome.headline_class }}">{{ error }}</h1>
          <p class="{{ chrome.lede_class }}">The page you requested does not exist on this depot.</p>
          <a href="/" class="{{ chrome.button_class }}">Back to home</a>
        </div>
      </div>
    </main>
  </body>
</html>"#,
    ext = "html"
)]
struct ErrorTemplate<'a> {
    chrome: Chrome,
    pretty_name: &'a str,
    links: &'a [Link],
    searchbar: SafeMarkup,
    code: u16,
    error: &'a str,
}

#[cfg(all(test, feature = "web"))]
mod tests {
    use super::*;
    use crate::fixtures::sample_index;
    use axum::{body, body::Body, http::Request};
    use tower::ServiceExt;

    fn test_router() -> Router {
        let registry = RegistryConfig {
            name: "testing".to_string(),
            pretty_name: "Testing Depot".to_string(),
            links: vec![Link {
                name: "Browse".to_string(),
                url: "/".to_string(),
                active: true,
            }],
            ..RegistryConfig::default()
        };
        let state = Arc::new(AppState {
            index: RwLock::new(sample_index()),
            registry,
            theme: WebTheme::Bootstrap,
            base_url: "http://127.0.0.1:8080".to_string(),
        });
        build_router(state)
    }

    async fn fetch(path: &str) -> (StatusCode, String) {
        let router = test_router();
        let response = router
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn active_items(html: &str) -> usize {
        html.matches(" active bg-accent").count()
    }

    #[tokio::test]
    async fn home_page_renders_catalog_summary() {
        let (status, html) = fetch("/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Testing Depot"));
        assert!(html.contains("3 packages available"));
        assert!(html.contains("electronics/widget"));
    }

    #[tokio::test]
    async fn unmatched_path_falls_back_to_not_found() {
        let (status, html) = fetch("/no/such").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(html.contains("Page Not Found"));
    }

    #[tokio::test]
    async fn explicit_404_route_renders_not_found() {
        let (status, html) = fetch("/404").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(html.contains("Page Not Found"));
    }

    #[tokio::test]
    async fn details_route_resolves_package_version() {
        let (status, html) = fetch("/electronics/widget/1.0").await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("electronics/widget 1.0.0"));
        assert!(html.contains("A reusable widget"));
    }

    #[tokio::test]
    async fn details_page_links_canonical_url() {
        let (status, html) = fetch("/electronics/widget/1.0").await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains(
            r#"<link rel="canonical" href="http://127.0.0.1:8080/electronics/widget/1%2E0%2E0">"#
        ));
    }

    #[tokio::test]
    async fn home_page_links_canonical_url() {
        let (_, html) = fetch("/").await;
        assert!(html.contains(r#"<link rel="canonical" href="http://127.0.0.1:8080/">"#));
    }

    #[tokio::test]
    async fn details_route_unknown_package_is_not_found() {
        let (status, html) = fetch("/electronics/gizmo/1.0.0").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(html.contains("Page Not Found"));
    }

    #[tokio::test]
    async fn details_route_unreleased_version_is_not_found() {
        let (status, _) = fetch("/electronics/widget/9.9.9").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn search_page_lists_matches() {
        let (status, html) = fetch("/search?q=widget&search_by=name").await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("electronics/widget"));
        assert!(html.contains("1 match"));
    }

    #[tokio::test]
    async fn search_page_without_query_is_empty() {
        let (status, html) = fetch("/search").await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("No packages found."));
    }

    #[tokio::test]
    async fn searchbar_defaults_to_name_mode() {
        let (_, html) = fetch("/").await;
        assert_eq!(active_items(&html), 1);
        assert!(html.contains("search-name active bg-accent"));
    }

    #[tokio::test]
    async fn searchbar_restores_mode_from_query() {
        let (_, html) = fetch("/search?q=gcc&search_by=category").await;
        assert_eq!(active_items(&html), 1);
        assert!(html.contains("search-category active bg-accent"));
        assert!(!html.contains("search-name active"));
    }

    #[tokio::test]
    async fn searchbar_accepts_unknown_mode_without_activating() {
        let (status, html) = fetch("/search?q=gcc&search_by=bogus").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(active_items(&html), 0);
    }

    #[tokio::test]
    async fn api_search_returns_json_results() {
        let (status, json_body) = fetch("/api/search?q=widget&search_by=name").await;
        assert_eq!(status, StatusCode::OK);
        let payload: SearchResponsePayload = serde_json::from_str(&json_body).unwrap();
        assert_eq!(payload.query, "widget");
        assert_eq!(payload.results.len(), 1);
        assert_eq!(payload.results[0].latest_version.as_deref(), Some("1.1.0"));
    }

    #[tokio::test]
    async fn api_search_requires_query() {
        let (status, _) = fetch("/api/search?search_by=name").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn api_search_exact_match() {
        let (status, json_body) = fetch("/api/search?q=widg&search_by=name&exact_match=true").await;
        assert_eq!(status, StatusCode::OK);
        let payload: SearchResponsePayload = serde_json::from_str(&json_body).unwrap();
        assert!(payload.results.is_empty());
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let (status, json_body) = fetch("/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert!(json_body.contains("\"ok\""));
    }

    #[test]
    fn search_url_encodes_text_and_lowercases_mode() {
        assert_eq!(
            search_url("foo bar", "Category"),
            "/search?q=foo%20bar&search_by=category"
        );
    }

    #[test]
    fn first_query_value_first_match_wins() {
        let raw = "search_by=category&search_by=name";
        assert_eq!(
            first_query_value(raw, "search_by").as_deref(),
            Some("category")
        );
    }

    #[test]
    fn first_query_value_decodes_percent_escapes() {
        assert_eq!(
            first_query_value("q=foo%20bar", "q").as_deref(),
            Some("foo bar")
        );
    }

    #[test]
    fn first_query_value_without_equals_is_empty() {
        assert_eq!(first_query_value("search_by", "search_by").as_deref(), Some(""));
        assert_eq!(first_query_value("a=1&search_by", "search_by").as_deref(), Some(""));
    }

    #[test]
    fn first_query_value_missing_key_is_none() {
        assert!(first_query_value("q=foo", "search_by").is_none());
    }

    #[test]
    fn searchbar_state_exclusive_selection() {
        let state = SearchbarState::from_raw_query(Some("q=x&search_by=tags"));
        let active: Vec<_> = state.entries.iter().filter(|entry| entry.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].slug, "tags");
    }

    #[test]
    fn lenient_version_parse_pads_missing_components() {
        assert_eq!(
            parse_lenient_version("1.0"),
            Some(Version::parse("1.0.0").unwrap())
        );
        assert_eq!(
            parse_lenient_version("2"),
            Some(Version::parse("2.0.0").unwrap())
        );
        assert!(parse_lenient_version("not-a-version").is_none());
    }

    #[test]
    fn format_size_scales_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
    }
}
