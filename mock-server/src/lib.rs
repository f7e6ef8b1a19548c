use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub const API_KEY_HEADER: &str = "x-space-d-api-key";
pub const CLOUD_NAME: &str = "mock";

/// Publishing state of a stored content item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Live,
    Staging,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredContent {
    pub public_id: String,
    pub definition: String,
    pub repository: String,
    pub payload: Value,
    pub online_date: Option<DateTime<Utc>>,
    pub offline_date: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub stage: Stage,
    pub version: i64,
}

impl StoredContent {
    pub fn live(public_id: &str, definition: &str, payload: Value) -> Self {
        Self {
            public_id: public_id.to_string(),
            definition: definition.to_string(),
            repository: "default".to_string(),
            payload,
            online_date: None,
            offline_date: None,
            tags: Vec::new(),
            stage: Stage::Live,
            version: 1,
        }
    }

    pub fn staging(public_id: &str, definition: &str, payload: Value) -> Self {
        Self {
            stage: Stage::Staging,
            ..Self::live(public_id, definition, payload)
        }
    }

    pub fn with_repository(mut self, repository: &str) -> Self {
        self.repository = repository.to_string();
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn online_between(
        mut self,
        online: Option<DateTime<Utc>>,
        offline: Option<DateTime<Utc>>,
    ) -> Self {
        self.online_date = online;
        self.offline_date = offline;
        self
    }

    fn visible_at(&self, at: DateTime<Utc>) -> bool {
        self.online_date.map_or(true, |d| d <= at) && self.offline_date.map_or(true, |d| d > at)
    }

    fn to_json(&self, channel: &str, now: DateTime<Utc>) -> Value {
        json!({
            "publicId": self.public_id,
            "definition": self.definition,
            "repository": self.repository,
            "payload": self.payload,
            "onlineDate": self.online_date,
            "offlineDate": self.offline_date,
            "metadata": {
                "id": self.version,
                "authoringContentId": self.version,
                "contentVersion": self.version,
                "contentLastModifiedDate": now,
                "tags": self.tags,
                "publishedOn": now,
            },
            "requestContext": request_context(channel, now),
        })
    }
}

/// Space served by the mock: channel keys plus stored contents.
#[derive(Clone, Debug, Default)]
pub struct Fixture {
    pub space_id: String,
    pub channels: HashMap<String, String>,
    pub contents: Vec<StoredContent>,
}

impl Fixture {
    pub fn new(space_id: &str) -> Self {
        Self {
            space_id: space_id.to_string(),
            ..Self::default()
        }
    }

    pub fn with_channel(mut self, name: &str, api_key: &str) -> Self {
        self.channels.insert(name.to_string(), api_key.to_string());
        self
    }

    pub fn with_content(mut self, content: StoredContent) -> Self {
        self.contents.push(content);
        self
    }
}

/// A request as seen by the mock, for assertions.
#[derive(Clone, Debug, Serialize)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Decoded query pairs in wire order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .as_deref()
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default()
    }
}

#[derive(Clone, Default)]
pub struct AppState {
    fixture: Arc<Fixture>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl AppState {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            fixture: Arc::new(fixture),
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests().pop()
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/space/{space}/online/content/{channel}", get(online_content))
        .route("/space/{space}/online/search/v2/{channel}", get(online_search))
        .route("/space/{space}/preview/{state}/content/{channel}", get(preview_content))
        .route("/space/{space}/preview/{state}/search/v2/{channel}", get(preview_search))
        .route("/_mock/redirect-loop", get(redirect_loop))
        .route("/_mock/status/{code}", get(plain_status))
        .route("/_mock/empty", get(empty_ok))
        .route("/_mock/slow/{millis}", get(slow))
        .route("/_mock/bytes/{len}", get(bytes_body))
        .route("/_mock/echo", any(echo))
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the mock API until `shutdown` resolves, then drains in-flight requests.
pub async fn run_until(
    listener: TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn record(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let headers = request
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect();
    let entry = RecordedRequest {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        query: request.uri().query().map(str::to_string),
        headers,
    };
    if let Ok(mut log) = state.requests.lock() {
        log.push(entry);
    }
    next.run(request).await
}

type Params = Vec<(String, String)>;

#[derive(Clone, Copy)]
enum Mode {
    Online,
    Preview(Stage),
}

#[derive(Debug)]
struct ApiFailure(StatusCode, String);

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "message": self.1, "code": self.0.as_u16() }))).into_response()
    }
}

async fn online_content(
    State(state): State<AppState>,
    Path((space, channel)): Path<(String, String)>,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> Result<Json<Value>, ApiFailure> {
    content(&state, &space, &channel, Mode::Online, &headers, &params)
}

async fn preview_content(
    State(state): State<AppState>,
    Path((space, stage, channel)): Path<(String, String, String)>,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> Result<Json<Value>, ApiFailure> {
    let stage = parse_stage(&stage)?;
    content(&state, &space, &channel, Mode::Preview(stage), &headers, &params)
}

async fn online_search(
    State(state): State<AppState>,
    Path((space, channel)): Path<(String, String)>,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> Result<Json<Value>, ApiFailure> {
    search(&state, &space, &channel, Mode::Online, &headers, &params)
}

async fn preview_search(
    State(state): State<AppState>,
    Path((space, stage, channel)): Path<(String, String, String)>,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> Result<Json<Value>, ApiFailure> {
    let stage = parse_stage(&stage)?;
    search(&state, &space, &channel, Mode::Preview(stage), &headers, &params)
}

fn parse_stage(raw: &str) -> Result<Stage, ApiFailure> {
    match raw {
        "live" => Ok(Stage::Live),
        "staging" => Ok(Stage::Staging),
        other => Err(ApiFailure(
            StatusCode::BAD_REQUEST,
            format!("unknown state {other}"),
        )),
    }
}

fn content(
    state: &AppState,
    space: &str,
    channel: &str,
    mode: Mode,
    headers: &HeaderMap,
    params: &Params,
) -> Result<Json<Value>, ApiFailure> {
    authorize(state, space, channel, headers)?;
    let at = effective_time(mode, params)?;
    let public_id = param(params, "publicId")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiFailure(StatusCode::BAD_REQUEST, "publicId is required".to_string()))?;
    let found = visible_contents(state, mode, at)
        .find(|c| c.public_id == public_id)
        .ok_or_else(|| {
            ApiFailure(
                StatusCode::NOT_FOUND,
                format!("content {public_id} not found"),
            )
        })?;
    Ok(Json(found.to_json(channel, Utc::now())))
}

fn search(
    state: &AppState,
    space: &str,
    channel: &str,
    mode: Mode,
    headers: &HeaderMap,
    params: &Params,
) -> Result<Json<Value>, ApiFailure> {
    authorize(state, space, channel, headers)?;
    let at = effective_time(mode, params)?;
    let skip = numeric_param(params, "skip")?.unwrap_or(0);
    let take = numeric_param(params, "take")?.unwrap_or(10);

    let public_ids = params_named(params, "publicId");
    let definitions = params_named(params, "contentDefinition");
    let repositories = params_named(params, "repositories");
    let tags = params_named(params, "tags");
    let filters = match param(params, "propFilters") {
        Some(raw) => Some(serde_json::from_str::<PropFilters>(raw).map_err(|e| {
            ApiFailure(StatusCode::BAD_REQUEST, format!("invalid propFilters: {e}"))
        })?),
        None => None,
    };

    let mut matches: Vec<&StoredContent> = visible_contents(state, mode, at)
        .filter(|c| public_ids.is_empty() || public_ids.contains(&c.public_id.as_str()))
        .filter(|c| definitions.is_empty() || definitions.contains(&c.definition.as_str()))
        .filter(|c| repositories.is_empty() || repositories.contains(&c.repository.as_str()))
        .filter(|c| tags.is_empty() || c.tags.iter().any(|t| tags.contains(&t.as_str())))
        .filter(|c| filters.as_ref().map_or(true, |f| f.matches(&c.payload)))
        .collect();

    if let Some(sorting) = param(params, "sorting") {
        sort_contents(&mut matches, sorting)?;
    }

    let now = Utc::now();
    let total = matches.len();
    let items: Vec<Value> = matches
        .into_iter()
        .skip(skip)
        .take(take)
        .map(|c| c.to_json(channel, now))
        .collect();
    Ok(Json(json!({
        "items": items,
        "total": total,
        "skip": skip,
        "take": take,
        "requestContext": request_context(channel, now),
    })))
}

fn authorize(state: &AppState, space: &str, channel: &str, headers: &HeaderMap) -> Result<(), ApiFailure> {
    if space != state.fixture.space_id {
        return Err(ApiFailure(StatusCode::NOT_FOUND, format!("space {space} not found")));
    }
    let expected = state
        .fixture
        .channels
        .get(channel)
        .ok_or_else(|| ApiFailure(StatusCode::NOT_FOUND, format!("channel {channel} not found")))?;
    let supplied = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    if supplied != Some(expected.as_str()) {
        return Err(ApiFailure(StatusCode::FORBIDDEN, "invalid api key".to_string()));
    }
    Ok(())
}

fn effective_time(mode: Mode, params: &Params) -> Result<DateTime<Utc>, ApiFailure> {
    match (mode, param(params, "targetDate")) {
        (Mode::Preview(_), Some(raw)) => DateTime::parse_from_rfc3339(raw)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| ApiFailure(StatusCode::BAD_REQUEST, format!("invalid targetDate: {e}"))),
        _ => Ok(Utc::now()),
    }
}

fn visible_contents(
    state: &AppState,
    mode: Mode,
    at: DateTime<Utc>,
) -> impl Iterator<Item = &StoredContent> {
    state.fixture.contents.iter().filter(move |c| {
        let stage_ok = match mode {
            Mode::Online | Mode::Preview(Stage::Live) => c.stage == Stage::Live,
            Mode::Preview(Stage::Staging) => true,
        };
        stage_ok && c.visible_at(at)
    })
}

fn param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn params_named<'a>(params: &'a Params, key: &str) -> Vec<&'a str> {
    params
        .iter()
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .collect()
}

fn numeric_param(params: &Params, key: &str) -> Result<Option<usize>, ApiFailure> {
    param(params, key)
        .map(|raw| {
            raw.parse()
                .map_err(|_| ApiFailure(StatusCode::BAD_REQUEST, format!("{key} must be a number")))
        })
        .transpose()
}

fn sort_contents(contents: &mut [&StoredContent], sorting: &str) -> Result<(), ApiFailure> {
    let mut keys = Vec::new();
    for token in sorting.split(',').filter(|t| !t.is_empty()) {
        let (ascending, field) = if let Some(field) = token.strip_prefix('+') {
            (true, field)
        } else if let Some(field) = token.strip_prefix('-') {
            (false, field)
        } else {
            return Err(ApiFailure(
                StatusCode::BAD_REQUEST,
                format!("sorting entry {token} must start with + or -"),
            ));
        };
        keys.push((ascending, field.to_string()));
    }
    contents.sort_by(|a, b| {
        keys.iter()
            .map(|(ascending, field)| {
                let ord = sort_key(a, field).cmp(&sort_key(b, field));
                if *ascending {
                    ord
                } else {
                    ord.reverse()
                }
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(())
}

fn sort_key(content: &StoredContent, field: &str) -> String {
    match field {
        "publicId" => content.public_id.clone(),
        "definition" => content.definition.clone(),
        "repository" => content.repository.clone(),
        "onlineDate" => content.online_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
        "offlineDate" => content.offline_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
        other => match content.payload.get(other) {
            Some(Value::String(s)) => s.clone(),
            Some(v) => v.to_string(),
            None => String::new(),
        },
    }
}

fn request_context(channel: &str, now: DateTime<Utc>) -> Value {
    json!({
        "publishingChannel": channel,
        "cloudName": CLOUD_NAME,
        "timestamp": now,
    })
}

#[derive(Debug, Deserialize)]
struct PropFilters {
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    items: Vec<PropFilterItem>,
}

#[derive(Debug, Deserialize)]
struct PropFilterItem {
    #[serde(default)]
    field: String,
    #[serde(default)]
    operator: Option<String>,
    #[serde(default)]
    value: Value,
}

impl PropFilters {
    fn matches(&self, payload: &Value) -> bool {
        let mut results = self.items.iter().map(|item| item.matches(payload));
        match self.condition.as_deref() {
            Some("OR") => results.any(|m| m),
            _ => results.all(|m| m),
        }
    }
}

impl PropFilterItem {
    fn matches(&self, payload: &Value) -> bool {
        let Some(actual) = payload.get(&self.field) else {
            return false;
        };
        let operator = self.operator.as_deref().unwrap_or("EQUALS");
        let ignore_case = operator.ends_with("_IC");
        let text = |v: &Value| {
            let s = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if ignore_case {
                s.to_lowercase()
            } else {
                s
            }
        };
        let actual = text(actual);
        match operator.trim_end_matches("_IC") {
            "EQUALS" => actual == text(&self.value),
            "CONTAINS" => actual.contains(&text(&self.value)),
            "STARTS_WITH" => actual.starts_with(&text(&self.value)),
            "IN" => match &self.value {
                Value::Array(candidates) => candidates.iter().any(|c| text(c) == actual),
                single => text(single) == actual,
            },
            _ => false,
        }
    }
}

async fn redirect_loop() -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, "/_mock/redirect-loop")])
}

async fn plain_status(Path(code): Path<u16>) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let reason = status.canonical_reason().unwrap_or("Unknown");
    (status, format!("{reason}\n")).into_response()
}

async fn empty_ok() -> StatusCode {
    StatusCode::OK
}

async fn slow(Path(millis): Path<u64>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    Json(json!({}))
}

/// A `len`-byte body of `x`, for exercising large downloads.
async fn bytes_body(Path(len): Path<usize>) -> Vec<u8> {
    vec![b'x'; len]
}

async fn echo(method: Method, headers: HeaderMap, body: String) -> Json<Value> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    Json(json!({
        "method": method.as_str(),
        "contentType": content_type,
        "body": body,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(id: &str, title: &str) -> StoredContent {
        StoredContent::live(id, "article", json!({ "title": title, "rank": 1 }))
    }

    #[test]
    fn prop_filter_equals_ignores_case_when_asked() {
        let filters: PropFilters = serde_json::from_str(
            r#"{"condition":"AND","items":[{"field":"title","operator":"EQUALS_IC","value":"HELLO"}]}"#,
        )
        .unwrap();
        assert!(filters.matches(&json!({"title": "hello"})));
        assert!(!filters.matches(&json!({"title": "bye"})));
    }

    #[test]
    fn prop_filter_or_needs_one_match() {
        let filters: PropFilters = serde_json::from_str(
            r#"{"condition":"OR","items":[
                {"field":"title","operator":"STARTS_WITH","value":"He"},
                {"field":"rank","operator":"IN","value":[5,6]}]}"#,
        )
        .unwrap();
        assert!(filters.matches(&json!({"title": "Hello", "rank": 1})));
        assert!(filters.matches(&json!({"title": "Bye", "rank": 5})));
        assert!(!filters.matches(&json!({"title": "Bye", "rank": 1})));
    }

    #[test]
    fn visibility_window_respects_dates() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(article("a", "t").visible_at(at));
        assert!(article("a", "t").online_between(Some(before), Some(after)).visible_at(at));
        assert!(!article("a", "t").online_between(Some(after), None).visible_at(at));
        assert!(!article("a", "t").online_between(None, Some(before)).visible_at(at));
    }

    #[test]
    fn sorting_orders_by_each_key_in_turn() {
        let a = article("a", "x").with_repository("r2");
        let b = article("b", "x").with_repository("r1");
        let c = article("c", "x").with_repository("r1");
        let mut contents = vec![&a, &b, &c];
        sort_contents(&mut contents, "+repository,-publicId").unwrap();
        let ids: Vec<&str> = contents.iter().map(|c| c.public_id.as_str()).collect();
        assert_eq!(ids, ["c", "b", "a"]);
    }

    #[test]
    fn sorting_rejects_unsigned_entries() {
        let a = article("a", "x");
        let mut contents = vec![&a];
        assert!(sort_contents(&mut contents, "publicId").is_err());
    }

    #[test]
    fn stored_content_serializes_stage_lowercase() {
        let json = serde_json::to_value(StoredContent::staging("s", "page", json!({}))).unwrap();
        assert_eq!(json["stage"], "staging");
        assert_eq!(json["publicId"], "s");
    }
}
