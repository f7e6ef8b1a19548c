//! Request construction and response normalization shared by every API call.
//!
//! # Design
//! `Client` holds only configuration: the base URL, the space id, the
//! transport and the preview target date. Each call builds an
//! [`HttpRequest`], hands it to the transport under the caller's
//! [`Context`], then either classifies a non-2xx response into an
//! [`ApiError`] or decodes the body. Nothing is cached or retried.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::context::Context;
use crate::error::{ApiError, Error, Result, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::query::{add_options, ToQuery};
use crate::transport::{Transport, UreqTransport};

pub const USER_AGENT: &str = concat!("contentchef-rs/", env!("CARGO_PKG_VERSION"));

/// Header carrying the channel access key.
pub const API_KEY_HEADER: &str = "X-SPACE-D-API-Key";

const MEDIA_TYPE: &str = "application/json";

pub const ENV_BASE_URL: &str = "CONTENTCHEF_BASE_URL";
pub const ENV_SPACE_ID: &str = "CONTENTCHEF_SPACE_ID";
pub const ENV_TARGET_DATE: &str = "CONTENTCHEF_TARGET_DATE";

/// Produces the target date for preview calls at request time.
pub type TargetDateResolver = Arc<dyn Fn() -> Option<DateTime<Utc>> + Send + Sync>;

/// Configuration accepted by [`Client::new`].
#[derive(Clone)]
pub struct ClientOptions {
    /// Absolute base URL of the ContentChef instance.
    pub base_url: String,
    pub space_id: String,
    /// Defaults to [`UreqTransport`].
    pub transport: Option<Arc<dyn Transport>>,
    /// Fixed target date for preview calls. Takes precedence over the resolver.
    pub target_date: Option<DateTime<Utc>>,
    pub target_date_resolver: Option<TargetDateResolver>,
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>, space_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            space_id: space_id.into(),
            transport: None,
            target_date: None,
            target_date_resolver: None,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_target_date(mut self, target_date: DateTime<Utc>) -> Self {
        self.target_date = Some(target_date);
        self
    }

    pub fn with_target_date_resolver(
        mut self,
        resolver: impl Fn() -> Option<DateTime<Utc>> + Send + Sync + 'static,
    ) -> Self {
        self.target_date_resolver = Some(Arc::new(resolver));
        self
    }

    /// Reads `CONTENTCHEF_BASE_URL`, `CONTENTCHEF_SPACE_ID` and the optional
    /// `CONTENTCHEF_TARGET_DATE` (RFC 3339) from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a caller-supplied lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Config(format!("{key} is not set")))
        };
        let mut options = Self::new(required(ENV_BASE_URL)?, required(ENV_SPACE_ID)?);
        if let Some(raw) = lookup(ENV_TARGET_DATE).filter(|v| !v.is_empty()) {
            let parsed = DateTime::parse_from_rfc3339(&raw)
                .map_err(|e| Error::Config(format!("{ENV_TARGET_DATE} {raw:?}: {e}")))?;
            options.target_date = Some(parsed.with_timezone(&Utc));
        }
        Ok(options)
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("base_url", &self.base_url)
            .field("space_id", &self.space_id)
            .field("transport", &self.transport)
            .field("target_date", &self.target_date)
            .field("target_date_resolver", &self.target_date_resolver.is_some())
            .finish()
    }
}

/// Client for one ContentChef space.
#[derive(Clone)]
pub struct Client {
    base_url: Url,
    space_id: String,
    transport: Arc<dyn Transport>,
    target_date: Option<DateTime<Utc>>,
    target_date_resolver: Option<TargetDateResolver>,
}

impl Client {
    /// Validates `options` and builds a client.
    ///
    /// Fails with [`Error::Config`] when the base URL is not absolute or the
    /// space id is empty.
    pub fn new(options: ClientOptions) -> Result<Self> {
        let base_url = Url::parse(&options.base_url)
            .map_err(|e| Error::Config(format!("invalid base URL {:?}: {e}", options.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "base URL {:?} cannot be used to resolve paths",
                options.base_url
            )));
        }
        if options.space_id.is_empty() {
            return Err(Error::Config("space id must be set".to_string()));
        }
        let transport = options
            .transport
            .unwrap_or_else(|| Arc::new(UreqTransport::new()));
        Ok(Self {
            base_url,
            space_id: options.space_id,
            transport,
            target_date: options.target_date,
            target_date_resolver: options.target_date_resolver,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn space_id(&self) -> &str {
        &self.space_id
    }

    /// Target date for preview calls: the fixed date if configured,
    /// otherwise whatever the resolver returns.
    pub fn target_date(&self) -> Option<DateTime<Utc>> {
        self.target_date
            .or_else(|| self.target_date_resolver.as_ref().and_then(|resolve| resolve()))
    }

    /// Builds a request for `path` resolved against the base URL.
    ///
    /// A body is serialized as JSON and marks the request
    /// `Content-Type: application/json`.
    pub fn new_request<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
    ) -> Result<HttpRequest> {
        let url = self.base_url.join(path).map_err(|e| Error::InvalidPath {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        let mut headers = Vec::with_capacity(3);
        let body = match body {
            Some(body) => {
                let json = serde_json::to_string(body).map_err(|e| Error::Encode(e.to_string()))?;
                headers.push(("Content-Type".to_string(), MEDIA_TYPE.to_string()));
                Some(json)
            }
            None => None,
        };
        headers.push(("Accept".to_string(), MEDIA_TYPE.to_string()));
        headers.push(("User-Agent".to_string(), USER_AGENT.to_string()));

        Ok(HttpRequest {
            method,
            url: url.into(),
            headers,
            body,
        })
    }

    /// Executes `request` and classifies the status.
    ///
    /// The context is mandatory: `None` fails with [`Error::MissingContext`]
    /// before the transport is touched. When the transport fails while the
    /// context is done, the context's error is reported instead. A response
    /// that arrives after the context was cancelled is discarded the same way.
    pub fn send(&self, ctx: Option<&Context>, request: &HttpRequest) -> Result<HttpResponse> {
        let ctx = ctx.ok_or(Error::MissingContext)?;
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        debug!(method = %request.method, url = %request.url, "sending request");
        let outcome = self.transport.execute(request, ctx);
        if let Some(ctx_err) = ctx.err() {
            return Err(ctx_err.into());
        }
        let response = outcome?;

        if let Err(err) = check_response(request, &response) {
            warn!(status = err.status, url = %err.url, "request rejected");
            return Err(err.into());
        }
        debug!(status = response.status, bytes = response.body.len(), "request succeeded");
        Ok(response)
    }

    /// Executes `request` and decodes the JSON body into `T`.
    ///
    /// An empty body decodes to `T::default()`.
    pub fn fetch<T: DeserializeOwned + Default>(
        &self,
        ctx: Option<&Context>,
        request: &HttpRequest,
    ) -> Result<T> {
        let response = self.send(ctx, request)?;
        decode_body(&response.body)
    }

    /// Executes `request` and copies the body verbatim into `sink`,
    /// returning the number of bytes written.
    pub fn fetch_raw<W: Write + ?Sized>(
        &self,
        ctx: Option<&Context>,
        request: &HttpRequest,
        sink: &mut W,
    ) -> Result<u64> {
        let response = self.send(ctx, request)?;
        sink.write_all(&response.body)
            .map_err(|e| Error::Transport(TransportError::Io(e)))?;
        Ok(response.body.len() as u64)
    }

    /// Authenticated GET of `path` with `opts` encoded as the query.
    pub fn get<O, T>(
        &self,
        ctx: Option<&Context>,
        path: &str,
        api_key: &str,
        opts: Option<&O>,
    ) -> Result<T>
    where
        O: ToQuery + ?Sized,
        T: DeserializeOwned + Default,
    {
        let path = add_options(path, opts)?;
        let mut request = self.new_request::<()>(HttpMethod::Get, &path, None)?;
        request.set_header(API_KEY_HEADER, api_key);
        self.fetch(ctx, &request)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_str())
            .field("space_id", &self.space_id)
            .field("transport", &self.transport)
            .field("target_date", &self.target_date)
            .finish_non_exhaustive()
    }
}

/// Maps a non-2xx response to an [`ApiError`].
///
/// The message comes from a JSON body's `message` field; a body that is not
/// JSON is used verbatim.
pub fn check_response(request: &HttpRequest, response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError {
        method: request.method,
        url: request.url.clone(),
        status: response.status,
        message: error_message(&response.body),
    })
}

fn error_message(body: &[u8]) -> String {
    if body.is_empty() {
        return String::new();
    }
    let raw = || String::from_utf8_lossy(body).into_owned();
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(fields)) => match message_field(&fields) {
            Some(serde_json::Value::String(message)) => message.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(_) => raw(),
        },
        Ok(serde_json::Value::Null) => String::new(),
        _ => raw(),
    }
}

/// The `message` field, preferring an exact key over a case-insensitive one.
fn message_field(
    fields: &serde_json::Map<String, serde_json::Value>,
) -> Option<&serde_json::Value> {
    fields.get("message").or_else(|| {
        fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("message"))
            .map(|(_, value)| value)
    })
}

/// Decodes the first JSON value in `body`; anything after it is ignored.
fn decode_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    match serde_json::Deserializer::from_slice(body).into_iter::<T>().next() {
        Some(decoded) => decoded.map_err(Error::Decode),
        None => Ok(T::default()),
    }
}
