//! Online and preview channels.
//!
//! A channel pairs a publishing channel name with its access key and fixes
//! the URL shape of its calls:
//!
//! - online: `/space/{space}/online/{method}/{channel}`
//! - preview: `/space/{space}/preview/{state}/{method}/{channel}`
//!
//! Preview calls also carry `targetDate` when the client resolves one.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;

use crate::client::Client;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::options::{ContentOptions, SearchOptions};
use crate::query::{QueryValues, ToQuery};
use crate::types::{ContentResponse, PaginatedResponse};

pub const CONTENT_METHOD: &str = "content";
pub const SEARCH_METHOD: &str = "search/v2";

pub fn online_endpoint(space_id: &str, method: &str, channel: &str) -> String {
    format!("/space/{space_id}/online/{method}/{channel}")
}

pub fn preview_endpoint(space_id: &str, state: PreviewState, method: &str, channel: &str) -> String {
    format!("/space/{space_id}/preview/{state}/{method}/{channel}")
}

/// Publishing state a preview channel reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreviewState {
    Live,
    Staging,
}

impl PreviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreviewState::Live => "live",
            PreviewState::Staging => "staging",
        }
    }
}

impl fmt::Display for PreviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreviewState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "live" => Ok(PreviewState::Live),
            "staging" => Ok(PreviewState::Staging),
            other => Err(Error::Config(format!(
                "state must be either 'live' or 'staging', got {other:?}"
            ))),
        }
    }
}

/// Channel serving content that is currently live.
#[derive(Clone)]
pub struct OnlineChannel<'a> {
    client: &'a Client,
    name: String,
    api_key: String,
}

impl<'a> OnlineChannel<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &'a Client {
        self.client
    }

    /// Fetches one content item by public id.
    pub fn content(&self, ctx: &Context, opts: &ContentOptions) -> Result<ContentResponse> {
        self.content_as(ctx, opts)
    }

    /// [`content`](Self::content) with the payload decoded into `P`.
    pub fn content_as<P>(&self, ctx: &Context, opts: &ContentOptions) -> Result<ContentResponse<P>>
    where
        P: DeserializeOwned + Default,
    {
        let path = online_endpoint(self.client.space_id(), CONTENT_METHOD, &self.name);
        self.client.get(Some(ctx), &path, &self.api_key, Some(opts))
    }

    /// Runs a paginated search.
    pub fn search(&self, ctx: &Context, opts: &SearchOptions) -> Result<PaginatedResponse> {
        self.search_as(ctx, opts)
    }

    pub fn search_as<P>(&self, ctx: &Context, opts: &SearchOptions) -> Result<PaginatedResponse<P>>
    where
        P: DeserializeOwned + Default,
    {
        let path = online_endpoint(self.client.space_id(), SEARCH_METHOD, &self.name);
        self.client.get(Some(ctx), &path, &self.api_key, Some(opts))
    }
}

impl fmt::Debug for OnlineChannel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnlineChannel")
            .field("space_id", &self.client.space_id())
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Channel serving live or staging content, optionally as of a target date.
#[derive(Clone)]
pub struct PreviewChannel<'a> {
    client: &'a Client,
    name: String,
    api_key: String,
    state: PreviewState,
}

impl<'a> PreviewChannel<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PreviewState {
        self.state
    }

    pub fn client(&self) -> &'a Client {
        self.client
    }

    pub fn content(&self, ctx: &Context, opts: &ContentOptions) -> Result<ContentResponse> {
        self.content_as(ctx, opts)
    }

    pub fn content_as<P>(&self, ctx: &Context, opts: &ContentOptions) -> Result<ContentResponse<P>>
    where
        P: DeserializeOwned + Default,
    {
        let path = preview_endpoint(self.client.space_id(), self.state, CONTENT_METHOD, &self.name);
        let params = self.with_target_date(opts);
        self.client.get(Some(ctx), &path, &self.api_key, Some(&params))
    }

    pub fn search(&self, ctx: &Context, opts: &SearchOptions) -> Result<PaginatedResponse> {
        self.search_as(ctx, opts)
    }

    pub fn search_as<P>(&self, ctx: &Context, opts: &SearchOptions) -> Result<PaginatedResponse<P>>
    where
        P: DeserializeOwned + Default,
    {
        let path = preview_endpoint(self.client.space_id(), self.state, SEARCH_METHOD, &self.name);
        let params = self.with_target_date(opts);
        self.client.get(Some(ctx), &path, &self.api_key, Some(&params))
    }

    fn with_target_date<'o, O: ToQuery>(&self, options: &'o O) -> TargetDated<'o, O> {
        TargetDated {
            options,
            target_date: self.client.target_date(),
        }
    }
}

impl fmt::Debug for PreviewChannel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewChannel")
            .field("space_id", &self.client.space_id())
            .field("name", &self.name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Caller options plus the preview `targetDate` parameter.
struct TargetDated<'o, O> {
    options: &'o O,
    target_date: Option<DateTime<Utc>>,
}

impl<O: ToQuery> ToQuery for TargetDated<'_, O> {
    fn append_to(&self, values: &mut QueryValues) -> Result<()> {
        self.options.append_to(values)?;
        if let Some(date) = &self.target_date {
            values.add("targetDate", format_target_date(date));
        }
        Ok(())
    }
}

/// RFC 3339 with second precision and a `Z` suffix.
pub fn format_target_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Client {
    /// Creates an online channel. Name and key must be non-empty.
    pub fn online_channel(
        &self,
        name: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<OnlineChannel<'_>> {
        let (name, api_key) = validate_channel(name.into(), api_key.into())?;
        Ok(OnlineChannel {
            client: self,
            name,
            api_key,
        })
    }

    /// Creates a preview channel reading `state` (`"live"` or `"staging"`).
    pub fn preview_channel(
        &self,
        name: impl Into<String>,
        api_key: impl Into<String>,
        state: &str,
    ) -> Result<PreviewChannel<'_>> {
        let (name, api_key) = validate_channel(name.into(), api_key.into())?;
        let state = state.parse()?;
        Ok(PreviewChannel {
            client: self,
            name,
            api_key,
            state,
        })
    }
}

fn validate_channel(name: String, api_key: String) -> Result<(String, String)> {
    if name.is_empty() {
        return Err(Error::Config("channel name must not be empty".to_string()));
    }
    if api_key.is_empty() {
        return Err(Error::Config("channel api key must not be empty".to_string()));
    }
    Ok((name, api_key))
}
