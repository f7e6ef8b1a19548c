//! Response envelopes returned by the content-delivery API.
//!
//! Every field defaults when absent so partial payloads still decode. The
//! content payload is generic; it stays a `serde_json::Value` unless the
//! caller asks for a concrete type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single published content item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    default,
    bound(deserialize = "P: Deserialize<'de> + Default")
)]
pub struct ContentResponse<P = serde_json::Value> {
    pub public_id: String,
    pub definition: String,
    pub repository: String,
    pub payload: P,
    pub online_date: Option<DateTime<Utc>>,
    pub offline_date: Option<DateTime<Utc>>,
    pub metadata: Metadata,
    pub request_context: RequestContext,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metadata {
    pub id: i64,
    pub authoring_content_id: i64,
    pub content_version: i64,
    pub content_last_modified_date: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub published_on: Option<DateTime<Utc>>,
}

/// Where and when the server answered a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestContext {
    pub publishing_channel: String,
    pub cloud_name: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    default,
    bound(deserialize = "P: Deserialize<'de> + Default")
)]
pub struct PaginatedResponse<P = serde_json::Value> {
    pub items: Vec<ContentResponse<P>>,
    pub total: u64,
    pub skip: u64,
    pub take: u64,
    pub request_context: RequestContext,
}

// Written by hand so `P` does not need `Default` for an empty page.
impl<P> Default for PaginatedResponse<P> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            skip: 0,
            take: 0,
            request_context: RequestContext::default(),
        }
    }
}
