//! Blocking client for the ContentChef content-delivery API.
//!
//! # Overview
//! A [`Client`] is configured once with a base URL and a space id. Channels
//! created from it ([`OnlineChannel`], [`PreviewChannel`]) fetch single
//! content items or paginated search results.
//!
//! # Design
//! - Options types map their fields to query parameters explicitly through
//!   [`ToQuery`]; sorting and property filters encode themselves through
//!   [`EncodeValues`].
//! - Every call is one stateless round trip under a caller-supplied
//!   [`Context`]. Non-2xx responses become [`ApiError`]s; nothing is retried.
//! - I/O is isolated behind [`Transport`], with [`UreqTransport`] as the
//!   default.
//!
//! ```no_run
//! use contentchef_core::{Client, ClientOptions, ContentOptions, Context};
//!
//! let client = Client::new(ClientOptions::new("https://api.contentchef.io/", "my-space"))?;
//! let channel = client.online_channel("website", "api-key")?;
//! let home = channel.content(&Context::background(), &ContentOptions::new("home"))?;
//! println!("{}", home.payload);
//! # Ok::<(), contentchef_core::Error>(())
//! ```

pub mod channel;
pub mod client;
pub mod context;
pub mod error;
pub mod http;
pub mod options;
pub mod query;
pub mod transport;
pub mod types;

pub use channel::{OnlineChannel, PreviewChannel, PreviewState};
pub use client::{Client, ClientOptions, TargetDateResolver, API_KEY_HEADER, USER_AGENT};
pub use context::Context;
pub use error::{ApiError, ContextError, Error, Result, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use options::{
    Condition, ContentOptions, Operator, PropFilterItem, PropFilters, SearchOptions, Sorting,
    SortingField,
};
pub use query::{add_options, EncodeValues, QueryValues, ToQuery};
pub use transport::{Transport, UreqTransport};
pub use types::{ContentResponse, Metadata, PaginatedResponse, RequestContext};
