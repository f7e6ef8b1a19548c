//! Query-string encoding for option structs.
//!
//! # Design
//! Each options type states its own parameter mapping by implementing
//! [`ToQuery`]: which name every field goes under and whether it is left out
//! at its zero value. Field types that need a non-trivial wire form implement
//! [`EncodeValues`] and contribute themselves under the key they are given.
//!
//! Keys are emitted in sorted order and repeated keys keep insertion order,
//! so the same options always produce the same URL.

use std::collections::BTreeMap;

use tracing::trace;

use crate::error::{Error, Result};

/// Ordered multi-map of query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryValues {
    inner: BTreeMap<String, Vec<String>>,
}

impl QueryValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value to `key`, keeping earlier values.
    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        self.inner
            .entry(key.to_string())
            .or_default()
            .push(value.into());
    }

    /// Replaces every value of `key` with `value`.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), vec![value.into()]);
    }

    /// Appends each value of `values` under `key`. Nothing is added for an
    /// empty slice.
    pub fn add_all<S: AsRef<str>>(&mut self, key: &str, values: &[S]) {
        for value in values {
            self.add(key, value.as_ref());
        }
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.inner.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// `application/x-www-form-urlencoded` form, keys sorted.
    pub fn encode(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, values) in &self.inner {
            for value in values {
                serializer.append_pair(key, value);
            }
        }
        serializer.finish()
    }
}

/// A value that knows how to write itself as query parameters.
pub trait ToQuery {
    fn append_to(&self, values: &mut QueryValues) -> Result<()>;
}

impl<T: ToQuery + ?Sized> ToQuery for &T {
    fn append_to(&self, values: &mut QueryValues) -> Result<()> {
        (**self).append_to(values)
    }
}

/// A field value with its own wire encoding, written under `key`.
pub trait EncodeValues {
    fn encode_values(&self, key: &str, values: &mut QueryValues) -> Result<()>;
}

/// Collects the parameters of `opts`.
pub fn query_values<T: ToQuery + ?Sized>(opts: &T) -> Result<QueryValues> {
    let mut values = QueryValues::new();
    opts.append_to(&mut values)?;
    Ok(values)
}

/// Replaces the query of `path` with the encoding of `opts`.
///
/// `None` returns `path` untouched. An empty encoding leaves no `?` behind,
/// and a fragment, if any, is kept at the end.
pub fn add_options<T: ToQuery + ?Sized>(path: &str, opts: Option<&T>) -> Result<String> {
    let Some(opts) = opts else {
        return Ok(path.to_string());
    };
    validate_path(path)?;

    let (without_fragment, fragment) = match path.split_once('#') {
        Some((p, f)) => (p, Some(f)),
        None => (path, None),
    };
    let base = without_fragment
        .split_once('?')
        .map_or(without_fragment, |(p, _)| p);

    let query = query_values(opts)?.encode();
    let mut out = String::with_capacity(base.len() + query.len() + 1);
    out.push_str(base);
    if !query.is_empty() {
        out.push('?');
        out.push_str(&query);
    }
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    trace!(path = %out, "encoded query options");
    Ok(out)
}

fn validate_path(path: &str) -> Result<()> {
    let invalid = |reason: String| Error::InvalidPath {
        path: path.to_string(),
        reason,
    };
    if path.starts_with(':') {
        return Err(invalid("missing protocol scheme".to_string()));
    }
    let bytes = path.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b if b < 0x20 || b == 0x7f => {
                return Err(invalid(format!("invalid control character 0x{b:02x}")));
            }
            b'%' => {
                let escape = bytes.get(i + 1..i + 3);
                match escape {
                    Some([h, l]) if h.is_ascii_hexdigit() && l.is_ascii_hexdigit() => i += 3,
                    _ => {
                        let end = (i + 3).min(bytes.len());
                        let seq = String::from_utf8_lossy(&bytes[i..end]);
                        return Err(invalid(format!("invalid URL escape {seq:?}")));
                    }
                }
            }
            _ => i += 1,
        }
    }
    Ok(())
}
