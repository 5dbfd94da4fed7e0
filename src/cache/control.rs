//! `Cache-Control` handling.
//!
//! Only the directives the page cache acts on are modelled: `public`,
//! `private`, `no-store`, `no-cache`, `max-age` and `s-maxage`. Everything
//! else is carried through untouched when the header is rewritten.

use std::fmt;

use axum::http::{
    HeaderMap, HeaderValue, StatusCode,
    header::{CACHE_CONTROL, CONTENT_TYPE, SET_COOKIE},
};

/// Statuses a stored response may carry.
const CACHEABLE_STATUSES: [StatusCode; 5] = [
    StatusCode::OK,
    StatusCode::NON_AUTHORITATIVE_INFORMATION,
    StatusCode::MULTIPLE_CHOICES,
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Directive {
    Public,
    /// `private`, optionally restricted to the listed fields.
    Private(Option<String>),
    NoStore,
    NoCache(Option<String>),
    MaxAge(u64),
    SharedMaxAge(u64),
    Other(String),
}

impl Directive {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Some((name, argument)) = raw.split_once('=') {
            let argument = argument.trim();
            let value = argument.trim_matches('"');
            let parsed = match name.trim().to_ascii_lowercase().as_str() {
                "max-age" => value.parse().ok().map(Directive::MaxAge),
                "s-maxage" => value.parse().ok().map(Directive::SharedMaxAge),
                "private" => Some(Directive::Private(Some(argument.to_string()))),
                "no-cache" => Some(Directive::NoCache(Some(argument.to_string()))),
                "no-store" => Some(Directive::NoStore),
                _ => None,
            };
            return Some(parsed.unwrap_or_else(|| Directive::Other(raw.to_string())));
        }

        Some(match raw.to_ascii_lowercase().as_str() {
            "public" => Directive::Public,
            "private" => Directive::Private(None),
            "no-store" => Directive::NoStore,
            "no-cache" => Directive::NoCache(None),
            _ => Directive::Other(raw.to_string()),
        })
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Public => f.write_str("public"),
            Directive::Private(None) => f.write_str("private"),
            Directive::Private(Some(fields)) => write!(f, "private={fields}"),
            Directive::NoStore => f.write_str("no-store"),
            Directive::NoCache(None) => f.write_str("no-cache"),
            Directive::NoCache(Some(fields)) => write!(f, "no-cache={fields}"),
            Directive::MaxAge(secs) => write!(f, "max-age={secs}"),
            Directive::SharedMaxAge(secs) => write!(f, "s-maxage={secs}"),
            Directive::Other(raw) => f.write_str(raw),
        }
    }
}

/// Parsed `Cache-Control` header of a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    directives: Vec<Directive>,
}

impl CacheControl {
    pub fn parse(value: &str) -> Self {
        Self {
            directives: value.split(',').filter_map(Directive::parse).collect(),
        }
    }

    /// Read every `Cache-Control` header present on `headers`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let joined = headers
            .get_all(CACHE_CONTROL)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect::<Vec<_>>()
            .join(",");
        Self::parse(&joined)
    }

    /// Replace the `Cache-Control` header(s) with this value.
    pub fn write_to(&self, headers: &mut HeaderMap) {
        if self.directives.is_empty() {
            headers.remove(CACHE_CONTROL);
            return;
        }

        if let Ok(value) = HeaderValue::from_str(&self.to_string()) {
            headers.insert(CACHE_CONTROL, value);
        }
    }

    pub fn shared_max_age(&self) -> Option<u64> {
        self.directives.iter().find_map(|d| match d {
            Directive::SharedMaxAge(secs) => Some(*secs),
            _ => None,
        })
    }

    pub fn max_age(&self) -> Option<u64> {
        self.directives.iter().find_map(|d| match d {
            Directive::MaxAge(secs) => Some(*secs),
            _ => None,
        })
    }

    pub fn has_shared_max_age(&self) -> bool {
        self.shared_max_age().is_some()
    }

    /// Lifetime a shared cache should honour: `s-maxage` wins over `max-age`.
    pub fn effective_max_age(&self) -> Option<u64> {
        self.shared_max_age().or_else(|| self.max_age())
    }

    pub fn is_no_store(&self) -> bool {
        self.directives.contains(&Directive::NoStore)
    }

    pub fn is_private(&self) -> bool {
        self.directives
            .iter()
            .any(|d| matches!(d, Directive::Private(_)))
    }

    /// Set `s-maxage`; a shared lifetime implies `public`.
    pub fn set_shared_max_age(&mut self, secs: u64) {
        self.directives
            .retain(|d| !matches!(d, Directive::SharedMaxAge(_) | Directive::Private(_)));
        if !self.directives.contains(&Directive::Public) {
            self.directives.insert(0, Directive::Public);
        }
        self.directives.push(Directive::SharedMaxAge(secs));
    }

    pub fn set_max_age(&mut self, secs: u64) {
        self.directives.retain(|d| !matches!(d, Directive::MaxAge(_)));
        self.directives.push(Directive::MaxAge(secs));
    }
}

impl fmt::Display for CacheControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, directive) in self.directives.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{directive}")?;
        }
        Ok(())
    }
}

/// Whether a finished response may be written to the shared cache.
///
/// Returns the lifetime in seconds when it may.
pub fn cacheable_lifetime(status: StatusCode, headers: &HeaderMap) -> Option<u64> {
    if !CACHEABLE_STATUSES.contains(&status) {
        return None;
    }

    if headers.contains_key(SET_COOKIE) {
        return None;
    }

    if headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"))
    {
        return None;
    }

    let control = CacheControl::from_headers(headers);
    if control.is_no_store() || control.is_private() {
        return None;
    }

    control.effective_max_age().filter(|secs| *secs > 0)
}
