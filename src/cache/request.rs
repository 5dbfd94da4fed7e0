//! The engine's view of an incoming request.

use axum::http::{HeaderMap, Method, Request, Uri, header::HOST};
use url::form_urlencoded;

const DEFAULT_SCHEME: &str = "http";
const DEFAULT_HOST: &str = "localhost";

/// Session data placed in the request extensions by upstream auth.
///
/// Only the user id is consulted: a non-zero uid marks an authenticated
/// user, whose traffic never touches the shared cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    uid: Option<u64>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { uid: Some(0) }
    }

    pub fn for_user(uid: u64) -> Self {
        Self { uid: Some(uid) }
    }

    pub fn uid(&self) -> Option<u64> {
        self.uid
    }

    pub fn is_authenticated(&self) -> bool {
        self.uid.is_some_and(|uid| uid != 0)
    }
}

#[derive(Debug, Clone)]
pub struct CacheRequest {
    method: Method,
    uri: String,
    path: String,
    session: Option<Session>,
}

impl CacheRequest {
    pub fn new(method: Method, uri: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            path: path.into(),
            session: None,
        }
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            uri: full_uri(request.uri(), request.headers()),
            path: request.uri().path().to_string(),
            session: request.extensions().get::<Session>().cloned(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Scheme, host, path and normalized query.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }
}

/// Rebuild the absolute URI a request was made for.
///
/// Query pairs are sorted by key so equivalent URLs share one entry.
pub fn full_uri(uri: &Uri, headers: &HeaderMap) -> String {
    let scheme = uri.scheme_str().unwrap_or(DEFAULT_SCHEME);
    let host = uri
        .authority()
        .map(|authority| authority.as_str().to_string())
        .or_else(|| {
            headers
                .get(HOST)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_string())
        })
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string())
        .to_ascii_lowercase();

    let mut full = format!("{scheme}://{host}{}", uri.path());
    if let Some(query) = uri.query().map(normalize_query).filter(|q| !q.is_empty()) {
        full.push('?');
        full.push_str(&query);
    }
    full
}

fn normalize_query(query: &str) -> String {
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}
