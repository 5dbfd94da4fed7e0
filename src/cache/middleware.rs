//! Page cache middleware.
//!
//! Serves hits before the handler runs, collects entity tags while it
//! renders, stamps freshness on the way out and persists the response on
//! a spawned task while it is handed back to the server.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use futures::stream;
use tracing::{debug, instrument, warn};

use super::engine::{CacheDecisionEngine, CompletedResponse};
use super::entry::CacheHit;
use super::request::CacheRequest;
use super::tags::{self, TagCollector};

/// Shared cache state for middleware.
#[derive(Clone, Debug)]
pub struct CacheState {
    pub engine: Arc<CacheDecisionEngine>,
}

impl CacheState {
    pub fn new(engine: Arc<CacheDecisionEngine>) -> Self {
        Self { engine }
    }
}

/// Page cache middleware, for use with `axum::middleware::from_fn_with_state`.
///
/// Handlers reach the request's [`TagCollector`] through
/// [`tags::record`] or `Extension<Arc<TagCollector>>`.
///
/// The terminate phase is spawned once the body has been buffered, just
/// before the response is handed back to the server. The store write can
/// therefore start before the last byte reaches the client; it never holds
/// up or alters the response. A body that fails while being buffered is
/// not stored and the client receives the handler's status and headers
/// with the error surfacing in the body, as it would without the cache.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn page_cache_layer(
    State(cache): State<CacheState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let engine = &cache.engine;
    let cache_request = CacheRequest::from_request(&request);

    if let Some(entry) = engine.on_incoming_request(&cache_request).await {
        return entry.into_response();
    }

    let collector = Arc::new(TagCollector::new());
    request.extensions_mut().insert(Arc::clone(&collector));
    let response = tags::scope(Arc::clone(&collector), next.run(request)).await;

    let (mut parts, body) = response.into_parts();
    engine.on_outgoing_response(&cache_request, &mut parts.headers);

    let replayed = parts.extensions.get::<CacheHit>().is_some();
    if let Err(reason) =
        engine.check_persistable(&cache_request, parts.status, &parts.headers, replayed)
    {
        debug!(
            cache = "page",
            outcome = "skipped",
            uri = %cache_request.uri(),
            reason = %reason,
            "Response not persisted"
        );
        return Response::from_parts(parts, body);
    }

    let limit = engine.config().body_limit_bytes;
    let buffer = engine.config().store
        && body
            .size_hint()
            .exact()
            .is_some_and(|len| len <= limit as u64);

    let (body, captured) = if buffer {
        match axum::body::to_bytes(body, limit).await {
            Ok(bytes) => (Body::from(bytes.clone()), Some(bytes)),
            Err(err) => {
                warn!(
                    cache = "page",
                    outcome = "skipped",
                    uri = %cache_request.uri(),
                    error = %err,
                    "Response body failed while buffering"
                );
                let failed = stream::once(async move { Err::<Bytes, _>(err) });
                return Response::from_parts(parts, Body::from_stream(failed));
            }
        }
    } else {
        (body, None)
    };

    let completed = CompletedResponse {
        status: parts.status,
        headers: parts.headers.clone(),
        body: captured,
        replayed,
    };
    let engine = Arc::clone(&cache.engine);
    tokio::spawn(async move {
        engine
            .on_request_terminated(&cache_request, completed, &collector)
            .await;
    });

    Response::from_parts(parts, body)
}
