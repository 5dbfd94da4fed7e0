use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::Path,
    http::{
        Method, Request, StatusCode,
        header::{CACHE_CONTROL, SET_COOKIE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use http_body_util::BodyExt;
use pagecache::cache::{
    CacheConfig, CacheEntry, CacheStore, Directive, FreshnessRules, MemoryCacheStore, PageCache,
    Session, StoreError, TagSet, page_cache_layer, tags,
};
use tower::ServiceExt;

fn news_rules() -> FreshnessRules {
    FreshnessRules::compile([
        ("^/news/archive", Directive::shared(3600)),
        ("^/news", Directive::new(Some(600), Some(60))),
    ])
    .expect("rules compile")
}

fn config() -> CacheConfig {
    CacheConfig::enabled().with_rules(news_rules())
}

struct Site {
    app: Router,
    renders: Arc<AtomicUsize>,
    store: Arc<MemoryCacheStore>,
    cache: PageCache,
}

fn site(config: CacheConfig) -> Site {
    let store = Arc::new(MemoryCacheStore::new(&config));
    let cache = PageCache::with_store(config, store.clone());
    let renders = Arc::new(AtomicUsize::new(0));

    let article_renders = Arc::clone(&renders);
    let pinned_renders = Arc::clone(&renders);
    let app = Router::new()
        .route(
            "/news/{id}",
            get(move |Path(id): Path<i64>| {
                let renders = Arc::clone(&article_renders);
                async move {
                    let n = renders.fetch_add(1, Ordering::SeqCst) + 1;
                    tags::record("node", id);
                    format!("article {id} render {n}")
                }
            }),
        )
        .route(
            "/pinned",
            get(move || {
                let renders = Arc::clone(&pinned_renders);
                async move {
                    renders.fetch_add(1, Ordering::SeqCst);
                    ([(CACHE_CONTROL, "public, s-maxage=30")], "pinned")
                }
            }),
        )
        .route(
            "/news/broken/page",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/news/private/page",
            get(|| async { ([(CACHE_CONTROL, "no-store")], "secret") }),
        )
        .route(
            "/news/login/page",
            get(|| async { ([(SET_COOKIE, "sid=abc")], "welcome") }),
        )
        .layer(middleware::from_fn_with_state(cache.state(), page_cache_layer));

    Site {
        app,
        renders,
        store,
        cache,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (Response, String) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let (parts, body) = response.into_parts();
    let bytes = body.collect().await.expect("body").to_bytes();
    let text = String::from_utf8(bytes.to_vec()).expect("utf8 body");
    (Response::from_parts(parts, Body::empty()), text)
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

async fn wait_for_entries(store: &MemoryCacheStore, expected: usize) {
    for _ in 0..100 {
        if store.len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {expected} cached entries, found {}", store.len());
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn second_request_is_served_without_rendering() {
    let site = site(config());

    let (first, first_body) = send(&site.app, get_request("/news/7")).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first_body, "article 7 render 1");
    assert_eq!(
        first.headers()[CACHE_CONTROL].to_str().expect("ascii"),
        "public, s-maxage=600, max-age=60"
    );

    wait_for_entries(&site.store, 1).await;
    assert_eq!(site.store.keys_for_tag("node:7").len(), 1);

    let (second, second_body) = send(&site.app, get_request("/news/7")).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second_body, "article 7 render 1");
    assert_eq!(
        second.headers()[CACHE_CONTROL].to_str().expect("ascii"),
        "public, s-maxage=600, max-age=60"
    );
    assert_eq!(site.renders.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn query_order_does_not_split_entries() {
    let site = site(config());

    send(&site.app, get_request("/news/3?b=2&a=1")).await;
    wait_for_entries(&site.store, 1).await;

    let (_, body) = send(&site.app, get_request("/news/3?a=1&b=2")).await;
    assert_eq!(body, "article 3 render 1");
    assert_eq!(site.renders.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn explicit_shared_max_age_is_kept() {
    let site = site(config().with_rules(
        FreshnessRules::compile([("^/", Directive::shared(600))]).expect("rules compile"),
    ));

    let (response, _) = send(&site.app, get_request("/pinned")).await;
    assert_eq!(
        response.headers()[CACHE_CONTROL].to_str().expect("ascii"),
        "public, s-maxage=30"
    );

    wait_for_entries(&site.store, 1).await;
    let entry = site
        .store
        .get("http://localhost/pinned", "GET")
        .await
        .expect("stored");
    let ttl = entry.expires_at - time::OffsetDateTime::now_utc();
    assert!(ttl.whole_seconds() <= 30, "ttl was {ttl}");
}

#[tokio::test]
async fn uncacheable_responses_are_not_persisted() {
    let site = site(config());

    for uri in ["/news/broken/page", "/news/private/page", "/news/login/page"] {
        send(&site.app, get_request(uri)).await;
    }
    settle().await;

    assert!(site.store.is_empty());
}

#[tokio::test]
async fn invalidation_forces_a_fresh_render() {
    let site = site(config());

    send(&site.app, get_request("/news/1")).await;
    send(&site.app, get_request("/news/2")).await;
    wait_for_entries(&site.store, 2).await;

    let report = site
        .cache
        .trigger()
        .entity_updated("node", 1)
        .await
        .expect("tags enabled");
    assert_eq!(report.removed, 1);

    let (_, body) = send(&site.app, get_request("/news/1")).await;
    assert_eq!(body, "article 1 render 3");

    let (_, body) = send(&site.app, get_request("/news/2")).await;
    assert_eq!(body, "article 2 render 2");
    assert_eq!(site.renders.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn head_and_get_are_cached_separately() {
    let site = site(config());

    let head = Request::builder()
        .method(Method::HEAD)
        .uri("/news/9")
        .body(Body::empty())
        .expect("request should build");
    let (response, body) = send(&site.app, head).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body.is_empty());
    wait_for_entries(&site.store, 1).await;

    let (_, body) = send(&site.app, get_request("/news/9")).await;
    assert_eq!(body, "article 9 render 2");
    wait_for_entries(&site.store, 2).await;

    assert_eq!(site.store.keys_for_tag("node:9").len(), 2);
}

#[tokio::test]
async fn disabled_cache_renders_every_time() {
    let site = site(CacheConfig::default().with_rules(news_rules()));

    send(&site.app, get_request("/news/4")).await;
    let (response, body) = send(&site.app, get_request("/news/4")).await;
    settle().await;

    assert_eq!(body, "article 4 render 2");
    assert_eq!(
        response.headers()[CACHE_CONTROL].to_str().expect("ascii"),
        "public, s-maxage=600, max-age=60"
    );
    assert!(site.store.is_empty());
}

#[derive(Default)]
struct CountingStore {
    calls: AtomicUsize,
}

#[async_trait]
impl CacheStore for CountingStore {
    async fn get(&self, uri: &str, method: &str) -> Result<CacheEntry, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::not_found(method, uri))
    }

    async fn set(&self, _entry: CacheEntry, _tags: TagSet) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn invalidate_by_tag(&self, _tag: &str) -> Result<usize, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

#[tokio::test]
async fn authenticated_session_bypasses_the_store() {
    let store = Arc::new(CountingStore::default());
    let cache = PageCache::with_store(config(), store.clone());
    let app = Router::new()
        .route(
            "/news/{id}",
            get(|Path(id): Path<i64>| async move {
                tags::record("node", id);
                format!("hello user, article {id}").into_response()
            }),
        )
        .layer(middleware::from_fn_with_state(cache.state(), page_cache_layer));

    let request = Request::builder()
        .uri("/news/5")
        .extension(Session::for_user(42))
        .body(Body::empty())
        .expect("request should build");
    let (response, body) = send(&app, request).await;
    settle().await;

    assert_eq!(body, "hello user, article 5");
    assert!(response.headers().get(CACHE_CONTROL).is_none());
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);

    let anonymous = Request::builder()
        .uri("/news/5")
        .extension(Session::anonymous())
        .body(Body::empty())
        .expect("request should build");
    send(&app, anonymous).await;
    settle().await;

    // lookup + persist
    assert_eq!(store.calls.load(Ordering::SeqCst), 2);
}
