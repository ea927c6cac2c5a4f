// tests/endpoint_resolver.rs
// Endpoint discovery, cached resolution and the sequential-ID fallback.

use listing_watch::discovery::{
    DiscoveryTarget, EndpointResolver, Resolution, META_ENDPOINT, META_LAST_ID, META_RESOLVED_AT,
    META_SHAPE,
};
use listing_watch::{RunContext, Settings, SourceMeta};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ctx(probe_budget: u32) -> RunContext {
    let s = Settings {
        probe_budget,
        ..Settings::default().without_delays()
    };
    RunContext::from_settings(s).unwrap()
}

fn resolver(server: &MockServer) -> EndpointResolver {
    let target = DiscoveryTarget::new(
        "app",
        &format!("{}/", server.uri()),
        &format!("{}/annonce/{{id}}", server.uri()),
        &[],
    )
    .unwrap();
    EndpointResolver::new(target)
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body.to_string())
}

fn detail(title: &str) -> ResponseTemplate {
    html(&format!(
        r#"<html><head><meta property="og:title" content="{title}"></head><body></body></html>"#
    ))
}

#[tokio::test]
async fn endpoint_is_discovered_from_bundle_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<html><head><script src="/static/app.js"></script></head></html>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/static/app.js"))
        .respond_with(html(r#"const u="/api/listings?sort=new";fetch('/api/auth/me');"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/listings"))
        .and(query_param("page", "1"))
        .and(query_param("size", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 1,
            "data": [{"id": 11, "title": "Boulangerie", "city": "Namur", "url": "/annonce/11"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/listings"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let ctx = ctx(25);
    let mut r = resolver(&server);
    let mut meta = SourceMeta::new();

    let items = r.fetch_page(&ctx, &mut meta, 1).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Boulangerie");
    assert_eq!(items[0].url, format!("{}/annonce/11", server.uri()));
    assert_eq!(items[0].key(), "app:11");
    assert_eq!(items[0].attr("location"), Some("Namur"));

    assert_eq!(
        meta.get(META_ENDPOINT).map(String::as_str),
        Some(format!("{}/api/listings", server.uri()).as_str())
    );
    assert_eq!(meta.get(META_SHAPE).map(String::as_str), Some("page_size_1"));
    assert!(meta.contains_key(META_RESOLVED_AT));
    assert!(matches!(r.state(), Resolution::Resolved(_)));

    assert!(r.fetch_page(&ctx, &mut meta, 2).await.unwrap().is_empty());
}

#[tokio::test]
async fn cached_resolution_skips_discovery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/search"))
        .and(query_param("offset", "0"))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 70, "title": "Tabac presse"}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/search"))
        .and(query_param("offset", "20"))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"uuid": "a-1", "name": "Pressing", "link": "/annonce/71"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let mut meta = SourceMeta::from([
        (META_ENDPOINT.to_string(), format!("{}/v2/search", server.uri())),
        (META_SHAPE.to_string(), "offset_limit".to_string()),
    ]);
    let mut r = resolver(&server);
    let ctx = ctx(25);
    let items = r.fetch_page(&ctx, &mut meta, 1).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].url, format!("{}/annonce/70", server.uri()));

    let items = r.fetch_page(&ctx, &mut meta, 2).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].key(), "app:a-1");
}

#[tokio::test]
async fn dead_cached_endpoint_falls_back_to_id_probe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<a href=/annonce/480>x</a> <a href=/annonce/500>y</a>"))
        .mount(&server)
        .await;

    let mut meta = SourceMeta::from([
        (META_ENDPOINT.to_string(), format!("{}/api/gone", server.uri())),
        (META_SHAPE.to_string(), "page_size_1".to_string()),
        (META_RESOLVED_AT.to_string(), "2026-01-01T00:00:00Z".to_string()),
    ]);
    let mut r = resolver(&server);
    let items = r.fetch_page(&ctx(25), &mut meta, 1).await.unwrap();

    assert!(items.is_empty());
    assert_eq!(*r.state(), Resolution::IdProbe);
    assert!(!meta.contains_key(META_ENDPOINT));
    assert!(!meta.contains_key(META_SHAPE));
    assert!(!meta.contains_key(META_RESOLVED_AT));
    assert_eq!(meta.get(META_LAST_ID).map(String::as_str), Some("500"));
}

#[tokio::test]
async fn throttled_cached_endpoint_is_kept_for_next_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<a href=/annonce/10>x</a>"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/listings"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let ctx = RunContext::from_settings(Settings {
        http_max_retries: 1,
        ..Settings::default().without_delays()
    })
    .unwrap();
    let cached = SourceMeta::from([
        (META_ENDPOINT.to_string(), format!("{}/api/listings", server.uri())),
        (META_SHAPE.to_string(), "page_size_1".to_string()),
        (META_RESOLVED_AT.to_string(), "2026-01-01T00:00:00Z".to_string()),
    ]);
    let mut meta = cached.clone();
    let mut r = resolver(&server);

    assert!(r.fetch_page(&ctx, &mut meta, 1).await.is_err());
    assert_eq!(meta, cached);
    assert!(!meta.contains_key(META_LAST_ID));
    assert!(matches!(r.state(), Resolution::Resolved(_)));
}

#[tokio::test]
async fn sequential_ids_are_seeded_then_probed_up_to_new_max() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<a href=/annonce/498>a</a><a href=/annonce/500>b</a>"))
        .mount(&server)
        .await;

    let ctx = ctx(25);
    let mut meta = SourceMeta::new();

    // first run: remember the max, emit nothing
    let items = resolver(&server).fetch_page(&ctx, &mut meta, 1).await.unwrap();
    assert!(items.is_empty());
    assert_eq!(meta.get(META_LAST_ID).map(String::as_str), Some("500"));

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<a href=/annonce/505>new</a>"))
        .mount(&server)
        .await;
    for (id, title) in [(501, "Fleuriste"), (502, "Opticien"), (504, "Bijouterie"), (505, "Cordonnerie")] {
        Mock::given(method("GET"))
            .and(path(format!("/annonce/{id}")))
            .respond_with(detail(title))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/annonce/503"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    for id in [499, 500, 506] {
        Mock::given(method("GET"))
            .and(path(format!("/annonce/{id}")))
            .respond_with(detail("never"))
            .expect(0)
            .mount(&server)
            .await;
    }

    // second run: 501..=505, the 404 is skipped
    let mut r = resolver(&server);
    let items = r.fetch_page(&ctx, &mut meta, 1).await.unwrap();
    let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["Fleuriste", "Opticien", "Bijouterie", "Cordonnerie"]);
    assert_eq!(items[0].key(), "app:501");
    assert_eq!(meta.get(META_LAST_ID).map(String::as_str), Some("505"));

    // later pages of an id-probe run are empty
    assert!(r.fetch_page(&ctx, &mut meta, 2).await.unwrap().is_empty());
}

#[tokio::test]
async fn probe_budget_bounds_one_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<a href=/annonce/510>x</a>"))
        .mount(&server)
        .await;

    let mut meta = SourceMeta::from([(META_LAST_ID.to_string(), "500".to_string())]);
    let items = resolver(&server)
        .fetch_page(&ctx(3), &mut meta, 1)
        .await
        .unwrap();
    // 501..=503 all 404
    assert!(items.is_empty());
    assert_eq!(meta.get(META_LAST_ID).map(String::as_str), Some("503"));

    let requests = server.received_requests().await.unwrap();
    let probed: Vec<String> = requests
        .iter()
        .map(|r| r.url.path().to_string())
        .filter(|p| p.starts_with("/annonce/"))
        .collect();
    assert_eq!(probed, vec!["/annonce/501", "/annonce/502", "/annonce/503"]);
}
