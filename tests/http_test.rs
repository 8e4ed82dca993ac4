use std::sync::Arc;

use httpmock::prelude::*;
use swcache::cache::{Cache, CacheState, InMemoryCache};
use swcache::config::ConfigProperties;
use swcache::error::SWError;
use swcache::http::{Client, Method, Request};
use swcache::io::{HttpRunner, ResponseType};
use swcache::manifest::Manifest;
use swcache::worker::OfflineCache;

struct ConfigMock {
    origin: String,
}

impl ConfigMock {
    fn new(origin: &str) -> Self {
        ConfigMock {
            origin: origin.to_string(),
        }
    }
}

impl ConfigProperties for ConfigMock {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn cache_location(&self) -> Option<&str> {
        None
    }

    fn skip_waiting(&self) -> bool {
        true
    }
}

type TestCache = OfflineCache<InMemoryCache, Client<ConfigMock>, ConfigMock>;

fn offline_cache(origin: &str) -> TestCache {
    OfflineCache::new(
        Arc::new(InMemoryCache::default()),
        Client::new(ConfigMock::new(origin)),
        ConfigMock::new(origin),
    )
    .unwrap()
}

#[test]
fn test_http_runner_same_origin_is_basic() {
    let server = MockServer::start();
    let server_mock = server.mock(|when, then| {
        when.method(GET).path("/data.json");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"planets": 8}"#);
    });
    let runner = Client::new(ConfigMock::new(&server.base_url()));
    let response = runner
        .run(&Request::new("/data.json", Method::GET))
        .unwrap();
    assert_eq!(200, response.status);
    assert_eq!(ResponseType::Basic, response.response_type);
    assert_eq!(Some("application/json"), response.header("content-type"));
    assert_eq!(r#"{"planets": 8}"#, response.text());
    assert!(response.is_cacheable());
    server_mock.assert();
}

#[test]
fn test_http_runner_cross_origin_is_opaque() {
    let cdn = MockServer::start();
    cdn.mock(|when, then| {
        when.method(GET).path("/lib.js");
        then.status(200).body("lib");
    });
    let runner = Client::new(ConfigMock::new("http://localhost:8080"));
    let response = runner
        .run(&Request::new(&cdn.url("/lib.js"), Method::GET))
        .unwrap();
    assert_eq!(ResponseType::Opaque, response.response_type);
    assert!(!response.is_cacheable());
}

#[test]
fn test_http_runner_error_status_is_a_response() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/missing.png");
        then.status(404).body("not found");
    });
    let runner = Client::new(ConfigMock::new(&server.base_url()));
    let response = runner
        .run(&Request::new("/missing.png", Method::GET))
        .unwrap();
    assert_eq!(404, response.status);
    assert_eq!("not found", response.text());
}

#[test]
fn test_http_runner_sends_headers_and_body() {
    let server = MockServer::start();
    let server_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/feedback")
            .header("content-type", "application/json")
            .body(r#"{"stars":5}"#);
        then.status(201);
    });
    let runner = Client::new(ConfigMock::new(&server.base_url()));
    let mut request = Request::builder()
        .url("/api/feedback")
        .method(Method::POST)
        .body(br#"{"stars":5}"#.to_vec())
        .build()
        .unwrap();
    request.set_header("content-type", "application/json");
    let response = runner.run(&request).unwrap();
    assert_eq!(201, response.status);
    server_mock.assert();
}

#[test]
fn test_http_runner_server_down() {
    let runner = Client::new(ConfigMock::new("http://localhost:8091"));
    let err = runner
        .run(&Request::new("/app.js", Method::GET))
        .unwrap_err();
    match err.downcast_ref::<SWError>() {
        Some(SWError::NetworkUnavailable(_)) => {}
        _ => panic!("Expected NetworkUnavailable"),
    }
}

#[test]
fn test_resolve_server_down_is_503() {
    let cache = offline_cache("http://localhost:8091");
    let response = cache.resolve(&Request::new("/app.js", Method::GET));
    assert_eq!(503, response.status);
    assert_eq!("Service Unavailable", response.status_text);
    assert_eq!("Network error occurred", response.text());
}

#[test]
fn test_resolve_populates_cache_on_miss() {
    let server = MockServer::start();
    let precached = server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200).body("<html>home</html>");
    });
    let lazy = server.mock(|when, then| {
        when.method(GET).path("/img/mars.jpg");
        then.status(200)
            .header("content-type", "image/jpeg")
            .body("jpeg");
    });
    let cache = offline_cache(&server.base_url());
    cache.install(&Manifest::new(vec!["/"]), "v1").unwrap();

    let first = cache.resolve(&Request::new("/img/mars.jpg", Method::GET));
    cache.flush();
    let second = cache.resolve(&Request::new(&server.url("/img/mars.jpg"), Method::GET));
    assert_eq!(first, second);
    assert_eq!(Some("image/jpeg"), second.header("content-type"));
    lazy.assert_hits(1);
    precached.assert_hits(1);
}

#[test]
fn test_resolve_does_not_cache_errors_or_cross_origin() {
    let server = MockServer::start();
    let cdn = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200).body("<html>home</html>");
    });
    let missing = server.mock(|when, then| {
        when.method(GET).path("/missing.png");
        then.status(404);
    });
    let font = cdn.mock(|when, then| {
        when.method(GET).path("/font.woff2");
        then.status(200).body("font");
    });
    let cache = offline_cache(&server.base_url());
    cache.install(&Manifest::new(vec!["/"]), "v1").unwrap();

    for _ in 0..2 {
        assert_eq!(
            404,
            cache
                .resolve(&Request::new("/missing.png", Method::GET))
                .status
        );
        let response = cache.resolve(&Request::new(&cdn.url("/font.woff2"), Method::GET));
        assert_eq!(ResponseType::Opaque, response.response_type);
        cache.flush();
    }
    missing.assert_hits(2);
    font.assert_hits(2);
    assert_eq!(1, cache.storage().len("v1"));
}

#[test]
fn test_resolve_writes_always_reach_network() {
    let server = MockServer::start();
    let feedback = server.mock(|when, then| {
        when.method(POST).path("/api/feedback");
        then.status(200).body("thanks");
    });
    let cache = offline_cache(&server.base_url());
    cache.install(&Manifest::default(), "v1").unwrap();
    for _ in 0..2 {
        let response = cache.resolve(&Request::new("/api/feedback", Method::POST));
        assert_eq!("thanks", response.text());
    }
    cache.flush();
    feedback.assert_hits(2);
    assert!(cache.storage().is_empty("v1"));
}

#[test]
fn test_upgrade_from_v1_to_v2() {
    let server = MockServer::start();
    let home = server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200).body("<html>home</html>");
    });
    let app = server.mock(|when, then| {
        when.method(GET).path("/app.js");
        then.status(200).body("console.log('app')");
    });
    let data = server.mock(|when, then| {
        when.method(GET).path("/data.json");
        then.status(200).body(r#"{"earth":{}}"#);
    });
    let new_css = server.mock(|when, then| {
        when.method(GET).path("/new.css");
        then.status(200).body("h1{}");
    });
    let cache = offline_cache(&server.base_url());

    cache
        .install(&Manifest::new(vec!["/", "/app.js", "/data.json"]), "v1")
        .unwrap();
    assert_eq!(Some("v1".to_string()), cache.current_generation());
    let response = cache.resolve(&Request::new("/app.js", Method::GET));
    assert_eq!("console.log('app')", response.text());
    app.assert_hits(1);

    let v2 = Manifest::new(vec!["/", "/app.js", "/data.json", "/new.css"]);
    cache.initialize(&v2, "v2").unwrap();
    assert_eq!(Some("v1".to_string()), cache.current_generation());
    let report = cache.activate("v2").unwrap();
    assert_eq!(vec!["v1".to_string()], report.swept);
    assert_eq!(vec!["v2".to_string()], cache.storage().generations().unwrap());

    let response = cache.resolve(&Request::new("/new.css", Method::GET));
    assert_eq!("h1{}", response.text());
    new_css.assert_hits(1);
    home.assert_hits(2);
    data.assert_hits(2);
    match cache
        .storage()
        .get("v2", &Request::new("/data.json", Method::GET).key(&server.base_url()))
        .unwrap()
    {
        CacheState::Found(response) => assert_eq!(r#"{"earth":{}}"#, response.text()),
        CacheState::None => panic!("Expected /data.json in v2"),
    }
}

#[test]
fn test_offline_navigation_serves_index() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/index.html");
        then.status(200).body("<html>index</html>");
    });
    let cache = offline_cache(&server.base_url());
    cache
        .install(&Manifest::new(vec!["/index.html"]), "v1")
        .unwrap();
    // Same origin and storage, but every request is routed to a port
    // nobody listens on.
    let offline = OfflineCache::new(
        cache.storage().clone(),
        Client::new(ConfigMock::new("http://localhost:8091")),
        ConfigMock::new(&server.base_url()),
    )
    .unwrap();
    let response = offline.resolve(&Request::navigate("/planets/jupiter"));
    assert_eq!(200, response.status);
    assert_eq!("<html>index</html>", response.text());
    let response = offline.resolve(&Request::new("/planets/jupiter.png", Method::GET));
    assert_eq!(503, response.status);
}
