//! Integration tests for the mirroring engine
//!
//! These tests run the full engine against wiremock servers: fetch,
//! parse, scheduling, politeness, persistence, rewriting, and forensic
//! report emission end-to-end. Mock expectations double as fetch-count
//! assertions, so a page fetched twice fails the test on server drop.

use kagami::config::Config;
use kagami::{JobStatus, MirrorEngine, MirrorMode};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test configuration rooted under a temp dir, tuned for fast runs
fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.output.root_dir = root.to_path_buf();
    config.limits.per_host_interval_ms = 10;
    config.limits.concurrency = 4;
    config.limits.max_retries = 3;
    config.job.max_depth = 3;
    config
}

/// The directory a server's host maps to under the mirror root
fn host_dir(server: &MockServer) -> String {
    let url = Url::parse(&server.uri()).expect("server uri");
    format!(
        "{}_{}",
        url.host_str().expect("host"),
        url.port().expect("port")
    )
}

async fn mount_html(server: &MockServer, route: &str, body: String, hits: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .expect(hits)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_mirror_site_full_rewrites_and_reports() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(
        &server,
        "/",
        concat!(
            "<html><head><title>Home</title>",
            "<link rel=\"stylesheet\" href=\"/css/site.css\">",
            "</head><body>",
            "<a href=\"/about\">About</a>",
            "<img src=\"/img/logo.png\">",
            "</body></html>"
        )
        .to_string(),
        1,
    )
    .await;
    mount_html(
        &server,
        "/about",
        "<html><head><title>About</title></head><body><a href=\"/\">Home</a></body></html>"
            .to_string(),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/css/site.css"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("body { background: url(\"/img/bg.png\"); }")
                .insert_header("content-type", "text/css"),
        )
        .expect(1)
        .mount(&server)
        .await;
    for image in ["/img/logo.png", "/img/bg.png"] {
        Mock::given(method("GET"))
            .and(path(image))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0x89, 0x50, 0x4e, 0x47])
                    .insert_header("content-type", "image/png"),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let engine = MirrorEngine::new(test_config(dir.path())).unwrap();
    let summary = engine.mirror_site(&server.uri()).await.unwrap();

    assert_eq!(summary.status, JobStatus::Success);
    assert_eq!(summary.pages_mirrored, 2);
    assert_eq!(summary.assets_mirrored, 3);
    assert_eq!(summary.reports_written, 2);
    assert!(summary.bytes_written > 0);

    let host = host_dir(&server);
    let index = std::fs::read_to_string(dir.path().join(&host).join("index.html")).unwrap();
    assert!(index.contains("href=\"about/index.html\""));
    assert!(index.contains("src=\"img/logo.png\""));
    assert!(index.contains("href=\"css/site.css\""));

    // The page linking back to the seed points at the local copy
    let about = std::fs::read_to_string(dir.path().join(&host).join("about/index.html")).unwrap();
    assert!(about.contains("href=\"../index.html\""));

    // The stylesheet's own reference was rewritten relative to its location
    let css = std::fs::read_to_string(dir.path().join(&host).join("css/site.css")).unwrap();
    assert!(css.contains("url(\"../img/bg.png\")"));

    // A parseable report sits beside the page
    let report: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join(&host).join("index.html.report.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report["status"], 200);
    assert_eq!(report["structure"]["title"], "Home");
}

#[tokio::test]
async fn test_depth_bound_skips_beyond_limit() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(
        &server,
        "/",
        "<html><body><a href=\"/a\">a</a></body></html>".to_string(),
        1,
    )
    .await;
    mount_html(
        &server,
        "/a",
        "<html><body><a href=\"/b\">b</a></body></html>".to_string(),
        1,
    )
    .await;
    // Two hops from the seed: never fetched
    mount_html(&server, "/b", "<html><body>deep</body></html>".to_string(), 0).await;

    let mut config = test_config(dir.path());
    config.job.max_depth = 1;
    let engine = MirrorEngine::new(config).unwrap();
    let summary = engine.mirror_site(&server.uri()).await.unwrap();

    assert_eq!(summary.status, JobStatus::Success);
    assert_eq!(summary.pages_mirrored, 2);
    assert_eq!(summary.skipped, 1);
}

#[tokio::test]
async fn test_scope_allows_seed_host_and_allowed_hosts_only() {
    let server = MockServer::start().await;
    let partner = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(
        &server,
        "/",
        format!(
            concat!(
                "<html><body>",
                "<a href=\"{}/partner\">partner</a>",
                "<a href=\"https://outside.invalid/else\">outside</a>",
                "</body></html>"
            ),
            partner.uri()
        ),
        1,
    )
    .await;
    mount_html(
        &partner,
        "/partner",
        "<html><body>welcome</body></html>".to_string(),
        1,
    )
    .await;

    let partner_url = Url::parse(&partner.uri()).unwrap();
    let partner_key = format!(
        "{}:{}",
        partner_url.host_str().unwrap(),
        partner_url.port().unwrap()
    );

    let mut config = test_config(dir.path());
    config.job.allowed_hosts = vec![partner_key];
    let engine = MirrorEngine::new(config).unwrap();
    let summary = engine.mirror_site(&server.uri()).await.unwrap();

    // The out-of-scope host was never contacted; a fetch attempt against
    // outside.invalid would have surfaced as a failure
    assert_eq!(summary.status, JobStatus::Success);
    assert_eq!(summary.pages_mirrored, 2);
    assert_eq!(summary.skipped, 1);

    // Each host keeps its own root, and the cross-host link resolves
    let index =
        std::fs::read_to_string(dir.path().join(host_dir(&server)).join("index.html")).unwrap();
    let expected = format!("href=\"../{}/partner/index.html\"", host_dir(&partner));
    assert!(index.contains(&expected));
    assert!(dir
        .path()
        .join(host_dir(&partner))
        .join("partner/index.html")
        .exists());
}

#[tokio::test]
async fn test_politeness_spaces_same_host_dispatches() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(
        &server,
        "/",
        concat!(
            "<html><body>",
            "<a href=\"/one\">1</a>",
            "<a href=\"/two\">2</a>",
            "</body></html>"
        )
        .to_string(),
        1,
    )
    .await;
    mount_html(&server, "/one", "<html><body>1</body></html>".to_string(), 1).await;
    mount_html(&server, "/two", "<html><body>2</body></html>".to_string(), 1).await;

    let mut config = test_config(dir.path());
    config.limits.per_host_interval_ms = 200;
    let engine = MirrorEngine::new(config).unwrap();

    let started = Instant::now();
    let summary = engine.mirror_site(&server.uri()).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.pages_mirrored, 3);
    // Three dispatches to one host, at least an interval apart each
    assert!(
        elapsed >= Duration::from_millis(380),
        "dispatches were not spaced: {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_server_errors_are_retried_with_backoff() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(
        &server,
        "/",
        "<html><body><a href=\"/flaky\">f</a></body></html>".to_string(),
        1,
    )
    .await;
    // Two 503s, then the page appears
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_html(
        &server,
        "/flaky",
        "<html><body>recovered</body></html>".to_string(),
        1,
    )
    .await;

    let engine = MirrorEngine::new(test_config(dir.path())).unwrap();
    let summary = engine.mirror_site(&server.uri()).await.unwrap();

    assert_eq!(summary.status, JobStatus::Success);
    assert_eq!(summary.pages_mirrored, 2);
    assert_eq!(summary.pages_failed, 0);
}

#[tokio::test]
async fn test_client_errors_fail_without_retry() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(
        &server,
        "/",
        "<html><body><a href=\"/gone\">g</a></body></html>".to_string(),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let engine = MirrorEngine::new(test_config(dir.path())).unwrap();
    let summary = engine.mirror_site(&server.uri()).await.unwrap();

    assert_eq!(summary.status, JobStatus::PartialSuccess);
    assert_eq!(summary.pages_mirrored, 1);
    assert_eq!(summary.pages_failed, 1);
}

#[tokio::test]
async fn test_redirect_loop_fails_the_entry() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(
        &server,
        "/",
        "<html><body><a href=\"/loop\">l</a></body></html>".to_string(),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/loop2"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/loop2"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/loop"))
        .mount(&server)
        .await;

    let engine = MirrorEngine::new(test_config(dir.path())).unwrap();
    let summary = engine.mirror_site(&server.uri()).await.unwrap();

    assert_eq!(summary.status, JobStatus::PartialSuccess);
    assert_eq!(summary.pages_failed, 1);
    assert_eq!(summary.pages_mirrored, 1);
}

#[tokio::test]
async fn test_text_mode_reduces_pages_and_fetches_no_assets() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(
        &server,
        "/",
        concat!(
            "<html><head><title>T</title><style>body{color:red}</style></head><body>",
            "<nav><a href=\"/ignored\">menu</a></nav>",
            "<script>var x = 1;</script>",
            "<h1>Heading</h1><p>Body text here.</p>",
            "<img src=\"/logo.png\">",
            "</body></html>"
        )
        .to_string(),
        1,
    )
    .await;
    // Assets are never fetched in text mode
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1, 2, 3]))
        .expect(0)
        .mount(&server)
        .await;
    mount_html(
        &server,
        "/ignored",
        "<html><body>linked</body></html>".to_string(),
        1,
    )
    .await;

    let mut config = test_config(dir.path());
    config.job.mode = MirrorMode::Text;
    let engine = MirrorEngine::new(config).unwrap();
    let summary = engine.mirror_site(&server.uri()).await.unwrap();

    assert_eq!(summary.pages_mirrored, 2);
    assert_eq!(summary.assets_mirrored, 0);

    let text =
        std::fs::read_to_string(dir.path().join(host_dir(&server)).join("index.html")).unwrap();
    assert!(text.contains("Heading\nBody text here."));
    assert!(!text.contains("<h1>"));
    assert!(!text.contains("var x"));
    assert!(!text.contains("menu"));
}

#[tokio::test]
async fn test_image_mode_without_follow_links_stays_on_page() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(
        &server,
        "/",
        concat!(
            "<html><body>",
            "<a href=\"/about\">about</a>",
            "<img src=\"/logo.png\">",
            "<script src=\"/app.js\"></script>",
            "</body></html>"
        )
        .to_string(),
        1,
    )
    .await;
    mount_html(&server, "/about", "<html></html>".to_string(), 0).await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0x89, 0x50])
                .insert_header("content-type", "image/png"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/app.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x()"))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = test_config(dir.path());
    config.job.mode = MirrorMode::Image;
    config.job.follow_links = false;
    let engine = MirrorEngine::new(config).unwrap();
    let summary = engine.mirror_site(&server.uri()).await.unwrap();

    assert_eq!(summary.status, JobStatus::Success);
    assert_eq!(summary.pages_mirrored, 0);
    assert_eq!(summary.traversed, 1);
    assert_eq!(summary.assets_mirrored, 1);

    let host = host_dir(&server);
    assert!(dir.path().join(&host).join("logo.png").exists());
    assert!(!dir.path().join(&host).join("index.html").exists());
}

#[tokio::test]
async fn test_mirror_page_bounds_to_the_page_and_its_assets() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(
        &server,
        "/",
        concat!(
            "<html><head><title>Solo</title></head><body>",
            "<a href=\"/about\">about</a>",
            "<img src=\"/logo.png\">",
            "</body></html>"
        )
        .to_string(),
        1,
    )
    .await;
    mount_html(&server, "/about", "<html></html>".to_string(), 0).await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0x89, 0x50])
                .insert_header("content-type", "image/png"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let engine = MirrorEngine::new(test_config(dir.path())).unwrap();
    let result = engine.mirror_page(&server.uri()).await.unwrap();

    assert_eq!(result.status, JobStatus::Success);
    assert_eq!(result.assets_mirrored, 1);
    assert_eq!(result.assets_failed, 0);

    let document = result.document_path.expect("page persisted");
    assert!(dir.path().join(&document).exists());
    let report = result.report_path.expect("report written");
    assert!(dir.path().join(&report).exists());
}

#[tokio::test]
async fn test_cancellation_stops_new_dispatches() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let mut body = String::from("<html><body>");
    for i in 0..4 {
        body.push_str(&format!("<a href=\"/page{}\">p</a>", i));
    }
    body.push_str("</body></html>");
    mount_html(&server, "/", body, 1).await;
    for i in 0..4 {
        // Queued behind a long politeness interval, then cancelled
        mount_html(
            &server,
            &format!("/page{}", i),
            "<html></html>".to_string(),
            0,
        )
        .await;
    }

    let mut config = test_config(dir.path());
    config.limits.concurrency = 1;
    config.limits.per_host_concurrency = 1;
    config.limits.per_host_interval_ms = 30_000;
    let engine = MirrorEngine::new(config).unwrap();

    let mut job = engine.start_site(&server.uri()).await.unwrap();
    let handle = job.handle();

    let first = job.next_event().await.expect("seed event");
    assert_eq!(first.url, format!("{}/", server.uri()));
    handle.cancel();

    while job.next_event().await.is_some() {}
    let summary = job.finish().await.unwrap();

    assert_eq!(summary.status, JobStatus::Cancelled);
    assert_eq!(summary.pages_mirrored, 1);
    assert_eq!(summary.cancelled, 4);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(
        &server,
        "/",
        "<html><body><a href=\"/about\">about</a></body></html>".to_string(),
        2,
    )
    .await;
    mount_html(&server, "/about", "<html><body>i</body></html>".to_string(), 2).await;

    let first = MirrorEngine::new(test_config(dir.path()))
        .unwrap()
        .mirror_site(&server.uri())
        .await
        .unwrap();
    let index_path = dir.path().join(host_dir(&server)).join("index.html");
    let after_first = std::fs::read_to_string(&index_path).unwrap();

    let second = MirrorEngine::new(test_config(dir.path()))
        .unwrap()
        .mirror_site(&server.uri())
        .await
        .unwrap();
    let after_second = std::fs::read_to_string(&index_path).unwrap();

    assert_eq!(first.pages_mirrored, second.pages_mirrored);
    assert_eq!(after_first, after_second);

    // Same layout both times: no duplicate or suffixed files appeared
    let entries: Vec<_> = std::fs::read_dir(dir.path().join(host_dir(&server)))
        .unwrap()
        .collect();
    // index.html, its report, and the about/ directory
    assert_eq!(entries.len(), 3);
}

#[tokio::test]
async fn test_query_variants_map_to_distinct_files() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(
        &server,
        "/",
        concat!(
            "<html><body>",
            "<a href=\"/item?id=1\">one</a>",
            "<a href=\"/item?id=2\">two</a>",
            "</body></html>"
        )
        .to_string(),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/item"))
        .and(query_param("id", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>first</body></html>")
                .insert_header("content-type", "text/html"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item"))
        .and(query_param("id", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>second</body></html>")
                .insert_header("content-type", "text/html"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let engine = MirrorEngine::new(test_config(dir.path())).unwrap();
    let summary = engine.mirror_site(&server.uri()).await.unwrap();

    assert_eq!(summary.pages_mirrored, 3);
    let host = host_dir(&server);
    let first = std::fs::read_to_string(dir.path().join(&host).join("item@id=1")).unwrap();
    let second = std::fs::read_to_string(dir.path().join(&host).join("item@id=2")).unwrap();
    assert!(first.contains("first"));
    assert!(second.contains("second"));
}

#[tokio::test]
async fn test_forensic_profile_writes_nothing_to_disk() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(concat!(
                    "<html><head><title>Login</title>",
                    "<meta name=\"generator\" content=\"shopfront 2.1\">",
                    "</head><body>",
                    "<form action=\"/session\" method=\"POST\">",
                    "<input name=\"user\"><input name=\"pass\" type=\"password\">",
                    "<input type=\"hidden\" name=\"csrf\" value=\"t\">",
                    "</form>",
                    "<script src=\"/js/app.js\"></script>",
                    "</body></html>"
                ))
                .insert_header("content-type", "text/html")
                .insert_header("server", "nginx/1.24")
                .insert_header("x-powered-by", "PHP/8.2")
                .insert_header("strict-transport-security", "max-age=63072000")
                .append_header("set-cookie", "sid=abc; Secure; HttpOnly")
                .append_header("set-cookie", "theme=dark"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let engine = MirrorEngine::new(test_config(dir.path())).unwrap();
    let report = engine
        .extract_forensic_report(&format!("{}/login", server.uri()))
        .await
        .unwrap();

    assert_eq!(report.status, 200);
    assert_eq!(report.server.as_deref(), Some("nginx/1.24"));
    assert_eq!(report.powered_by.as_deref(), Some("PHP/8.2"));
    assert!(report.security_headers.strict_transport_security);
    assert!(!report.security_headers.x_frame_options);

    assert_eq!(report.cookies.len(), 2);
    assert!(report.cookies[0].secure);
    assert!(report.cookies[0].http_only);
    assert!(!report.cookies[1].secure);

    assert_eq!(report.forms.len(), 1);
    assert_eq!(report.forms[0].method, "post");
    assert_eq!(report.forms[0].hidden_input_count, 1);
    assert_eq!(report.script_sources.len(), 1);
    assert_eq!(report.meta_tags[0].name, "generator");
    assert_eq!(report.structure.title.as_deref(), Some("Login"));

    // The standalone operation leaves the output root untouched
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
