//! Admin API integration tests
//!
//! Token middleware, course management, and the multipart upload path
//! from archive bytes through to served content.

use std::io::Write;
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::util::ServiceExt;
use zip::write::FileOptions;
use zip::ZipWriter;

use coursegate::server::{app, AppState, ServerConfig};
use coursegate::{ContentStore, Course, CourseId, CourseStore, StaticOracle};

const TOKEN: &str = "sekrit";
const BOUNDARY: &str = "cgtestboundary";

struct TestServer {
    router: Router,
    courses: CourseStore,
    _content: TempDir,
}

async fn test_server(admin_token: Option<&str>) -> TestServer {
    let content = TempDir::new().unwrap();
    let courses = CourseStore::open_in_memory().unwrap();

    let state = AppState::new(
        ServerConfig {
            public_url: "https://courses.example.com".to_string(),
            purchase_url_template: None,
            admin_token: admin_token.map(str::to_string),
        },
        ContentStore::new(content.path()),
        courses.clone(),
        Arc::new(StaticOracle::new()),
    );

    TestServer {
        router: app(state),
        courses,
        _content: content,
    }
}

fn authed(builder: axum::http::request::Builder) -> axum::http::request::Builder {
    builder.header(AUTHORIZATION, format!("Bearer {}", TOKEN))
}

fn create_course_request(slug: &str, group: Option<&str>) -> Request<Body> {
    authed(Request::post("/admin/courses"))
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({
                "slug": slug,
                "content_group_id": group,
            })
            .to_string(),
        ))
        .unwrap()
}

/// In-memory ZIP with the given (name, content) entries.
fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, FileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Multipart body with one `archive` file field.
fn upload_request(course_id: CourseId, file_name: &str, payload: Vec<u8>) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"archive\"; filename=\"{}\"\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/zip\r\n\r\n");
    body.extend_from_slice(&payload);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    authed(Request::post(format!("/admin/courses/{}/content", course_id)))
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_admin_requires_token() {
    let server = test_server(Some(TOKEN)).await;

    // No token at all.
    let request = Request::get("/admin/courses").body(Body::empty()).unwrap();
    let response = server.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Wrong token.
    let request = Request::get("/admin/courses")
        .header(AUTHORIZATION, "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let response = server.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Correct token.
    let request = authed(Request::get("/admin/courses"))
        .body(Body::empty())
        .unwrap();
    let response = server.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_disabled_without_configured_token() {
    let server = test_server(None).await;

    let request = authed(Request::get("/admin/courses"))
        .body(Body::empty())
        .unwrap();
    let response = server.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_create_and_list_courses() {
    let server = test_server(Some(TOKEN)).await;

    let response = server
        .router
        .clone()
        .oneshot(create_course_request("intro-to-rust", Some("1042")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_text(response).await;
    assert!(body.contains("\"intro-to-rust\""));
    assert!(body.contains("\"1042\""));

    let request = authed(Request::get("/admin/courses"))
        .body(Body::empty())
        .unwrap();
    let response = server.router.oneshot(request).await.unwrap();
    let body = body_text(response).await;
    assert!(body.contains("intro-to-rust"));
}

#[tokio::test]
async fn test_duplicate_slug_conflicts() {
    let server = test_server(Some(TOKEN)).await;

    let response = server
        .router
        .clone()
        .oneshot(create_course_request("sample", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = server
        .router
        .oneshot(create_course_request("sample", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(body_text(response).await.contains("conflict"));
}

#[tokio::test]
async fn test_invalid_slug_rejected() {
    let server = test_server(Some(TOKEN)).await;

    let response = server
        .router
        .oneshot(create_course_request("Bad Slug!", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_text(response).await.contains("invalid_request"));
}

#[tokio::test]
async fn test_upload_installs_and_serves_content() {
    let server = test_server(Some(TOKEN)).await;
    let course = Course::new("sample").unwrap().with_content_group("1042");
    server.courses.insert(&course).unwrap();

    // Single top-level folder; it gets stripped on extraction.
    let payload = zip_bytes(&[
        ("course/html/start.html", "<h1>uploaded</h1>"),
        ("course/html/style.css", "body{}"),
    ]);
    let response = server
        .router
        .clone()
        .oneshot(upload_request(course.id, "course.zip", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("extracted successfully"));

    let installed = server
        .courses
        .find_by_id(course.id)
        .unwrap()
        .unwrap()
        .content_path
        .expect("content path recorded");
    assert!(installed.ends_with("1042"));

    // Admin identity can fetch the freshly installed file.
    let request = Request::get("/courses/sample/html/start.html")
        .header("x-user-id", "ops")
        .header("x-user-roles", "administrator")
        .body(Body::empty())
        .unwrap();
    let response = server.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "<h1>uploaded</h1>");
}

#[tokio::test]
async fn test_reupload_replaces_whole_tree() {
    let server = test_server(Some(TOKEN)).await;
    let course = Course::new("sample").unwrap().with_content_group("1042");
    server.courses.insert(&course).unwrap();

    let first = zip_bytes(&[("html/start.html", "v1"), ("html/old.html", "old")]);
    let response = server
        .router
        .clone()
        .oneshot(upload_request(course.id, "v1.zip", first))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let second = zip_bytes(&[("html/start.html", "v2")]);
    let response = server
        .router
        .clone()
        .oneshot(upload_request(course.id, "v2.zip", second))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let admin_get = |uri: &str| {
        Request::get(uri)
            .header("x-user-id", "ops")
            .header("x-user-roles", "administrator")
            .body(Body::empty())
            .unwrap()
    };

    let response = server
        .router
        .clone()
        .oneshot(admin_get("/courses/sample/html/start.html"))
        .await
        .unwrap();
    assert_eq!(body_text(response).await, "v2");

    // Files from the first upload are gone, not merged.
    let response = server
        .router
        .oneshot(admin_get("/courses/sample/html/old.html"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_corrupt_archive_leaves_content_untouched() {
    let server = test_server(Some(TOKEN)).await;
    let course = Course::new("sample").unwrap().with_content_group("1042");
    server.courses.insert(&course).unwrap();

    let good = zip_bytes(&[("html/start.html", "intact")]);
    let response = server
        .router
        .clone()
        .oneshot(upload_request(course.id, "good.zip", good))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .router
        .clone()
        .oneshot(upload_request(course.id, "bad.zip", b"not a zip".to_vec()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_text(response).await.contains("archive_open_failure"));

    let request = Request::get("/courses/sample/html/start.html")
        .header("x-user-id", "ops")
        .header("x-user-roles", "administrator")
        .body(Body::empty())
        .unwrap();
    let response = server.router.oneshot(request).await.unwrap();
    assert_eq!(body_text(response).await, "intact");
}

#[tokio::test]
async fn test_upload_rejected_without_content_group() {
    let server = test_server(Some(TOKEN)).await;
    let course = Course::new("bare").unwrap();
    server.courses.insert(&course).unwrap();

    let payload = zip_bytes(&[("html/start.html", "x")]);
    let response = server
        .router
        .oneshot(upload_request(course.id, "course.zip", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_text(response).await.contains("no_content_group"));
}

#[tokio::test]
async fn test_upload_rejects_non_zip_extension() {
    let server = test_server(Some(TOKEN)).await;
    let course = Course::new("sample").unwrap().with_content_group("1042");
    server.courses.insert(&course).unwrap();

    let payload = zip_bytes(&[("html/start.html", "x")]);
    let response = server
        .router
        .oneshot(upload_request(course.id, "course.tar.gz", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_text(response).await.contains("invalid_archive"));
}

#[tokio::test]
async fn test_upload_for_unknown_course_id() {
    let server = test_server(Some(TOKEN)).await;

    let payload = zip_bytes(&[("html/start.html", "x")]);
    let response = server
        .router
        .oneshot(upload_request(CourseId::new(), "course.zip", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
