//! GcsSource against a mock Cloud Storage JSON API

use om_artifact::{ArtifactError, ArtifactSource, GcsSource, NoProgress, Resolver, VersionSelector};
use serde_json::json;
use tokio::io::AsyncReadExt;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING: &str = "/storage/v1/b/tiles/o";

fn source(server: &MockServer) -> GcsSource {
    GcsSource::with_endpoint(&server.uri(), "tiles").unwrap()
}

#[tokio::test]
async fn test_list_follows_page_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "storage#objects",
            "items": [{"name": "cf-2.1.0_cf.pivotal", "size": "7"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LISTING))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "storage#objects",
            "items": [
                {"name": "cf-2.0.1_cf.pivotal", "size": "4"},
                {"name": "notes.txt", "size": "12"}
            ],
            "nextPageToken": "page-2"
        })))
        .mount(&server)
        .await;

    let objects = source(&server).list().await.unwrap();
    let listed: Vec<_> = objects.iter().map(|o| (o.key.as_str(), o.size)).collect();
    assert_eq!(
        listed,
        vec![("cf-2.0.1_cf.pivotal", 4), ("notes.txt", 12), ("cf-2.1.0_cf.pivotal", 7)]
    );
}

#[tokio::test]
async fn test_list_sends_prefix_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING))
        .and(query_param("prefix", "products/"))
        .and(header("authorization", "Bearer ya29.token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"name": "products/cf-2.0.1_cf.pivotal", "size": "4"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let objects = source(&server)
        .with_prefix("/products/")
        .with_access_token("ya29.token")
        .list()
        .await
        .unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].base_name(), "cf-2.0.1_cf.pivotal");
}

#[tokio::test]
async fn test_empty_bucket() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kind": "storage#objects"})))
        .mount(&server)
        .await;

    assert!(source(&server).list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_listing_failure_names_the_bucket() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let err = source(&server).list().await.unwrap_err();
    assert!(matches!(err, ArtifactError::Source { .. }));
    assert!(err.to_string().contains("tiles"));
    assert!(err.to_string().contains("forbidden"));
}

#[tokio::test]
async fn test_open_streams_media() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/v1/b/tiles/o/cf-2.0.1_cf.pivotal"))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tile".to_vec()))
        .mount(&server)
        .await;

    let mut opened = source(&server).open("cf-2.0.1_cf.pivotal").await.unwrap();
    assert_eq!(opened.size, 4);
    let mut body = Vec::new();
    opened.reader.read_to_end(&mut body).await.unwrap();
    assert_eq!(body, b"tile");
}

#[tokio::test]
async fn test_open_missing_object() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/v1/b/tiles/o/gone.pivotal"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = source(&server).open("gone.pivotal").await.unwrap_err();
    assert!(matches!(err, ArtifactError::NotFound { .. }));
}

#[tokio::test]
async fn test_resolver_downloads_from_bucket() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"name": "cf-2.0.1_cf.pivotal", "size": "4"},
                {"name": "cf-2.10.0_cf.pivotal", "size": "5"},
                {"name": "cf-3.0.0_cf.pivotal", "size": "5"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/storage/v1/b/tiles/o/cf-2.10.0_cf.pivotal"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"newer".to_vec()))
        .mount(&server)
        .await;

    let resolver = Resolver::new(source(&server));
    let version = resolver
        .resolve_version("cf", &VersionSelector::Matching(r"^2\.".into()))
        .await
        .unwrap();
    assert_eq!(version, "2.10.0");
    let file = resolver.latest_file("cf", &version, "*.pivotal").await.unwrap();

    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join(&file.file_name);
    let written = resolver.download(&file, &dest, &mut NoProgress).await.unwrap();
    assert_eq!(written, 5);
    assert_eq!(std::fs::read(&dest).unwrap(), b"newer");
}
