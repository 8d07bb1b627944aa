//! HttpDirector against a mock Ops Manager

use std::time::Duration;

use om_artifact::ProgressSink;
use om_config::ConfigTree;
use om_director::{
    Availability, CreateInstallation, Credentials, DirectorError, DirectorGateway, DirectorOptions,
    HttpDirector, InstallationStatus,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn director(server: &MockServer) -> HttpDirector {
    Mock::given(method("POST"))
        .and(path("/uaa/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "some-token", "token_type": "bearer"})),
        )
        .mount(server)
        .await;

    let mut options = DirectorOptions::new(server.uri());
    options.credentials = Some(Credentials::Client {
        client_id: "ci".into(),
        client_secret: "secret".into(),
    });
    options.poll_interval = Duration::from_millis(10);
    HttpDirector::new(options).unwrap()
}

#[derive(Default)]
struct Totals {
    total: Option<u64>,
    advanced: u64,
    finished: bool,
}

impl ProgressSink for Totals {
    fn set_total(&mut self, total: u64) {
        self.total = Some(total);
    }

    fn advance(&mut self, bytes: u64) {
        self.advanced += bytes;
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

#[tokio::test]
async fn test_running_installation_uses_bearer_token() {
    let server = MockServer::start().await;
    let director = director(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v0/installations"))
        .and(header("authorization", "Bearer some-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "installations": [
                {"id": 200, "status": "running", "user_name": "admin", "started_at": "2017-02-25T02:31:01Z", "finished_at": null},
                {"id": 199, "status": "succeeded", "user_name": "admin", "started_at": "2017-02-24T02:31:01Z", "finished_at": "2017-02-24T03:00:00Z"}
            ]
        })))
        .mount(&server)
        .await;

    let running = director.running_installation().await.unwrap().unwrap();
    assert_eq!(running.id, 200);
    assert_eq!(running.started_display(), "Sat Feb 25 02:31:01 UTC 2017");
}

#[tokio::test]
async fn test_create_installation_body() {
    let server = MockServer::start().await;
    let director = director(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v0/installations"))
        .and(body_json(json!({"ignore_warnings": "false", "deploy_products": "all"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"install": {"id": 42}})))
        .expect(1)
        .mount(&server)
        .await;

    let created = director
        .create_installation(&CreateInstallation::default())
        .await
        .unwrap();
    assert_eq!(created.id, 42);
    assert_eq!(created.status, InstallationStatus::Running);
}

#[tokio::test]
async fn test_create_installation_resolves_product_names() {
    let server = MockServer::start().await;
    let director = director(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v0/staged/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"guid": "p-bosh-1", "type": "p-bosh"},
            {"guid": "cf-1", "type": "cf", "product_version": "2.0.1"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v0/installations"))
        .and(body_json(json!({"ignore_warnings": "true", "deploy_products": ["cf-1"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"install": {"id": 7}})))
        .expect(1)
        .mount(&server)
        .await;

    let request = CreateInstallation {
        ignore_warnings: true,
        product_names: vec!["cf".into()],
        ..Default::default()
    };
    assert_eq!(director.create_installation(&request).await.unwrap().id, 7);

    let missing = CreateInstallation {
        product_names: vec!["nope".into()],
        ..Default::default()
    };
    assert!(matches!(
        director.create_installation(&missing).await.unwrap_err(),
        DirectorError::NotFound { .. }
    ));
}

#[tokio::test]
async fn test_delete_without_installation() {
    let server = MockServer::start().await;
    let director = director(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/api/v0/installation_asset_collection"))
        .and(body_json(json!({"errands": {}})))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    assert_eq!(director.delete_installation_assets().await.unwrap(), None);
}

#[tokio::test]
async fn test_ensure_availability() {
    let cases = [
        (ResponseTemplate::new(302).insert_header("Location", "https://example.com/setup"), Availability::Unstarted),
        (
            ResponseTemplate::new(302).insert_header("Location", "https://example.com/auth/cloudfoundry"),
            Availability::Complete,
        ),
        (
            ResponseTemplate::new(200).set_body_string("Waiting for authentication system to start..."),
            Availability::Pending,
        ),
        (ResponseTemplate::new(500), Availability::Unknown),
    ];
    for (response, expected) in cases {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/login/ensure_availability"))
            .respond_with(response)
            .mount(&server)
            .await;
        let director = HttpDirector::new(DirectorOptions::new(server.uri())).unwrap();
        assert_eq!(director.ensure_availability().await.unwrap(), expected);
    }
}

#[tokio::test]
async fn test_stream_logs_then_error() {
    let server = MockServer::start().await;
    let director = director(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v0/installations/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "failed"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v0/installations/5/logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"logs": "first\nsecond\nlast"})))
        .mount(&server)
        .await;

    let mut stream = director.stream_installation_logs(5).await.unwrap();
    let mut lines = Vec::new();
    while let Some(line) = stream.lines.recv().await {
        lines.push(line);
    }
    assert_eq!(lines, vec!["first", "second", "last"]);
    assert!(matches!(
        stream.errors.recv().await,
        Some(DirectorError::InstallationFailed { id: 5 })
    ));
}

#[tokio::test]
async fn test_stage_upgrades_existing_product() {
    let server = MockServer::start().await;
    let director = director(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v0/staged/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"guid": "cf-1", "type": "cf", "product_version": "2.0.0"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v0/staged/products/cf-1"))
        .and(body_json(json!({"to_version": "2.0.1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v0/staged/products"))
        .and(body_json(json!({"name": "mysql", "product_version": "1.0.0"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    director.stage_product("cf", "2.0.1").await.unwrap();
    director.stage_product("mysql", "1.0.0").await.unwrap();
}

#[tokio::test]
async fn test_api_error_carries_status() {
    let server = MockServer::start().await;
    let director = director(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v0/staged/products"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = director.list_staged_products().await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().contains("boom"));
}

#[tokio::test]
async fn test_product_diff() {
    let server = MockServer::start().await;
    let director = director(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v0/staged/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"guid": "cf-1", "type": "cf"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v0/products/cf-1/diff"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "manifest": {"status": "different", "diff": "-a\n+b"},
            "runtime_configs": []
        })))
        .mount(&server)
        .await;

    assert!(director.product_diff("cf").await.unwrap().has_changes());
    assert!(matches!(
        director.product_diff("mysql").await.unwrap_err(),
        DirectorError::NotFound { kind: "product", .. }
    ));
}

#[tokio::test]
async fn test_export_installation() {
    let server = MockServer::start().await;
    let director = director(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v0/installation_asset_collection"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 4096]))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("installation.zip");
    let mut progress = Totals::default();
    let written = director.export_installation(&dest, &mut progress).await.unwrap();

    assert_eq!(written, 4096);
    assert_eq!(std::fs::read(&dest).unwrap().len(), 4096);
    assert_eq!(progress.total, Some(4096));
    assert_eq!(progress.advanced, 4096);
    assert!(progress.finished);
}

#[tokio::test]
async fn test_upload_product_reports_progress() {
    let server = MockServer::start().await;
    let director = director(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v0/available_products"))
        .and(header("authorization", "Bearer some-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let tile = dir.path().join("cf-2.0.1.pivotal");
    std::fs::write(&tile, vec![1u8; 2048]).unwrap();
    let mut progress = Totals::default();
    director.upload_product(&tile, &mut progress).await.unwrap();

    assert_eq!(progress.total, Some(2048));
    assert_eq!(progress.advanced, 2048);
    assert!(progress.finished);
}

#[tokio::test]
async fn test_apply_product_config() {
    let server = MockServer::start().await;
    let director = director(&server).await;
    Mock::given(method("PUT"))
        .and(path("/api/v0/staged/products/cf-1/properties"))
        .and(body_json(json!({"properties": {".properties.enabled": {"value": true}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v0/staged/products/cf-1/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobs": [{"name": "router", "guid": "router-1"}]})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v0/staged/products/cf-1/jobs/router-1/resource_config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"instances": 1, "persistent_disk": {"size_mb": "1024"}})))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v0/staged/products/cf-1/jobs/router-1/resource_config"))
        .and(body_json(json!({"instances": 3, "persistent_disk": {"size_mb": "1024"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v0/staged/products/cf-1/max_in_flight"))
        .and(body_json(json!({"max_in_flight": {"router-1": "20%"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let tree = ConfigTree::from_value(
        serde_yaml::from_str(
            "product-name: cf\n\
             product-properties:\n  .properties.enabled:\n    value: true\n\
             resource-config:\n  router:\n    instances: 3\n    max_in_flight: 20%\n",
        )
        .unwrap(),
    )
    .unwrap();
    director.apply_product_config("cf-1", &tree).await.unwrap();
}

#[tokio::test]
async fn test_unlock_before_first_token() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v0/unlock"))
        .and(body_json(json!({"passphrase": "decrypt-me"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login/ensure_availability"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "https://example.com/auth/cloudfoundry"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v0/deployed/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/uaa/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "t"})))
        .mount(&server)
        .await;

    let mut options = DirectorOptions::new(server.uri());
    options.credentials = Some(Credentials::Password {
        username: "admin".into(),
        password: "pw".into(),
    });
    options.decryption_passphrase = Some("decrypt-me".into());
    let director = HttpDirector::new(options).unwrap();

    assert!(director.list_deployed_products().await.unwrap().is_empty());
    assert!(director.list_deployed_products().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_credentials() {
    let server = MockServer::start().await;
    let director = HttpDirector::new(DirectorOptions::new(server.uri())).unwrap();
    assert!(matches!(
        director.list_installations().await.unwrap_err(),
        DirectorError::Authentication(_)
    ));
}

#[tokio::test]
async fn test_cancelled_requests() {
    let server = MockServer::start().await;
    let director = director(&server).await;
    director.cancellation().cancel();
    assert!(director.list_installations().await.unwrap_err().is_cancelled());
}
