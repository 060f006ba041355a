// tests/test_client.rs
//
// REST client: login, projects, simulations, and an upload/download round
// trip through the fake artifact service.

mod common;

use anyhow::Result;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{client_for, namespace, print_test_header, start_fake_service, write_tree, OWNER, PROJECT};
use pollination::download::download_tree;
use pollination::types::{NewProject, SubmitSimulation};
use pollination::{
    auth, upload_items, ArtifactStore, Config, PathEnumerator, PollinationClient, Ensured, SyncError,
};

#[tokio::test]
async fn test_login_exchanges_api_key() -> Result<()> {
    print_test_header("login");
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user/login"))
        .and(body_json(serde_json::json!({ "id": "key-id", "secret": "key-secret" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access_token": "jwt-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .and(header("authorization", "Bearer jwt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "username": "ada", "name": "Ada" })))
        .mount(&server)
        .await;

    let config = Config::default().with_endpoint(server.uri()).with_api_key("key-id", "key-secret");
    let client = PollinationClient::connect(config).await?;
    assert_eq!(client.config().access_token.as_deref(), Some("jwt-1"));

    let account = client.get_account().await?;
    assert_eq!(account.username, "ada");
    println!("✅ logged in as {}", account.username);
    Ok(())
}

#[tokio::test]
async fn test_login_rejected() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user/login"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let config = Config::default().with_endpoint(server.uri()).with_api_key("id", "wrong");
    let http = config.http.build()?;
    let err = auth::login(&http, &config).await.unwrap_err();
    assert!(matches!(err, SyncError::Auth(_)), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn test_existing_token_skips_login() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user/login"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let config = Config::default()
        .with_endpoint(server.uri())
        .with_api_key("id", "secret")
        .with_access_token("already");
    let client = PollinationClient::connect(config).await?;
    assert_eq!(client.config().access_token.as_deref(), Some("already"));
    Ok(())
}

#[tokio::test]
async fn test_no_credentials_is_an_auth_error() -> Result<()> {
    let config = Config::default().with_endpoint("http://127.0.0.1:9");
    let err = PollinationClient::connect(config).await.unwrap_err();
    assert!(matches!(err, SyncError::Auth(_)));
    Ok(())
}

#[tokio::test]
async fn test_ensure_project_creates_when_missing() -> Result<()> {
    print_test_header("ensure project");
    let server = MockServer::start().await;
    let project_path = format!("/projects/{OWNER}/{PROJECT}");
    Mock::given(method("GET"))
        .and(path(project_path.as_str()))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/projects/{OWNER}")))
        .and(body_json(serde_json::to_value(NewProject {
            name: PROJECT.into(),
            public: true,
            description: String::new(),
        })?))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(matches!(
        client.ensure_project(&namespace(), true, false).await,
        Err(SyncError::NotFound(_))
    ));
    assert_eq!(client.ensure_project(&namespace(), true, true).await?, Ensured::Created);
    println!("✅ project created on demand");
    Ok(())
}

#[tokio::test]
async fn test_simulations_list_get_and_submit() -> Result<()> {
    let server = MockServer::start().await;
    let sims = format!("/projects/{OWNER}/{PROJECT}/simulations");
    Mock::given(method("GET"))
        .and(path(sims.as_str()))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "resources": [
                { "id": "old", "status": "Succeeded", "started_at": "2024-01-01T00:00:00Z" },
                { "id": "new", "status": "Running", "started_at": "2024-02-01T00:00:00Z" }
            ],
            "page": 2,
            "per_page": 25,
            "total_count": 27
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{sims}/new")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "new", "status": "Running", "author": { "name": "ada" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/projects/{OWNER}/{PROJECT}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "name": PROJECT })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(sims.as_str()))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "sub-1" })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let page = client.list_simulations(&namespace(), 2).await?;
    assert_eq!(page.resources.len(), 2);
    assert_eq!(page.total_count, Some(27));

    let sim = client.get_simulation(&namespace(), "new").await?;
    assert_eq!(sim.status.as_deref(), Some("Running"));
    assert!(sim.extra.contains_key("author"));

    let submit = SubmitSimulation {
        recipe: "ladybug-tools/annual-daylight:0.8.2".parse().map_err(anyhow::Error::msg)?,
        inputs: serde_json::json!({ "model": "model.hbjson" }),
    };
    assert_eq!(client.submit_simulation(&namespace(), &submit).await?.id, "sub-1");
    Ok(())
}

#[tokio::test]
async fn test_submit_to_missing_project_posts_nothing() -> Result<()> {
    print_test_header("submit to missing project");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/projects/{OWNER}/{PROJECT}")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/projects/{OWNER}/{PROJECT}/simulations")))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "never" })))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let submit = SubmitSimulation {
        recipe: "ladybug-tools/annual-daylight:0.8.2".parse().map_err(anyhow::Error::msg)?,
        inputs: serde_json::json!({}),
    };
    let err = client.submit_simulation(&namespace(), &submit).await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)), "{err:?}");
    println!("✅ missing project rejected before submit");
    Ok(())
}

#[tokio::test]
async fn test_delete_and_server_errors() -> Result<()> {
    let server = MockServer::start().await;
    let artifacts = format!("/projects/{OWNER}/{PROJECT}/artifacts");
    Mock::given(method("DELETE"))
        .and(path(artifacts.as_str()))
        .and(query_param("path", "old/run"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(artifacts.as_str()))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.delete(&namespace(), Some("old/run")).await?;
    match client.list_entries(&namespace(), None).await {
        Err(SyncError::Store { status, message }) => {
            assert_eq!(status, 502);
            assert_eq!(message, "bad gateway");
        }
        other => panic!("expected Store error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_upload_then_download_round_trip() -> Result<()> {
    print_test_header("round trip");
    let (server, _state) = start_fake_service().await;
    let client = client_for(&server);
    let src = TempDir::new()?;
    write_tree(
        src.path(),
        &[("model/rooms/a.json", "{\"a\":1}"), ("model/rooms/b.json", "{\"b\":2}"), ("readme.md", "# hi")],
    );

    let items = PathEnumerator::new(src.path(), None)?.collect_items()?;
    let report = upload_items(Arc::new(client.clone()), client.transfer(), &namespace(), items, 2, None).await;
    assert!(report.all_confirmed());

    let dest = TempDir::new()?;
    let stats = download_tree(&client, client.transfer(), &namespace(), None, dest.path(), None).await?;
    assert_eq!(stats.files, 3);
    for rel in ["model/rooms/a.json", "model/rooms/b.json", "readme.md"] {
        assert_eq!(std::fs::read(src.path().join(rel))?, std::fs::read(dest.path().join(rel))?, "{rel}");
    }
    println!("✅ {} files survived the round trip", stats.files);
    Ok(())
}
