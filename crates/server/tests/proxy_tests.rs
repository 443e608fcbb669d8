//! Authorization proxy tests against a mock upstream.

mod common;

use common::spawn_app;
use curator_core::User;
use httpmock::Method::{GET, PATCH, POST};
use httpmock::MockServer;
use serde_json::{json, Value};

#[tokio::test]
async fn member_project_query_passes_through_on_get() {
    let upstream = MockServer::start();
    let mock = upstream.mock(|when, then| {
        when.method(GET)
            .path("/directories/42")
            .query_param("project", "P1");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"project_identifier": "P1"}));
    });

    let app = spawn_app(&upstream.base_url()).await;
    let sid = app.login(User::for_testing("matti", &["P1", "P2"]));

    let response = app
        .http
        .get(app.url("/directories/42?project=P1"))
        .header("cookie", format!("sid={sid}"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["project_identifier"], "P1");
    // allowed_projects is never appended on GET
    mock.assert();
}

#[tokio::test]
async fn files_endpoint_renames_project_parameter() {
    let upstream = MockServer::start();
    let mock = upstream.mock(|when, then| {
        when.method(GET)
            .path("/files/7")
            .query_param("project_identifier", "P1");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"project_identifier": "P1"}));
    });

    let app = spawn_app(&upstream.base_url()).await;
    let sid = app.login(User::for_testing("matti", &["P1"]));

    let response = app
        .http
        .get(app.url("/files/7?project=P1"))
        .header("cookie", format!("sid={sid}"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    mock.assert();
}

#[tokio::test]
async fn proxy_requires_a_session() {
    let upstream = MockServer::start();
    let app = spawn_app(&upstream.base_url()).await;

    let response = app
        .http
        .get(app.url("/directories/42"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.unwrap();
    assert!(body["error_id"].as_str().is_some());
}

#[tokio::test]
async fn proxy_controlled_parameters_are_rejected() {
    let upstream = MockServer::start();
    let app = spawn_app(&upstream.base_url()).await;
    let sid = app.login(User::for_testing("matti", &["P1"]));

    for query in ["allowed_projects=P1", "project_identifier=P1"] {
        let response = app
            .http
            .get(app.url(&format!("/directories/42?{query}")))
            .header("cookie", format!("sid={sid}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "query: {query}");
    }
}

#[tokio::test]
async fn repeated_project_parameter_is_rejected() {
    let upstream = MockServer::start();
    let app = spawn_app(&upstream.base_url()).await;
    let sid = app.login(User::for_testing("matti", &["P1", "P2"]));

    let response = app
        .http
        .get(app.url("/directories/42?project=P1&project=P2"))
        .header("cookie", format!("sid={sid}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn non_member_project_is_forbidden() {
    let upstream = MockServer::start();
    let app = spawn_app(&upstream.base_url()).await;

    // user without any projects
    let sid = app.login(User::for_testing("solo", &[]));
    let response = app
        .http
        .get(app.url("/directories/42?project=P1"))
        .header("cookie", format!("sid={sid}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // member of other projects only
    let sid = app.login(User::for_testing("matti", &["P2"]));
    let response = app
        .http
        .get(app.url("/directories/42?project=P1"))
        .header("cookie", format!("sid={sid}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn response_walk_blocks_foreign_projects() {
    let upstream = MockServer::start();
    upstream.mock(|when, then| {
        when.method(GET).path("/directories/42");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "results": [
                    {"project_identifier": "P1"},
                    {"project_identifier": "P2"},
                ],
            }));
    });

    let app = spawn_app(&upstream.base_url()).await;
    let sid = app.login(User::for_testing("matti", &["P1"]));

    let response = app
        .http
        .get(app.url("/directories/42"))
        .header("cookie", format!("sid={sid}"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["msg"], "invalid project in response");
    assert!(body["error_id"].as_str().is_some());
    // the upstream body never reaches the client
    assert!(body.get("results").is_none());
}

#[tokio::test]
async fn patch_rewrites_body_and_scopes_projects() {
    let upstream = MockServer::start();
    let mock = upstream.mock(|when, then| {
        when.method(PATCH)
            .path("/files/1")
            .query_param("allowed_projects", "P1,P2")
            .json_body(json!({"identifier": "1", "user_modified": "matti"}));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"identifier": "1"}));
    });

    let app = spawn_app(&upstream.base_url()).await;
    let sid = app.login(User::for_testing("matti", &["P1", "P2"]));

    let response = app
        .http
        .patch(app.url("/files/1"))
        .header("cookie", format!("sid={sid}"))
        .json(&json!({"identifier": "1"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    mock.assert();
}

#[tokio::test]
async fn post_stamps_user_created_on_array_elements() {
    let upstream = MockServer::start();
    let mock = upstream.mock(|when, then| {
        when.method(POST).path("/files/bulk").json_body(json!([
            {"identifier": "1", "user_created": "matti"},
            {"identifier": "2", "user_created": "matti"},
        ]));
        then.status(201)
            .header("content-type", "application/json")
            .json_body(json!({"created": 2}));
    });

    let app = spawn_app(&upstream.base_url()).await;
    let sid = app.login(User::for_testing("matti", &["P1"]));

    let response = app
        .http
        .post(app.url("/files/bulk"))
        .header("cookie", format!("sid={sid}"))
        .json(&json!([{"identifier": "1"}, {"identifier": "2"}]))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    mock.assert();
}

#[tokio::test]
async fn upstream_errors_pass_through_verbatim() {
    let upstream = MockServer::start();
    upstream.mock(|when, then| {
        when.method(GET).path("/directories/404");
        then.status(404)
            .header("content-type", "application/json")
            .body(r#"{"detail": "directory not found"}"#);
    });

    let app = spawn_app(&upstream.base_url()).await;
    let sid = app.login(User::for_testing("matti", &["P1"]));

    let response = app
        .http
        .get(app.url("/directories/404"))
        .header("cookie", format!("sid={sid}"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    assert_eq!(
        response.text().await.unwrap(),
        r#"{"detail": "directory not found"}"#
    );
}

#[tokio::test]
async fn unreachable_upstream_is_a_bad_gateway() {
    // a freed port: nothing is listening there
    let dead = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    };

    let app = spawn_app(&dead).await;
    let sid = app.login(User::for_testing("matti", &["P1"]));

    let response = app
        .http
        .get(app.url("/directories/42"))
        .header("cookie", format!("sid={sid}"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert!(body["error_id"].as_str().is_some());
}
