//! HTTP API tests driving the router in-process

mod common;

use ageplane_api::build_router;
use ageplane_api::config::AgePlaneConfig;
use ageplane_api::kubernetes::memory::Operation;
use ageplane_api::kubernetes::PlatformError;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::{json_body, mark_ready, memory_state, memory_state_with, TEST_API_KEY};
use serde_json::json;
use tower::ServiceExt;

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn authed(method: Method, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", TEST_API_KEY));

    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn create(app: &Router, name: &str) -> StatusCode {
    app.clone()
        .oneshot(authed(
            Method::POST,
            "/api/v1/customers",
            Some(json!({"name": name})),
        ))
        .await
        .unwrap()
        .status()
}

// ============== Public Routes ==============

#[tokio::test]
async fn test_root_descriptor() {
    let (_cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["service"], "PostgreSQL AGE Operator API");
    assert_eq!(body["backend"], "memory");
    assert_eq!(body["endpoints"]["customers"], "/api/v1/customers");
}

#[tokio::test]
async fn test_health_is_public() {
    let (_cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");

    let response = app.oneshot(get("/health/live")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["alive"], true);
}

#[tokio::test]
async fn test_readiness_follows_cluster() {
    let (cluster, state) = memory_state("");
    let app = build_router(state);

    let response = app.clone().oneshot(get("/health/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    cluster
        .inject_failure(
            Operation::Ping,
            PlatformError::Transport("connection refused".to_string()),
        )
        .await;

    let response = app.oneshot(get("/health/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["ready"], false);
    assert!(body["reason"].as_str().unwrap().contains("cluster"));
}

// ============== Authentication ==============

#[tokio::test]
async fn test_auth_error_codes() {
    let (_cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);

    let cases = [
        (None, "MISSING_AUTHORIZATION"),
        (Some("Basic abc"), "INVALID_AUTHORIZATION_FORMAT"),
        (Some("Bearer wrong-key"), "INVALID_API_KEY"),
    ];

    for (authorization, code) in cases {
        let mut builder = Request::builder().uri("/api/v1/customers");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let response = app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], code);
    }

    let response = app
        .oneshot(authed(Method::GET, "/api/v1/customers", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_no_key_configured_allows_all() {
    let (_cluster, state) = memory_state("");
    let app = build_router(state);

    let response = app.oneshot(get("/api/v1/customers")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ============== Customer CRUD ==============

#[tokio::test]
async fn test_create_customer_returns_201() {
    let (_cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);

    let response = app
        .oneshot(authed(
            Method::POST,
            "/api/v1/customers",
            Some(json!({
                "name": "acme-corp",
                "displayName": "ACME Corporation",
                "imageTag": "v1",
                "config": {"resources": {"requests": {"cpu": "200m"}}}
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Customer instance created successfully");
    assert_eq!(body["data"]["name"], "acme-corp");
    assert_eq!(body["data"]["namespace"], "postgres-operator-acme-corp");
    assert_eq!(body["data"]["imageTag"], "v1");
    assert_eq!(body["data"]["status"]["phase"], "Creating");
    assert_eq!(body["data"]["config"]["resources"]["requests"]["cpu"], "200m");
}

#[tokio::test]
async fn test_create_rejects_bad_name_before_cluster() {
    let (cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);

    let response = app
        .oneshot(authed(
            Method::POST,
            "/api/v1/customers",
            Some(json!({"name": "Bad_Name!"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    assert_eq!(body["error"]["details"][0]["field"], "name");
    assert!(cluster.calls().await.is_empty());
}

#[tokio::test]
async fn test_create_rejects_bad_quantity_and_label() {
    let (_cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);

    let response = app
        .oneshot(authed(
            Method::POST,
            "/api/v1/customers",
            Some(json!({
                "name": "acme",
                "config": {"resources": {"limits": {"memory": "lots"}}},
                "labels": {"bad key!": "x"}
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    let fields: Vec<&str> = body["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d["field"].as_str())
        .collect();
    assert!(fields.contains(&"config.resources.limits.memory"));
    assert!(fields.iter().any(|f| f.starts_with("labels.")));
}

#[tokio::test]
async fn test_create_rejects_malformed_body() {
    let (_cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/customers")
        .header(header::AUTHORIZATION, format!("Bearer {}", TEST_API_KEY))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_duplicate_create_conflicts() {
    let (_cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);

    assert_eq!(create(&app, "acme").await, StatusCode::CREATED);

    let response = app
        .oneshot(authed(
            Method::POST,
            "/api/v1/customers",
            Some(json!({"name": "acme"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["error"]["code"], "CUSTOMER_EXISTS");
}

#[tokio::test]
async fn test_get_missing_customer_is_404() {
    let (_cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);

    let response = app
        .oneshot(authed(Method::GET, "/api/v1/customers/ghost", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"]["code"], "CUSTOMER_NOT_FOUND");
}

#[tokio::test]
async fn test_status_endpoint_tracks_readiness() {
    let (cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);
    create(&app, "acme").await;

    let response = app
        .clone()
        .oneshot(authed(Method::GET, "/api/v1/customers/acme/status", None))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["data"]["phase"], "Creating");

    mark_ready(&cluster, "acme").await;

    let response = app
        .oneshot(authed(Method::GET, "/api/v1/customers/acme/status", None))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["phase"], "Running");
    assert_eq!(body["data"]["ready"], true);
}

#[tokio::test]
async fn test_update_customer() {
    let (_cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);
    create(&app, "acme").await;

    let response = app
        .oneshot(authed(
            Method::PUT,
            "/api/v1/customers/acme",
            Some(json!({"imageTag": "v2", "labels": {"tier": "gold"}})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Customer instance updated successfully");
    assert_eq!(body["data"]["imageTag"], "v2");
}

#[tokio::test]
async fn test_update_rejects_selector_labels() {
    let (cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);
    create(&app, "acme").await;
    let mutations = cluster.mutation_count().await;

    let response = app
        .oneshot(authed(
            Method::PUT,
            "/api/v1/customers/acme",
            Some(json!({"labels": {"app.kubernetes.io/instance": "hijack"}})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    assert_eq!(
        body["error"]["details"][0]["field"],
        "labels.app.kubernetes.io/instance"
    );
    assert_eq!(cluster.mutation_count().await, mutations);
}

#[tokio::test]
async fn test_delete_customer_twice() {
    let (cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);
    create(&app, "acme").await;

    for expected in ["completed", "already-absent"] {
        let response = app
            .clone()
            .oneshot(authed(Method::DELETE, "/api/v1/customers/acme", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["message"], "Customer instance deleted successfully");
        assert_eq!(body["data"]["operation"], "delete");
        assert_eq!(body["data"]["steps"][0]["step"], "namespace");
        assert_eq!(body["data"]["steps"][0]["outcome"], expected);
    }

    assert_eq!(cluster.namespace_count().await, 0);
}

#[tokio::test]
async fn test_partial_failure_carries_report() {
    let (cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);
    cluster
        .inject_failure(
            Operation::CreateDeployment,
            PlatformError::Api {
                code: 422,
                message: "invalid image".to_string(),
            },
        )
        .await;

    let response = app
        .oneshot(authed(
            Method::POST,
            "/api/v1/customers",
            Some(json!({"name": "acme"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "PARTIAL_FAILURE");

    let steps = body["error"]["context"]["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 5);
    assert_eq!(steps[4]["step"], "deployment");
    assert_eq!(steps[4]["outcome"], "failed");
}

#[tokio::test]
async fn test_upstream_failure_is_502() {
    let (cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);
    cluster
        .inject_failure(
            Operation::GetNamespace,
            PlatformError::Transport("connection reset".to_string()),
        )
        .await;

    let response = app
        .oneshot(authed(Method::GET, "/api/v1/customers/acme", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["error"]["code"], "UPSTREAM_ERROR");
}

// ============== Listing ==============

#[tokio::test]
async fn test_list_pagination() {
    let (_cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);
    for name in ["alpha", "bravo", "charlie"] {
        assert_eq!(create(&app, name).await, StatusCode::CREATED);
    }

    let response = app
        .clone()
        .oneshot(authed(
            Method::GET,
            "/api/v1/customers?page=2&pageSize=2",
            None,
        ))
        .await
        .unwrap();
    let data = json_body(response).await["data"].clone();
    assert_eq!(data["total"], 3);
    assert_eq!(data["page"], 2);
    assert_eq!(data["pageSize"], 2);
    assert_eq!(data["hasNext"], false);
    assert_eq!(data["hasPrev"], true);
    assert_eq!(data["customers"][0]["name"], "charlie");

    let response = app
        .oneshot(authed(
            Method::GET,
            "/api/v1/customers?page=zero&pageSize=500",
            None,
        ))
        .await
        .unwrap();
    let data = json_body(response).await["data"].clone();
    assert_eq!(data["page"], 1);
    assert_eq!(data["pageSize"], 10);
    assert_eq!(data["customers"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_list_phase_filter() {
    let (cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);
    create(&app, "alpha").await;
    create(&app, "bravo").await;
    mark_ready(&cluster, "alpha").await;

    let response = app
        .clone()
        .oneshot(authed(Method::GET, "/api/v1/customers?phase=Running", None))
        .await
        .unwrap();
    let data = json_body(response).await["data"].clone();
    assert_eq!(data["total"], 1);
    assert_eq!(data["customers"][0]["name"], "alpha");

    let response = app
        .oneshot(authed(Method::GET, "/api/v1/customers?phase=asleep", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["details"][0]["field"], "phase");
}

// ============== Middleware ==============

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let mut config = AgePlaneConfig::default();
    config.rate_limit.max_requests = 2;
    let (_cluster, state) = memory_state_with(config);
    let app = build_router(state);

    for _ in 0..2 {
        let response = app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-ratelimit-remaining"));
    }

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    assert_eq!(json_body(response).await["error"]["code"], "RATE_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn test_rate_limit_is_per_client() {
    let mut config = AgePlaneConfig::default();
    config.rate_limit.max_requests = 1;
    let (_cluster, state) = memory_state_with(config);
    let app = build_router(state);

    let from = |ip: &str| {
        Request::builder()
            .uri("/health")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(app.clone().oneshot(from("10.0.0.1")).await.unwrap().status(), StatusCode::OK);
    assert_eq!(app.clone().oneshot(from("10.0.0.2")).await.unwrap().status(), StatusCode::OK);
    assert_eq!(
        app.oneshot(from("10.0.0.1")).await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_request_id_echo_and_generation() {
    let (_cluster, state) = memory_state("");
    let app = build_router(state);

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-123");

    let response = app.oneshot(get("/health")).await.unwrap();
    let generated = response.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());
}

#[tokio::test]
async fn test_docs_endpoint() {
    let (_cluster, state) = memory_state(TEST_API_KEY);
    let app = build_router(state);

    let response = app
        .oneshot(authed(Method::GET, "/api/v1/docs", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["baseURL"], "/api/v1");
    assert_eq!(body["authentication"]["type"], "Bearer Token");
    assert_eq!(body["examples"]["createCustomer"]["body"]["name"], "acme-corp");
}
