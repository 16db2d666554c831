use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use dynapi_sdk::codegen::SourceFiles;
use dynapi_sdk::{
    app, AppState, CompiledArtifacts, ConnectionRegistry, DatabaseKind, DatabaseModel, MemoryConnectionStore,
    ModuleCompiler, ModuleLoader, ModuleProxy, PipelineError, ReferenceSet, RouteRegistry, SchemaSource,
    ServiceContainer,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct Unreachable;

#[async_trait]
impl SchemaSource for Unreachable {
    async fn extract(&self, _: DatabaseKind, _: &str) -> Result<DatabaseModel, PipelineError> {
        Err(PipelineError::Connectivity("connection refused".into()))
    }
}

struct NoCompiler;

#[async_trait]
impl ModuleCompiler for NoCompiler {
    async fn compile(&self, _: &str, _: &SourceFiles, _: &ReferenceSet) -> Result<CompiledArtifacts, PipelineError> {
        Err(PipelineError::Compilation { diagnostics: vec![] })
    }
}

fn state() -> AppState {
    let loader = ModuleLoader::new(
        std::env::temp_dir().join(format!("dynapi-http-{}", uuid::Uuid::new_v4())),
        Duration::from_secs(5),
        Arc::new(RouteRegistry::new()),
        Arc::new(ServiceContainer::new()),
    );
    let registry = ConnectionRegistry::new(
        Arc::new(MemoryConnectionStore::new()),
        Arc::new(Unreachable),
        Arc::new(NoCompiler),
        Arc::new(loader),
    );
    AppState {
        registry: Arc::new(registry),
        proxy: ModuleProxy::new(1024 * 1024).unwrap(),
        pool: None,
        max_body_bytes: 1024 * 1024,
    }
}

async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_and_version() {
    let app = app(state());
    let (status, body) = call(app.clone(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    let (status, body) = call(app.clone(), "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connections"], 0);
    let (_, body) = call(app, "GET", "/version", None).await;
    assert_eq!(body["name"], "dynapi-sdk");
}

#[tokio::test]
async fn invalid_descriptor_is_422_validation_error() {
    let body = json!({
        "name": "shop",
        "connectionString": "postgres://localhost/shop",
        "databaseKind": "postgres",
        "apiRoutePrefix": "Not Valid"
    });
    let (status, body) = call(app(state()), "POST", "/api/v1/connections", Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn unreachable_database_reports_connection_error_state() {
    let body = json!({
        "name": "shop",
        "connectionString": "postgres://localhost:1/shop",
        "databaseKind": "postgres",
        "apiRoutePrefix": "shop"
    });
    let app = app(state());
    let (status, body) = call(app.clone(), "POST", "/api/v1/connections", Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["data"]["state"], "ConnectionError");
    assert!(body["data"]["messages"][0].as_str().unwrap().contains("connection refused"));
    assert!(body["data"].get("connectionId").is_none());

    let (status, body) = call(app, "GET", "/api/v1/connections", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["count"], 0);
}

#[tokio::test]
async fn unknown_connection_ids() {
    let app = app(state());
    let (status, _) = call(app.clone(), "GET", "/api/v1/connections/not-a-uuid/endpoints", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let uri = format!("/api/v1/connections/{}/source", uuid::Uuid::new_v4());
    let (status, body) = call(app.clone(), "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
    let uri = format!("/api/v1/connections/{}", uuid::Uuid::new_v4());
    let (status, _) = call(app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unrouted_paths_fall_through_to_not_found_and_405() {
    let state = state();
    state
        .registry
        .routes()
        .register("shop", "shop", "http://127.0.0.1:9", [("GET", "/customers")]);
    let app = app(state);
    let (status, body) = call(app.clone(), "GET", "/api/v1/crm/leads", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
    let (status, body) = call(app, "DELETE", "/api/v1/shop/customers", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"]["code"], "method_not_allowed");
}

#[tokio::test]
async fn registered_routes_are_proxied_to_the_module() {
    use axum::extract::{OriginalUri, Path};
    use axum::routing::get;

    let module = Router::new().route(
        "/customers/:id",
        get(|Path(id): Path<String>, OriginalUri(uri): OriginalUri| async move {
            axum::Json(json!({ "id": id, "query": uri.query() }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, module).await.unwrap();
    });

    let state = state();
    state.registry.routes().register(
        "shop",
        "shop",
        &format!("http://{}", addr),
        [("GET", "/customers/:id")],
    );
    let (status, body) = call(app(state), "GET", "/api/v1/shop/customers/7?page=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "7");
    assert_eq!(body["query"], "page=2");
}
