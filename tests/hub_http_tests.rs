//! HttpHub against an in-process stub of the hub REST API

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use golem_build::hub::{HttpHub, HubApi, HubError};
use golem_protocol::{Command, DeploymentImage, DeploymentSpec, FileFormat, HubInfo, PeerHardware, PeerInfo};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Default)]
struct Seen {
    app_names: Vec<String>,
    specs: Vec<Value>,
    commands: Vec<Value>,
    dropped: Vec<String>,
}

type Shared = Arc<Mutex<Seen>>;

fn record_header(seen: &Shared, headers: &HeaderMap) {
    let value = headers
        .get("x-gu-appname")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    seen.lock().unwrap().app_names.push(value);
}

async fn info(State(seen): State<Shared>, headers: HeaderMap) -> Json<Value> {
    record_header(&seen, &headers);
    Json(json!({ "nodeId": "0xhub", "version": "0.8.1" }))
}

async fn peers(State(seen): State<Shared>, headers: HeaderMap) -> Json<Value> {
    record_header(&seen, &headers);
    Json(json!([
        { "nodeId": "0xaaa", "peerAddr": "10.0.0.5:7464", "nodeName": "builder-1" },
        { "nodeId": "0xbbb", "peerAddr": "10.0.0.6:7464" }
    ]))
}

async fn hardware(Path(node): Path<String>) -> Result<Json<Value>, StatusCode> {
    match node.as_str() {
        "0xaaa" => Ok(Json(json!({ "coreCount": 12, "memoryBytes": 34359738368u64 }))),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn create(State(seen): State<Shared>, Path(_node): Path<String>, Json(spec): Json<Value>) -> String {
    seen.lock().unwrap().specs.push(spec);
    "\"dep-7\"".to_string()
}

async fn update(
    State(seen): State<Shared>,
    Path((_node, _dep)): Path<(String, String)>,
    Json(commands): Json<Value>,
) -> Json<Vec<String>> {
    let count = commands.as_array().map(|a| a.len()).unwrap_or(0);
    seen.lock().unwrap().commands.push(commands);
    Json((0..count).map(|i| format!("result {}", i)).collect())
}

async fn drop_deployment(State(seen): State<Shared>, Path((_node, dep)): Path<(String, String)>) -> StatusCode {
    seen.lock().unwrap().dropped.push(dep);
    StatusCode::OK
}

async fn stub_hub() -> (String, Shared) {
    let seen: Shared = Arc::new(Mutex::new(Seen::default()));
    let app = Router::new()
        .route("/", get(info))
        .route("/peers", get(peers))
        .route("/peers/{node}/hardware", get(hardware))
        .route("/peers/{node}/deployments", post(create))
        .route(
            "/peers/{node}/deployments/{dep}",
            patch(update).delete(drop_deployment),
        )
        .with_state(seen.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), seen)
}

#[tokio::test]
async fn test_discovery_calls() {
    let (url, seen) = stub_hub().await;
    let hub = HttpHub::new(&url, "GolemCompiler").unwrap();

    let info: HubInfo = hub.hub_info().await.unwrap();
    assert_eq!(info.node_id, "0xhub");

    let peers: Vec<PeerInfo> = hub.list_peers().await.unwrap();
    assert_eq!(peers.len(), 2);
    assert_eq!(peers[0].node_name.as_deref(), Some("builder-1"));
    assert_eq!(peers[1].peer_addr, "10.0.0.6:7464");

    let hardware: PeerHardware = hub.peer_hardware("0xaaa").await.unwrap();
    assert_eq!(hardware.core_count, 12);

    let names = seen.lock().unwrap().app_names.clone();
    assert_eq!(names, vec!["Bearer GolemCompiler", "Bearer GolemCompiler"]);
}

#[tokio::test]
async fn test_error_status_surfaces() {
    let (url, _seen) = stub_hub().await;
    let hub = HttpHub::new(&url, "GolemCompiler").unwrap();

    match hub.peer_hardware("0xmissing").await {
        Err(HubError::Status { operation, status, .. }) => {
            assert_eq!(operation, "peer_hardware");
            assert_eq!(status, 404);
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_deployment_lifecycle() {
    let (url, seen) = stub_hub().await;
    let hub = HttpHub::new(&url, "GolemCompiler").unwrap();

    let spec = DeploymentSpec::new(
        DeploymentImage::sha1("c0ffee", "http://10.0.0.1:6000/requestID/compiler/c0ffee"),
        "compiler",
    );
    let id = hub.create_deployment("0xaaa", &spec).await.unwrap();
    assert_eq!(id, "dep-7");

    let commands = vec![
        Command::download("http://10.0.0.1:6000/requestID/tasks/ab", "ab.tar", FileFormat::Tar),
        Command::exec("ab.tar/golembuild.bat", Vec::new()),
    ];
    let results = hub.update_deployment("0xaaa", &id, &commands).await.unwrap();
    assert_eq!(results, vec!["result 0", "result 1"]);

    hub.drop_deployment("0xaaa", &id).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.specs[0]["image"]["hash"], "SHA1:c0ffee");
    assert_eq!(seen.specs[0]["envType"], "hd");
    assert_eq!(seen.commands[0][0]["downloadFile"]["filePath"], "ab.tar");
    assert_eq!(seen.commands[0][0]["downloadFile"]["format"], "tar");
    assert_eq!(seen.dropped, vec!["dep-7"]);
}

#[tokio::test]
async fn test_unreachable_hub() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let hub = HttpHub::new(&format!("http://{}", addr), "GolemCompiler").unwrap();
    assert!(matches!(hub.list_peers().await, Err(HubError::Http(_))));
}
