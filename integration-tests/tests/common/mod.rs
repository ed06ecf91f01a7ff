#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use zbi_manager::model::{Instance, Project};
use zbi_manager::testing::{sample_blockchain, sample_policy};

pub const INTERNAL_SECRET: &str = "it-secret";

/// Find a free TCP port by binding to port 0
pub fn find_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to port 0");
    listener.local_addr().unwrap().port()
}

/// Wait for a TCP port to accept connections
pub async fn wait_for_port(port: u16, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if tokio::time::Instant::now() > deadline {
            panic!("Timed out waiting for port {} to be ready", port);
        }
        if tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port))
            .await
            .is_ok()
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Get the path to a compiled binary in the target directory
fn cargo_bin(name: &str) -> PathBuf {
    // Look for the binary next to the test executable's parent (target/debug)
    let mut path = std::env::current_exe()
        .expect("Failed to get current exe")
        .parent()
        .expect("No parent")
        .parent()
        .expect("No grandparent")
        .to_path_buf();
    path.push(name);
    if path.exists() {
        return path;
    }

    // Fallback: try target/debug directly
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop(); // integration-tests -> workspace root
    path.push("target");
    path.push("debug");
    path.push(name);
    if path.exists() {
        return path;
    }

    panic!(
        "Binary '{}' not found. Run `cargo build --workspace` first.",
        name
    );
}

// ============================================================================
// Mock repository
// ============================================================================

#[derive(Default)]
pub struct MockState {
    pub instances: Mutex<Vec<Value>>,
    pub projects: Mutex<Vec<Value>>,
    pub updates: Mutex<Vec<(String, Value)>>,
    pub activities: Mutex<Vec<(String, Value)>>,
    pub rejected: Mutex<usize>,
}

impl MockState {
    pub fn instance(&self, id: &str) -> Option<Value> {
        self.instances
            .lock()
            .unwrap()
            .iter()
            .find(|i| i["id"] == id)
            .cloned()
    }
}

/// Repository service speaking the wire protocol the control binary uses,
/// seeded with the sample policy and blockchain.
pub struct MockRepository {
    pub port: u16,
    pub state: Arc<MockState>,
    server: tokio::task::JoinHandle<()>,
}

impl MockRepository {
    pub async fn start(projects: Vec<Project>, instances: Vec<Instance>) -> Self {
        let state = Arc::new(MockState::default());
        *state.projects.lock().unwrap() = projects
            .iter()
            .map(|p| serde_json::to_value(p).unwrap())
            .collect();
        *state.instances.lock().unwrap() = instances
            .iter()
            .map(|i| serde_json::to_value(i).unwrap())
            .collect();

        let app = Router::new()
            .route("/api/v1/config/policy", get(policy))
            .route("/api/v1/config/blockchains/:name", get(blockchain))
            .route("/api/v1/projects/:name", get(project))
            .route("/api/v1/projects/:name/instances", get(project_instances))
            .route("/api/v1/instances/:id", get(instance).put(update_instance))
            .route("/api/v1/instances/:id/activities", post(add_activity))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock repository");
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock repository failed");
        });

        Self {
            port,
            state,
            server,
        }
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}/api/v1", self.port)
    }
}

impl Drop for MockRepository {
    fn drop(&mut self) {
        self.server.abort();
    }
}

type MockResult = Result<Json<Value>, StatusCode>;

fn authorize(state: &MockState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let secret = headers
        .get("x-internal-secret")
        .and_then(|v| v.to_str().ok());
    let has_request_id = headers.contains_key("x-request-id");
    if secret == Some(INTERNAL_SECRET) && has_request_id {
        Ok(())
    } else {
        *state.rejected.lock().unwrap() += 1;
        Err(StatusCode::UNAUTHORIZED)
    }
}

async fn policy(State(state): State<Arc<MockState>>, headers: HeaderMap) -> MockResult {
    authorize(&state, &headers)?;
    Ok(Json(json!({ "policy": sample_policy() })))
}

async fn blockchain(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> MockResult {
    authorize(&state, &headers)?;
    let blockchain = sample_blockchain();
    if blockchain.name != name {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({ "blockchain": blockchain })))
}

async fn project(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> MockResult {
    authorize(&state, &headers)?;
    let projects = state.projects.lock().unwrap();
    let project = projects
        .iter()
        .find(|p| p["name"] == name.as_str())
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!({ "project": project })))
}

async fn project_instances(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> MockResult {
    authorize(&state, &headers)?;
    let instances: Vec<Value> = state
        .instances
        .lock()
        .unwrap()
        .iter()
        .filter(|i| i["project"] == name.as_str())
        .cloned()
        .collect();
    Ok(Json(json!({ "instances": instances })))
}

async fn instance(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> MockResult {
    authorize(&state, &headers)?;
    let instance = state.instance(&id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!({ "instance": instance })))
}

async fn update_instance(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> MockResult {
    authorize(&state, &headers)?;
    let request = body.get("request").cloned().ok_or(StatusCode::BAD_REQUEST)?;

    let mut instances = state.instances.lock().unwrap();
    let instance = instances
        .iter_mut()
        .find(|i| i["id"] == id.as_str())
        .ok_or(StatusCode::NOT_FOUND)?;
    instance["request"] = request.clone();
    state.updates.lock().unwrap().push((id, request));
    Ok(Json(json!({})))
}

async fn add_activity(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> MockResult {
    authorize(&state, &headers)?;
    state.activities.lock().unwrap().push((id, body));
    Ok(Json(json!({})))
}

// ============================================================================
// Control process
// ============================================================================

/// A running control binary pointed at a repository URL.
pub struct ControlProcess {
    pub port: u16,
    child: Child,
}

impl ControlProcess {
    pub async fn start(repository_url: &str) -> Self {
        let port = find_free_port();

        let child = Command::new(cargo_bin("zbi-control"))
            .args(["--bind", &format!("127.0.0.1:{}", port)])
            .args(["--repository-url", repository_url])
            .args(["--internal-secret", INTERNAL_SECRET])
            .args(["--log-level", "debug"])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .expect("Failed to start control service");

        wait_for_port(port, Duration::from_secs(10)).await;

        Self { port, child }
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Drop for ControlProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Response types for deserialization
#[derive(Debug, serde::Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}
