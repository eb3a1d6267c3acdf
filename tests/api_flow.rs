//! End-to-end API flow over a real listener and an on-disk database

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_test::assert_ok;

use treatment_tracker::{db::TrackerDb, serve, AppState, Args};

const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "correct horse battery staple";

struct TestServer {
    base: String,
    _dir: tempfile::TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("tracker.db");
        let args = Args::parse_from([
            "treatment-tracker",
            "--dev-mode",
            "--listen",
            "127.0.0.1:0",
            "--database-path",
            db_path.to_str().unwrap(),
        ]);

        let db = Arc::new(TrackerDb::open(&db_path).unwrap());
        let state = Arc::new(AppState::new(args, db).unwrap());
        assert_ok!(state
            .services
            .patients
            .bootstrap_admin(ADMIN_EMAIL, "Admin", ADMIN_PASSWORD));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state));

        Self {
            base: format!("http://{}", addr),
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

fn client() -> Client {
    Client::builder().cookie_store(true).build().unwrap()
}

async fn post(client: &Client, url: String, body: Value) -> (StatusCode, Value) {
    let resp = client.post(url).json(&body).send().await.unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap_or(Value::Null))
}

async fn get(client: &Client, url: String) -> (StatusCode, Value) {
    let resp = client.get(url).send().await.unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap_or(Value::Null))
}

fn tree() -> Value {
    json!({
        "nodes": [
            {"key": "root", "title": "Start here", "is_root": true},
            {"key": "skin_wash", "title": "Gentle skin wash"},
            {"key": "calendula", "title": "Calendula cream"},
            {"key": "tylenol", "title": "Tylenol"},
            {"key": "mugard", "title": "MuGard", "categories": ["oral_care"]},
            {"key": "mugard_rinse", "title": "MuGard rinse", "categories": ["oral_care"]}
        ],
        "edges": [
            {"parent_id": "root", "child_id": "skin_wash", "unlock_type": "always"},
            {"parent_id": "skin_wash", "child_id": "calendula", "unlock_type": "symptom_match",
             "unlock_value": {"any": ["itch", "redness"]}},
            {"parent_id": "root", "child_id": "tylenol", "unlock_type": "symptom_match",
             "unlock_value": {"all": ["pain"]}},
            {"parent_id": "root", "child_id": "mugard", "unlock_type": "manual",
             "description": "Ask your care team"},
            {"parent_id": "mugard", "child_id": "mugard_rinse", "unlock_type": "always"}
        ]
    })
}

/// Node ids by key from the admin tree
async fn node_ids(server: &TestServer, admin: &Client) -> HashMap<String, String> {
    let (status, body) = get(admin, server.url("/api/admin/tree")).await;
    assert_eq!(status, StatusCode::OK);
    body["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| {
            (
                n["key"].as_str().unwrap().to_string(),
                n["id"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

async fn admin_client(server: &TestServer) -> Client {
    let admin = client();
    let (status, body) = post(
        &admin,
        server.url("/api/admin/login"),
        json!({"email": ADMIN_EMAIL, "password": ADMIN_PASSWORD}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["admin"], true);
    admin
}

#[tokio::test]
async fn test_health_endpoints() {
    let server = TestServer::start().await;
    let http = client();

    let (status, body) = get(&http, server.url("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], true);

    let (status, _) = get(&http, server.url("/readyz")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&http, server.url("/version")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let (status, _) = get(&http, server.url("/nowhere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_patient_flow() {
    let server = TestServer::start().await;
    let admin = admin_client(&server).await;

    let (status, _) = post(&admin, server.url("/api/admin/tree/save"), tree()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post(
        &admin,
        server.url("/api/admin/users"),
        json!({"email": "pat@example.com", "name": "Pat"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let ids = node_ids(&server, &admin).await;

    let patient = client();

    // No session yet
    let (status, body) = get(&patient, server.url("/api/me")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "NO_SESSION");

    let (status, _) = post(&patient, server.url("/api/login"), json!({"email": "nobody@example.com"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(&patient, server.url("/api/login"), json!({"email": "Pat@Example.com"})).await;
    assert_eq!(status, StatusCode::OK);

    // First visit unlocks the root and its always children
    let (status, body) = get(&patient, server.url("/api/me")).await;
    assert_eq!(status, StatusCode::OK);
    let path: Vec<&str> = body["path"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["key"].as_str().unwrap())
        .collect();
    assert_eq!(path, vec!["root", "skin_wash"]);

    let (status, body) = post(
        &patient,
        server.url("/api/unlock-by-symptoms"),
        json!({"symptoms": ["itch"], "category": "skincare"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unlocked"], json!([ids["calendula"]]));

    // Manual edges are for the care team
    let (status, body) = post(&patient, server.url("/api/unlock-node"), json!({"nodeId": ids["mugard"]})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "NOT_UNLOCKABLE");

    let (status, _) = post(&patient, server.url("/api/unlock-node"), json!({"nodeId": ids["tylenol"]})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(&patient, server.url("/api/unlock-node"), json!({"nodeId": ids["tylenol"]})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = get(&patient, server.url("/api/tree")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unlockedCount"], 4);
    assert_eq!(body["totalNodes"], 6);

    // Patients stay out of the dashboard
    let (status, _) = get(&patient, server.url("/api/admin/stats")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = post(&patient, server.url("/api/logout"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(&patient, server.url("/api/me")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_patient_management() {
    let server = TestServer::start().await;
    let admin = admin_client(&server).await;

    let (status, _) = post(&admin, server.url("/api/admin/tree/save"), tree()).await;
    assert_eq!(status, StatusCode::OK);
    let (_, created) = post(
        &admin,
        server.url("/api/admin/users"),
        json!({"email": "sam@example.com", "name": "Sam"}),
    )
    .await;
    let user_id = created["id"].as_str().unwrap().to_string();
    let ids = node_ids(&server, &admin).await;

    let (status, body) = post(
        &admin,
        server.url(&format!("/api/admin/patients/{}/unlock-node", user_id)),
        json!({"nodeId": ids["mugard"]}),
    )
    .await;
    // The patient has not been bootstrapped, so the root is still locked
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let (status, _) = post(
        &admin,
        server.url(&format!("/api/admin/patients/{}/reset", user_id)),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(
        &admin,
        server.url(&format!("/api/admin/patients/{}/unlock-node", user_id)),
        json!({"nodeId": ids["mugard"]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["propagated"], json!([ids["mugard_rinse"]]));

    let (status, body) = get(
        &admin,
        server.url(&format!("/api/admin/patients/{}/unlocks", user_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let by_node: HashMap<&str, &str> = body["unlocks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| (u["node_id"].as_str().unwrap(), u["unlocked_by"].as_str().unwrap()))
        .collect();
    assert_eq!(by_node[ids["root"].as_str()], "system");
    assert_eq!(by_node[ids["mugard"].as_str()], "admin");

    let (status, body) = post(
        &admin,
        server.url(&format!("/api/admin/patients/{}/unlock-all", user_id)),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unlockedCount"], 2);

    let (status, body) = get(&admin, server.url("/api/admin/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalUsers"], 2);
    assert_eq!(body["totalUnlocks"], 6);

    let (status, body) = post(&admin, server.url("/api/admin/clear-data"), json!({"action": "unlocks"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unlocksDeleted"], 6);
}
