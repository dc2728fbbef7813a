//! HTTP round trips against a server bound to an ephemeral port.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use livesync_client::{Timeouts, room_collection};
use livesync_server::{Server, ServerConfig};
use livesync_store::{AckStatus, GraphStore, MeshConfig, Put};
use livesync_types::RoomId;
use reqwest::StatusCode;
use serde_json::{Value, json};

const DEADLINE: Duration = Duration::from_millis(300);

async fn spawn_for_tests() -> (Server, String) {
    let config = ServerConfig {
        bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        timeouts: Timeouts::uniform(DEADLINE),
        mesh: MeshConfig {
            latency_ms: 20,
            ..MeshConfig::default()
        },
    };
    let server = Server::spawn(config).await.unwrap();
    let base = format!("http://{}", server.http_addr());
    (server, base)
}

async fn upload(client: &reqwest::Client, base: &str, room: &str, name: &str, content: &str) -> Value {
    let res = client
        .post(format!("{base}/api/upload"))
        .json(&json!({"room": room, "filename": name, "content": content}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

async fn list(client: &reqwest::Client, base: &str, room: &str) -> Vec<Value> {
    let res = client
        .get(format!("{base}/api/files?room={room}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    body["files"].as_array().unwrap().clone()
}

#[tokio::test]
async fn test_upload_list_download_delete() {
    let (server, base) = spawn_for_tests().await;
    let client = reqwest::Client::new();

    let uploaded = upload(&client, &base, "r1", "a.txt", "hi").await;
    assert_eq!(uploaded["success"], true);
    assert_eq!(uploaded["created"], true);
    assert_eq!(uploaded["acknowledged"], true);
    let id = uploaded["id"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 9);

    let files = list(&client, &base, "r1").await;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["name"], "a.txt");
    assert_eq!(files[0]["size"], 2);
    assert_eq!(files[0]["type"], "TXT");
    assert!(files[0]["modified"].as_str().unwrap().ends_with('Z'));

    let res = client
        .get(format!("{base}/api/download?room=r1&file=a.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers()["content-type"].to_str().unwrap().starts_with("text/plain"));
    assert_eq!(res.text().await.unwrap(), "hi");

    let again = upload(&client, &base, "r1", "a.txt", "hello").await;
    assert_eq!(again["created"], false);
    assert_eq!(again["id"], id.as_str());

    let res = client
        .delete(format!("{base}/api/delete?room=r1&file=a.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let deleted: Value = res.json().await.unwrap();
    assert_eq!(deleted["deleted"], json!([id]));

    assert!(list(&client, &base, "r1").await.is_empty());
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_params_are_bad_requests() {
    let (server, base) = spawn_for_tests().await;
    let client = reqwest::Client::new();

    for path in ["/api/files", "/api/download?room=r1", "/api/delete?file=a.txt"] {
        let res = client.get(format!("{base}{path}")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{path}");
        let body: Value = res.json().await.unwrap();
        assert!(body["error"].is_string());
    }

    let res = client
        .post(format!("{base}/api/upload"))
        .json(&json!({"room": "r1", "filename": "a.txt"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(format!("{base}/api/upload"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_not_found_within_deadline() {
    let (server, base) = spawn_for_tests().await;
    let client = reqwest::Client::new();

    for req in [
        client.get(format!("{base}/api/download?room=r1&file=nope.txt")),
        client.get(format!("{base}/api/delete?room=r1&file=nope.txt")),
    ] {
        let res = req.send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "File not found within 300 ms");
    }

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_upload_method_handling_and_cors() {
    let (server, base) = spawn_for_tests().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{base}/api/upload"))
        .header("origin", "https://app.example")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");

    let res = client
        .request(reqwest::Method::OPTIONS, format!("{base}/api/upload"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{base}/api/files?room=r1"))
        .header("origin", "https://app.example")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["access-control-allow-origin"], "*");

    let res = client.get(format!("{base}/healthcheck")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "OK");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_listing_is_sorted_and_room_scoped() {
    let (server, base) = spawn_for_tests().await;
    let client = reqwest::Client::new();

    upload(&client, &base, "r1", "b.md", "2").await;
    upload(&client, &base, "r1", "a.txt", "1").await;
    upload(&client, &base, "r2", "other.txt", "3").await;

    let names: Vec<_> = list(&client, &base, "r1")
        .await
        .into_iter()
        .map(|f| f["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["a.txt", "b.md"]);

    let r2 = list(&client, &base, "r2").await;
    assert_eq!(r2.len(), 1);
    assert_eq!(r2[0]["type"], "TXT");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_far_future_timestamp_from_peer_is_ignored() {
    let (server, base) = spawn_for_tests().await;
    let client = reqwest::Client::new();
    upload(&client, &base, "r1", "ok.txt", "fine").await;

    let peer = server.relay().mesh().join();
    let hostile = json!({"name": "bad.txt", "content": "x", "lastModified": 1e300});
    let Value::Object(node) = hostile else { unreachable!() };
    let collection = room_collection(&RoomId::new("r1").unwrap());
    let ack = peer.put(&collection, "hostile", Put::Replace(node)).unwrap();
    assert_eq!(ack.wait(DEADLINE).await, AckStatus::Acked);
    drop(peer);

    let files = list(&client, &base, "r1").await;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["name"], "ok.txt");

    server.shutdown().await.unwrap();
}
