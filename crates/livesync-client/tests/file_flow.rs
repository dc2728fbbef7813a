//! End-to-end room behavior across several mesh peers, under a paused clock.

use std::sync::Arc;
use std::time::Duration;

use livesync_client::{
    Delivery, FileService, Lookup, RoomStore, SyncStatus, Timeouts, spawn_reconciler,
};
use livesync_store::{Mesh, MeshConfig};
use livesync_types::RoomId;

const LATENCY: Duration = Duration::from_millis(200);

fn mesh() -> Mesh {
    Mesh::new(MeshConfig {
        latency_ms: LATENCY.as_millis() as u64,
        ..MeshConfig::default()
    })
}

fn room_store(mesh: &Mesh, room: &str) -> RoomStore {
    RoomStore::new(Arc::new(mesh.join()), RoomId::new(room).unwrap())
}

fn service(mesh: &Mesh, room: &str) -> FileService {
    FileService::new(room_store(mesh, room), Timeouts::default())
}

async fn propagate() {
    tokio::time::sleep(LATENCY * 2).await;
}

#[tokio::test(start_paused = true)]
async fn test_upload_list_delete_example() {
    let mesh = mesh();
    let uploader = service(&mesh, "r1");
    let observer = service(&mesh, "r1");

    let uploaded = uploader.upsert("a.txt", "hi").await.unwrap();
    assert!(uploaded.created);
    propagate().await;

    let listed = observer.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, uploaded.id);
    assert_eq!(listed[0].name, "a.txt");
    assert_eq!(listed[0].size, 2);
    assert_eq!(listed[0].file_type, "TXT");

    let deleted = observer.delete_by_name("a.txt").await.unwrap().found().unwrap();
    assert_eq!(deleted.ids, [uploaded.id]);
    propagate().await;

    assert!(uploader.list().await.unwrap().is_empty());
    assert!(observer.list().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_upsert_reuses_id_across_peers() {
    let mesh = mesh();
    let first = service(&mesh, "r1");
    let second = service(&mesh, "r1");

    let created = first.upsert("notes.md", "v1").await.unwrap();
    propagate().await;
    let updated = second.upsert("notes.md", "v2").await.unwrap();

    assert!(created.created);
    assert!(!updated.created);
    assert_eq!(updated.id, created.id);

    propagate().await;
    let file = first.find_by_name("notes.md").await.unwrap().found().unwrap();
    assert_eq!(file.content, "v2");
    assert_eq!(file.file_type, "MD");
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_upserts_race_to_duplicate_names() {
    let mesh = mesh();
    let left = service(&mesh, "r1");
    let right = service(&mesh, "r1");

    let (a, b) = tokio::join!(left.upsert("dup.txt", "left"), right.upsert("dup.txt", "right"));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.created);
    assert!(b.created);
    assert_ne!(a.id, b.id);

    propagate().await;
    let listed = left.list().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|f| f.name == "dup.txt"));

    // Readers agree on one winner.
    let from_left = left.find_by_name("dup.txt").await.unwrap().found().unwrap();
    let from_right = right.find_by_name("dup.txt").await.unwrap().found().unwrap();
    assert_eq!(from_left.id, from_right.id);

    let deleted = right.delete_by_name("dup.txt").await.unwrap().found().unwrap();
    assert_eq!(deleted.ids.len(), 2);
    propagate().await;
    assert!(left.list().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_ack_is_uncertain_but_still_propagates() {
    let mesh = mesh();
    mesh.set_latency(Duration::from_secs(5));
    let writer = service(&mesh, "r1");
    let reader = room_store(&mesh, "r1");

    let outcome = writer.upload_raw("slow.txt", "eventually").await.unwrap();
    assert_eq!(outcome.delivery, Delivery::Uncertain);

    tokio::time::sleep(Duration::from_secs(5)).await;
    let seen = reader.get(&outcome.id).await.unwrap().unwrap();
    assert_eq!(seen.into_present().unwrap().content, "eventually");
}

#[tokio::test(start_paused = true)]
async fn test_discovery_deadline_shorter_than_propagation() {
    let mesh = mesh();
    mesh.set_latency(Duration::from_secs(6));
    let writer = service(&mesh, "r1");
    let reader = service(&mesh, "r1");

    writer.upload_raw("late.txt", "x").await.unwrap();

    let miss = reader.find_by_name("late.txt").await.unwrap();
    assert_eq!(miss, Lookup::NotFound { waited: Timeouts::default().download() });

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(reader.find_by_name("late.txt").await.unwrap().is_found());
}

#[tokio::test(start_paused = true)]
async fn test_rooms_are_isolated() {
    let mesh = mesh();
    let r1 = service(&mesh, "r1");
    let r2 = service(&mesh, "r2");

    r1.upsert("a.txt", "1").await.unwrap();
    propagate().await;

    assert!(r2.list().await.unwrap().is_empty());
    assert!(!r2.find_by_name("a.txt").await.unwrap().is_found());
}

#[tokio::test(start_paused = true)]
async fn test_reconciler_follows_remote_changes() {
    let mesh = mesh();
    let remote = service(&mesh, "r1");
    let view = spawn_reconciler(room_store(&mesh, "r1")).unwrap();
    let mut files = view.subscribe_files();
    assert_eq!(view.status(), SyncStatus::Syncing);

    let a = remote.upsert("a.txt", "1").await.unwrap();
    let b = remote.upload_raw("b.txt", "2").await.unwrap();
    files.wait_for(|f| f.len() == 2).await.unwrap();
    assert_eq!(view.status(), SyncStatus::Live);

    remote.upsert("a.txt", "changed").await.unwrap();
    files
        .wait_for(|f| f.iter().any(|r| r.content == "changed"))
        .await
        .unwrap();
    let ids: Vec<_> = view.files().into_iter().map(|f| f.id).collect();
    assert_eq!(ids, [a.id.clone(), b.id.clone()]);

    remote.delete(&a.id).await.unwrap();
    files.wait_for(|f| f.len() == 1).await.unwrap();
    assert_eq!(view.files()[0].id, b.id);

    view.unsubscribe();
    remote.delete(&b.id).await.unwrap();
    propagate().await;
    assert_eq!(files.borrow().len(), 1);
}
