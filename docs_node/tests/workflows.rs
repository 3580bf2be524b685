use std::time::Duration;

use docs_client::{Client, ClientError};
use docs_core::Status;
use docs_node::{NameServer, NameServerConfig};
use docs_storage::{StorageServer, StorageServerConfig};

async fn start_name_server() -> String {
    let config = NameServerConfig {
        listen: "127.0.0.1:0".into(),
        rpc_timeout_secs: Some(5),
        user_registry_file: None,
    };
    let server = NameServer::bind(&config).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(server.run());
    addr
}

async fn start_storage_server(name_server: &str, base_path: &std::path::Path) {
    let config = StorageServerConfig {
        name_server: name_server.to_string(),
        listen: "127.0.0.1:0".into(),
        advertise_ip: Some("127.0.0.1".into()),
        base_path: base_path.to_string_lossy().into_owned(),
        stream_word_delay_ms: 0,
    };
    let server = StorageServer::bind(&config).await.unwrap();
    tokio::spawn(async move {
        if let Err(err) = server.run().await {
            eprintln!("storage server stopped: {err}");
        }
    });
}

/// Retries `create` until a storage server has registered.
async fn create_when_ready(client: &mut Client, name: &str) {
    for _ in 0..100 {
        match client.create(name).await {
            Ok(_) => return,
            Err(err) if err.status() == Some(Status::ServerUnavailable) => {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Err(err) => panic!("create failed: {err}"),
        }
    }
    panic!("no storage server registered");
}

fn status_of<T: std::fmt::Debug>(result: Result<T, ClientError>) -> Status {
    result.unwrap_err().status().unwrap()
}

#[tokio::test]
async fn share_edit_undo_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let nm = start_name_server().await;
    start_storage_server(&nm, dir.path()).await;

    let mut alice = Client::connect(&nm, "alice").await.unwrap();
    let mut bob = Client::connect(&nm, "bob").await.unwrap();
    create_when_ready(&mut alice, "r.txt").await;

    let info = alice.info("r.txt").await.unwrap();
    assert!(info.contains("Owner: alice"));
    assert!(!info.contains("bob"));

    let mut session = alice.write("r.txt", 0).await.unwrap();
    session.edit(0, "Hello").await.unwrap();
    assert_eq!(session.edit(1, "world.").await.unwrap(), "Hello world.");
    session.commit().await.unwrap();
    assert_eq!(alice.read("r.txt").await.unwrap(), "Hello world.");

    assert_eq!(status_of(bob.read("r.txt").await), Status::ReadPermission);
    alice.add_access("r.txt", "bob", false).await.unwrap();
    assert_eq!(bob.read("r.txt").await.unwrap(), "Hello world.");
    assert_eq!(
        status_of(bob.write("r.txt", 0).await),
        Status::WritePermission
    );

    alice.add_access("r.txt", "bob", true).await.unwrap();
    let mut session = bob.write("r.txt", 0).await.unwrap();
    assert_eq!(session.sentence(), "Sentence 0 locked: Hello world.");
    session.edit(1, "there.").await.unwrap();
    session.commit().await.unwrap();
    assert_eq!(bob.read("r.txt").await.unwrap(), "Hello there.");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("r.txt.bak")).unwrap(),
        "Hello world."
    );

    alice.undo("r.txt").await.unwrap();
    assert_eq!(alice.read("r.txt").await.unwrap(), "Hello world.");

    let mut words = Vec::new();
    bob.stream("r.txt", |w| words.push(w.to_string()))
        .await
        .unwrap();
    assert_eq!(words, vec!["Hello", "world."]);

    assert_eq!(status_of(bob.delete("r.txt").await), Status::OwnerRequired);
    assert!(dir.path().join("r.txt").exists());

    let listing = bob.view(false, false).await.unwrap();
    assert_eq!(listing, "Files:\n  r.txt\n");
    let users = bob.list_users().await.unwrap();
    assert!(users.contains("alice") && users.contains("bob"));

    alice.delete("r.txt").await.unwrap();
    assert!(!dir.path().join("r.txt").exists());
    assert!(!dir.path().join("r.txt.meta").exists());
    assert_eq!(status_of(alice.info("r.txt").await), Status::NotFound);
}

#[tokio::test]
async fn abandoned_session_frees_its_sentence() {
    let dir = tempfile::tempdir().unwrap();
    let nm = start_name_server().await;
    start_storage_server(&nm, dir.path()).await;

    let mut alice = Client::connect(&nm, "alice").await.unwrap();
    let mut bob = Client::connect(&nm, "bob").await.unwrap();
    create_when_ready(&mut alice, "doc.txt").await;
    alice.add_access("doc.txt", "bob", true).await.unwrap();
    let mut first = alice.write("doc.txt", 0).await.unwrap();
    first.edit(0, "One.").await.unwrap();
    first.commit().await.unwrap();

    let held = bob.write("doc.txt", 0).await.unwrap();
    assert_eq!(status_of(alice.write("doc.txt", 0).await), Status::Locked);
    let mut other = alice.write("doc.txt", 1).await.unwrap();
    other.edit(0, "Two.").await.unwrap();
    other.commit().await.unwrap();
    assert_eq!(
        status_of(alice.write("doc.txt", 3).await),
        Status::SentenceOutOfRange
    );

    drop(held);
    let mut reopened = None;
    for _ in 0..100 {
        match alice.write("doc.txt", 0).await {
            Ok(session) => {
                reopened = Some(session);
                break;
            }
            Err(err) if err.status() == Some(Status::Locked) => {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    assert!(reopened.is_some(), "lock was never released");
}

#[tokio::test]
async fn restarted_storage_brings_its_files_back() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("old.txt"), "Kept across restarts.").unwrap();
    std::fs::write(
        dir.path().join("old.txt.meta"),
        "owner=carol\ncreated=0\nmodified=0\naccessed=0\naccessed_by=carol\nsize=21\nword_count=3\nchar_count=21\naccess_count=1\naccess_0=dave:R\n",
    )
    .unwrap();

    let nm = start_name_server().await;
    start_storage_server(&nm, dir.path()).await;

    let mut dave = Client::connect(&nm, "dave").await.unwrap();
    let mut found = false;
    for _ in 0..100 {
        if dave.view(false, false).await.unwrap().contains("old.txt") {
            found = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(found, "old.txt never showed up");
    assert_eq!(dave.read("old.txt").await.unwrap(), "Kept across restarts.");
    assert_eq!(
        status_of(dave.add_access("old.txt", "dave", true).await),
        Status::OwnerRequired
    );
}

#[tokio::test]
async fn second_login_with_same_name_is_refused() {
    let nm = start_name_server().await;
    let _alice = Client::connect(&nm, "alice").await.unwrap();
    assert_eq!(
        status_of(Client::connect(&nm, "alice").await),
        Status::AlreadyConnected
    );
}

#[tokio::test]
async fn access_list_too_long_to_store_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let nm = start_name_server().await;
    start_storage_server(&nm, dir.path()).await;

    let mut alice = Client::connect(&nm, "alice").await.unwrap();
    create_when_ready(&mut alice, "r.txt").await;
    for i in 0..16 {
        let user = format!("u{i:02}{}", "x".repeat(57));
        alice.add_access("r.txt", &user, false).await.unwrap();
    }

    // "r.txt " plus the serialized list would need all 1024 bytes of the
    // args field, leaving no room for its terminator.
    assert_eq!(
        status_of(alice.add_access("r.txt", "zzzzzzz", true).await),
        Status::InvalidArgs
    );
    let info = alice.info("r.txt").await.unwrap();
    assert!(!info.contains("zzzzzzz"));
    let sidecar = std::fs::read_to_string(dir.path().join("r.txt.meta")).unwrap();
    assert!(!sidecar.contains("zzzzzzz"));
    assert!(sidecar.contains("access_count=16\n"));

    alice.add_access("r.txt", "zed", true).await.unwrap();
    let sidecar = std::fs::read_to_string(dir.path().join("r.txt.meta")).unwrap();
    assert!(sidecar.contains("access_16=zed:RW\n"));
    let mut zed = Client::connect(&nm, "zed").await.unwrap();
    let session = zed.write("r.txt", 0).await.unwrap();
    assert_eq!(session.sentence(), "Sentence 0 locked: ");
}
