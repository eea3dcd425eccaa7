// ABOUTME: Integration tests for the remote deploy lock.
// ABOUTME: Exercises contention, staleness, forced breaks, and scoped release against a temp root.

use chrono::Utc;
use shipnode::deploy::{
    DeployError, DeployLock, LockInfo, LockRequest, force_unlock, read_lock,
};
use shipnode::diagnostics::Diagnostics;
use shipnode::release::RemoteLayout;
use shipnode::remote::LocalShell;
use std::path::Path;
use std::time::Duration;

const HOUR: Duration = Duration::from_secs(3600);

fn layout(dir: &Path) -> RemoteLayout {
    RemoteLayout::new(dir.to_str().unwrap())
}

fn request(user: &str) -> LockRequest {
    LockRequest::new(user, "deploy", HOUR)
}

fn plant_lock(dir: &Path, info: &LockInfo) {
    std::fs::create_dir_all(dir.join(".shipnode")).unwrap();
    std::fs::write(
        dir.join(".shipnode/deploy.lock"),
        serde_json::to_string(info).unwrap(),
    )
    .unwrap();
}

fn foreign_lock(age: chrono::Duration) -> LockInfo {
    let mut info = LockInfo::new("bob", "rollback");
    info.holder = "ci-runner-7".to_string();
    info.pid = 4242;
    info.started_at = Utc::now() - age;
    info
}

#[tokio::test]
async fn concurrent_acquires_have_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let layout = layout(dir.path());
    let shell = LocalShell::new();
    let (a, b) = (request("alice"), request("bob"));

    let (first, second) = tokio::join!(
        DeployLock::acquire(&shell, &layout, &a),
        DeployLock::acquire(&shell, &layout, &b),
    );

    let winners = [first.is_ok(), second.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(winners, 1);

    let loser = first.err().or(second.err()).unwrap();
    assert!(matches!(loser, DeployError::LockHeld(_)));
}

#[tokio::test]
async fn held_lock_reports_holder() {
    let dir = tempfile::tempdir().unwrap();
    plant_lock(dir.path(), &foreign_lock(chrono::Duration::minutes(5)));

    let shell = LocalShell::new();
    let err = DeployLock::acquire(&shell, &layout(dir.path()), &request("alice"))
        .await
        .unwrap_err();

    let holder = err.lock_holder().unwrap();
    assert_eq!(holder.holder, "ci-runner-7");
    assert_eq!(holder.pid, 4242);
    let message = err.to_string();
    assert!(message.contains("ci-runner-7"));
    assert!(message.contains("rollback"));
}

#[tokio::test]
async fn stale_lock_is_reclaimed() {
    let dir = tempfile::tempdir().unwrap();
    plant_lock(dir.path(), &foreign_lock(chrono::Duration::hours(2)));

    let shell = LocalShell::new();
    let lock = DeployLock::acquire(&shell, &layout(dir.path()), &request("alice"))
        .await
        .unwrap();
    assert_eq!(lock.info().user, "alice");

    let on_disk = read_lock(&shell, &layout(dir.path())).await.unwrap().unwrap();
    assert_eq!(on_disk.user, "alice");
}

#[tokio::test]
async fn force_breaks_fresh_lock() {
    let dir = tempfile::tempdir().unwrap();
    plant_lock(dir.path(), &foreign_lock(chrono::Duration::minutes(1)));

    let shell = LocalShell::new();
    let lock = DeployLock::acquire(
        &shell,
        &layout(dir.path()),
        &request("alice").force(true),
    )
    .await
    .unwrap();
    assert_eq!(lock.info().command, "deploy");
}

#[tokio::test]
async fn corrupt_lock_is_broken() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join(".shipnode")).unwrap();
    std::fs::write(dir.path().join(".shipnode/deploy.lock"), "{not json").unwrap();

    let shell = LocalShell::new();
    assert!(
        DeployLock::acquire(&shell, &layout(dir.path()), &request("alice"))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn with_lock_releases_after_error() {
    let dir = tempfile::tempdir().unwrap();
    let shell = LocalShell::new();
    let lock = DeployLock::acquire(&shell, &layout(dir.path()), &request("alice"))
        .await
        .unwrap();

    let scope = lock
        .with_lock(async { Err::<(), _>(DeployError::Config("boom".to_string())) })
        .await;
    let result = scope.into_result(&mut Diagnostics::default());

    assert!(matches!(result, Err(DeployError::Config(_))));
    assert!(!dir.path().join(".shipnode/deploy.lock").exists());
}

#[tokio::test]
async fn with_lock_releases_on_interrupt() {
    let dir = tempfile::tempdir().unwrap();
    let shell = LocalShell::new();
    let lock = DeployLock::acquire(&shell, &layout(dir.path()), &request("alice"))
        .await
        .unwrap();

    let scope = lock
        .with_lock_until(
            std::future::pending::<Result<(), DeployError>>(),
            async {},
        )
        .await;

    assert!(matches!(scope.result, Err(DeployError::Interrupted)));
    assert!(scope.release.is_ok());
    assert!(!dir.path().join(".shipnode/deploy.lock").exists());
}

#[tokio::test]
async fn with_lock_releases_before_resuming_panic() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();

    let handle = tokio::spawn(async move {
        let shell = LocalShell::new();
        let layout = RemoteLayout::new(root.to_str().unwrap());
        let lock = DeployLock::acquire(&shell, &layout, &LockRequest::new("alice", "deploy", HOUR))
            .await
            .unwrap();
        lock.with_lock(async {
            if std::hint::black_box(true) {
                panic!("deploy blew up");
            }
            Ok::<(), DeployError>(())
        })
        .await
    });

    let err = handle.await.unwrap_err();
    assert!(err.is_panic());
    assert!(!dir.path().join(".shipnode/deploy.lock").exists());
}

#[tokio::test]
async fn force_unlock_returns_previous_holder() {
    let dir = tempfile::tempdir().unwrap();
    plant_lock(dir.path(), &foreign_lock(chrono::Duration::minutes(1)));

    let shell = LocalShell::new();
    let holder = force_unlock(&shell, &layout(dir.path())).await.unwrap();
    assert_eq!(holder.unwrap().user, "bob");
    assert!(!dir.path().join(".shipnode/deploy.lock").exists());

    assert!(force_unlock(&shell, &layout(dir.path())).await.unwrap().is_none());
}

#[tokio::test]
async fn lock_is_released_after_deploy_fails_under_it() {
    let dir = tempfile::tempdir().unwrap();
    let shell = LocalShell::new();
    let layout = layout(dir.path());

    let lock = DeployLock::acquire(&shell, &layout, &request("alice"))
        .await
        .unwrap();
    assert!(read_lock(&shell, &layout).await.unwrap().is_some());
    lock.release().await.unwrap();

    assert!(read_lock(&shell, &layout).await.unwrap().is_none());
    assert!(
        DeployLock::acquire(&shell, &layout, &request("bob"))
            .await
            .is_ok()
    );
}
