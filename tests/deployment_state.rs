// ABOUTME: Tests for the typestate deployment chain, driven transition by transition.
// ABOUTME: Checks what each state leaves on disk and what the failure exits hand back.

mod support;

use shipnode::deploy::{DeployError, Deployment, SourceTree};
use shipnode::diagnostics::Diagnostics;
use shipnode::release::{ReleaseStatus, ReleaseStore, RemoteLayout};
use shipnode::remote::StepKind;
use shipnode::types::ReleaseId;
use support::{FakeRemote, backend_config, current_target, ledger_pairs, node_project};

fn id(s: &str) -> ReleaseId {
    ReleaseId::parse(s).unwrap()
}

async fn prepared(root: &std::path::Path, remote: &FakeRemote) {
    ReleaseStore::new(remote, RemoteLayout::new(root.to_str().unwrap()))
        .ensure_structure()
        .await
        .unwrap();
}

#[tokio::test]
async fn full_walk_to_completed() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());
    let remote = FakeRemote::new();
    prepared(root.path(), &remote).await;

    let config = backend_config(root.path(), "");
    let release = id("20250101000001");
    let deployment = Deployment::new(config, release.clone(), None);
    assert_eq!(
        deployment.release_dir(),
        format!("{}/releases/20250101000001", root.path().display())
    );

    let staged = deployment
        .stage(&remote, &SourceTree::new(project.path()))
        .await
        .unwrap();
    assert!(root.path().join("releases/20250101000001/index.js").is_file());
    assert_eq!(current_target(root.path()), None, "staging must not move current");

    let ready = staged.pre_deploy(&remote, None).await.unwrap();
    let switched = ready.switch(&remote).await.unwrap();
    assert_eq!(current_target(root.path()), Some(release.to_string()));

    let activated = switched.reload(&remote).await.map_err(|(_, e)| e).unwrap();
    let verified = activated
        .health_check(&remote)
        .await
        .map_err(|(_, e)| e)
        .unwrap();
    assert_eq!(verified.health_attempts(), 1);
    assert!(ledger_pairs(root.path()).is_empty(), "nothing recorded before verification");

    let completed = verified.record(&remote).await.unwrap();
    let completed = completed
        .post_deploy(&remote, None, &mut Diagnostics::default())
        .await;
    let report = completed.finish();

    assert_eq!(report.release, Some(release.clone()));
    assert_eq!(
        ledger_pairs(root.path()),
        vec![(release.to_string(), "success".to_string())]
    );
}

#[tokio::test]
async fn failed_health_check_hands_back_activated_state() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());
    let remote = FakeRemote::new();
    prepared(root.path(), &remote).await;

    let config = backend_config(root.path(), "");
    let store = ReleaseStore::new(&remote, RemoteLayout::new(root.path().to_str().unwrap()));
    let old = id("20250101000001");
    store.create_release(&old).await.unwrap();
    store.switch_current(&old).await.unwrap();
    store.record(&old, ReleaseStatus::Success).await.unwrap();

    let new = id("20250101000002");
    let activated = Deployment::new(config, new.clone(), Some(old.clone()))
        .stage(&remote, &SourceTree::new(project.path()))
        .await
        .unwrap()
        .pre_deploy(&remote, None)
        .await
        .unwrap()
        .switch(&remote)
        .await
        .unwrap()
        .reload(&remote)
        .await
        .map_err(|(_, e)| e)
        .unwrap();

    remote.health_results(&[false, false]);
    let Err((activated, err)) = activated.health_check(&remote).await else {
        panic!("health check should fail");
    };
    assert!(matches!(err, DeployError::HealthCheckFailed { attempts: 2, .. }));
    assert_eq!(activated.health_attempts(), 2);

    remote.clear();
    let restored = activated.rollback(&remote).await.unwrap();
    assert_eq!(restored, Some(old.clone()));
    assert_eq!(current_target(root.path()), Some(old.to_string()));
    assert!(remote.kinds().contains(&StepKind::ReloadProcess));
    assert_eq!(
        ledger_pairs(root.path()),
        vec![
            (old.to_string(), "success".to_string()),
            (new.to_string(), "failed".to_string()),
        ]
    );
}

#[tokio::test]
async fn failed_reload_hands_back_switched_state() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());
    let remote = FakeRemote::new();
    prepared(root.path(), &remote).await;

    let config = backend_config(root.path(), "");
    let release = id("20250101000001");
    let switched = Deployment::new(config, release.clone(), None)
        .stage(&remote, &SourceTree::new(project.path()))
        .await
        .unwrap()
        .pre_deploy(&remote, None)
        .await
        .unwrap()
        .switch(&remote)
        .await
        .unwrap();

    remote.fail(StepKind::ReloadProcess);
    let Err((switched, err)) = switched.reload(&remote).await else {
        panic!("reload should fail");
    };
    assert_eq!(err.failed_step(), Some(StepKind::ReloadProcess));

    remote.heal(StepKind::ReloadProcess);
    let restored = switched.revert(&remote).await.unwrap();
    assert_eq!(restored, None);
    assert_eq!(current_target(root.path()), None);
    assert_eq!(
        ledger_pairs(root.path()),
        vec![(release.to_string(), "failed".to_string())]
    );
}

#[tokio::test]
async fn failing_install_stops_before_pre_deploy() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());
    let remote = FakeRemote::new();
    prepared(root.path(), &remote).await;
    remote.fail(StepKind::InstallDependencies);

    let config = backend_config(root.path(), "");
    let err = Deployment::new(config, id("20250101000001"), None)
        .stage(&remote, &SourceTree::new(project.path()))
        .await
        .unwrap_err();

    assert_eq!(err.failed_step(), Some(StepKind::InstallDependencies));
    assert!(!remote.kinds().contains(&StepKind::SwitchCurrent));
}

#[tokio::test]
async fn disabled_health_check_is_skipped() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());
    let remote = FakeRemote::new();
    prepared(root.path(), &remote).await;

    let mut config = backend_config(root.path(), "");
    config.healthcheck.enabled = false;
    let verified = Deployment::new(config, id("20250101000001"), None)
        .stage(&remote, &SourceTree::new(project.path()))
        .await
        .unwrap()
        .pre_deploy(&remote, None)
        .await
        .unwrap()
        .switch(&remote)
        .await
        .unwrap()
        .reload(&remote)
        .await
        .map_err(|(_, e)| e)
        .unwrap()
        .health_check(&remote)
        .await
        .map_err(|(_, e)| e)
        .unwrap();

    assert_eq!(verified.health_attempts(), 0);
    assert_eq!(remote.count(StepKind::HealthCheck), 0);
}
