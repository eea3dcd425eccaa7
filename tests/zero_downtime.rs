// ABOUTME: End-to-end deploy tests against a local fake remote.
// ABOUTME: Covers first deploy, health rollback, hooks, cleanup, frontends, and legacy mode.

mod support;

use shipnode::deploy::{DeployError, DeployErrorKind, DeployOptions, SourceTree, deploy};
use shipnode::diagnostics::{Diagnostics, WarningKind};
use shipnode::remote::StepKind;
use support::{
    FakeRemote, backend_config, current_target, frontend_config, ledger_pairs, node_project,
    release_dirs, write_hook,
};

fn options(project: &std::path::Path) -> DeployOptions {
    DeployOptions::new(SourceTree::new(project), "tester")
}

#[tokio::test]
async fn first_deploy_creates_release_and_points_current() {
    support::init_tracing();
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());
    std::fs::create_dir_all(root.path().join("shared")).unwrap();
    std::fs::write(root.path().join("shared/.env"), "SECRET=server\n").unwrap();

    let remote = FakeRemote::new();
    let config = backend_config(root.path(), "");
    let mut diag = Diagnostics::default();

    let report = deploy(&remote, &config, &options(project.path()), &mut diag)
        .await
        .unwrap();

    let id = report.release.unwrap().to_string();
    assert_eq!(current_target(root.path()), Some(id.clone()));
    assert_eq!(ledger_pairs(root.path()), vec![(id.clone(), "success".to_string())]);
    assert!(report.previous.is_none());

    let release = root.path().join("releases").join(&id);
    assert!(release.join("index.js").is_file());
    assert!(!release.join("node_modules").exists(), "node_modules must not be synced");
    let env = std::fs::read_link(release.join(".env")).unwrap();
    assert_eq!(env, root.path().join("shared/.env"));

    let ecosystem =
        std::fs::read_to_string(root.path().join("shared/ecosystem.config.cjs")).unwrap();
    assert!(ecosystem.contains(&format!("{}/current", root.path().display())));

    assert!(!root.path().join(".shipnode/deploy.lock").exists());
    assert!(!diag.has_warnings());
}

#[tokio::test]
async fn steps_run_in_lifecycle_order() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());

    let remote = FakeRemote::new();
    let config = backend_config(root.path(), "build_command: npm run build\n");
    deploy(&remote, &config, &options(project.path()), &mut Diagnostics::default())
        .await
        .unwrap();

    let kinds = remote.kinds();
    let pos = |kind: StepKind| kinds.iter().position(|k| *k == kind).unwrap();
    assert!(pos(StepKind::AcquireLock) < pos(StepKind::EnsureStructure));
    assert!(pos(StepKind::SyncFiles) < pos(StepKind::InstallDependencies));
    assert!(pos(StepKind::InstallDependencies) < pos(StepKind::Build));
    assert!(pos(StepKind::Build) < pos(StepKind::SwitchCurrent));
    assert!(pos(StepKind::SwitchCurrent) < pos(StepKind::ReloadProcess));
    assert!(pos(StepKind::ReloadProcess) < pos(StepKind::HealthCheck));
    assert!(pos(StepKind::HealthCheck) < pos(StepKind::WriteLedger));
    assert_eq!(kinds.last(), Some(&StepKind::ReleaseLock));
}

#[tokio::test]
async fn failed_health_check_restores_previous_release() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());

    let remote = FakeRemote::new();
    let config = backend_config(root.path(), "");

    let first = deploy(&remote, &config, &options(project.path()), &mut Diagnostics::default())
        .await
        .unwrap()
        .release
        .unwrap();

    remote.health_results(&[false, false]);
    let err = deploy(&remote, &config, &options(project.path()), &mut Diagnostics::default())
        .await
        .unwrap_err();

    let failed = match err {
        DeployError::HealthCheckFailed {
            release,
            attempts,
            rolled_back_to,
        } => {
            assert_eq!(attempts, 2);
            assert_eq!(rolled_back_to.as_ref(), Some(&first));
            release
        }
        other => panic!("unexpected error: {other}"),
    };

    assert_eq!(current_target(root.path()), Some(first.to_string()));
    assert_eq!(
        ledger_pairs(root.path()),
        vec![
            (first.to_string(), "success".to_string()),
            (failed.to_string(), "failed".to_string()),
        ]
    );
    assert!(!root.path().join(".shipnode/deploy.lock").exists());
}

#[tokio::test]
async fn first_deploy_health_failure_records_failure_without_rollback() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());

    let remote = FakeRemote::new();
    remote.health_results(&[false, false]);
    let config = backend_config(root.path(), "");

    let err = deploy(&remote, &config, &options(project.path()), &mut Diagnostics::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), DeployErrorKind::HealthCheckFailed);
    assert!(!err.to_string().contains("rolled back"));
    let ledger = ledger_pairs(root.path());
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].1, "failed");
    assert_eq!(current_target(root.path()), None);
}

#[tokio::test]
async fn repeated_health_failures_before_any_success_leave_no_current() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());

    let remote = FakeRemote::new();
    remote.health_results(&[false, false, false, false]);
    let config = backend_config(root.path(), "");

    for _ in 0..2 {
        let err = deploy(&remote, &config, &options(project.path()), &mut Diagnostics::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeployError::HealthCheckFailed {
                rolled_back_to: None,
                ..
            }
        ));
        assert_eq!(current_target(root.path()), None);
    }

    let statuses: Vec<_> = ledger_pairs(root.path()).into_iter().map(|(_, s)| s).collect();
    assert_eq!(statuses, vec!["failed", "failed"]);

    let good = deploy(&remote, &config, &options(project.path()), &mut Diagnostics::default())
        .await
        .unwrap()
        .release
        .unwrap();
    assert_eq!(current_target(root.path()), Some(good.to_string()));
}

#[tokio::test]
async fn consecutive_health_failures_fall_back_to_last_success() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());

    let remote = FakeRemote::new();
    let config = backend_config(root.path(), "");
    let good = deploy(&remote, &config, &options(project.path()), &mut Diagnostics::default())
        .await
        .unwrap()
        .release
        .unwrap();

    remote.health_results(&[false, false, false, false]);
    for _ in 0..2 {
        let err = deploy(&remote, &config, &options(project.path()), &mut Diagnostics::default())
            .await
            .unwrap_err();
        match err {
            DeployError::HealthCheckFailed { rolled_back_to, .. } => {
                assert_eq!(rolled_back_to.as_ref(), Some(&good));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(current_target(root.path()), Some(good.to_string()));
    }

    let statuses: Vec<_> = ledger_pairs(root.path()).into_iter().map(|(_, s)| s).collect();
    assert_eq!(statuses, vec!["success", "failed", "failed"]);
}

#[tokio::test]
async fn reload_failure_reverts_switch() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());

    let remote = FakeRemote::new();
    let config = backend_config(root.path(), "");
    let first = deploy(&remote, &config, &options(project.path()), &mut Diagnostics::default())
        .await
        .unwrap()
        .release
        .unwrap();

    remote.fail(StepKind::ReloadProcess);
    let mut diag = Diagnostics::default();
    let err = deploy(&remote, &config, &options(project.path()), &mut diag)
        .await
        .unwrap_err();

    assert_eq!(err.failed_step(), Some(StepKind::ReloadProcess));
    assert_eq!(current_target(root.path()), Some(first.to_string()));
    assert_eq!(ledger_pairs(root.path()).last().unwrap().1, "failed");
    // Reloading the previous release failed too.
    assert!(
        diag.warnings()
            .iter()
            .any(|w| w.kind == WarningKind::Recovery)
    );
}

#[tokio::test]
async fn failing_pre_deploy_hook_leaves_current_alone() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());

    let remote = FakeRemote::new();
    let config = backend_config(root.path(), "");
    let first = deploy(&remote, &config, &options(project.path()), &mut Diagnostics::default())
        .await
        .unwrap()
        .release
        .unwrap();

    write_hook(project.path(), "pre-deploy", "exit 3\n");
    remote.clear();
    let err = deploy(&remote, &config, &options(project.path()), &mut Diagnostics::default())
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::HookFailed { exit_code: 3, .. }));
    assert_eq!(current_target(root.path()), Some(first.to_string()));
    assert_eq!(remote.count(StepKind::SwitchCurrent), 0);
    assert_eq!(ledger_pairs(root.path()).last().unwrap().1, "failed");
}

#[tokio::test]
async fn hooks_see_release_context() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());
    write_hook(
        project.path(),
        "pre-deploy",
        "echo \"$SHIPNODE_APP $SHIPNODE_RELEASE\" > pre-ran\n",
    );
    write_hook(project.path(), "post-deploy", "pwd > post-ran\n");

    let remote = FakeRemote::new();
    let config = backend_config(root.path(), "");
    let id = deploy(&remote, &config, &options(project.path()), &mut Diagnostics::default())
        .await
        .unwrap()
        .release
        .unwrap();

    let release = root.path().join("releases").join(id.to_string());
    let pre = std::fs::read_to_string(release.join("pre-ran")).unwrap();
    assert_eq!(pre.trim(), format!("api {}", id));
    assert!(release.join("post-ran").is_file());
    assert!(!release.join(".shipnode").exists(), "hooks dir must not be synced");
}

#[tokio::test]
async fn failing_post_deploy_hook_is_a_warning() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());
    write_hook(project.path(), "post-deploy", "exit 9\n");

    let remote = FakeRemote::new();
    let config = backend_config(root.path(), "");
    let mut diag = Diagnostics::default();
    let report = deploy(&remote, &config, &options(project.path()), &mut diag)
        .await
        .unwrap();

    assert_eq!(
        ledger_pairs(root.path()),
        vec![(report.release.unwrap().to_string(), "success".to_string())]
    );
    assert_eq!(diag.warnings().len(), 1);
    assert_eq!(diag.warnings()[0].kind, WarningKind::PostDeployHook);
}

#[tokio::test]
async fn cleanup_keeps_newest_releases() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());

    let remote = FakeRemote::new();
    let config = backend_config(root.path(), "keep_releases: 2\n");
    let mut ids = Vec::new();
    for _ in 0..3 {
        let report =
            deploy(&remote, &config, &options(project.path()), &mut Diagnostics::default())
                .await
                .unwrap();
        ids.push(report.release.unwrap().to_string());
    }

    assert_eq!(release_dirs(root.path()), ids[1..].to_vec());
    assert_eq!(current_target(root.path()), Some(ids[2].clone()));
}

#[tokio::test]
async fn frontend_syncs_build_output_only() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    std::fs::write(project.path().join("package.json"), "{}").unwrap();
    std::fs::create_dir_all(project.path().join("dist/assets")).unwrap();
    std::fs::write(project.path().join("dist/index.html"), "<html></html>").unwrap();
    std::fs::write(project.path().join("dist/assets/app.js"), "").unwrap();

    let remote = FakeRemote::new();
    let config = frontend_config(root.path(), "");
    let report = deploy(&remote, &config, &options(project.path()), &mut Diagnostics::default())
        .await
        .unwrap();

    let release = root
        .path()
        .join("releases")
        .join(report.release.unwrap().to_string());
    assert!(release.join("index.html").is_file());
    assert!(release.join("assets/app.js").is_file());
    assert!(!release.join("package.json").exists());

    assert_eq!(remote.count(StepKind::LocalBuild), 1);
    assert_eq!(remote.count(StepKind::ReloadProcess), 0);
    assert_eq!(remote.count(StepKind::HealthCheck), 0);
}

#[tokio::test]
async fn skip_build_does_not_run_local_build() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(project.path().join("dist")).unwrap();
    std::fs::write(project.path().join("dist/index.html"), "").unwrap();

    let remote = FakeRemote::new();
    let config = frontend_config(root.path(), "");
    let opts = DeployOptions::new(SourceTree::new(project.path()).skip_build(true), "tester");
    deploy(&remote, &config, &opts, &mut Diagnostics::default())
        .await
        .unwrap();

    assert_eq!(remote.count(StepKind::LocalBuild), 0);
}

#[tokio::test]
async fn failed_local_build_stops_before_remote_changes() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();

    let remote = FakeRemote::new();
    remote.fail(StepKind::LocalBuild);
    let config = frontend_config(root.path(), "");
    let err = deploy(&remote, &config, &options(project.path()), &mut Diagnostics::default())
        .await
        .unwrap_err();

    assert_eq!(err.failed_step(), Some(StepKind::LocalBuild));
    assert_eq!(remote.count(StepKind::CreateRelease), 0);
    assert_eq!(current_target(root.path()), None);
}

#[tokio::test]
async fn legacy_backend_syncs_into_root() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());
    std::fs::write(root.path().join(".env"), "SECRET=server\n").unwrap();

    let remote = FakeRemote::new();
    remote.health_results(&[false, false]);
    let config = backend_config(root.path(), "zero_downtime: false\n");
    let mut diag = Diagnostics::default();
    let report = deploy(&remote, &config, &options(project.path()), &mut diag)
        .await
        .unwrap();

    assert!(report.release.is_none());
    assert!(root.path().join("index.js").is_file());
    assert_eq!(
        std::fs::read_to_string(root.path().join(".env")).unwrap(),
        "SECRET=server\n"
    );
    assert!(!root.path().join("releases").exists());
    assert!(!root.path().join("current").exists());
    assert!(ledger_pairs(root.path()).is_empty());

    let ecosystem =
        std::fs::read_to_string(root.path().join("shared/ecosystem.config.cjs")).unwrap();
    assert!(!ecosystem.contains("/current"));

    // Health is advisory without releases to fall back to.
    assert_eq!(diag.warnings().len(), 1);
    assert_eq!(diag.warnings()[0].kind, WarningKind::AdvisoryHealth);
}

#[tokio::test]
async fn legacy_frontend_keeps_lock_directory() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(project.path().join("dist")).unwrap();
    std::fs::write(project.path().join("dist/index.html"), "v2").unwrap();
    std::fs::write(root.path().join("stale.html"), "v1").unwrap();

    let remote = FakeRemote::new();
    let config = frontend_config(root.path(), "zero_downtime: false\n");
    deploy(&remote, &config, &options(project.path()), &mut Diagnostics::default())
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(root.path().join("index.html")).unwrap(),
        "v2"
    );
    assert!(!root.path().join("stale.html").exists());
    assert!(root.path().join(".shipnode").is_dir());
}

#[tokio::test]
async fn port_conflict_is_reported_before_touching_the_server() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    node_project(project.path());

    let remote = FakeRemote::new();
    remote.hold_port(4242, "billing");
    let config = backend_config(root.path(), "");

    let err = deploy(&remote, &config, &options(project.path()), &mut Diagnostics::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), DeployErrorKind::PortConflict);
    assert!(err.to_string().contains("billing"));
    assert!(!remote.kinds().contains(&StepKind::AcquireLock));
    assert!(!remote.kinds().contains(&StepKind::EnsureStructure));
    let leftovers: Vec<_> = std::fs::read_dir(root.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "server root was modified: {leftovers:?}");
}
