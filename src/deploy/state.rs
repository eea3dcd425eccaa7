// ABOUTME: Deployment state marker types for the type state pattern.
// ABOUTME: Zero-sized types enforce valid state transitions at compile time.

/// Initial state: release id chosen, nothing on the server yet.
/// Available actions: `stage()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Initialized;

/// Staged: release directory populated, dependencies installed and built.
/// Available actions: `pre_deploy()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Staged;

/// Ready: pre-deploy hook passed (or absent).
/// Available actions: `switch()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Ready;

/// Switched: `current` points at the new release.
/// Available actions: `reload()`, `revert()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Switched;

/// Activated: process manager reloaded onto the new release.
/// Available actions: `health_check()`, `rollback()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Activated;

/// Verified: health check passed (or not applicable).
/// Available actions: `record()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Verified;

/// Completed: release recorded as successful.
/// Available actions: `post_deploy()`, `cleanup()`, `finish()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Completed;
