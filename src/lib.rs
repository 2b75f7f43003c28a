// ABOUTME: Library root for cutover - blue/green traffic shifting over an external control plane.
// ABOUTME: The CLI binary lives in main.rs and drives these modules.

pub mod blueprint;
pub mod config;
pub mod control_plane;
pub mod diagnostics;
pub mod error;
pub mod health;
pub mod hooks;
pub mod output;
pub mod pipeline;
pub mod reconcile;
pub mod retry;
pub mod shift;
pub mod types;
