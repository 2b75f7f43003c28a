// ABOUTME: Sealed trait pattern for control plane capability traits.
// ABOUTME: Prevents external implementations, allowing non-breaking evolution.

/// Sealed trait to prevent external implementations.
///
/// Only backends inside this crate implement the control plane traits, so
/// new operations can be added without breaking downstream code.
pub trait Sealed {}
