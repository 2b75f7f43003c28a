// ABOUTME: Compile-fail test verifying cut_over cannot be called on Initialized.
// ABOUTME: Production may only be repointed once the candidate is healthy and routed.

use cutover::control_plane::MemoryControlPlane;
use cutover::shift::{Initialized, Shift};

async fn try_early_cut_over(shift: Shift<Initialized>, plane: &MemoryControlPlane) {
    // ERROR: cut_over() method doesn't exist on Shift<Initialized>
    let _ = shift.cut_over(plane).await;
}

fn main() {}
