// ABOUTME: Compile-fail test verifying abort cannot be called once production is repointed.
// ABOUTME: After cut-over only completion or rollback is possible.

use cutover::control_plane::MemoryControlPlane;
use cutover::shift::{CutOver, Shift};

async fn try_late_abort(shift: Shift<CutOver>, plane: &MemoryControlPlane) {
    // ERROR: abort() method doesn't exist on Shift<CutOver>
    let _ = shift.abort(plane).await;
}

fn main() {}
