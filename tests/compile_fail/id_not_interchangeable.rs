// ABOUTME: Compile-fail test verifying ListenerId and TargetGroupId are not interchangeable.
// ABOUTME: This test should fail to compile, validating type safety.

use cutover::types::{ListenerId, TargetGroupId};

fn takes_listener_id(_id: ListenerId) {}

fn main() {
    let group = TargetGroupId::new("web-green");
    takes_listener_id(group); // ERROR: expected ListenerId, found TargetGroupId
}
