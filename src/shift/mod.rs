// ABOUTME: Blue/green traffic shifting using the type state pattern.
// ABOUTME: Exports state markers, the Shift struct, the controller and its supporting pieces.

mod blue_green;
mod controller;
mod error;
mod journal;
mod lock;
mod observe;
mod rollback;
mod settings;
mod state;
mod transitions;

pub use blue_green::{Shift, ShiftContext, Topology};
pub use controller::{ShiftController, ShiftOutcome};
pub use error::{ControlPlaneResultExt, LockHolderInfo, ShiftError, ShiftErrorKind};
pub use journal::{JournalEntry, ShiftEvent, ShiftJournal};
pub use lock::ShiftLock;
pub use observe::{InvalidTaskSet, Observation, ServicePhase, classify, find_invalid, observe_service};
pub use rollback::{CommittedPair, restore_previous};
pub use settings::{Approval, ShiftSettings, ValidationCheck};
pub use state::{CandidateLaunched, Completed, CutOver, Initialized, TargetsHealthy, ValidationRouted};
pub use transitions::{Prepared, TransitionResult};
