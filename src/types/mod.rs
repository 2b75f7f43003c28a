// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent resource ID confusion at compile time.

mod endpoint;
mod id;
mod image_ref;
mod protocol;
mod revision;
mod scale;
mod service_name;

pub use endpoint::{Endpoint, ParseEndpointError};
pub use id::{ListenerId, TargetGroupId, TaskSetId};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use protocol::{ApplicationProtocol, TransportProtocol};
pub use revision::{ParseRevisionError, TaskDefinitionRef};
pub use scale::{Scale, ScaleError};
pub use service_name::{ServiceName, ServiceNameError};
