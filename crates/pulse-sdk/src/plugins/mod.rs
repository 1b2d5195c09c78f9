//! Built-in stages.
//!
//! - **session**: stamps time, session and event ids, emits boundary events
//! - **identity**: stamps user id, device id, insert id and library
//! - **destination**: hands events to a delivery collaborator

mod destination;
mod identity;
mod session;

pub use destination::{DeliveryCollaborator, DestinationStage, MemoryDestination};
pub use identity::{IdentityStage, LIBRARY};
pub use session::SessionStage;
