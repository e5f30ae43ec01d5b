//! UDP chat hub server
//!
//! - **Listener**: single receive loop, decodes each datagram on its own task
//! - **Hub**: one actor owning the session registry and the bounded history
//! - **Sessions**: one delivery task per participant draining a bounded queue

pub mod hub;
pub mod listener;
pub mod registry;
pub mod session;

pub use hub::{Hub, HubEvent, HubHandle, HubStats};
pub use listener::Listener;
pub use registry::{DisconnectOutcome, JoinOutcome, SessionRegistry};
pub use session::{ClientSession, Outbox};
