pub mod handler;
pub mod messages;
pub mod registry;

pub use handler::ws_handler;
pub use messages::{ClientMessage, ServerMessage};
pub use registry::{GraceEntry, Session, SessionRegistry};
