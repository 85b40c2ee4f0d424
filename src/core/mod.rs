pub mod config;
pub mod controller;
pub mod events;
pub mod observer;
pub mod session;
pub mod transport;

pub use controller::{ControllerOptions, SessionController, StartError};
pub use events::{ChannelSink, FailureKind, SessionEvent, SessionSink};
pub use session::{SessionHandle, SessionId, SessionState};
