//! Domain models for the live-call engine

pub mod call;
pub mod command;
pub mod credential;
pub mod protocol;
pub mod status;

pub use call::*;
pub use command::*;
pub use credential::*;
pub use protocol::*;
pub use status::*;
