//! trackside-core: wire types and synchronization state machines for the
//! trackside operator console.
//!
//! Everything here is pure: no tokio, no sockets, no clocks read
//! implicitly. The async components in `trackside-sync` drive these
//! types and own all IO.

pub mod analytics;
pub mod audit;
pub mod command;
pub mod cursor;
pub mod error;
pub mod hints;
pub mod rpc;
pub mod sequence;
pub mod sse;
pub mod throttle;

pub use error::WireError;
