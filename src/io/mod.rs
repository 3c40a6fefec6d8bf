//! IO modules - the external surface of the service
//!
//! - `server` - hyper HTTP server: ingest, snapshots, health, streams
//! - `sse` - SSE stream sessions bridging connections to the bus

pub mod server;
pub mod sse;

// Re-export commonly used types
pub use server::{start_server, AppContext};
pub use sse::{StreamSession, LOCATION_EVENTS};
