//! HTTP API handlers.
//!
//! - [`sse`]: push streams and the publish endpoints, nested under `/sse`
//! - [`ws`]: the bidirectional socket pool at `/ws/{id}`

pub mod sse;
pub mod ws;
