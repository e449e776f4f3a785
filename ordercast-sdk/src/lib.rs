//! Wire types shared by the Ordercast server and its clients.
//!
//! Enable the `client` feature for typed HTTP, event-stream and socket
//! clients.

#![deny(clippy::unwrap_used)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

#[cfg(feature = "client")]
pub mod client;
pub mod objects;
pub mod sse;
