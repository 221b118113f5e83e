//! fseq-node library.
//!
//! Exposes the follower's building blocks so the binary and the
//! integration tests assemble the same router and state.

pub mod api;
pub mod config;
pub mod discovery;
pub mod identity;
pub mod link;
pub mod playback;
pub mod state;
pub mod storage;
pub mod sync;
pub mod udp;
pub mod upload;
