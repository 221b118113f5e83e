//! Shared types for fseq-sync followers.
//!
//! This crate contains:
//! - **Models** — the JSON shapes served over HTTP to controllers and the
//!   web UI (system info, playback status, multi-sync system list, file
//!   listings). Field names here are the wire contract.

pub mod models;
