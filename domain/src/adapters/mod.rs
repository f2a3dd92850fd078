//! Adapters that live inside the domain crate.
//!
//! `memory` is a complete in-process backend used by tests and local demos;
//! `unimplemented` stands in for engines that are not supported yet. Network
//! backed adapters (Supabase, SQLite) live in separate crates and reuse
//! [`session::Session`] for their connection handle.

pub mod memory;
pub mod session;
pub mod unimplemented;
