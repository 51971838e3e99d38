//! Network infrastructure for the server.
//!
//! # Sub-modules
//!
//! - **`listener_pool`** – Binds one TCP listener per port in a range (best
//!   effort), runs an accept loop per listener, and hands each accepted
//!   socket to the session handler or the tagging relay.
//!
//! - **`supervisor`** – Owns the accept-loop tasks: start, idempotent
//!   shutdown through a cancellation token, and wait-for-all.

pub mod listener_pool;
pub mod supervisor;
