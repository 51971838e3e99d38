//! Application layer: what happens on one accepted connection.
//!
//! Nothing in here knows about listeners, ports, or shutdown.  Every function
//! takes a generic async stream, so the same code runs against a real
//! `TcpStream` in production and an in-memory pipe in tests.
//!
//! # Sub-modules
//!
//! - **`dispatch`**      – The action registry: `hello`, `echo`, and any
//!   application-registered actions.
//!
//! - **`serve_session`** – The request/response loop for protocol mode, plus
//!   the [`serve_session::SessionSummary`] every mode reports when a
//!   connection ends.
//!
//! - **`tag_traffic`**   – Tagging mode: raw reads stamped with
//!   `(port, session_id)` and handed to a [`tag_traffic::ChunkSink`].
//!
//! - **`echo_lines`**    – Echo mode: each text line sent back prefixed with
//!   the port it arrived on.

pub mod dispatch;
pub mod echo_lines;
pub mod serve_session;
pub mod tag_traffic;
