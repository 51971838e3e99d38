//! Infrastructure layer for the server.
//!
//! Contains the OS-facing adapters: TCP listeners and the config file.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `portpool_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
