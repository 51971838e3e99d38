//! File-system storage for the server: the TOML config file.

pub mod config;
