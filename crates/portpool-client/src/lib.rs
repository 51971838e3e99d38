//! portpool-client: talks the framed JSON protocol to a portpool server.
//!
//! ```no_run
//! use portpool_client::ProtocolClient;
//!
//! # async fn example() -> Result<(), portpool_client::ClientError> {
//! let mut client = ProtocolClient::connect("127.0.0.1:10000").await?;
//! let greeting = client.hello().await?;
//! assert_eq!(greeting, "Hello, client!");
//! # Ok(())
//! # }
//! ```

pub mod connection;

pub use connection::{ClientError, ProtocolClient};
