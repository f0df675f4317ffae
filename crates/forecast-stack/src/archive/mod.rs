//! Remote archive access.
//!
//! The archive is modelled as a session-oriented file tree: connect, change
//! into a directory, list it and retrieve files by name. [`HttpArchive`]
//! implements this over the HTTPS directory index of the open-data server.

mod http;

pub use http::{parse_index_listing, HttpArchive, HttpArchiveConfig, HttpSession};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

/// Opens sessions to an archive.
#[async_trait]
pub trait ArchiveConnector: Send + Sync {
    type Session: ArchiveSession;

    /// Connect and log in.
    async fn connect(&self) -> Result<Self::Session, TransportError>;
}

/// An open archive session.
#[async_trait]
pub trait ArchiveSession: Send {
    /// Change the working directory, relative to the archive root.
    async fn change_dir(&mut self, path: &str) -> Result<(), TransportError>;

    /// Names of the entries in the working directory, in listing order.
    async fn list(&mut self) -> Result<Vec<String>, TransportError>;

    /// Download a file of the working directory completely into memory.
    async fn retrieve(&mut self, name: &str) -> Result<Bytes, TransportError>;

    /// Close the session.
    async fn quit(&mut self) -> Result<(), TransportError>;
}
