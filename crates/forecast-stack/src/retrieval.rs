//! Whole-file retrieval into memory.

use bytes::Bytes;
use metrics::counter;
use tracing::{debug, instrument};

use crate::archive::{ArchiveConnector, ArchiveSession};
use crate::connection::ConnectionManager;
use crate::error::TransportError;

/// Downloads one file at a time, restarting from scratch after any failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrievalEngine;

impl RetrievalEngine {
    pub fn new() -> Self {
        Self
    }

    /// Retrieve `name` from the current directory.
    ///
    /// A failed transfer is discarded, the session is reconnected and
    /// re-navigated, and the file is requested again. Only complete payloads
    /// are returned.
    #[instrument(skip(self, connection))]
    pub async fn retrieve<C: ArchiveConnector>(
        &self,
        connection: &mut ConnectionManager<'_, C>,
        name: &str,
    ) -> Result<Bytes, TransportError> {
        let mut failures = 0;
        loop {
            let result = connection.session()?.retrieve(name).await;
            match result {
                Ok(payload) => {
                    counter!("nwp_files_retrieved_total").increment(1);
                    counter!("nwp_bytes_retrieved_total").increment(payload.len() as u64);
                    debug!(bytes = payload.len(), attempts = failures + 1, "Retrieved file");
                    return Ok(payload);
                }
                Err(e) => {
                    failures += 1;
                    connection.recover("retrieve", failures, e).await?;
                }
            }
        }
    }
}
