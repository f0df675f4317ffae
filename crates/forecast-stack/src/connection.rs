//! Resilient archive session.
//!
//! [`ConnectionManager`] owns the single session of a pipeline run. Any
//! transport failure is handled by [`ConnectionManager::recover`], which waits
//! per the retry policy, opens a fresh session and changes back into the
//! directory the failed operation ran in.

use metrics::counter;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveConnector, ArchiveSession};
use crate::error::TransportError;
use crate::retry::RetryPolicy;

/// Lifecycle of the managed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    /// Connected and inside a working directory
    Browsing,
}

pub struct ConnectionManager<'a, C: ArchiveConnector> {
    connector: &'a C,
    policy: RetryPolicy,
    session: Option<C::Session>,
    location: Option<String>,
    reconnects: u32,
}

impl<'a, C: ArchiveConnector> ConnectionManager<'a, C> {
    pub fn new(connector: &'a C, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            session: None,
            location: None,
            reconnects: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        match (&self.session, &self.location) {
            (None, _) => SessionState::Disconnected,
            (Some(_), None) => SessionState::Connected,
            (Some(_), Some(_)) => SessionState::Browsing,
        }
    }

    /// Directory the session navigated to, if any.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Number of reconnects performed so far.
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    /// Open a session, retrying per the policy.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        let mut failures = 0;
        loop {
            counter!("nwp_archive_connects_total").increment(1);
            let result = self.connector.connect().await;
            match result {
                Ok(session) => {
                    self.session = Some(session);
                    info!(attempts = failures + 1, "Connected to archive");
                    return Ok(());
                }
                Err(e) => {
                    failures += 1;
                    self.give_up_or_wait("connect", failures, e).await?;
                }
            }
        }
    }

    /// Change into `path`, reconnecting on failure.
    pub async fn navigate(&mut self, path: &str) -> Result<(), TransportError> {
        let mut failures = 0;
        loop {
            let result = self.session()?.change_dir(path).await;
            match result {
                Ok(()) => {
                    self.location = Some(path.to_string());
                    debug!(path = %path, "Changed directory");
                    return Ok(());
                }
                Err(e) => {
                    failures += 1;
                    self.recover("navigate", failures, e).await?;
                }
            }
        }
    }

    /// The open session.
    pub fn session(&mut self) -> Result<&mut C::Session, TransportError> {
        self.session.as_mut().ok_or(TransportError::NotConnected)
    }

    /// Handle the `failures`-th failure of `operation`.
    ///
    /// Returns `Ok(())` once a fresh session is back in the previous working
    /// directory and the operation may be retried. Returns the error when the
    /// policy allows no further attempt.
    pub async fn recover(
        &mut self,
        operation: &'static str,
        failures: u32,
        error: TransportError,
    ) -> Result<(), TransportError> {
        self.give_up_or_wait(operation, failures, error).await?;
        self.reconnect().await
    }

    /// Replace the session and restore the working directory.
    async fn reconnect(&mut self) -> Result<(), TransportError> {
        self.reconnects += 1;
        counter!("nwp_archive_reconnects_total").increment(1);

        // The old session is unusable; drop it without a goodbye
        self.session = None;

        let mut failures = 0;
        loop {
            self.connect().await?;

            let Some(path) = self.location.clone() else {
                return Ok(());
            };

            let result = self.session()?.change_dir(&path).await;
            match result {
                Ok(()) => {
                    info!(path = %path, reconnects = self.reconnects, "Reconnected to archive");
                    return Ok(());
                }
                Err(e) => {
                    failures += 1;
                    self.session = None;
                    self.give_up_or_wait("navigate", failures, e).await?;
                }
            }
        }
    }

    /// Close the session. The manager is disconnected afterwards either way.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.location = None;
        match self.session.take() {
            Some(mut session) => session.quit().await,
            None => Ok(()),
        }
    }

    async fn give_up_or_wait(
        &self,
        operation: &'static str,
        failures: u32,
        error: TransportError,
    ) -> Result<(), TransportError> {
        if !self.policy.should_retry(failures) {
            return Err(TransportError::Exhausted {
                operation,
                attempts: failures,
                source: Box::new(error),
            });
        }

        let delay = self.policy.delay_for(failures);
        warn!(
            operation = operation,
            attempt = failures,
            delay_secs = delay.as_secs_f64(),
            error = %error,
            "Archive operation failed, retrying"
        );
        self.policy.wait(failures).await;
        Ok(())
    }
}
