//! Endpoint publisher: the handoff to the ETL stage.
//!
//! Host and role ARN live in two different sections of the configuration
//! file. Both edits are applied to one in-memory copy and saved with a
//! single rename, so a reader never sees a new host next to an old ARN.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use dwh_core::{ConfigDocument, ConfigError, ConfigResult, PersistedEndpoint, UNSET_SENTINEL};

use crate::error::PersistError;

const HOST: (&str, &str) = ("cluster", "host");
const ROLE_ARN: (&str, &str) = ("iam_role", "arn");

pub struct EndpointPublisher {
    path: PathBuf,
    write_attempts: u32,
}

impl EndpointPublisher {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            write_attempts: 3,
        }
    }

    pub fn with_write_attempts(mut self, attempts: u32) -> Self {
        self.write_attempts = attempts.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the endpoint and role ARN of an available cluster.
    pub fn publish(&self, endpoint: &PersistedEndpoint) -> Result<(), PersistError> {
        self.update_with(|doc| {
            doc.set_str(HOST.0, HOST.1, &endpoint.host)?;
            doc.set_str(ROLE_ARN.0, ROLE_ARN.1, &endpoint.role_arn)
        })?;
        info!(path = %self.path.display(), host = %endpoint.host, "endpoint published");
        Ok(())
    }

    /// Reset both fields to the sentinel. Keys are kept so readers still
    /// find the schema they expect.
    pub fn clear(&self) -> Result<(), PersistError> {
        self.update_with(|doc| {
            doc.set_str(HOST.0, HOST.1, UNSET_SENTINEL)?;
            doc.set_str(ROLE_ARN.0, ROLE_ARN.1, UNSET_SENTINEL)
        })?;
        info!(path = %self.path.display(), "endpoint cleared");
        Ok(())
    }

    /// What the file currently holds.
    pub fn current(&self) -> Result<PersistedEndpoint, PersistError> {
        let doc = self.load()?;
        Ok(PersistedEndpoint::new(
            doc.get_str(HOST.0, HOST.1).unwrap_or(UNSET_SENTINEL),
            doc.get_str(ROLE_ARN.0, ROLE_ARN.1).unwrap_or(UNSET_SENTINEL),
        ))
    }

    /// Load, edit, and atomically save the file. A failing edit leaves the
    /// file untouched. Only the save is retried, with the same edited document.
    pub fn update_with<F>(&self, edit: F) -> Result<(), PersistError>
    where
        F: FnOnce(&mut ConfigDocument) -> ConfigResult<()>,
    {
        let mut doc = self.load()?;
        edit(&mut doc).map_err(|source| PersistError::Write {
            path: self.path.display().to_string(),
            attempts: 1,
            source,
        })?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match doc.save() {
                Ok(()) => return Ok(()),
                Err(e @ ConfigError::Write { .. }) if attempt < self.write_attempts => {
                    warn!(path = %self.path.display(), attempt, error = %e, "config write failed, retrying");
                }
                Err(source) => {
                    return Err(PersistError::Write {
                        path: self.path.display().to_string(),
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    fn load(&self) -> Result<ConfigDocument, PersistError> {
        ConfigDocument::load(&self.path).map_err(|source| PersistError::Load {
            path: self.path.display().to_string(),
            source,
        })
    }
}
