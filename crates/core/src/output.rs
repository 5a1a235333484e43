//! Binary-safe encoding of captured command output.
//!
//! Commands may write arbitrary bytes. The record keeps them as standard,
//! padded base64 text so JSON bodies and text columns never have to carry raw
//! bytes.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Captured stdout+stderr of a job, base64 encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobOutput(String);

impl JobOutput {
    /// Output of a job that has not produced anything yet.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Encode raw bytes.
    pub fn encode(bytes: impl AsRef<[u8]>) -> Self {
        Self(STANDARD.encode(bytes))
    }

    /// Wrap text that is already base64 (e.g. read back from the store).
    ///
    /// The text is validated so a corrupted row can not leak out as a job.
    pub fn from_encoded(encoded: impl Into<String>) -> DomainResult<Self> {
        let encoded = encoded.into();
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| DomainError::invalid_output(e.to_string()))?;
        Ok(Self(encoded))
    }

    /// Decode back to the exact bytes the command produced.
    pub fn decode(&self) -> DomainResult<Vec<u8>> {
        STANDARD
            .decode(self.0.as_bytes())
            .map_err(|e| DomainError::invalid_output(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl core::fmt::Display for JobOutput {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
