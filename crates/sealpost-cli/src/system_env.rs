//! Production environment backed by the operating system RNG.

use sealpost_core::Environment;

use crate::error::CliError;

/// Production environment using `getrandom`.
///
/// # Security
///
/// Key material must never come from a degraded source. Construction checks
/// the entropy source and fails if it is unavailable; a failure after a
/// successful check aborts the process rather than continue with
/// predictable bytes.
#[derive(Debug, Clone)]
pub struct SystemEnv {
    _checked: (),
}

impl SystemEnv {
    /// Check the OS entropy source.
    pub fn new() -> Result<Self, CliError> {
        let mut sample = [0u8; 1];
        getrandom::fill(&mut sample).map_err(|e| CliError::Entropy(e.to_string()))?;
        Ok(Self { _checked: () })
    }
}

impl Environment for SystemEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        if let Err(e) = getrandom::fill(buffer) {
            tracing::error!(error = %e, "entropy source failed after successful check");
            std::process::abort();
        }
    }
}
