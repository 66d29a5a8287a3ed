use std::path::Path;

use thiserror::Error;

use crate::config::SiteCredentials;
use crate::errors::PipelineError;

#[derive(Debug, Error)]
#[error("login failed: {reason}")]
pub struct AuthError {
    pub reason: String,
}

/// Performs the remote side of one upload. Implemented over a browser
/// session in production and by scripted fakes in tests.
pub trait UploadDriver {
    fn login(&mut self, credentials: &SiteCredentials) -> Result<(), AuthError>;

    /// Errors are `LookupMiss` or `RemoteInteraction`.
    fn upload(
        &mut self,
        base_identifier: &str,
        pdf_path: &Path,
        txt_path: &Path,
    ) -> Result<(), PipelineError>;
}
