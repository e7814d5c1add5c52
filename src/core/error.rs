use thiserror::Error;

/// Failures that abort a run before any page is fetched.
///
/// Everything below this level — transient retrieval failures, malformed
/// payload fragments, out-of-region coordinates — is absorbed where it occurs
/// and never surfaces as an error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no usable browser executable found; install Chromium or set CHROME_EXECUTABLE")]
    BrowserMissing,

    #[error("browser failed to launch ({exe}): {reason}")]
    BrowserLaunch { exe: String, reason: String },

    #[error("invalid target url `{url}`: {reason}")]
    InvalidTarget { url: String, reason: String },
}
