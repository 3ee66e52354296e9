use std::time::Duration;

use fantoccini::error::CmdError;
use thiserror::Error;

/// Failure while processing a single URL. The runner logs it and moves on.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("navigation to {url} timed out after {}s", .timeout.as_secs())]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("timed out after {}s waiting for `{selector}`", .timeout.as_secs())]
    ElementWaitTimeout { selector: String, timeout: Duration },

    #[error("webdriver command failed: {0}")]
    Browser(#[from] CmdError),

    #[error("failed to write record: {0:#}")]
    Sink(anyhow::Error),
}
