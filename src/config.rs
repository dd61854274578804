//! Configuration types.

use std::time::Duration;

/// Pipeline tuning knobs.
///
/// Environment handling stays in `main`; the pipeline only sees this struct.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How often the runner fetches new mail and drains pending messages.
    pub poll_interval: Duration,
    /// Upper bound on a single model call (classification or generation).
    pub nlp_timeout: Duration,
    /// Upper bound on a single outbound dispatch.
    pub send_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            nlp_timeout: Duration::from_secs(15),
            send_timeout: Duration::from_secs(30),
        }
    }
}
