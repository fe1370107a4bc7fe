/// Errors produced by the `warden-core` crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A slash percentage was outside `0..=100`.
    #[error("invalid slash percentage {value}: must be in [0, 100]")]
    InvalidSlashPercentage { value: u8 },

    /// A configuration field failed validation.
    #[error("config validation failed for field '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },
}
