pub type LoopshotResult<T> = Result<T, LoopshotError>;

/// Error taxonomy for the capture-to-GIF pipeline.
///
/// Every fallible operation in this crate returns one of these variants; the
/// orchestrator maps the first error it sees to `PipelineStage::Failed` and
/// stops. Nothing in this crate retries.
#[derive(thiserror::Error, Debug)]
pub enum LoopshotError {
    /// Unknown or unsupported frame-container version. Fatal, checked before
    /// anything else in the container is trusted.
    #[error("unsupported container version {found:#06x} (expected {expected:#06x})")]
    FormatVersion { found: u16, expected: u16 },

    /// CRC32 of the pixel payload does not match the stored checksum.
    #[error("integrity failure: payload crc32 {actual:#010x} does not match stored {expected:#010x}")]
    Integrity { expected: u32, actual: u32 },

    /// A stage produced (or was handed) a buffer whose length disagrees with
    /// the declared dimensions. Indicates a logic bug, never retried.
    #[error("size mismatch: {0}")]
    SizeMismatch(String),

    /// The frame batch does not contain exactly the configured number of
    /// frames. Surfaced before any quantization work starts.
    #[error("batch count: expected {expected} frames, got {actual}")]
    BatchCount { expected: usize, actual: usize },

    /// Palette/frame inconsistency detected at GIF-write time.
    #[error("gif encode error: {0}")]
    Encode(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LoopshotError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn size_mismatch(msg: impl Into<String>) -> Self {
        Self::SizeMismatch(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            LoopshotError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            LoopshotError::size_mismatch("x")
                .to_string()
                .contains("size mismatch:")
        );
        assert!(
            LoopshotError::encode("x")
                .to_string()
                .contains("gif encode error:")
        );
        assert!(
            LoopshotError::BatchCount {
                expected: 81,
                actual: 3
            }
            .to_string()
            .contains("expected 81 frames, got 3")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = LoopshotError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
