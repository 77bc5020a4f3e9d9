use thiserror::Error;

/// Errors the nester can surface. In practice the nester never fails on
/// packing outcomes — unplaceable instances are recorded as skips, not
/// errors — so this enum stays small and its variant unreachable from
/// `nest_instances`. It exists so the worker's error taxonomy has a slot
/// to propagate into, per the reserved `NestingError` category.
#[derive(Debug, Error)]
pub enum NestingError {
    #[error("invalid nesting configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Core(#[from] nest_core::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nesting_error_invalid_config() {
        let err = NestingError::InvalidConfig("rotation_step must be >= 0".into());
        assert!(err.to_string().contains("rotation_step"));
    }
}
