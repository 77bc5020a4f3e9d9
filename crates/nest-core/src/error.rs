use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid dimension: {0}")]
    InvalidDimension(String),

    #[error("degenerate polygon: {0}")]
    DegeneratePolygon(String),

    #[error("value out of range: {name} = {value} (expected {min}..{max})")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_dimension() {
        let err = Error::InvalidDimension("width must be positive".into());
        assert_eq!(err.to_string(), "invalid dimension: width must be positive");
    }

    #[test]
    fn test_error_display_out_of_range() {
        let err = Error::OutOfRange {
            name: "rotation_step".into(),
            value: -5.0,
            min: 0.0,
            max: 360.0,
        };
        assert!(err.to_string().contains("rotation_step"));
    }

    #[test]
    fn test_error_display_degenerate_polygon() {
        let err = Error::DegeneratePolygon("fewer than 3 distinct vertices".into());
        assert!(err.to_string().contains("fewer than 3"));
    }
}
