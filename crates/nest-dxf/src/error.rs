use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read DXF file '{path}': {message}")]
    BadInput { path: String, message: String },

    #[error("failed to write DXF file: {0}")]
    Write(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_input_display() {
        let err = ImportError::BadInput {
            path: "part_01.dxf".into(),
            message: "unexpected EOF".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("part_01.dxf"));
        assert!(msg.contains("unexpected EOF"));
    }
}
