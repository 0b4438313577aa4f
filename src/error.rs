use thiserror::Error;

use crate::engine::StatusCode;

// Unified error type for amghost

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmgError {
    #[error("engine call failed with status {code}")]
    Engine { code: i32 },
    #[error("invalid object state: {0}")]
    InvalidState(&'static str),
    #[error("matrix must be square, got {rows} rows and {cols} columns")]
    NonSquareMatrix { rows: usize, cols: usize },
    #[error("unsupported block shape {bx}x{by}, only square blocks are supported")]
    UnsupportedShape { bx: usize, by: usize },
    #[error("array length mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("unresolvable mode descriptor `{0}`")]
    InvalidMode(String),
    #[error("inconsistent communication map: {0}")]
    InvalidCommunicationMap(String),
}

impl From<StatusCode> for AmgError {
    fn from(status: StatusCode) -> Self {
        AmgError::Engine { code: status.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_maps_to_engine_error() {
        let err: AmgError = StatusCode(3).into();
        assert_eq!(err, AmgError::Engine { code: 3 });
    }

    #[test]
    fn messages_carry_payload() {
        let err = AmgError::NonSquareMatrix { rows: 2, cols: 3 };
        assert_eq!(
            err.to_string(),
            "matrix must be square, got 2 rows and 3 columns"
        );
    }
}
