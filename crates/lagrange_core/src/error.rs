use thiserror::Error;

/// Failures raised by the symbolic layer.
///
/// Numeric and pipeline code wraps these in `anyhow::Error` with stage context.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SymbolicError {
    #[error("Parse error at token {position}: {message}")]
    Parse { position: usize, message: String },
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("Unsupported equation shape for solving in {var}: {expr}")]
    UnsupportedEquation { var: String, expr: String },
    #[error("Coefficient of {0} must not depend on the unknowns.")]
    NonConstantCoefficient(String),
    #[error("Coefficient of {0} is zero.")]
    ZeroCoefficient(String),
    #[error("Cannot determine the sign of {0}.")]
    IndeterminateSign(String),
    #[error("Dimension mismatch: expected {expected}, got {got}.")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Matrix is not diagonalizable (repeated eigenvalue {0}).")]
    NotDiagonalizable(String),
    #[error("Linear system is singular.")]
    Singular,
    #[error("Expression is complex-valued: {0}")]
    ComplexValued(String),
    #[error("Expression has unbound symbol {0} during evaluation.")]
    Unbound(String),
}

pub type SymbolicResult<T> = Result<T, SymbolicError>;
