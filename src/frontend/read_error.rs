use thiserror::Error;

/// A reading error with source location.
///
/// `line` and `col` are 1-based positions coming from the lexer spans.
/// For EOF-ish errors (e.g. a missing `)`), the reader uses the last
/// consumed token's span as a fallback so locations are never `0:0`.
#[derive(Debug, Clone, Error)]
#[error("{line}:{col}: {message}")]
pub struct ReadError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}
