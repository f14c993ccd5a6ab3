//! Rule and Template Error Types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    /// Expression failed to parse or evaluate
    #[error("Expression error: {0}")]
    Expression(String),

    /// Expression evaluated to a non-boolean value
    #[error("Expression result is not boolean, got {0}")]
    NotBoolean(String),

    /// Template failed to parse or render
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}
