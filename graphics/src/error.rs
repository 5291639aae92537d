//! Graphics error types.

use crate::shader::ShaderStage;

/// Errors that can occur in the graphics system.
///
/// Only [`GraphicsError::Unsupported`] is fatal. Everything else is reported
/// through the log and degrades the rendered output instead of stopping the
/// frame loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphicsError {
    /// A required capability is missing at device creation.
    #[error("unsupported environment: {0}")]
    Unsupported(String),
    /// A shader stage was rejected by the compiler.
    #[error("{stage} shader compilation failed: {message}")]
    ShaderCompilation {
        stage: ShaderStage,
        message: String,
        /// The rejected source with line numbers.
        listing: String,
    },
    /// The compiled stages could not be linked into a program.
    #[error("program link failed: {0}")]
    ProgramLink(String),
    /// A resource does not match what the consumer expects.
    #[error("resource mismatch: {0}")]
    ResourceMismatch(String),
    /// The graphics context was lost; all GPU handles are invalid.
    #[error("graphics context lost")]
    ContextLost,
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Prefix every line of `source` with its 1-based line number.
pub fn number_lines(source: &str) -> String {
    source
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:4}: {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::ContextLost;
        assert_eq!(err.to_string(), "graphics context lost");

        let err = GraphicsError::Unsupported("no vertex stage".into());
        assert_eq!(err.to_string(), "unsupported environment: no vertex stage");
    }

    #[test]
    fn test_compilation_error_display() {
        let err = GraphicsError::ShaderCompilation {
            stage: ShaderStage::Fragment,
            message: "syntax error".into(),
            listing: String::new(),
        };
        assert_eq!(
            err.to_string(),
            "fragment shader compilation failed: syntax error"
        );
    }

    #[test]
    fn test_number_lines() {
        let numbered = number_lines("void main() {\n}");
        assert_eq!(numbered, "   1: void main() {\n   2: }");
    }
}
