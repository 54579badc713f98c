/// Core error types for the Glint shader pipeline.
use crate::diagnostic::{Diagnostic, Severity, Stage};

/// A specialized Result type for Glint operations.
pub type GlintResult<T> = Result<T, GlintError>;

/// Top-level error type encompassing every pipeline stage.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GlintError {
    #[error("preprocess error: {message} at {file}:{line}:{column}")]
    Preprocess {
        message: String,
        file: String,
        line: usize,
        column: usize,
    },

    #[error("macro recursion: expansion of '{name}' exceeded {limit} steps at {file}:{line}:{column}")]
    MacroRecursion {
        name: String,
        limit: usize,
        file: String,
        line: usize,
        column: usize,
    },

    #[error("file not found: {path} (included at {file}:{line})")]
    FileNotFound {
        path: String,
        file: String,
        line: usize,
    },

    #[error("lex error: {message} at {file}:{line}:{column}")]
    Lex {
        message: String,
        file: String,
        line: usize,
        column: usize,
    },

    #[error("parse error: {message} at {file}:{line}:{column}")]
    Parse {
        message: String,
        file: String,
        line: usize,
        column: usize,
    },

    #[error("transform error: {message} at {file}:{line}:{column}")]
    Transform {
        message: String,
        file: String,
        line: usize,
        column: usize,
    },

    /// Internal consistency defect in the emitter. Unreachable while the
    /// upstream stages keep the tree well-formed.
    #[error("emit error: {0}")]
    Emit(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("TOML error: {0}")]
    Toml(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl GlintError {
    /// Create a preprocess error with source location.
    pub fn preprocess(
        message: impl Into<String>,
        file: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        GlintError::Preprocess {
            message: message.into(),
            file: file.into(),
            line,
            column,
        }
    }

    /// Create a lex error with source location.
    pub fn lex(
        message: impl Into<String>,
        file: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        GlintError::Lex {
            message: message.into(),
            file: file.into(),
            line,
            column,
        }
    }

    /// Create a parse error with source location.
    pub fn parse(
        message: impl Into<String>,
        file: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        GlintError::Parse {
            message: message.into(),
            file: file.into(),
            line,
            column,
        }
    }

    /// Create a transform error with source location.
    pub fn transform(
        message: impl Into<String>,
        file: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        GlintError::Transform {
            message: message.into(),
            file: file.into(),
            line,
            column,
        }
    }

    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            GlintError::Preprocess { .. }
            | GlintError::MacroRecursion { .. }
            | GlintError::FileNotFound { .. } => Stage::Preprocess,
            GlintError::Lex { .. } => Stage::Lex,
            GlintError::Parse { .. } => Stage::Parse,
            GlintError::Transform { .. } => Stage::Transform,
            GlintError::Emit(_) => Stage::Emit,
            GlintError::Config(_)
            | GlintError::Io(_)
            | GlintError::Toml(_)
            | GlintError::Serialization(_) => Stage::Config,
        }
    }

    /// Convert into an error-severity diagnostic, keeping the location.
    pub fn into_diagnostic(self) -> Diagnostic {
        let stage = self.stage();
        let (message, file, line, column) = match self {
            GlintError::Preprocess { message, file, line, column }
            | GlintError::Lex { message, file, line, column }
            | GlintError::Parse { message, file, line, column }
            | GlintError::Transform { message, file, line, column } => {
                (message, file, line, column)
            }
            GlintError::MacroRecursion { name, limit, file, line, column } => (
                format!("expansion of macro '{name}' exceeded {limit} steps"),
                file,
                line,
                column,
            ),
            GlintError::FileNotFound { path, file, line } => {
                (format!("included file not found: {path}"), file, line, 1)
            }
            GlintError::Emit(message) => (message, String::new(), 0, 0),
            GlintError::Config(message)
            | GlintError::Io(message)
            | GlintError::Toml(message)
            | GlintError::Serialization(message) => (message, String::new(), 0, 0),
        };
        Diagnostic {
            stage,
            severity: Severity::Error,
            message,
            file,
            line,
            column,
        }
    }
}

impl From<std::io::Error> for GlintError {
    fn from(err: std::io::Error) -> Self {
        GlintError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for GlintError {
    fn from(err: toml::de::Error) -> Self {
        GlintError::Toml(err.to_string())
    }
}

impl From<toml::ser::Error> for GlintError {
    fn from(err: toml::ser::Error) -> Self {
        GlintError::Toml(err.to_string())
    }
}

impl From<serde_json::Error> for GlintError {
    fn from(err: serde_json::Error) -> Self {
        GlintError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = GlintError::parse("unexpected token", "main.fsh", 10, 5);
        assert_eq!(
            err.to_string(),
            "parse error: unexpected token at main.fsh:10:5"
        );
    }

    #[test]
    fn test_stage_mapping() {
        let err = GlintError::MacroRecursion {
            name: "A".into(),
            limit: 256,
            file: "a.glsl".into(),
            line: 3,
            column: 1,
        };
        assert_eq!(err.stage(), Stage::Preprocess);
        assert_eq!(GlintError::Emit("x".into()).stage(), Stage::Emit);
    }

    #[test]
    fn test_into_diagnostic_keeps_location() {
        let diag = GlintError::transform("dangling reference", "lib.glsl", 7, 12).into_diagnostic();
        assert_eq!(diag.stage, Stage::Transform);
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!((diag.line, diag.column), (7, 12));
        assert_eq!(diag.file, "lib.glsl");
    }

    #[test]
    fn test_file_not_found_display() {
        let err = GlintError::FileNotFound {
            path: "lib/noise.glsl".into(),
            file: "main.fsh".into(),
            line: 2,
        };
        assert!(err.to_string().contains("lib/noise.glsl"));
    }
}
