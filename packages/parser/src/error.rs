use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural problems recovered by the parser.
///
/// Parsing never fails: each of these is carried by an error node in the tree so
/// the malformed region stays visible and editable.
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StructuralError {
    #[error("Unclosed group: missing closing '{closer}'")]
    UnclosedGroup { closer: char },

    #[error("Unclosed environment '{name}': missing \\end{{{name}}}")]
    UnclosedEnvironment { name: String },

    #[error("Unclosed math: missing closing '{closer}'")]
    UnclosedMath { closer: String },

    #[error("Unmatched '{text}'")]
    UnmatchedClose { text: String },
}

impl StructuralError {
    pub fn unclosed_group(closer: char) -> Self {
        Self::UnclosedGroup { closer }
    }

    pub fn unclosed_environment(name: impl Into<String>) -> Self {
        Self::UnclosedEnvironment { name: name.into() }
    }

    pub fn unclosed_math(closer: impl Into<String>) -> Self {
        Self::UnclosedMath {
            closer: closer.into(),
        }
    }

    pub fn unmatched_close(text: impl Into<String>) -> Self {
        Self::UnmatchedClose { text: text.into() }
    }

    /// True for errors describing an opener that never found its closer.
    pub fn is_unclosed(&self) -> bool {
        !matches!(self, Self::UnmatchedClose { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            StructuralError::unclosed_environment("itemize").to_string(),
            "Unclosed environment 'itemize': missing \\end{itemize}"
        );
        assert_eq!(
            StructuralError::unmatched_close("}").to_string(),
            "Unmatched '}'"
        );
        assert!(StructuralError::unclosed_group('}').is_unclosed());
        assert!(!StructuralError::unmatched_close("$").is_unclosed());
    }
}
