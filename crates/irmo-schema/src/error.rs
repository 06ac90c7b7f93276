use thiserror::Error;

/// Errors raised while assembling a [`crate::Schema`].
///
/// These are construction-time failures only; a `Schema` that has been
/// built successfully is immutable and cannot subsequently violate its own
/// invariants (spec.md §3, "Schema descriptor").
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("duplicate class name '{0}'")]
    DuplicateClassName(String),
    #[error("duplicate method name '{0}'")]
    DuplicateMethodName(String),
    #[error("class '{0}' has unknown parent '{1}'")]
    UnknownParent(String, String),
    #[error("class '{0}' has duplicate variable name '{1}'")]
    DuplicateVariableName(String, String),
    #[error("method '{0}' has duplicate argument name '{1}'")]
    DuplicateArgumentName(String, String),
    #[error("too many classes (max 256)")]
    TooManyClasses,
    #[error("too many methods (max 256)")]
    TooManyMethods,
    #[error("class '{0}' has too many variables (max 256 including inherited)")]
    TooManyVariables(String),
    #[error("method '{0}' has too many arguments (max 256)")]
    TooManyArguments(String),
}
