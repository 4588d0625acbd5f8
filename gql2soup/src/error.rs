//! Compile-time errors and the helpers that batch them.

use thiserror::Error;

/// A schema or shape error found while compiling a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredicateError {
    #[error("{0}")]
    Message(String),
    #[error("Missing object info for type {0}.")]
    MissingObjectInfo(String),
}

impl PredicateError {
    pub fn message(message: impl Into<String>) -> Self {
        PredicateError::Message(message.into())
    }
}

pub type CompileResult<T> = Result<T, Vec<PredicateError>>;

pub(crate) fn failure<T>(error: PredicateError) -> CompileResult<T> {
    Err(vec![error])
}

/// Visits every result and returns all values, or every error when any failed.
pub fn partition<T, I>(results: I) -> CompileResult<Vec<T>>
where
    I: IntoIterator<Item = CompileResult<T>>,
{
    let mut values = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(mut errs) => errors.append(&mut errs),
        }
    }
    if errors.is_empty() {
        Ok(values)
    } else {
        Err(errors)
    }
}

/// Appends the error list of `result` (if any) to `errors`, keeping the value.
pub(crate) fn collect<T>(result: CompileResult<T>, errors: &mut Vec<PredicateError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(mut errs) => {
            errors.append(&mut errs);
            None
        }
    }
}
