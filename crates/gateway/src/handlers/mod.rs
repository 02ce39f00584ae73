//! API handlers module

pub mod documents;
pub mod expansions;
pub mod health;

use refgraph_common::errors::AppError;
use validator::Validate;

/// Run `validator` rules, reporting the first failing field
pub(crate) fn validate<T: Validate>(request: &T) -> Result<(), AppError> {
    request.validate().map_err(|e| {
        let field = e.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: e.to_string(),
            field,
        }
    })
}
