//! Outcome of a filesystem mutation

use serde::Serialize;

/// Four-way outcome returned by the mutation orchestrator.
///
/// `Rejected` is a policy refusal the user can act on. `Error` is a fault or
/// a partial failure; its message never carries internal detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OpResult<T> {
    Ok(T),
    NotFound,
    Rejected { reason: String },
    Error { message: String, failed: usize },
}

impl<T> OpResult<T> {
    pub fn rejected(reason: impl Into<String>) -> Self {
        OpResult::Rejected {
            reason: reason.into(),
        }
    }

    /// Unexpected fault, no per-entry accounting
    pub fn internal() -> Self {
        OpResult::Error {
            message: "internal error".to_string(),
            failed: 0,
        }
    }

    /// Partial failure of a recursive operation
    pub fn partial(failed: usize) -> Self {
        OpResult::Error {
            message: format!("{} entries could not be processed", failed),
            failed,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, OpResult::Ok(_))
    }

    /// Number of entries that failed, zero unless this is an `Error`
    pub fn failed_count(&self) -> usize {
        match self {
            OpResult::Error { failed, .. } => *failed,
            _ => 0,
        }
    }

    /// Transport-level status the controller layer maps this to
    pub fn status_code(&self) -> u16 {
        match self {
            OpResult::Ok(_) => 200,
            OpResult::NotFound => 404,
            OpResult::Rejected { .. } => 400,
            OpResult::Error { .. } => 500,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> OpResult<U> {
        match self {
            OpResult::Ok(value) => OpResult::Ok(f(value)),
            OpResult::NotFound => OpResult::NotFound,
            OpResult::Rejected { reason } => OpResult::Rejected { reason },
            OpResult::Error { message, failed } => OpResult::Error { message, failed },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(OpResult::Ok(()).status_code(), 200);
        assert_eq!(OpResult::<()>::NotFound.status_code(), 404);
        assert_eq!(OpResult::<()>::rejected("locked").status_code(), 400);
        assert_eq!(OpResult::<()>::partial(2).status_code(), 500);
        assert_eq!(OpResult::<()>::partial(2).failed_count(), 2);
        assert_eq!(OpResult::<()>::internal().failed_count(), 0);
    }

    #[test]
    fn test_serializes_with_status_tag() {
        let json = serde_json::to_value(OpResult::<()>::rejected("protected")).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["reason"], "protected");
    }
}
