//! Remediation document persisted for every non-successful run.

use serde::{Deserialize, Serialize};

use crate::core::taxonomy::RequiredAction;
use crate::core::types::{ErrorDetails, RunState, RuntimeResult};

/// Code recorded when a failed result carries no error.
pub const UNKNOWN_FAILURE_CODE: &str = "unknown";
pub const UNKNOWN_FAILURE_MESSAGE: &str = "Unknown failure";

/// Contents of `resolution.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub state: RunState,
    pub error: ResolutionError,
    pub required: Vec<RequiredAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionError {
    pub code: String,
    pub message: String,
    pub details: Option<ErrorDetails>,
}

impl Resolution {
    /// Build the document for `state` from the result that produced it.
    ///
    /// Depends only on the result, so it can be rebuilt later from `result.json`.
    pub fn build(state: RunState, result: &RuntimeResult) -> Self {
        match &result.error {
            None => Self {
                state,
                error: ResolutionError {
                    code: UNKNOWN_FAILURE_CODE.to_string(),
                    message: UNKNOWN_FAILURE_MESSAGE.to_string(),
                    details: None,
                },
                required: Vec::new(),
            },
            Some(error) => Self {
                state,
                error: ResolutionError {
                    code: error.code.to_string(),
                    message: error.message.clone(),
                    details: error.details.clone(),
                },
                required: vec![error.code.remediation().required_action(error)],
            },
        }
    }
}
