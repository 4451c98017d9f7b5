//! Generative completion service seam.
//!
//! Every model call in the crate goes through [`CompletionService`]. The
//! production stack is
//!
//! ```text
//! ResilientCompletion (timeout + retry + semaphore) → OpenAiCompatClient (HTTP)
//! ```
//!
//! Tests substitute scripted fakes or the mockall-generated mock.
//!
//! ## Error classes
//!
//! | Variant     | Retried by `ResilientCompletion` |
//! |-------------|----------------------------------|
//! | `Transient` | yes                              |
//! | `Timeout`   | yes                              |
//! | `Rejected`  | no                               |
//! | `Cancelled` | no                               |

pub mod openai;
pub mod resilient;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use workflow_core::ModelStage;

pub use openai::OpenAiCompatClient;
pub use resilient::ResilientCompletion;

/// One structured prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub stage: ModelStage,
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(
        stage: ModelStage,
        system: impl Into<String>,
        user: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            stage,
            system: system.into(),
            user: user.into(),
            temperature,
        }
    }
}

/// Transport-level failure of a completion call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompletionError {
    /// Network failure, 429, or 5xx.
    #[error("transient upstream failure: {0}")]
    Transient(String),

    #[error("call timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Non-retriable HTTP rejection (auth, bad request).
    #[error("upstream rejected request (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("call cancelled")]
    Cancelled,
}

impl CompletionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

/// A black-box text completion backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Return the raw text of the model's answer.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

/// Shared reference to a completion backend
pub type SharedCompletionService = Arc<dyn CompletionService>;
