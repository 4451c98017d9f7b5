//! Candidate-Matching Agents
//!
//! The model-facing half of the matching loop. `workflow-core` owns the
//! deterministic pieces; this crate wires them to a generative model:
//!
//! - [`completion`]: the completion-service seam, an OpenAI-compatible HTTP
//!   client, and the resilient adapter that owns retries, timeouts and the
//!   concurrency cap
//! - [`schema`] / [`prompts`]: response contracts and prompt builders
//! - [`agents`]: candidate generator and evaluator, feedback analyzer,
//!   criteria refiner
//! - [`orchestrator`]: the workflow state machine over the store
//! - [`config`]: layered engine configuration
//!
//! ```text
//! WorkflowOrchestrator ──▶ MatchingAgents ──▶ ResilientCompletion ──▶ OpenAiCompatClient
//!          │
//!          └──▶ WorkflowStore (memory | files | RocksDB)
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod agents;
pub mod completion;
pub mod config;
pub mod orchestrator;
pub mod prompts;
pub mod schema;

pub use agents::{
    CandidateEvaluator, CandidateGenerator, CriteriaRefiner, FeedbackAnalyzer, MatchingAgents,
    StageError,
};
pub use completion::{
    CompletionError, CompletionRequest, CompletionService, OpenAiCompatClient,
    ResilientCompletion, SharedCompletionService,
};
pub use config::{EngineConfig, ModelConfig, StoreBackend};
pub use orchestrator::{
    FeedbackSource, ScriptedFeedback, ScriptedVerdict, WorkflowOrchestrator, WorkflowReport,
};
