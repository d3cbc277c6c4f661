//! Agent runtime - guarded natural-language-to-SQL question answering
//!
//! This crate is the "brain" of the askdb system - a bounded agent loop that:
//! - Keeps resumable conversation sessions in a process-wide store
//! - Lets a model decide when to issue a single guarded SQL query
//! - Validates every model-generated statement before it touches the pool
//! - Assembles the final answer transcript for the caller
//!
//! # Architecture
//!
//! One `ask` call follows a constrained state machine:
//! 1. **ANALYZE** (`runtime`) - hand the transcript to the model adapter
//! 2. **EXECUTE_TOOL** (`tools`, `guardrails`) - run requested tool calls
//!    through the registry and feed results back
//! 3. **DONE** - persist exactly one user turn and one assistant turn
//!
//! # Safety principle
//!
//! Loop termination is enforced in code, never delegated to model
//! cooperation: tool round trips are capped by configuration, and the SQL
//! guardrail is a deny-by-default allow-list (`select`/`with` only) with a
//! forced row bound.

pub mod guardrails;
pub mod llm;
pub mod messages;
pub mod openai;
pub mod runtime;
pub mod sessions;
pub mod tools;

pub use guardrails::{validate, QueryError, SqlGuardrail, ValidatedQuery};
pub use llm::{AssistantTurn, ModelClient, ModelError};
pub use messages::{Message, ToolCall};
pub use openai::OpenAiClient;
pub use runtime::{AgentError, AgentRuntime, AskOutcome};
pub use sessions::{
    ConversationSession, ConversationStore, SessionHandle, SessionSummary, StoreError,
};
pub use tools::{SqlQueryTool, Tool, ToolDescriptor, ToolError, ToolRegistry};
