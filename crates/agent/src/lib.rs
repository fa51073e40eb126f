//! Agent runtime for emsbot: routes natural-language requests about RF
//! automation rules to a bounded tool loop.
//!
//! # Architecture
//!
//! 1. **Intent routing** (`router`) - analyze the query, pick context, classify it
//! 2. **Domain loops** (`engine`, `domains`) - plan, execute and respond for Create, Update and Info
//! 3. **Tool execution** (`tools`, `dispatch`) - closed per-domain tool sets run against a `RuleStore`
//! 4. **Reply repair** (`extract`) - recover structured decisions from loosely formatted model text
//!
//! # Key Types
//!
//! - `AgentRuntime` - entry point, `classify(query)` returns intent plus final response
//! - `DecisionService` - pluggable text-in/text-out inference (Ollama, OpenAI-compatible, scripted)
//! - `AgentDomain` - one implementation per record domain, driven by the shared `AgentLoop`
//!
//! # Safety Principle
//!
//! The model only proposes. Tool eligibility, parameter validation, completion
//! and iteration limits are decided here, never by the model's reply.

pub mod dispatch;
pub mod domains;
pub mod engine;
pub mod extract;
pub mod knowledge;
pub mod llm;
pub mod router;
pub mod runtime;
pub mod tools;

pub use domains::{AgentDomain, DomainKind};
pub use engine::{AgentLoop, LoopSettings, PlanningDecision, RunState};
pub use llm::{build_decision_service, DecisionService, LlmError, ScriptedDecisionService};
pub use router::{IntentClassification, IntentRouter, RouterOutcome};
pub use runtime::{AgentRuntime, ClassificationReport};
