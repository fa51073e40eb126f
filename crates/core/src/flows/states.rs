use serde::{Deserialize, Serialize};

use crate::domain::intent::Intent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    IntentRouter,
    CreateLoop,
    UpdateLoop,
    InfoLoop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouterState {
    Analyzing,
    Classifying,
    CreateLoop,
    UpdateLoop,
    InfoLoop,
    Generic,
    Error,
    Terminal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouterEvent {
    ContextSelected,
    Classified(Intent),
    HandlerCompleted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    Planning,
    Executing,
    Responding,
    Terminal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopEvent {
    ToolSelected,
    /// The engine stopped the run: ceiling, collapsed tool set, accumulator or parse failure.
    CompletionForced,
    /// The decision service asked to finish.
    CompletionSignaled,
    ToolExecuted,
    ResponseProduced,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome<S, E> {
    pub from: S,
    pub to: S,
    pub event: E,
}
