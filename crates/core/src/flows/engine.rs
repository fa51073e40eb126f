use std::fmt::Debug;

use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::intent::Intent;
use crate::flows::states::{
    FlowType, LoopEvent, LoopState, RouterEvent, RouterState, TransitionOutcome,
};

pub trait FlowDefinition {
    type State: Clone + Debug + PartialEq;
    type Event: Clone + Debug;

    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> Self::State;
    fn transition(
        &self,
        current: &Self::State,
        event: &Self::Event,
    ) -> Result<TransitionOutcome<Self::State, Self::Event>, FlowTransitionError>;
}

/// Top-level routing: analyze, classify, hand off to exactly one handler.
#[derive(Clone, Debug, Default)]
pub struct IntentRouterFlow;

impl FlowDefinition for IntentRouterFlow {
    type State = RouterState;
    type Event = RouterEvent;

    fn flow_type(&self) -> FlowType {
        FlowType::IntentRouter
    }

    fn initial_state(&self) -> RouterState {
        RouterState::Analyzing
    }

    fn transition(
        &self,
        current: &RouterState,
        event: &RouterEvent,
    ) -> Result<TransitionOutcome<RouterState, RouterEvent>, FlowTransitionError> {
        transition_router(current, event)
    }
}

/// Planner / executor / responder cycle shared by every record domain.
#[derive(Clone, Debug)]
pub struct AgentLoopFlow {
    flow_type: FlowType,
}

impl AgentLoopFlow {
    pub fn new(flow_type: FlowType) -> Self {
        Self { flow_type }
    }
}

impl FlowDefinition for AgentLoopFlow {
    type State = LoopState;
    type Event = LoopEvent;

    fn flow_type(&self) -> FlowType {
        self.flow_type
    }

    fn initial_state(&self) -> LoopState {
        LoopState::Planning
    }

    fn transition(
        &self,
        current: &LoopState,
        event: &LoopEvent,
    ) -> Result<TransitionOutcome<LoopState, LoopEvent>, FlowTransitionError> {
        transition_agent_loop(self.flow_type, current, event)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> F::State {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &F::State,
        event: &F::Event,
    ) -> Result<TransitionOutcome<F::State, F::Event>, FlowTransitionError> {
        self.flow.transition(current, event)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &F::State,
        event: &F::Event,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome<F::State, F::Event>, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        let category = match self.flow_type() {
            FlowType::IntentRouter => AuditCategory::Routing,
            FlowType::CreateLoop | FlowType::UpdateLoop | FlowType::InfoLoop => {
                AuditCategory::Planning
            }
        };
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "flow.transition_applied",
                        category,
                        AuditOutcome::Success,
                    )
                    .with_metadata("flow", format!("{:?}", self.flow_type()))
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "flow.transition_rejected",
                        category,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("flow", format!("{:?}", self.flow_type()))
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<IntentRouterFlow> {
    fn default() -> Self {
        Self::new(IntentRouterFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid {flow:?} transition from {state} using event {event}")]
    InvalidTransition { flow: FlowType, state: String, event: String },
}

fn invalid<S: Debug, E: Debug>(flow: FlowType, state: &S, event: &E) -> FlowTransitionError {
    FlowTransitionError::InvalidTransition {
        flow,
        state: format!("{state:?}"),
        event: format!("{event:?}"),
    }
}

fn transition_router(
    current: &RouterState,
    event: &RouterEvent,
) -> Result<TransitionOutcome<RouterState, RouterEvent>, FlowTransitionError> {
    use RouterEvent::{Classified, ContextSelected, HandlerCompleted};
    use RouterState::{
        Analyzing, Classifying, CreateLoop, Error, Generic, InfoLoop, Terminal, UpdateLoop,
    };

    let to = match (current, event) {
        (Analyzing, ContextSelected) => Classifying,
        (Classifying, Classified(intent)) => match intent {
            Intent::Create => CreateLoop,
            Intent::Update => UpdateLoop,
            Intent::Info => InfoLoop,
            Intent::Generic => Generic,
            Intent::Unknown => Error,
        },
        (CreateLoop | UpdateLoop | InfoLoop | Generic | Error, HandlerCompleted) => Terminal,
        _ => return Err(invalid(FlowType::IntentRouter, current, event)),
    };

    Ok(TransitionOutcome { from: *current, to, event: *event })
}

fn transition_agent_loop(
    flow: FlowType,
    current: &LoopState,
    event: &LoopEvent,
) -> Result<TransitionOutcome<LoopState, LoopEvent>, FlowTransitionError> {
    use LoopEvent::{
        CompletionForced, CompletionSignaled, ResponseProduced, ToolExecuted, ToolSelected,
    };
    use LoopState::{Executing, Planning, Responding, Terminal};

    let to = match (current, event) {
        (Planning, ToolSelected) => Executing,
        (Planning, CompletionForced | CompletionSignaled) => Responding,
        (Executing, ToolExecuted) => Planning,
        (Responding, ResponseProduced) => Terminal,
        _ => return Err(invalid(flow, current, event)),
    };

    Ok(TransitionOutcome { from: *current, to, event: *event })
}
