pub mod engine;
pub mod states;

pub use engine::{AgentLoopFlow, FlowDefinition, FlowEngine, FlowTransitionError, IntentRouterFlow};
pub use states::{FlowType, LoopEvent, LoopState, RouterEvent, RouterState, TransitionOutcome};
