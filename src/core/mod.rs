//! 编排核心：状态机、上下文栈、思考接缝与控制循环

pub mod context_stack;
pub mod deliberator;
pub mod error;
pub mod orchestrator;
pub mod state;
pub mod working;

pub use context_stack::{ContextStack, ContextStackEntry};
pub use deliberator::{Decision, Deliberator, RuleDeliberator};
pub use error::CoreError;
pub use orchestrator::{Command, OrchestratorBuilder, OrchestratorHandle};
pub use state::{transition, Action, OrchestratorState, StateMachine, StateSnapshot};
pub use working::WorkingContext;
