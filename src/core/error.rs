//! 编排核心错误
//!
//! 全部在检测层就地恢复：非法转移是可计数的 no-op，能力失败隔离在单次调用内，
//! 空栈 Recover 回退到 Idle——任何一种都不会终止控制循环。

use thiserror::Error;

use crate::core::state::{Action, OrchestratorState};

/// 编排器运行过程中可能出现的错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// 状态机收到转移表之外的 (state, action) 组合
    #[error("Invalid transition: {state:?} + {action:?}")]
    InvalidTransition {
        state: OrchestratorState,
        action: Action,
    },

    /// Recover 时上下文栈为空
    #[error("Context stack is empty")]
    EmptyStack,

    /// 请求了未注册的能力（fail closed）
    #[error("Unknown capability: {0}")]
    CapabilityNotFound(String),

    /// 能力执行失败
    #[error("Capability '{name}' failed: {reason}")]
    CapabilityFailed { name: String, reason: String },

    /// 能力调用超过期限
    #[error("Capability '{0}' timed out")]
    CapabilityTimeout(String),

    /// 能力调用被协作式取消
    #[error("Capability '{0}' was cancelled")]
    CapabilityCancelled(String),

    /// 思考阶段失败
    #[error("Deliberation failed: {0}")]
    DeliberationFailed(String),
}
