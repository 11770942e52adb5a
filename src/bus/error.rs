//! 总线错误：校验失败与入队失败
//!
//! 校验错误只返回给调用方记录与计数，绝不进入状态机控制流。

use thiserror::Error;

use crate::bus::signal::{Priority, SignalKind};

/// 结构性校验失败（信号被丢弃并计数）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Source must be a non-empty string")]
    EmptySource,

    #[error("Unknown signal type: {0}")]
    UnknownType(String),

    #[error("Priority is required for intervention signal type {0:?}")]
    MissingPriority(SignalKind),

    #[error("Malformed priority: {0}")]
    MalformedPriority(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

/// emit 的失败结果
#[derive(Debug, Error)]
pub enum EmitError {
    /// 校验拒绝
    #[error("Signal rejected: {0}")]
    Rejected(#[from] ValidationError),

    /// intervention 队列在该层级的准入超时内仍然满，信号已进入死信缓冲
    #[error("Intervention queue full past {tier:?} admission timeout")]
    AdmissionTimeout { tier: Priority },

    /// 总线正在关闭
    #[error("Signal bus is shutting down")]
    ShuttingDown,
}
