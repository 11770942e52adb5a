//! 编排器状态机：封闭状态集与显式转移表
//!
//! 转移是 (state, action) 的纯函数；表外组合返回可区分的错误且不改状态。
//! 状态实例由控制循环独占，外部只能通过 watch 通道拿到只读快照。

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::core::error::CoreError;
use crate::metrics::Metrics;

/// 编排器运行状态（封闭枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Off,
    Idle,
    Thinking,
    Acting,
    AwaitingResponse,
    Interrupted,
    Error,
}

/// 状态机动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Start,
    SignalReceived,
    InterventionReceived,
    ThinkComplete,
    ActionComplete,
    ResponseReceived,
    Recover,
    ErrorOccurred,
    Stop,
}

/// 转移表：对有效输入全覆盖，表外组合报 InvalidTransition 且无副作用
pub fn transition(
    state: OrchestratorState,
    action: Action,
) -> Result<OrchestratorState, CoreError> {
    use Action::*;
    use OrchestratorState::*;

    let next = match (state, action) {
        (Off, Start) => Idle,
        (Idle, SignalReceived) | (Idle, InterventionReceived) => Thinking,
        (Thinking, ThinkComplete) => Acting,
        (Thinking, InterventionReceived) => Interrupted,
        (Acting, ActionComplete) => Idle,
        (Acting, InterventionReceived) => Interrupted,
        (Acting, ResponseReceived) => AwaitingResponse,
        (AwaitingResponse, ResponseReceived) => Idle,
        (AwaitingResponse, InterventionReceived) => Interrupted,
        (Interrupted, Recover) => Thinking,
        (Error, Recover) => Idle,
        (s, ErrorOccurred) if s != Off => Error,
        (_, Stop) => Off,
        (state, action) => return Err(CoreError::InvalidTransition { state, action }),
    };
    Ok(next)
}

/// 对外发布的只读状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub state: OrchestratorState,
    pub at: DateTime<Utc>,
}

impl StateSnapshot {
    pub fn off() -> Self {
        Self {
            state: OrchestratorState::Off,
            at: Utc::now(),
        }
    }
}

/// 状态机实例：当前状态 + 快照发布 + 非法转移计数
pub struct StateMachine {
    state: OrchestratorState,
    snapshot_tx: watch::Sender<StateSnapshot>,
    metrics: std::sync::Arc<Metrics>,
}

impl StateMachine {
    pub fn new(metrics: std::sync::Arc<Metrics>) -> (Self, watch::Receiver<StateSnapshot>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(StateSnapshot::off());
        (
            Self {
                state: OrchestratorState::Off,
                snapshot_tx,
                metrics,
            },
            snapshot_rx,
        )
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// 应用动作；非法组合保持原状态、计数并告警，不向调用方之外传播
    pub fn apply(&mut self, action: Action) -> Result<OrchestratorState, CoreError> {
        match transition(self.state, action) {
            Ok(next) => {
                tracing::debug!(from = ?self.state, ?action, to = ?next, "State transition");
                self.state = next;
                let _ = self.snapshot_tx.send(StateSnapshot {
                    state: next,
                    at: Utc::now(),
                });
                Ok(next)
            }
            Err(e) => {
                Metrics::incr(&self.metrics.invalid_transitions);
                tracing::warn!(state = ?self.state, ?action, "Rejected invalid transition");
                Err(e)
            }
        }
    }
}
