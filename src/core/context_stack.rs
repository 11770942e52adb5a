//! 上下文栈：被抢占周期的现场保存
//!
//! 严格 LIFO，只有控制循环这一个调用方（无并发压栈）；深度有界，
//! 溢出淘汰最旧条目并计数——这是需要被看见的运行异常，不是静默行为。

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::error::CoreError;
use crate::core::state::OrchestratorState;
use crate::core::working::WorkingContext;
use crate::metrics::Metrics;

/// 入栈条目：被打断时的状态与工作上下文
#[derive(Debug, Clone, PartialEq)]
pub struct ContextStackEntry {
    /// 被打断前的非 Interrupted 状态
    pub saved_state: OrchestratorState,
    /// 被打断周期累积的工作上下文
    pub saved_payload: WorkingContext,
    pub timestamp: DateTime<Utc>,
}

/// 有界 LIFO 栈
pub struct ContextStack {
    entries: VecDeque<ContextStackEntry>,
    max_depth: usize,
    metrics: Arc<Metrics>,
}

impl ContextStack {
    pub fn new(max_depth: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            entries: VecDeque::new(),
            max_depth: max_depth.max(1),
            metrics,
        }
    }

    pub fn push(&mut self, saved_state: OrchestratorState, saved_payload: WorkingContext) {
        if self.entries.len() >= self.max_depth {
            self.entries.pop_front();
            Metrics::incr(&self.metrics.stack_evicted);
            tracing::warn!(max_depth = self.max_depth, "Context stack overflow, evicted oldest entry");
        }
        self.entries.push_back(ContextStackEntry {
            saved_state,
            saved_payload,
            timestamp: Utc::now(),
        });
        Metrics::incr(&self.metrics.stack_pushes);
    }

    /// 弹出最近条目；空栈返回 EmptyStack（调用方负责回退，不得当作致命错误）
    pub fn pop(&mut self) -> Result<ContextStackEntry, CoreError> {
        match self.entries.pop_back() {
            Some(entry) => {
                Metrics::incr(&self.metrics.stack_pops);
                Ok(entry)
            }
            None => Err(CoreError::EmptyStack),
        }
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
