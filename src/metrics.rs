//! 运行计数器：总线与编排核心的可观测性
//!
//! 全部为 AtomicU64（Relaxed），只用于观测，不参与控制决策；snapshot() 产出可序列化快照。

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// 进程级计数器集合，由总线、编排器与能力执行器共享（Arc）
#[derive(Debug, Default)]
pub struct Metrics {
    /// 校验拒绝的信号数
    pub validation_rejected: AtomicU64,
    /// context 通道成功入队数
    pub context_admitted: AtomicU64,
    /// context 通道因容量淘汰的最旧信号数
    pub context_evicted: AtomicU64,
    /// intervention 通道成功入队数
    pub intervention_admitted: AtomicU64,
    /// 出队时发现已过期而丢弃的 intervention 信号数
    pub intervention_expired: AtomicU64,
    /// 准入超时进入死信的信号数
    pub dead_lettered: AtomicU64,
    /// 死信缓冲自身溢出淘汰数
    pub dead_letter_evicted: AtomicU64,
    /// 状态机拒绝的非法转移数
    pub invalid_transitions: AtomicU64,
    /// 空栈 Recover 回退次数
    pub empty_stack_recoveries: AtomicU64,
    /// 上下文栈压入次数
    pub stack_pushes: AtomicU64,
    /// 上下文栈弹出次数
    pub stack_pops: AtomicU64,
    /// 上下文栈溢出淘汰数
    pub stack_evicted: AtomicU64,
    /// 抢占中断次数（高优先级打断进行中的动作）
    pub interruptions: AtomicU64,
    /// 能力调用成功数
    pub capability_success: AtomicU64,
    /// 能力调用失败数（含未注册能力）
    pub capability_failure: AtomicU64,
    /// 能力调用超时数
    pub capability_timeout: AtomicU64,
    /// 能力调用被取消数
    pub capability_cancelled: AtomicU64,
}

/// 计数器快照（可序列化，供状态接口 / 日志输出）
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub validation_rejected: u64,
    pub context_admitted: u64,
    pub context_evicted: u64,
    pub intervention_admitted: u64,
    pub intervention_expired: u64,
    pub dead_lettered: u64,
    pub dead_letter_evicted: u64,
    pub invalid_transitions: u64,
    pub empty_stack_recoveries: u64,
    pub stack_pushes: u64,
    pub stack_pops: u64,
    pub stack_evicted: u64,
    pub interruptions: u64,
    pub capability_success: u64,
    pub capability_failure: u64,
    pub capability_timeout: u64,
    pub capability_cancelled: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 计数 +1
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            validation_rejected: load(&self.validation_rejected),
            context_admitted: load(&self.context_admitted),
            context_evicted: load(&self.context_evicted),
            intervention_admitted: load(&self.intervention_admitted),
            intervention_expired: load(&self.intervention_expired),
            dead_lettered: load(&self.dead_lettered),
            dead_letter_evicted: load(&self.dead_letter_evicted),
            invalid_transitions: load(&self.invalid_transitions),
            empty_stack_recoveries: load(&self.empty_stack_recoveries),
            stack_pushes: load(&self.stack_pushes),
            stack_pops: load(&self.stack_pops),
            stack_evicted: load(&self.stack_evicted),
            interruptions: load(&self.interruptions),
            capability_success: load(&self.capability_success),
            capability_failure: load(&self.capability_failure),
            capability_timeout: load(&self.capability_timeout),
            capability_cancelled: load(&self.capability_cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counts() {
        let metrics = Metrics::new();
        Metrics::incr(&metrics.context_admitted);
        Metrics::incr(&metrics.context_admitted);
        Metrics::incr(&metrics.dead_lettered);

        let snap = metrics.snapshot();
        assert_eq!(snap.context_admitted, 2);
        assert_eq!(snap.dead_lettered, 1);
        assert_eq!(snap.validation_rejected, 0);
    }
}
