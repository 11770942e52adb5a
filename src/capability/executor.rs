//! 能力执行器
//!
//! 对每次调用施加按触发层级决定的期限（可抢占层级短、默认宽松），失败 / 超时 / 取消
//! 全部隔离在单次调用内并转为 CoreError；每次调用无论结果如何都输出结构化审计日志（JSON）
//! 并计入指标。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::bus::Priority;
use crate::capability::registry::{CapabilityContext, CapabilityRegistry, CapabilityReply};
use crate::config::CapabilitySection;
use crate::core::error::CoreError;
use crate::metrics::Metrics;

/// 能力执行器：注册表 + 分级期限 + 审计
pub struct CapabilityExecutor {
    registry: CapabilityRegistry,
    priority_deadline: Duration,
    default_deadline: Duration,
    metrics: Arc<Metrics>,
}

impl CapabilityExecutor {
    pub fn new(
        registry: CapabilityRegistry,
        cfg: &CapabilitySection,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            priority_deadline: Duration::from_secs(cfg.priority_deadline_secs),
            default_deadline: Duration::from_secs(cfg.default_deadline_secs),
            metrics,
        }
    }

    /// 触发层级 → 调用期限
    fn deadline_for(&self, tier: Option<Priority>) -> Duration {
        match tier {
            Some(t) if t.is_preemptive() => self.priority_deadline,
            _ => self.default_deadline,
        }
    }

    /// 调用指定能力；未注册 fail closed，超时 / 失败 / 取消转为对应错误。
    /// 取消判定：调用返回 Err 且令牌已被取消时按取消处理。
    pub async fn invoke(
        &self,
        name: &str,
        input: Value,
        tier: Option<Priority>,
        ctx: CapabilityContext,
    ) -> Result<CapabilityReply, CoreError> {
        let start = Instant::now();

        let Some(capability) = self.registry.get(name) else {
            self.audit(name, "not_found", start);
            Metrics::incr(&self.metrics.capability_failure);
            return Err(CoreError::CapabilityNotFound(name.to_string()));
        };

        let deadline = self.deadline_for(tier);
        let cancel = ctx.cancel.clone();
        let result = timeout(deadline, capability.execute(input, ctx)).await;

        let (outcome, mapped) = match result {
            Ok(Ok(reply)) => {
                Metrics::incr(&self.metrics.capability_success);
                ("ok", Ok(reply))
            }
            Ok(Err(_)) if cancel.is_cancelled() => {
                Metrics::incr(&self.metrics.capability_cancelled);
                (
                    "cancelled",
                    Err(CoreError::CapabilityCancelled(name.to_string())),
                )
            }
            Ok(Err(reason)) => {
                Metrics::incr(&self.metrics.capability_failure);
                (
                    "error",
                    Err(CoreError::CapabilityFailed {
                        name: name.to_string(),
                        reason,
                    }),
                )
            }
            Err(_) => {
                Metrics::incr(&self.metrics.capability_timeout);
                (
                    "timeout",
                    Err(CoreError::CapabilityTimeout(name.to_string())),
                )
            }
        };

        self.audit(name, outcome, start);
        mapped
    }

    fn audit(&self, name: &str, outcome: &str, start: Instant) {
        let audit = serde_json::json!({
            "event": "capability_audit",
            "capability": name,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit.to_string(), "capability");
    }

    pub fn capability_names(&self) -> Vec<String> {
        self.registry.names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SignalBus;
    use crate::capability::registry::{Capability, SignalEmitter};
    use crate::config::BusSection;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct EchoCapability;

    #[async_trait]
    impl Capability for EchoCapability {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "returns its input"
        }
        async fn execute(
            &self,
            input: Value,
            _ctx: CapabilityContext,
        ) -> Result<CapabilityReply, String> {
            Ok(CapabilityReply::Done(input))
        }
    }

    struct FailingCapability;

    #[async_trait]
    impl Capability for FailingCapability {
        fn name(&self) -> &str {
            "failing"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        async fn execute(
            &self,
            _input: Value,
            _ctx: CapabilityContext,
        ) -> Result<CapabilityReply, String> {
            Err("boom".to_string())
        }
    }

    struct SlowCapability;

    #[async_trait]
    impl Capability for SlowCapability {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps until cancelled"
        }
        async fn execute(
            &self,
            _input: Value,
            ctx: CapabilityContext,
        ) -> Result<CapabilityReply, String> {
            tokio::select! {
                _ = ctx.cancel.cancelled() => Err("cancelled".to_string()),
                _ = tokio::time::sleep(Duration::from_secs(60)) => {
                    Ok(CapabilityReply::Done(Value::Null))
                }
            }
        }
    }

    fn test_ctx() -> CapabilityContext {
        let bus = SignalBus::new(&BusSection::default(), Arc::new(Metrics::new()));
        CapabilityContext {
            cancel: CancellationToken::new(),
            emitter: SignalEmitter::new(bus),
            correlation_id: None,
        }
    }

    fn executor_with(registry: CapabilityRegistry, metrics: Arc<Metrics>) -> CapabilityExecutor {
        CapabilityExecutor::new(
            registry,
            &CapabilitySection {
                priority_deadline_secs: 1,
                default_deadline_secs: 2,
            },
            metrics,
        )
    }

    #[tokio::test]
    async fn test_unknown_capability_fails_closed() {
        let metrics = Arc::new(Metrics::new());
        let executor = executor_with(CapabilityRegistry::new(), Arc::clone(&metrics));

        let err = executor
            .invoke("missing", Value::Null, None, test_ctx())
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::CapabilityNotFound("missing".to_string()));
        assert_eq!(metrics.snapshot().capability_failure, 1);
    }

    #[tokio::test]
    async fn test_success_is_counted() {
        let metrics = Arc::new(Metrics::new());
        let mut registry = CapabilityRegistry::new();
        registry.register(EchoCapability);
        let executor = executor_with(registry, Arc::clone(&metrics));

        let reply = executor
            .invoke("echo", serde_json::json!({"x": 1}), None, test_ctx())
            .await
            .unwrap();
        assert!(matches!(reply, CapabilityReply::Done(v) if v == serde_json::json!({"x": 1})));
        assert_eq!(metrics.snapshot().capability_success, 1);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_and_structured() {
        let metrics = Arc::new(Metrics::new());
        let mut registry = CapabilityRegistry::new();
        registry.register(FailingCapability);
        let executor = executor_with(registry, Arc::clone(&metrics));

        let err = executor
            .invoke("failing", Value::Null, None, test_ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CapabilityFailed { ref reason, .. } if reason == "boom"));
        assert_eq!(metrics.snapshot().capability_failure, 1);
    }

    #[tokio::test]
    async fn test_preemptive_tier_uses_short_deadline() {
        let metrics = Arc::new(Metrics::new());
        let mut registry = CapabilityRegistry::new();
        registry.register(SlowCapability);
        let executor = executor_with(registry, Arc::clone(&metrics));

        let start = Instant::now();
        let err = executor
            .invoke("slow", Value::Null, Some(Priority::Critical), test_ctx())
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::CapabilityTimeout("slow".to_string()));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(metrics.snapshot().capability_timeout, 1);
    }

    #[tokio::test]
    async fn test_cancellation_maps_to_cancelled() {
        let metrics = Arc::new(Metrics::new());
        let mut registry = CapabilityRegistry::new();
        registry.register(SlowCapability);
        let executor = executor_with(registry, Arc::clone(&metrics));

        let ctx = test_ctx();
        let cancel = ctx.cancel.clone();
        let invoke = executor.invoke("slow", Value::Null, None, ctx);
        tokio::pin!(invoke);

        tokio::select! {
            _ = &mut invoke => panic!("should not complete before cancel"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => cancel.cancel(),
        }

        let err = invoke.await.unwrap_err();
        assert_eq!(err, CoreError::CapabilityCancelled("slow".to_string()));
        assert_eq!(metrics.snapshot().capability_cancelled, 1);
    }
}
