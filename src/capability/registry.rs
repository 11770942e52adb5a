//! 能力注册表
//!
//! 所有能力实现 Capability trait（name / description / execute），按名注册与查找；
//! 未注册的名字由执行器 fail closed。执行入参为 JSON，出参为 Done 或 Pending（长任务）。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::bus::{RawSignal, SignalBus};

/// 能力执行结果
#[derive(Debug)]
pub enum CapabilityReply {
    /// 本次调用内完成
    Done(Value),
    /// 已发起外部长任务，最终结果经由通道送达（驱动 AwaitingResponse 路径）
    Pending(oneshot::Receiver<Result<Value, String>>),
}

/// 每次调用传入的执行环境
#[derive(Clone)]
pub struct CapabilityContext {
    /// 协作式取消令牌；能力必须观察它并尽快退出，核心没有强制终止手段
    pub cancel: CancellationToken,
    /// 回流总线的发射口（如话语转写重新进入 context 通道）
    pub emitter: SignalEmitter,
    /// 触发信号的关联 ID，随能力产出的信号传播
    pub correlation_id: Option<String>,
}

/// 能力 trait：命名、描述与隔离执行
#[async_trait]
pub trait Capability: Send + Sync {
    /// 能力名称（注册与调用用）
    fn name(&self) -> &str;

    /// 能力描述
    fn description(&self) -> &str;

    /// 执行；失败返回 Err(原因)，由执行器转为结构化错误，绝不向外抛
    async fn execute(&self, input: Value, ctx: CapabilityContext) -> Result<CapabilityReply, String>;
}

/// 能力向总线回流信号的发射口；发射失败只记日志，不影响能力结果
#[derive(Clone)]
pub struct SignalEmitter {
    bus: Arc<SignalBus>,
}

impl SignalEmitter {
    pub fn new(bus: Arc<SignalBus>) -> Self {
        Self { bus }
    }

    pub async fn emit(&self, raw: RawSignal) {
        if let Err(e) = self.bus.emit(raw).await {
            tracing::warn!(error = %e, "Capability-emitted signal was not admitted");
        }
    }
}

/// 能力注册表：按名称存储 Arc<dyn Capability>
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: impl Capability + 'static) {
        let name = capability.name().to_string();
        self.capabilities.insert(name, Arc::new(capability));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.capabilities.keys().cloned().collect()
    }

    /// (name, description) 列表，供宿主展示可用能力
    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.capabilities
            .iter()
            .map(|(name, cap)| (name.clone(), cap.description().to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCapability;

    #[async_trait]
    impl Capability for FakeCapability {
        fn name(&self) -> &str {
            "fake"
        }
        fn description(&self) -> &str {
            "test capability"
        }
        async fn execute(
            &self,
            input: Value,
            _ctx: CapabilityContext,
        ) -> Result<CapabilityReply, String> {
            Ok(CapabilityReply::Done(input))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = CapabilityRegistry::new();
        registry.register(FakeCapability);

        assert!(registry.get("fake").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["fake".to_string()]);
    }
}
