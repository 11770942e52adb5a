//! 观察能力：默认动作
//!
//! 仅把刺激记入日志后完成。规则路由没有更合适的动作时落到这里，
//! 保证每个 think-act 周期都有且只有一次能力调用。

use async_trait::async_trait;
use serde_json::Value;

use crate::capability::registry::{Capability, CapabilityContext, CapabilityReply};

pub struct NoopCapability;

#[async_trait]
impl Capability for NoopCapability {
    fn name(&self) -> &str {
        "observe"
    }

    fn description(&self) -> &str {
        "Acknowledge the stimulus without taking external action"
    }

    async fn execute(
        &self,
        input: Value,
        _ctx: CapabilityContext,
    ) -> Result<CapabilityReply, String> {
        tracing::debug!(input = %input, "Observed stimulus, no action taken");
        Ok(CapabilityReply::Done(Value::String("observed".to_string())))
    }
}
