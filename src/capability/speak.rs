//! 对话能力
//!
//! 通过 ConversationClient trait 调用外部对话模型生成回应，说出后把话语转写
//! 作为 utterance_transcript 信号回流 context 通道（携带触发信号的关联 ID）。
//! 对话模型本体不在此 crate 内，默认提供 Mock 实现供测试与离线运行。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::bus::{RawSignal, SignalPayload};
use crate::capability::registry::{Capability, CapabilityContext, CapabilityReply};

/// 外部对话模型的窄接口
#[async_trait]
pub trait ConversationClient: Send + Sync {
    /// 针对刺激描述生成一句回应
    async fn respond(&self, prompt: &str) -> Result<String, String>;
}

/// 测试 / 离线用 Mock：回显固定格式的回应，带一个小延迟模拟外呼
pub struct MockConversationClient {
    delay: Duration,
}

impl MockConversationClient {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(10),
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for MockConversationClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationClient for MockConversationClient {
    async fn respond(&self, prompt: &str) -> Result<String, String> {
        tokio::time::sleep(self.delay).await;
        Ok(format!("[mock response to: {prompt}]"))
    }
}

/// 说话能力：调对话模型 → 产出话语 → 转写回流总线
pub struct SpeakCapability<C: ConversationClient> {
    client: C,
}

impl<C: ConversationClient> SpeakCapability<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: ConversationClient + 'static> Capability for SpeakCapability<C> {
    fn name(&self) -> &str {
        "speak"
    }

    fn description(&self) -> &str {
        "Generate and voice a response via the conversational model"
    }

    async fn execute(
        &self,
        input: Value,
        ctx: CapabilityContext,
    ) -> Result<CapabilityReply, String> {
        let prompt = input
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| "speak requires a string 'prompt' field".to_string())?;

        // 外呼期间观察取消令牌；被抢占时立即放弃，不说半句话
        let text = tokio::select! {
            result = self.client.respond(prompt) => result?,
            _ = ctx.cancel.cancelled() => {
                return Err("speak cancelled before response".to_string());
            }
        };

        let mut raw = RawSignal::new(
            "capability.speak",
            SignalPayload::UtteranceTranscript { text: text.clone() },
        );
        if let Some(id) = &ctx.correlation_id {
            raw = raw.with_correlation_id(id.clone());
        }
        ctx.emitter.emit(raw).await;

        Ok(CapabilityReply::Done(Value::String(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{SignalBus, SignalKind};
    use crate::capability::registry::SignalEmitter;
    use crate::config::BusSection;
    use crate::metrics::Metrics;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn ctx_with_bus() -> (CapabilityContext, Arc<SignalBus>) {
        let bus = SignalBus::new(&BusSection::default(), Arc::new(Metrics::new()));
        (
            CapabilityContext {
                cancel: CancellationToken::new(),
                emitter: SignalEmitter::new(Arc::clone(&bus)),
                correlation_id: Some("corr-42".to_string()),
            },
            bus,
        )
    }

    #[tokio::test]
    async fn test_speak_emits_transcript_with_correlation_id() {
        let (ctx, bus) = ctx_with_bus();
        let mut sub = bus.subscribe_context(Some(vec![SignalKind::UtteranceTranscript]));
        bus.spawn_dispatcher();

        let speak = SpeakCapability::new(MockConversationClient::new());
        let reply = speak
            .execute(serde_json::json!({"prompt": "hello"}), ctx)
            .await
            .unwrap();
        assert!(matches!(reply, CapabilityReply::Done(_)));

        let transcript = sub.recv().await.unwrap();
        assert_eq!(transcript.kind(), SignalKind::UtteranceTranscript);
        assert_eq!(
            transcript.metadata.correlation_id.as_deref(),
            Some("corr-42")
        );
    }

    #[tokio::test]
    async fn test_speak_missing_prompt_fails() {
        let (ctx, _bus) = ctx_with_bus();
        let speak = SpeakCapability::new(MockConversationClient::new());
        let err = speak.execute(serde_json::json!({}), ctx).await.unwrap_err();
        assert!(err.contains("prompt"));
    }

    #[tokio::test]
    async fn test_speak_observes_cancellation() {
        let (ctx, _bus) = ctx_with_bus();
        ctx.cancel.cancel();

        let speak = SpeakCapability::new(MockConversationClient::with_delay(
            Duration::from_secs(30),
        ));
        let err = speak
            .execute(serde_json::json!({"prompt": "hello"}), ctx)
            .await
            .unwrap_err();
        assert!(err.contains("cancelled"));
    }
}
