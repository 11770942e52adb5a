//! 思考阶段：刺激 → 决策
//!
//! Deliberator trait 是 Thinking 阶段的接缝；默认实现 RuleDeliberator 用
//! 信号类型到能力名的路由表做决策（条目可覆写）。外部认知模型不在此 crate
//! 范围内，接入时实现同一 trait 即可。

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::bus::{Signal, SignalKind, SignalPayload};
use crate::core::working::WorkingContext;

/// 思考产出：本周期要调用的唯一能力及其入参
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub capability: String,
    pub input: Value,
}

/// Thinking 阶段接缝
#[async_trait]
pub trait Deliberator: Send + Sync {
    /// 针对刺激与当前工作上下文产出决策；Err 进入 Error 状态而非崩溃
    async fn deliberate(&self, signal: &Signal, ctx: &WorkingContext)
        -> Result<Decision, String>;
}

/// 刺激的单行文字描述，供决策入参与工作上下文使用
pub fn stimulus_text(signal: &Signal) -> String {
    match &signal.payload {
        SignalPayload::VisualState { description, .. } => format!("visual state: {description}"),
        SignalPayload::SceneChange { summary } => format!("scene change: {summary}"),
        SignalPayload::AmbientSound { label, .. } => format!("ambient sound: {label}"),
        SignalPayload::DialogueTranscript { speaker, text } => {
            format!("dialogue from {speaker}: {text}")
        }
        SignalPayload::UtteranceTranscript { text } => format!("own utterance: {text}"),
        SignalPayload::CognitiveInsight { insight } => format!("insight: {insight}"),
        SignalPayload::GestureDetected { gesture, .. } => format!("gesture: {gesture}"),
        SignalPayload::UserAddressed { text } => format!("user said: {text}"),
        SignalPayload::SafetyAlert { description } => format!("safety alert: {description}"),
        SignalPayload::OperatorCommand { command } => format!("operator command: {command}"),
    }
}

/// 规则路由决策器
pub struct RuleDeliberator {
    routes: HashMap<SignalKind, String>,
}

impl RuleDeliberator {
    /// 默认路由：干预类刺激走 speak，洞察写入记忆，其余仅观察
    pub fn new() -> Self {
        let mut routes = HashMap::new();
        for kind in [
            SignalKind::GestureDetected,
            SignalKind::UserAddressed,
            SignalKind::SafetyAlert,
            SignalKind::OperatorCommand,
        ] {
            routes.insert(kind, "speak".to_string());
        }
        routes.insert(SignalKind::CognitiveInsight, "remember".to_string());
        Self { routes }
    }

    /// 覆写或新增一条路由
    pub fn with_route(mut self, kind: SignalKind, capability: impl Into<String>) -> Self {
        self.routes.insert(kind, capability.into());
        self
    }

    fn input_for(&self, capability: &str, signal: &Signal, ctx: &WorkingContext) -> Value {
        let stimulus = stimulus_text(signal);
        match capability {
            "speak" => {
                let mut prompt = stimulus;
                if !ctx.resumed_from.is_empty() {
                    prompt = format!("{prompt} (resumed: {})", ctx.resumed_from.join("; "));
                }
                serde_json::json!({ "prompt": prompt })
            }
            "remember" => serde_json::json!({ "note": stimulus }),
            "recall" => serde_json::json!({ "query": stimulus }),
            _ => serde_json::json!({ "stimulus": stimulus }),
        }
    }
}

impl Default for RuleDeliberator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Deliberator for RuleDeliberator {
    async fn deliberate(
        &self,
        signal: &Signal,
        ctx: &WorkingContext,
    ) -> Result<Decision, String> {
        let capability = self
            .routes
            .get(&signal.kind())
            .map(String::as_str)
            .unwrap_or("observe");
        Ok(Decision {
            capability: capability.to_string(),
            input: self.input_for(capability, signal, ctx),
        })
    }
}
