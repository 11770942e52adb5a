//! 信号模型：类型目录、优先级、载荷与富化后的不可变信号
//!
//! 信号类型是封闭目录，payload 按类型取值（tagged union，拒绝自由 JSON）；
//! 通道归属（context / intervention）由类型静态决定，产出方不可指定。

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bus::error::ValidationError;

/// 信号通道：context（咨询性、高流量、尽力投递）或 intervention（按优先级排序、可抢占编排器）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Context,
    Intervention,
}

/// 封闭的信号类型目录；lane() 为静态分类，决定路由去向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    // === context 通道 ===
    /// 视觉专家的当前画面状态
    VisualState,
    /// 场景切换摘要
    SceneChange,
    /// 环境音分类结果
    AmbientSound,
    /// 对话转写（他人发言）
    DialogueTranscript,
    /// 本系统产出的话语转写（能力执行后回流总线）
    UtteranceTranscript,
    /// 深度推理专家的洞察
    CognitiveInsight,

    // === intervention 通道 ===
    /// 检测到用户手势
    GestureDetected,
    /// 用户直接对系统说话
    UserAddressed,
    /// 安全告警
    SafetyAlert,
    /// 运维指令
    OperatorCommand,
}

impl SignalKind {
    /// 类型 → 通道的静态分类表；路由只看这里，与载荷内容和到达时间无关
    pub fn lane(&self) -> Lane {
        match self {
            SignalKind::VisualState
            | SignalKind::SceneChange
            | SignalKind::AmbientSound
            | SignalKind::DialogueTranscript
            | SignalKind::UtteranceTranscript
            | SignalKind::CognitiveInsight => Lane::Context,
            SignalKind::GestureDetected
            | SignalKind::UserAddressed
            | SignalKind::SafetyAlert
            | SignalKind::OperatorCommand => Lane::Intervention,
        }
    }
}

/// intervention 信号的优先级层级；数值越大越先出队
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// 数值等级：critical=4 > high=3 > medium=2 > low=1
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
            Priority::Critical => 4,
        }
    }

    /// 队列准入超时（也是入队后的存活时间）
    pub fn admission_timeout(&self) -> Duration {
        match self {
            Priority::Critical => Duration::from_millis(500),
            Priority::High => Duration::from_secs(2),
            Priority::Medium => Duration::from_secs(10),
            Priority::Low => Duration::from_secs(30),
        }
    }

    /// 是否允许抢占进行中的动作（仅 high / critical）
    pub fn is_preemptive(&self) -> bool {
        matches!(self, Priority::High | Priority::Critical)
    }
}

/// 按类型取值的载荷联合体；未知类型与畸形载荷在反序列化边界即被拒绝
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalPayload {
    VisualState {
        description: String,
        #[serde(default)]
        confidence: f32,
    },
    SceneChange {
        summary: String,
    },
    AmbientSound {
        label: String,
        #[serde(default)]
        confidence: f32,
    },
    DialogueTranscript {
        speaker: String,
        text: String,
    },
    UtteranceTranscript {
        text: String,
    },
    CognitiveInsight {
        insight: String,
    },
    GestureDetected {
        gesture: String,
        #[serde(default)]
        confidence: f32,
    },
    UserAddressed {
        text: String,
    },
    SafetyAlert {
        description: String,
    },
    OperatorCommand {
        command: String,
    },
}

impl SignalPayload {
    /// 载荷变体 → 信号类型
    pub fn kind(&self) -> SignalKind {
        match self {
            SignalPayload::VisualState { .. } => SignalKind::VisualState,
            SignalPayload::SceneChange { .. } => SignalKind::SceneChange,
            SignalPayload::AmbientSound { .. } => SignalKind::AmbientSound,
            SignalPayload::DialogueTranscript { .. } => SignalKind::DialogueTranscript,
            SignalPayload::UtteranceTranscript { .. } => SignalKind::UtteranceTranscript,
            SignalPayload::CognitiveInsight { .. } => SignalKind::CognitiveInsight,
            SignalPayload::GestureDetected { .. } => SignalKind::GestureDetected,
            SignalPayload::UserAddressed { .. } => SignalKind::UserAddressed,
            SignalPayload::SafetyAlert { .. } => SignalKind::SafetyAlert,
            SignalPayload::OperatorCommand { .. } => SignalKind::OperatorCommand,
        }
    }
}

/// 产出方提交的原始信号：来源 + 载荷 + 可选优先级 / 关联 ID；metadata 由总线负责
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSignal {
    pub source: String,
    pub payload: SignalPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl RawSignal {
    pub fn new(source: impl Into<String>, payload: SignalPayload) -> Self {
        Self {
            source: source.into(),
            payload,
            priority: None,
            correlation_id: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn kind(&self) -> SignalKind {
        self.payload.kind()
    }

    /// 从线缆 JSON 形态解析：`{source, type, priority?, correlation_id?, payload: {...}}`。
    /// 缺字段 / 未知类型 / 畸形载荷分别映射为结构化校验错误，绝不 panic。
    pub fn from_wire(value: &serde_json::Value) -> Result<Self, ValidationError> {
        let obj = value
            .as_object()
            .ok_or(ValidationError::MissingField("source"))?;

        let source = obj
            .get("source")
            .and_then(|v| v.as_str())
            .ok_or(ValidationError::MissingField("source"))?
            .to_string();

        let kind_str = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or(ValidationError::MissingField("type"))?;
        serde_json::from_value::<SignalKind>(serde_json::Value::String(kind_str.to_string()))
            .map_err(|_| ValidationError::UnknownType(kind_str.to_string()))?;

        let payload_obj = obj
            .get("payload")
            .and_then(|v| v.as_object())
            .ok_or(ValidationError::MissingField("payload"))?;

        // 把外层 type 注入 payload 对象，走 tagged union 的一次性反序列化
        let mut tagged = payload_obj.clone();
        tagged.insert(
            "type".to_string(),
            serde_json::Value::String(kind_str.to_string()),
        );
        let payload: SignalPayload = serde_json::from_value(serde_json::Value::Object(tagged))
            .map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;

        let priority = match obj.get("priority") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => Some(
                serde_json::from_value::<Priority>(v.clone())
                    .map_err(|_| ValidationError::MalformedPriority(v.to_string()))?,
            ),
        };

        let correlation_id = obj
            .get("correlation_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(Self {
            source,
            payload,
            priority,
            correlation_id,
        })
    }
}

/// 总线富化的只读元数据；产出方不可写
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMetadata {
    /// 富化时刻的墙上时钟
    pub timestamp: DateTime<Utc>,
    /// 来源内单调递增序号，从 1 开始，进程生命周期内不复用
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// 富化后的不可变信号；入队后不再被修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub source: String,
    pub payload: SignalPayload,
    pub priority: Option<Priority>,
    pub metadata: SignalMetadata,
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        self.payload.kind()
    }

    pub fn lane(&self) -> Lane {
        self.kind().lane()
    }
}
