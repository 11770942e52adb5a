//! 应用配置：从 TOML 文件与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `IRIS__*` 覆盖（双下划线表示嵌套，
//! 如 `IRIS__BUS__CONTEXT_CAPACITY=2000`）。层级准入超时是信号模型里的固定表，不走配置。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub bus: BusSection,
    pub orchestrator: OrchestratorSection,
    pub capabilities: CapabilitySection,
}

/// [bus] 段：三个有界缓冲的容量
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusSection {
    /// context FIFO 容量（溢出淘汰最旧）
    pub context_capacity: usize,
    /// intervention 优先级队列容量（溢出按层级超时准入）
    pub intervention_capacity: usize,
    /// 死信缓冲容量
    pub dead_letter_capacity: usize,
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            context_capacity: 1000,
            intervention_capacity: 64,
            dead_letter_capacity: 128,
        }
    }
}

/// [orchestrator] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// 上下文栈最大深度（超出淘汰最旧并计数）
    pub context_stack_depth: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            context_stack_depth: 50,
        }
    }
}

/// [capabilities] 段：按触发层级区分的调用期限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CapabilitySection {
    /// high / critical 触发的调用期限（秒）
    pub priority_deadline_secs: u64,
    /// 其余调用的期限（秒）
    pub default_deadline_secs: u64,
}

impl Default for CapabilitySection {
    fn default() -> Self {
        Self {
            priority_deadline_secs: 10,
            default_deadline_secs: 60,
        }
    }
}

/// 加载配置：路径缺省为 config/default.toml；文件不存在时用默认值，环境变量仍生效
pub fn load_config(config_path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let path = config_path.unwrap_or_else(|| PathBuf::from("config/default.toml"));

    let mut builder = config::Config::builder();
    if path.exists() {
        builder = builder.add_source(config::File::from(path));
    }
    builder = builder.add_source(config::Environment::with_prefix("IRIS").separator("__"));

    let cfg = builder.build()?.try_deserialize::<AppConfig>()?;
    Ok(cfg)
}
