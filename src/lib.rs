//! Iris - 语音/视觉协作智能体协调核心
//!
//! 多个专职智能体（视觉、听觉、认知）并发产出信号，经双通道总线汇入
//! 单一编排器：context 通道尽力送达环境观察，intervention 通道按优先级
//! 有序送达需要响应的事件，可抢占层级能打断进行中的 think-act 周期。
//!
//! 模块划分：
//! - **bus**: 信号模型、校验、富化、双通道队列与路由、总线入口
//! - **capability**: 能力 trait、注册表、分级期限执行器与内置能力
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 状态机、上下文栈、思考接缝、编排控制循环
//! - **metrics**: 进程级计数器与快照
//! - **observability**: tracing 初始化
//! - **runtime**: 总线 + 编排器的整机装配

pub mod bus;
pub mod capability;
pub mod config;
pub mod core;
pub mod metrics;
pub mod observability;
pub mod runtime;

pub use runtime::IrisRuntime;
