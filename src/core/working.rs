//! 工作上下文：单个 think-act 周期内的显式上下文对象
//!
//! 由控制循环独占并在 Thinking / Acting 阶段间传递；被抢占时整体入栈，
//! Recover 时合并进新周期——恢复后的周期「知道」被打断前的进展，但不等同于它。

use serde::Serialize;

/// 当前周期累积的上下文
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkingContext {
    /// 触发本周期的刺激描述
    pub stimulus: Option<String>,
    /// 周期内累积的观察（能力结果、失败记录）
    pub observations: Vec<String>,
    /// 从被打断周期合并进来的摘要
    pub resumed_from: Vec<String>,
}

impl WorkingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stimulus(&mut self, stimulus: impl Into<String>) {
        self.stimulus = Some(stimulus.into());
    }

    pub fn add_observation(&mut self, observation: impl Into<String>) {
        self.observations.push(observation.into());
    }

    /// 把被打断周期的上下文并入本周期
    pub fn merge_resumed(&mut self, interrupted: &WorkingContext) {
        self.resumed_from.push(interrupted.describe());
        self.resumed_from.extend(interrupted.resumed_from.clone());
    }

    /// 单行摘要，用于入栈记录与思考阶段输入
    pub fn describe(&self) -> String {
        let stimulus = self.stimulus.as_deref().unwrap_or("(none)");
        if self.observations.is_empty() {
            format!("stimulus: {stimulus}")
        } else {
            format!(
                "stimulus: {stimulus}; observations: {}",
                self.observations.join(" | ")
            )
        }
    }

    pub fn clear(&mut self) {
        self.stimulus = None;
        self.observations.clear();
        self.resumed_from.clear();
    }
}
