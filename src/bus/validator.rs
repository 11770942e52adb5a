//! 信号校验：结构契约检查
//!
//! 拒绝不完整或不符合目录的信号；intervention 类型必须带合法优先级。
//! 校验无副作用，失败只产生结构化错误由调用方计数。

use crate::bus::error::ValidationError;
use crate::bus::signal::{Lane, RawSignal};

/// 校验通过的信号（仅由 Validator 构造，供 Enricher 消费）
#[derive(Debug, Clone)]
pub struct ValidatedSignal(pub(crate) RawSignal);

impl ValidatedSignal {
    pub fn raw(&self) -> &RawSignal {
        &self.0
    }
}

/// 无状态校验器
#[derive(Debug, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// 校验：来源非空；intervention 类型必须带优先级；context 类型携带的优先级被忽略（咨询性产出方
    /// 不一定了解目录分类，降级为 debug 日志而非拒绝）。
    pub fn validate(&self, raw: RawSignal) -> Result<ValidatedSignal, ValidationError> {
        if raw.source.trim().is_empty() {
            return Err(ValidationError::EmptySource);
        }

        match raw.kind().lane() {
            Lane::Intervention => {
                if raw.priority.is_none() {
                    return Err(ValidationError::MissingPriority(raw.kind()));
                }
            }
            Lane::Context => {
                if raw.priority.is_some() {
                    tracing::debug!(
                        kind = ?raw.kind(),
                        source = %raw.source,
                        "Ignoring priority on context-lane signal"
                    );
                }
            }
        }

        Ok(ValidatedSignal(raw))
    }
}
