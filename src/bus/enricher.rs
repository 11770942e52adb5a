//! 信号富化：时间戳与来源内单调序号
//!
//! 每个来源一个计数器，从 1 开始，进程生命周期内不复用（来源重连也继续递增）；
//! 计数器更新加锁保证并发安全。correlation_id 保持产出方给定值。

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::bus::signal::{Signal, SignalMetadata};
use crate::bus::validator::ValidatedSignal;

/// 富化器：持有按来源的序号表
#[derive(Debug, Default)]
pub struct Enricher {
    sequences: Mutex<HashMap<String, u64>>,
}

impl Enricher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 盖章：timestamp = 当前时间，sequence = 该来源的下一个序号
    pub fn enrich(&self, validated: ValidatedSignal) -> Signal {
        let raw = validated.0;
        let sequence = self.next_sequence(&raw.source);
        Signal {
            metadata: SignalMetadata {
                timestamp: Utc::now(),
                sequence,
                correlation_id: raw.correlation_id,
            },
            source: raw.source,
            payload: raw.payload,
            priority: raw.priority,
        }
    }

    fn next_sequence(&self, source: &str) -> u64 {
        let mut sequences = self
            .sequences
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let counter = sequences.entry(source.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }
}
