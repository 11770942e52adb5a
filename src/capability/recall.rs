//! 记忆能力
//!
//! MemoryService trait 是外部持久化服务的窄接口；核心不规定存储格式，
//! 默认提供进程内实现。remember 写入一条笔记，recall 按关键字取回。

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::capability::registry::{Capability, CapabilityContext, CapabilityReply};

/// 外部记忆服务的窄接口
#[async_trait]
pub trait MemoryService: Send + Sync {
    async fn store(&self, note: &str) -> Result<(), String>;
    async fn retrieve(&self, query: &str) -> Result<Vec<String>, String>;
}

/// 进程内记忆实现，供测试与离线运行
#[derive(Default)]
pub struct InMemoryStore {
    notes: Mutex<Vec<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.notes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MemoryService for InMemoryStore {
    async fn store(&self, note: &str) -> Result<(), String> {
        self.lock().push(note.to_string());
        Ok(())
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<String>, String> {
        let needle = query.to_lowercase();
        Ok(self
            .lock()
            .iter()
            .filter(|note| note.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }
}

/// 写入记忆
pub struct RememberCapability {
    memory: Arc<dyn MemoryService>,
}

impl RememberCapability {
    pub fn new(memory: Arc<dyn MemoryService>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Capability for RememberCapability {
    fn name(&self) -> &str {
        "remember"
    }

    fn description(&self) -> &str {
        "Store a note in the memory service"
    }

    async fn execute(
        &self,
        input: Value,
        _ctx: CapabilityContext,
    ) -> Result<CapabilityReply, String> {
        let note = input
            .get("note")
            .and_then(Value::as_str)
            .ok_or_else(|| "remember requires a string 'note' field".to_string())?;
        self.memory.store(note).await?;
        Ok(CapabilityReply::Done(Value::String("stored".to_string())))
    }
}

/// 检索记忆
pub struct RecallCapability {
    memory: Arc<dyn MemoryService>,
}

impl RecallCapability {
    pub fn new(memory: Arc<dyn MemoryService>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Capability for RecallCapability {
    fn name(&self) -> &str {
        "recall"
    }

    fn description(&self) -> &str {
        "Retrieve notes matching a query from the memory service"
    }

    async fn execute(
        &self,
        input: Value,
        _ctx: CapabilityContext,
    ) -> Result<CapabilityReply, String> {
        let query = input
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| "recall requires a string 'query' field".to_string())?;
        let notes = self.memory.retrieve(query).await?;
        Ok(CapabilityReply::Done(serde_json::json!({ "notes": notes })))
    }
}
