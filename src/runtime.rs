//! 运行时装配
//!
//! 把总线、分发任务、默认能力与编排器接成一个可运行的协调核心。
//! 宿主拿到 IrisRuntime 后通过 bus() 注入信号、通过 orchestrator 句柄观察
//! 状态与下发命令；stop() 先关总线再等循环退出。

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::bus::SignalBus;
use crate::capability::{
    InMemoryStore, MemoryService, MockConversationClient, NoopCapability, RecallCapability,
    RememberCapability, SpeakCapability,
};
use crate::config::AppConfig;
use crate::core::{OrchestratorBuilder, OrchestratorHandle};
use crate::metrics::Metrics;

pub struct IrisRuntime {
    bus: Arc<SignalBus>,
    metrics: Arc<Metrics>,
    orchestrator: OrchestratorHandle,
    dispatcher: JoinHandle<()>,
}

impl IrisRuntime {
    /// 用默认能力集启动：observe / speak（Mock 对话模型）/ remember / recall（进程内记忆）
    pub fn start(config: AppConfig) -> anyhow::Result<Self> {
        let metrics = Arc::new(Metrics::new());
        let bus = SignalBus::new(&config.bus, Arc::clone(&metrics));
        let dispatcher = bus.spawn_dispatcher();

        let memory: Arc<dyn MemoryService> = Arc::new(InMemoryStore::new());
        let orchestrator = OrchestratorBuilder::new(Arc::clone(&bus), config, Arc::clone(&metrics))
            .register_capability(NoopCapability)
            .register_capability(SpeakCapability::new(MockConversationClient::new()))
            .register_capability(RememberCapability::new(Arc::clone(&memory)))
            .register_capability(RecallCapability::new(memory))
            .spawn();

        Ok(Self {
            bus,
            metrics,
            orchestrator,
            dispatcher,
        })
    }

    pub fn bus(&self) -> &Arc<SignalBus> {
        &self.bus
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn orchestrator(&mut self) -> &mut OrchestratorHandle {
        &mut self.orchestrator
    }

    /// 优雅停机：总线拒绝新信号并唤醒消费者，随后等控制循环与分发任务退出
    pub async fn stop(self) {
        self.bus.shutdown();
        self.orchestrator.stop().await;
        let _ = self.dispatcher.await;
        tracing::info!("Runtime stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Priority, RawSignal, SignalPayload};
    use crate::core::OrchestratorState;
    use std::time::Duration;

    #[tokio::test]
    async fn test_runtime_starts_processes_and_stops() {
        let mut runtime = IrisRuntime::start(AppConfig::default()).unwrap();
        runtime
            .orchestrator()
            .wait_for(OrchestratorState::Idle)
            .await;

        runtime
            .bus()
            .emit(
                RawSignal::new(
                    "audio",
                    SignalPayload::UserAddressed {
                        text: "hello".into(),
                    },
                )
                .with_priority(Priority::Medium),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(runtime.orchestrator().state(), OrchestratorState::Idle);
        assert!(runtime.metrics().snapshot().capability_success >= 1);
        runtime.stop().await;
    }
}
