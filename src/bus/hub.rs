//! 信号总线入口：emit → 校验 → 富化 → 路由，以及两类消费口
//!
//! context 通道由单个分发任务出队后广播给所有订阅者（可按类型过滤）；
//! intervention 通道只有编排器这一个特权消费者。

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::enricher::Enricher;
use crate::bus::error::EmitError;
use crate::bus::router::{Admitted, Router};
use crate::bus::signal::{RawSignal, Signal, SignalKind};
use crate::bus::validator::Validator;
use crate::config::BusSection;
use crate::metrics::Metrics;

/// 信号总线（Arc 共享；产出方并发 emit 安全）
pub struct SignalBus {
    validator: Validator,
    enricher: Enricher,
    router: Router,
    context_tx: broadcast::Sender<Signal>,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
}

impl SignalBus {
    pub fn new(cfg: &BusSection, metrics: Arc<Metrics>) -> Arc<Self> {
        let (context_tx, _) = broadcast::channel(cfg.context_capacity.max(16));
        Arc::new(Self {
            validator: Validator::new(),
            enricher: Enricher::new(),
            router: Router::new(cfg, Arc::clone(&metrics)),
            context_tx,
            metrics,
            shutdown: CancellationToken::new(),
        })
    }

    /// 产出方入口：校验失败即拒绝（计数并记日志），通过则富化并路由。
    /// intervention 通道满时最多阻塞到该层级的准入超时。
    pub async fn emit(&self, raw: RawSignal) -> Result<Admitted, EmitError> {
        if self.shutdown.is_cancelled() {
            return Err(EmitError::ShuttingDown);
        }

        let validated = match self.validator.validate(raw) {
            Ok(v) => v,
            Err(e) => {
                Metrics::incr(&self.metrics.validation_rejected);
                tracing::warn!(error = %e, "Rejected malformed signal");
                return Err(EmitError::Rejected(e));
            }
        };

        let signal = self.enricher.enrich(validated);
        self.router.route(signal).await
    }

    /// 线缆形态入口：先解析 JSON 再走 emit
    pub async fn emit_wire(&self, value: &serde_json::Value) -> Result<Admitted, EmitError> {
        let raw = RawSignal::from_wire(value).map_err(|e| {
            Metrics::incr(&self.metrics.validation_rejected);
            tracing::warn!(error = %e, "Rejected malformed wire signal");
            EmitError::Rejected(e)
        })?;
        self.emit(raw).await
    }

    /// 订阅 context 通道；`kinds` 为 None 时收全部，否则只收列表内类型
    pub fn subscribe_context(&self, kinds: Option<Vec<SignalKind>>) -> ContextSubscription {
        ContextSubscription {
            rx: self.context_tx.subscribe(),
            filter: kinds.map(|k| k.into_iter().collect()),
        }
    }

    /// 特权消费口（编排器专用）：按（层级降序，到达序升序）取下一条 intervention 信号；
    /// 关闭时返回 None
    pub async fn consume_intervention(&self) -> Option<Signal> {
        self.router.intervention.consume(false, &self.shutdown).await
    }

    /// 只服务可抢占层级（high / critical），低层级留在队列中
    pub(crate) async fn consume_preemptive(&self) -> Option<Signal> {
        self.router.intervention.consume(true, &self.shutdown).await
    }

    /// 启动 context 通道的分发任务（单一淘汰出队者 → 广播）
    pub fn spawn_dispatcher(self: &Arc<Self>) -> JoinHandle<()> {
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(signal) = bus.router.context.recv(&bus.shutdown).await {
                // 无订阅者时 send 返回 Err，属正常情况
                let _ = bus.context_tx.send(signal);
            }
            tracing::debug!("Context dispatcher stopped");
        })
    }

    /// 取走死信缓冲中的信号（运维排查用）
    pub fn drain_dead_letters(&self) -> Vec<Signal> {
        self.router.drain_dead_letters()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// context 订阅：广播接收端 + 可选类型过滤
pub struct ContextSubscription {
    rx: broadcast::Receiver<Signal>,
    filter: Option<HashSet<SignalKind>>,
}

impl ContextSubscription {
    /// 下一条匹配过滤条件的信号；慢消费者落后时丢弃积压并继续，通道关闭返回 None
    pub async fn recv(&mut self) -> Option<Signal> {
        loop {
            match self.rx.recv().await {
                Ok(signal) => {
                    if let Some(filter) = &self.filter {
                        if !filter.contains(&signal.kind()) {
                            continue;
                        }
                    }
                    return Some(signal);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(dropped = n, "Context subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
