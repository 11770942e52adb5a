//! 有界队列：context FIFO、intervention 优先级堆与死信缓冲
//!
//! context 队列溢出时淘汰最旧（咨询性数据可容忍丢失）；intervention 队列满时准入方
//! 最多等待该层级的准入超时，仍满则交还调用方进死信——绝不无声丢弃。
//! 两个队列都支持并发入队；出队各自只有一个消费者。

use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::bus::signal::{Priority, Signal};
use crate::metrics::Metrics;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 入队的 intervention 信号：按（层级降序，到达序升序）出队
///
/// 同层级跨来源的平局用队列本地的到达序号裁决（各来源的 sequence 互不可比）；
/// 单一来源内到达序与 sequence 同序，二者一致。
#[derive(Debug)]
struct QueuedIntervention {
    signal: Signal,
    rank: u8,
    arrival: u64,
    expires_at: Instant,
}

impl PartialEq for QueuedIntervention {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank && self.arrival == other.arrival
    }
}

impl Eq for QueuedIntervention {}

impl PartialOrd for QueuedIntervention {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedIntervention {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap 取最大：层级高者优先，同层级到达早（arrival 小）者优先
        self.rank
            .cmp(&other.rank)
            .then(other.arrival.cmp(&self.arrival))
    }
}

/// context 通道的有界 FIFO；溢出淘汰最旧并计数
pub struct ContextQueue {
    items: Mutex<VecDeque<Signal>>,
    capacity: usize,
    arrived: Notify,
    metrics: Arc<Metrics>,
}

impl ContextQueue {
    pub fn new(capacity: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            arrived: Notify::new(),
            metrics,
        }
    }

    /// 入队；满则先淘汰最旧一条（drop-oldest）
    pub fn push(&self, signal: Signal) {
        {
            let mut items = lock(&self.items);
            if items.len() >= self.capacity {
                items.pop_front();
                Metrics::incr(&self.metrics.context_evicted);
            }
            items.push_back(signal);
        }
        Metrics::incr(&self.metrics.context_admitted);
        self.arrived.notify_one();
    }

    /// 单消费者出队；队列空则等待，关闭时返回 None
    pub async fn recv(&self, shutdown: &CancellationToken) -> Option<Signal> {
        loop {
            let arrived = self.arrived.notified();
            if let Some(signal) = lock(&self.items).pop_front() {
                return Some(signal);
            }
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = arrived => {}
            }
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// intervention 通道的有界优先级队列
pub struct InterventionQueue {
    heap: Mutex<BinaryHeap<QueuedIntervention>>,
    capacity: usize,
    next_arrival: AtomicU64,
    /// 出队释放容量时唤醒准入等待方
    space: Notify,
    /// 入队时唤醒消费方
    arrived: Notify,
    metrics: Arc<Metrics>,
}

impl InterventionQueue {
    pub fn new(capacity: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::with_capacity(capacity)),
            capacity: capacity.max(1),
            next_arrival: AtomicU64::new(0),
            space: Notify::new(),
            arrived: Notify::new(),
            metrics,
        }
    }

    /// 准入：满则等待至该层级的准入超时；仍满则把信号交还调用方（死信路径）。
    /// 入队成功的信号带上 `enqueue + 层级超时` 的过期时刻。
    pub async fn admit(&self, signal: Signal) -> Result<(), Signal> {
        // 校验器已保证 intervention 信号必带优先级
        let tier = signal.priority.unwrap_or(Priority::Low);
        let deadline = tokio::time::Instant::now() + tier.admission_timeout();

        loop {
            let space = self.space.notified();
            {
                let mut heap = lock(&self.heap);
                if heap.len() < self.capacity {
                    heap.push(QueuedIntervention {
                        rank: tier.rank(),
                        arrival: self.next_arrival.fetch_add(1, Ordering::Relaxed),
                        expires_at: Instant::now() + tier.admission_timeout(),
                        signal,
                    });
                    drop(heap);
                    Metrics::incr(&self.metrics.intervention_admitted);
                    self.arrived.notify_one();
                    return Ok(());
                }
            }
            match tokio::time::timeout_at(deadline, space).await {
                Ok(()) => continue,
                Err(_) => return Err(signal),
            }
        }
    }

    /// 非阻塞出队；过期条目在被服务的时刻丢弃并计数。
    /// `only_preemptive` 为真时只服务 high / critical，低层级留在队列中。
    pub fn try_pop(&self, only_preemptive: bool) -> Option<Signal> {
        let now = Instant::now();
        let mut heap = lock(&self.heap);
        loop {
            let top_expired = match heap.peek() {
                None => return None,
                Some(top) => top.expires_at <= now,
            };
            if top_expired {
                if let Some(expired) = heap.pop() {
                    tracing::debug!(
                        kind = ?expired.signal.kind(),
                        source = %expired.signal.source,
                        "Discarding expired intervention signal"
                    );
                    Metrics::incr(&self.metrics.intervention_expired);
                    self.space.notify_one();
                }
                continue;
            }
            if only_preemptive {
                // 堆序以层级为主序：堆顶都不可抢占则队内没有可抢占的
                let preemptive = heap
                    .peek()
                    .and_then(|top| top.signal.priority)
                    .map(|p| p.is_preemptive())
                    .unwrap_or(false);
                if !preemptive {
                    return None;
                }
            }
            let entry = heap.pop()?;
            self.space.notify_one();
            return Some(entry.signal);
        }
    }

    /// 阻塞消费；关闭时返回 None
    pub async fn consume(
        &self,
        only_preemptive: bool,
        shutdown: &CancellationToken,
    ) -> Option<Signal> {
        loop {
            let arrived = self.arrived.notified();
            if let Some(signal) = self.try_pop(only_preemptive) {
                return Some(signal);
            }
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = arrived => {}
            }
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.heap).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 有界死信缓冲：准入超时的 intervention 信号落在这里，可由宿主 drain 排查
pub struct DeadLetterBuffer {
    items: Mutex<VecDeque<Signal>>,
    capacity: usize,
    metrics: Arc<Metrics>,
}

impl DeadLetterBuffer {
    pub fn new(capacity: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            metrics,
        }
    }

    pub fn push(&self, signal: Signal) {
        let mut items = lock(&self.items);
        if items.len() >= self.capacity {
            items.pop_front();
            Metrics::incr(&self.metrics.dead_letter_evicted);
        }
        items.push_back(signal);
        Metrics::incr(&self.metrics.dead_lettered);
    }

    pub fn drain(&self) -> Vec<Signal> {
        lock(&self.items).drain(..).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::enricher::Enricher;
    use crate::bus::signal::{RawSignal, SignalPayload};
    use crate::bus::validator::Validator;

    fn intervention(source: &str, tier: Priority, enricher: &Enricher) -> Signal {
        let raw = RawSignal::new(
            source,
            SignalPayload::GestureDetected {
                gesture: "wave".into(),
                confidence: 0.9,
            },
        )
        .with_priority(tier);
        enricher.enrich(Validator::new().validate(raw).unwrap())
    }

    fn context_signal(source: &str, summary: &str, enricher: &Enricher) -> Signal {
        let raw = RawSignal::new(
            source,
            SignalPayload::SceneChange {
                summary: summary.into(),
            },
        );
        enricher.enrich(Validator::new().validate(raw).unwrap())
    }

    #[tokio::test]
    async fn test_intervention_order_tier_desc_then_arrival_asc() {
        let metrics = Arc::new(Metrics::new());
        let queue = InterventionQueue::new(16, metrics);
        let enricher = Enricher::new();

        queue
            .admit(intervention("a", Priority::Low, &enricher))
            .await
            .unwrap();
        queue
            .admit(intervention("b", Priority::High, &enricher))
            .await
            .unwrap();
        queue
            .admit(intervention("a", Priority::Critical, &enricher))
            .await
            .unwrap();
        queue
            .admit(intervention("c", Priority::High, &enricher))
            .await
            .unwrap();

        let order: Vec<(Priority, String)> = std::iter::from_fn(|| {
            queue
                .try_pop(false)
                .map(|s| (s.priority.unwrap(), s.source))
        })
        .collect();

        assert_eq!(
            order,
            vec![
                (Priority::Critical, "a".to_string()),
                (Priority::High, "b".to_string()),
                (Priority::High, "c".to_string()),
                (Priority::Low, "a".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_preemptive_pop_leaves_low_tiers_queued() {
        let metrics = Arc::new(Metrics::new());
        let queue = InterventionQueue::new(16, metrics);
        let enricher = Enricher::new();

        queue
            .admit(intervention("a", Priority::Low, &enricher))
            .await
            .unwrap();
        queue
            .admit(intervention("a", Priority::Medium, &enricher))
            .await
            .unwrap();
        assert!(queue.try_pop(true).is_none());
        assert_eq!(queue.len(), 2);

        queue
            .admit(intervention("a", Priority::Critical, &enricher))
            .await
            .unwrap();
        let popped = queue.try_pop(true).unwrap();
        assert_eq!(popped.priority, Some(Priority::Critical));
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_expired_signal_discarded_at_dequeue() {
        let metrics = Arc::new(Metrics::new());
        let queue = InterventionQueue::new(16, Arc::clone(&metrics));
        let enricher = Enricher::new();

        // critical 的存活时间是 500ms
        queue
            .admit(intervention("a", Priority::Critical, &enricher))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(600)).await;

        assert!(queue.try_pop(false).is_none());
        assert_eq!(metrics.snapshot().intervention_expired, 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_admission_times_out_when_full() {
        let metrics = Arc::new(Metrics::new());
        let queue = InterventionQueue::new(1, metrics);
        let enricher = Enricher::new();

        queue
            .admit(intervention("a", Priority::Critical, &enricher))
            .await
            .unwrap();

        // critical 的准入超时是 500ms；队列一直满，应返回原信号
        let start = std::time::Instant::now();
        let rejected = queue
            .admit(intervention("b", Priority::Critical, &enricher))
            .await;
        assert!(rejected.is_err());
        assert!(start.elapsed() >= std::time::Duration::from_millis(450));
        assert_eq!(rejected.unwrap_err().source, "b");
    }

    #[tokio::test]
    async fn test_admission_proceeds_when_space_frees_up() {
        let metrics = Arc::new(Metrics::new());
        let queue = Arc::new(InterventionQueue::new(1, metrics));
        let enricher = Enricher::new();

        queue
            .admit(intervention("a", Priority::Low, &enricher))
            .await
            .unwrap();

        let waiter = {
            let queue = Arc::clone(&queue);
            let signal = intervention("b", Priority::Low, &enricher);
            tokio::spawn(async move { queue.admit(signal).await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(queue.try_pop(false).is_some());

        waiter.await.unwrap().unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_context_queue_drops_oldest_on_overflow() {
        let metrics = Arc::new(Metrics::new());
        let queue = ContextQueue::new(3, Arc::clone(&metrics));
        let enricher = Enricher::new();

        for i in 0..5 {
            queue.push(context_signal("a", &format!("scene-{i}"), &enricher));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(metrics.snapshot().context_evicted, 2);

        // 留下的是最新的三条
        let shutdown = CancellationToken::new();
        let first = queue.recv(&shutdown).await.unwrap();
        assert!(matches!(
            first.payload,
            SignalPayload::SceneChange { ref summary } if summary == "scene-2"
        ));
    }

    #[tokio::test]
    async fn test_context_recv_returns_none_on_shutdown() {
        let metrics = Arc::new(Metrics::new());
        let queue = Arc::new(ContextQueue::new(4, metrics));
        let shutdown = CancellationToken::new();

        let recv = {
            let queue = Arc::clone(&queue);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { queue.recv(&shutdown).await })
        };

        shutdown.cancel();
        assert!(recv.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dead_letter_buffer_is_bounded() {
        let metrics = Arc::new(Metrics::new());
        let buffer = DeadLetterBuffer::new(2, Arc::clone(&metrics));
        let enricher = Enricher::new();

        for _ in 0..3 {
            buffer.push(intervention("a", Priority::Low, &enricher));
        }

        assert_eq!(buffer.len(), 2);
        let snap = metrics.snapshot();
        assert_eq!(snap.dead_lettered, 3);
        assert_eq!(snap.dead_letter_evicted, 1);
        assert_eq!(buffer.drain().len(), 2);
        assert!(buffer.is_empty());
    }
}
