//! 双通道路由：类型 → 通道的确定性分发
//!
//! 只依据类型目录的静态分类选择队列；intervention 准入失败走死信路径并返回可计数错误。

use std::sync::Arc;

use crate::bus::error::EmitError;
use crate::bus::queue::{ContextQueue, DeadLetterBuffer, InterventionQueue};
use crate::bus::signal::{Lane, Priority, Signal};
use crate::config::BusSection;
use crate::metrics::Metrics;

/// 路由结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admitted {
    Context,
    Intervention,
}

/// 路由器：持有两条通道的队列与死信缓冲
pub struct Router {
    pub(crate) context: ContextQueue,
    pub(crate) intervention: InterventionQueue,
    dead_letter: DeadLetterBuffer,
}

impl Router {
    pub fn new(cfg: &BusSection, metrics: Arc<Metrics>) -> Self {
        Self {
            context: ContextQueue::new(cfg.context_capacity, Arc::clone(&metrics)),
            intervention: InterventionQueue::new(cfg.intervention_capacity, Arc::clone(&metrics)),
            dead_letter: DeadLetterBuffer::new(cfg.dead_letter_capacity, metrics),
        }
    }

    /// 分发富化后的信号到对应队列
    pub async fn route(&self, signal: Signal) -> Result<Admitted, EmitError> {
        match signal.lane() {
            Lane::Context => {
                self.context.push(signal);
                Ok(Admitted::Context)
            }
            Lane::Intervention => {
                let tier = signal.priority.unwrap_or(Priority::Low);
                match self.intervention.admit(signal).await {
                    Ok(()) => Ok(Admitted::Intervention),
                    Err(rejected) => {
                        tracing::warn!(
                            kind = ?rejected.kind(),
                            source = %rejected.source,
                            ?tier,
                            "Intervention admission timed out, routing to dead letter"
                        );
                        self.dead_letter.push(rejected);
                        Err(EmitError::AdmissionTimeout { tier })
                    }
                }
            }
        }
    }

    pub fn drain_dead_letters(&self) -> Vec<Signal> {
        self.dead_letter.drain()
    }

    pub fn dead_letter_len(&self) -> usize {
        self.dead_letter.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::enricher::Enricher;
    use crate::bus::signal::{RawSignal, SignalPayload};
    use crate::bus::validator::Validator;

    fn enriched(raw: RawSignal) -> Signal {
        Enricher::new().enrich(Validator::new().validate(raw).unwrap())
    }

    #[tokio::test]
    async fn test_route_is_determined_by_kind_only() {
        let metrics = Arc::new(Metrics::new());
        let router = Router::new(&BusSection::default(), metrics);

        let context = enriched(RawSignal::new(
            "vision",
            SignalPayload::VisualState {
                description: "x".into(),
                confidence: 0.5,
            },
        ));
        assert_eq!(router.route(context).await.unwrap(), Admitted::Context);
        assert_eq!(router.context.len(), 1);
        assert!(router.intervention.is_empty());

        let intervention = enriched(
            RawSignal::new(
                "vision",
                SignalPayload::GestureDetected {
                    gesture: "wave".into(),
                    confidence: 0.5,
                },
            )
            .with_priority(Priority::High),
        );
        assert_eq!(
            router.route(intervention).await.unwrap(),
            Admitted::Intervention
        );
        assert_eq!(router.context.len(), 1);
        assert_eq!(router.intervention.len(), 1);
    }

    #[tokio::test]
    async fn test_admission_timeout_goes_to_dead_letter() {
        let metrics = Arc::new(Metrics::new());
        let cfg = BusSection {
            intervention_capacity: 1,
            ..BusSection::default()
        };
        let router = Router::new(&cfg, Arc::clone(&metrics));

        let make = |source: &str| {
            enriched(
                RawSignal::new(
                    source,
                    SignalPayload::SafetyAlert {
                        description: "smoke".into(),
                    },
                )
                .with_priority(Priority::Critical),
            )
        };

        router.route(make("a")).await.unwrap();
        let err = router.route(make("b")).await.unwrap_err();
        assert!(matches!(
            err,
            EmitError::AdmissionTimeout {
                tier: Priority::Critical
            }
        ));
        assert_eq!(router.dead_letter_len(), 1);
        assert_eq!(metrics.snapshot().dead_lettered, 1);
        assert_eq!(router.drain_dead_letters()[0].source, "b");
    }
}
