//! 信号总线：校验 → 富化 → 双通道路由 → 有界队列与订阅分发

pub mod enricher;
pub mod error;
pub mod hub;
pub mod queue;
pub mod router;
pub mod signal;
pub mod validator;

pub use enricher::Enricher;
pub use error::{EmitError, ValidationError};
pub use hub::{ContextSubscription, SignalBus};
pub use router::Admitted;
pub use signal::{Lane, Priority, RawSignal, Signal, SignalKind, SignalMetadata, SignalPayload};
pub use validator::{ValidatedSignal, Validator};
