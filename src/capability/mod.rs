//! 能力层：注册表、分级期限执行器与内置能力

pub mod executor;
pub mod noop;
pub mod recall;
pub mod registry;
pub mod speak;

pub use executor::CapabilityExecutor;
pub use noop::NoopCapability;
pub use recall::{InMemoryStore, MemoryService, RecallCapability, RememberCapability};
pub use registry::{
    Capability, CapabilityContext, CapabilityRegistry, CapabilityReply, SignalEmitter,
};
pub use speak::{ConversationClient, MockConversationClient, SpeakCapability};
