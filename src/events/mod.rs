pub mod handlers;
pub mod processor;
pub mod types;

pub use processor::{BatchOutcome, EventProcessor, ProcessorError};
pub use types::{ChainEvent, EventPayload};
