//! Record-stream protocol output
//!
//! Messages are written as JSON lines: one SCHEMA per stream at startup,
//! one RECORD per row, and a STATE after every committed window. The
//! downstream consumer trusts message order, so writers must preserve it.

pub mod jsonl;
pub mod message;

pub use jsonl::{JsonLinesWriter, MemoryWriter};
pub use message::Message;

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    FlushError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Sink for protocol messages
pub trait MessageWriter: Send {
    /// Write one message
    fn write_message(&mut self, message: &Message) -> OutputResult<()>;

    /// Flush buffered messages so the consumer has received them
    fn flush(&mut self) -> OutputResult<()>;
}

impl<W: MessageWriter + ?Sized> MessageWriter for Box<W> {
    fn write_message(&mut self, message: &Message) -> OutputResult<()> {
        (**self).write_message(message)
    }

    fn flush(&mut self) -> OutputResult<()> {
        (**self).flush()
    }
}
