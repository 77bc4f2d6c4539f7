//! JSON-lines message writer

use super::{Message, MessageWriter, OutputError, OutputResult};
use std::io::{BufWriter, Write};
use tracing::debug;

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// Writes one JSON object per line to any [`Write`] sink (usually stdout)
pub struct JsonLinesWriter<W: Write> {
    writer: BufWriter<W>,
    messages_written: u64,
}

impl<W: Write> JsonLinesWriter<W> {
    /// Create a writer with the default buffer size
    pub fn new(inner: W) -> Self {
        Self::with_buffer_size(inner, DEFAULT_BUFFER_SIZE)
    }

    /// Create a writer with a custom buffer size
    pub fn with_buffer_size(inner: W, buffer_size: usize) -> Self {
        Self {
            writer: BufWriter::with_capacity(buffer_size, inner),
            messages_written: 0,
        }
    }

    /// Number of messages written so far
    pub fn messages_written(&self) -> u64 {
        self.messages_written
    }

    /// Flush and return the inner sink
    pub fn into_inner(self) -> OutputResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| OutputError::FlushError(e.error().to_string()))
    }
}

impl<W: Write + Send> MessageWriter for JsonLinesWriter<W> {
    fn write_message(&mut self, message: &Message) -> OutputResult<()> {
        serde_json::to_writer(&mut self.writer, message)
            .map_err(|e| OutputError::SerializationError(e.to_string()))?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| OutputError::IoError(e.to_string()))?;
        self.messages_written += 1;
        Ok(())
    }

    fn flush(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(e.to_string()))?;
        debug!(messages = self.messages_written, "Flushed output");
        Ok(())
    }
}

/// Collects messages in memory; for tests and dry runs
#[derive(Debug, Default, Clone)]
pub struct MemoryWriter {
    messages: Vec<Message>,
    flushed: usize,
}

impl MemoryWriter {
    /// Empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message written, flushed or not
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages covered by the last flush
    pub fn flushed(&self) -> &[Message] {
        &self.messages[..self.flushed]
    }
}

impl MessageWriter for MemoryWriter {
    fn write_message(&mut self, message: &Message) -> OutputResult<()> {
        self.messages.push(message.clone());
        Ok(())
    }

    fn flush(&mut self) -> OutputResult<()> {
        self.flushed = self.messages.len();
        Ok(())
    }
}
