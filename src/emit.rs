//! Event output: one JSON payload per new feed item.

use std::io::Write;

use thiserror::Error;

use crate::bsky::FeedItem;

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("event receiver has gone away")]
    Closed,

    #[error("failed to write event: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Receives each new item in the order the diff produced it.
///
/// An error aborts the cycle; items already emitted stay emitted.
pub trait EventEmitter {
    fn emit(&mut self, item: &FeedItem) -> Result<(), EmitError>;
}

/// Writes each payload as a single line of JSON and flushes.
pub struct JsonLinesEmitter<W> {
    out: W,
}

impl<W: Write> JsonLinesEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> EventEmitter for JsonLinesEmitter<W> {
    fn emit(&mut self, item: &FeedItem) -> Result<(), EmitError> {
        serde_json::to_writer(&mut self.out, item.payload())?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}
