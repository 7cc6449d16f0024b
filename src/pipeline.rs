//! Ordered output buffer that lets per-scalar `action` calls run concurrently
//! while still splicing their results back in document order.
//!
//! Mirrors the original tool's goroutine-per-literal design: each
//! transformable scalar is dispatched to its own thread, and a `Promise`
//! placeholder reserves its spot in the output so that joining out of order
//! never reorders bytes.

use std::thread::JoinHandle;

use crate::error::Result;

enum Segment {
    Verbatim(Vec<u8>),
    Promise(JoinHandle<Result<Vec<u8>>>),
}

/// Accumulates verbatim byte runs and in-flight scalar transforms, then
/// flushes them to a single buffer in the order they were appended.
#[derive(Default)]
pub struct Pipeline {
    segments: Vec<Segment>,
    pending: Vec<u8>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_byte(&mut self, byte: u8) {
        self.pending.push(byte);
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Reserve a spot in the output for a job running on another thread.
    pub fn append_job(&mut self, handle: JoinHandle<Result<Vec<u8>>>) {
        self.flush_pending();
        self.segments.push(Segment::Promise(handle));
    }

    fn flush_pending(&mut self) {
        if !self.pending.is_empty() {
            self.segments
                .push(Segment::Verbatim(std::mem::take(&mut self.pending)));
        }
    }

    /// Join every in-flight job in document order and concatenate the
    /// result. The first job to fail aborts the whole flush.
    pub fn flush(mut self) -> Result<Vec<u8>> {
        self.flush_pending();
        let mut out = Vec::new();
        for segment in self.segments {
            match segment {
                Segment::Verbatim(bytes) => out.extend_from_slice(&bytes),
                Segment::Promise(handle) => {
                    let bytes = handle
                        .join()
                        .unwrap_or_else(|_| {
                            Err(crate::error::EcfgError::DocumentMalformed(
                                "scalar transform thread panicked".into(),
                            ))
                        })?;
                    out.extend_from_slice(&bytes);
                }
            }
        }
        Ok(out)
    }
}
