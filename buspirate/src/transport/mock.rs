//! Scripted in-memory byte channel for tests.
//!
//! Each `write` call is recorded and releases the next queued reply into the
//! receive buffer, which is how the Bus Pirate behaves: every command byte
//! (or raw payload) produces a reply. An empty reply models a silent device.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::ByteChannel;
use crate::config::DEFAULT_READ_TIMEOUT;

#[derive(Default)]
struct MockState {
    replies: VecDeque<Vec<u8>>,
    rx: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    read_chunk: Option<usize>,
    read_timeout: Duration,
    fail_writes: bool,
    fail_reads: bool,
    input_resets: usize,
    output_resets: usize,
}

/// Cloneable handle; clones share state so a test can keep one handle while
/// the session owns another.
#[derive(Clone, Default)]
pub(crate) struct MockChannel {
    state: Arc<Mutex<MockState>>,
}

impl MockChannel {
    pub(crate) fn new() -> Self {
        let mock = Self::default();
        mock.state.lock().read_timeout = DEFAULT_READ_TIMEOUT;
        mock
    }

    /// Queue the reply to the next unanswered write.
    pub(crate) fn reply(&self, bytes: &[u8]) -> &Self {
        self.state.lock().replies.push_back(bytes.to_vec());
        self
    }

    /// Queue `count` success bytes, one per write.
    pub(crate) fn ok(&self, count: usize) -> &Self {
        for _ in 0..count {
            self.reply(&[0x01]);
        }
        self
    }

    /// Queue a write that gets no reply at all.
    pub(crate) fn silent(&self) -> &Self {
        self.reply(&[])
    }

    /// Place bytes in the receive buffer without a preceding write.
    pub(crate) fn preload(&self, bytes: &[u8]) {
        self.state.lock().rx.extend(bytes.iter().copied());
    }

    /// Limit how many bytes a single read may return.
    pub(crate) fn set_read_chunk(&self, chunk: usize) {
        self.state.lock().read_chunk = Some(chunk);
    }

    pub(crate) fn fail_writes(&self) {
        self.state.lock().fail_writes = true;
    }

    pub(crate) fn fail_reads(&self) {
        self.state.lock().fail_reads = true;
    }

    /// Every write call, in order.
    pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    /// All written bytes, flattened.
    pub(crate) fn written_bytes(&self) -> Vec<u8> {
        self.state.lock().written.concat()
    }

    pub(crate) fn pending_replies(&self) -> usize {
        self.state.lock().replies.len()
    }

    pub(crate) fn read_timeout(&self) -> Duration {
        self.state.lock().read_timeout
    }

    pub(crate) fn resets(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.input_resets, state.output_resets)
    }
}

#[async_trait]
impl ByteChannel for MockChannel {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        state.written.push(data.to_vec());
        if let Some(reply) = state.replies.pop_front() {
            state.rx.extend(reply);
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = {
            let mut state = self.state.lock();
            if state.fail_reads {
                return Err(io::Error::other("mock read failure"));
            }
            if !state.rx.is_empty() {
                let limit = state.read_chunk.unwrap_or(usize::MAX);
                let n = buf.len().min(limit).min(state.rx.len());
                for slot in buf.iter_mut().take(n) {
                    // n <= rx.len(), so pop_front always yields
                    *slot = state.rx.pop_front().unwrap_or_default();
                }
                return Ok(n);
            }
            state.read_timeout
        };

        // Nothing buffered: behave like a serial read timing out.
        tokio::time::sleep(timeout).await;
        Ok(0)
    }

    fn reset_input_buffer(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        state.rx.clear();
        state.input_resets += 1;
        Ok(())
    }

    fn reset_output_buffer(&mut self) -> io::Result<()> {
        self.state.lock().output_resets += 1;
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.state.lock().read_timeout = timeout;
        Ok(())
    }
}
