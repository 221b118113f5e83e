//! Fixed-capacity write buffer in front of a storage sink.
//!
//! Small network chunks are coalesced into `capacity`-sized writes. The
//! buffer is flushed when it fills, on [`UploadBuffer::flush`], on
//! [`UploadBuffer::finish`] and on drop, so accepted bytes always reach the
//! sink.

use std::io::{self, Write};

pub const DEFAULT_CAPACITY: usize = 8192;

pub struct UploadBuffer<W: Write> {
    buf: Vec<u8>,
    capacity: usize,
    /// `None` only after `finish` has handed the sink back.
    sink: Option<W>,
    degraded: bool,
}

impl<W: Write> UploadBuffer<W> {
    /// Wrap `sink`. If the buffer cannot be allocated the result is in
    /// degraded mode: every write is refused.
    pub fn new(sink: W, capacity: usize) -> Self {
        let mut buf = Vec::new();
        let degraded = capacity == 0 || buf.try_reserve_exact(capacity).is_err();
        if degraded {
            tracing::warn!(capacity, "upload buffer allocation failed, refusing writes");
        }
        Self {
            buf,
            capacity,
            sink: Some(sink),
            degraded,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Bytes held but not yet written to the sink.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn sink(&self) -> Option<&W> {
        self.sink.as_ref()
    }

    /// Copy `data` in, writing full buffers through to the sink.
    ///
    /// Returns the number of bytes taken. A short count means the sink
    /// failed (or the buffer is degraded) and the upload cannot continue.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if self.degraded {
            return 0;
        }
        let mut taken = 0;
        while taken < data.len() {
            let room = self.capacity - self.buf.len();
            let n = room.min(data.len() - taken);
            self.buf.extend_from_slice(&data[taken..taken + n]);
            taken += n;
            if self.buf.len() == self.capacity {
                if let Err(e) = self.drain() {
                    tracing::warn!(error = %e, "upload sink write failed");
                    return taken - n;
                }
            }
        }
        taken
    }

    /// Write out anything buffered and flush the sink.
    pub fn flush(&mut self) -> io::Result<()> {
        self.drain()?;
        match self.sink.as_mut() {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }

    /// Flush and return the sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.flush()?;
        self.sink
            .take()
            .ok_or_else(|| io::Error::other("upload sink already taken"))
    }

    fn drain(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        sink.write_all(&self.buf)?;
        self.buf.clear();
        Ok(())
    }
}

impl<W: Write> Drop for UploadBuffer<W> {
    fn drop(&mut self) {
        if self.sink.is_some() {
            if let Err(e) = self.flush() {
                tracing::warn!(error = %e, "upload buffer flush on drop failed");
            }
        }
    }
}
