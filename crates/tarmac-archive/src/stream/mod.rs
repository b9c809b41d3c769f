//! Bridging the async tarball download into a blocking `Read`.
//!
//! The tar scan is inherently sequential and runs on a blocking thread;
//! this adapter pulls downloaded chunks out of a bounded channel fed by
//! the async side. Dropping the reader drops the receiver, which aborts
//! the transfer when the scan stops early.

use std::io::{self, Read};

use bytes::{Buf, Bytes};
use tokio::sync::mpsc::Receiver;

/// Download chunks as they arrive from the transfer task
pub type ChunkResult = Result<Bytes, reqwest::Error>;

/// Blocking `Read` over a channel of downloaded byte chunks
pub struct ChunkReader {
    receiver: Receiver<ChunkResult>,
    current: Bytes,
}

impl ChunkReader {
    pub fn new(receiver: Receiver<ChunkResult>) -> Self {
        Self {
            receiver,
            current: Bytes::new(),
        }
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.current.is_empty() {
            match self.receiver.blocking_recv() {
                Some(Ok(chunk)) => self.current = chunk,
                Some(Err(error)) => {
                    return Err(io::Error::new(io::ErrorKind::Other, error));
                }
                // Sender dropped: transfer complete
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        Ok(n)
    }
}
