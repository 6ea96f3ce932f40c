// Output capture for supervised processes.
//
// Each pipe gets a reader thread that copies bytes into a shared pending
// buffer as soon as they arrive, so the child never stalls on a full pipe
// and a poll only has to move whatever is already buffered.

use std::io::{ErrorKind, Read};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

const READ_CHUNK: usize = 8 * 1024;

pub(crate) struct OutputCapture {
    pending: Mutex<Vec<u8>>,
    open_streams: Mutex<usize>,
    all_closed: Condvar,
}

impl OutputCapture {
    pub(crate) fn new(streams: usize) -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(Vec::new()),
            open_streams: Mutex::new(streams),
            all_closed: Condvar::new(),
        })
    }

    fn push(&self, bytes: &[u8]) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(bytes);
    }

    /// Move out everything buffered since the previous call.
    pub(crate) fn take_pending(&self) -> Vec<u8> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn stream_closed(&self) {
        let mut open = self.open_streams.lock().unwrap_or_else(PoisonError::into_inner);
        *open = open.saturating_sub(1);
        if *open == 0 {
            self.all_closed.notify_all();
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.open_streams.lock().unwrap_or_else(PoisonError::into_inner) == 0
    }

    /// Wait up to `timeout` for every reader to reach end of stream.
    /// Returns `true` if all streams are closed.
    pub(crate) fn wait_closed(&self, timeout: Duration) -> bool {
        let open = self.open_streams.lock().unwrap_or_else(PoisonError::into_inner);
        let (open, _) = self
            .all_closed
            .wait_timeout_while(open, timeout, |open| *open > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *open == 0
    }
}

/// Copy `reader` into `capture` until end of stream on a detached thread.
pub(crate) fn spawn_reader<R: Read + Send + 'static>(
    name: String,
    mut reader: R,
    capture: Arc<OutputCapture>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new().name(name).spawn(move || {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => capture.push(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        capture.stream_closed();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reader_copies_everything_then_closes() {
        let capture = OutputCapture::new(1);
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();

        let handle = spawn_reader("test-reader".into(), Cursor::new(data.clone()), capture.clone()).unwrap();
        handle.join().unwrap();

        assert!(capture.wait_closed(Duration::from_millis(10)));
        assert_eq!(capture.take_pending(), data);
        assert!(capture.take_pending().is_empty());
    }

    #[test]
    fn test_wait_closed_times_out_with_open_streams() {
        let capture = OutputCapture::new(2);
        capture.stream_closed();
        assert!(!capture.wait_closed(Duration::from_millis(20)));
        capture.stream_closed();
        assert!(capture.wait_closed(Duration::from_millis(20)));
        assert!(capture.is_closed());
    }
}
