//! Capped capture of child stdout/stderr
//!
//! Both streams share one byte budget. The chunk that crosses the cap is cut at
//! the cap, a marker is appended to that stream, and waiters on
//! [`OutputCapture::overflowed`] are woken so the process can be killed.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Notify;
use tracing::trace;

/// Appended to the stream that overflowed
pub const TRUNCATION_MARKER: &str = "\n[output truncated]\n";

const READ_CHUNK: usize = 8 * 1024;

/// Which stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

#[derive(Debug, Default)]
struct Buffers {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    captured: usize,
}

/// Shared output buffer with a combined cap
#[derive(Debug)]
pub struct OutputCapture {
    cap: usize,
    buffers: Mutex<Buffers>,
    truncated: AtomicBool,
    overflow: Notify,
}

impl OutputCapture {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            buffers: Mutex::new(Buffers::default()),
            truncated: AtomicBool::new(false),
            overflow: Notify::new(),
        }
    }

    /// Append a chunk; returns `false` once the cap has been hit
    pub fn push(&self, stream: StreamKind, chunk: &[u8]) -> bool {
        if self.is_truncated() {
            return false;
        }
        let mut buffers = self.buffers.lock();
        // another stream may have overflowed while we waited for the lock
        if self.is_truncated() {
            return false;
        }
        let remaining = self.cap.saturating_sub(buffers.captured);
        let overflowed = chunk.len() > remaining;
        let take = chunk.len().min(remaining);
        buffers.captured += take;
        let target = match stream {
            StreamKind::Stdout => &mut buffers.stdout,
            StreamKind::Stderr => &mut buffers.stderr,
        };
        target.extend_from_slice(&chunk[..take]);

        if overflowed {
            target.extend_from_slice(TRUNCATION_MARKER.as_bytes());
            self.truncated.store(true, Ordering::SeqCst);
            drop(buffers);
            trace!(cap = self.cap, "output cap reached");
            self.overflow.notify_one();
            return false;
        }
        true
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated.load(Ordering::SeqCst)
    }

    /// Resolves once the cap has been exceeded
    pub async fn overflowed(&self) {
        if self.is_truncated() {
            return;
        }
        self.overflow.notified().await;
    }

    /// Captured bytes, excluding markers
    pub fn captured(&self) -> usize {
        self.buffers.lock().captured
    }

    /// Captured stdout and stderr as lossy UTF-8
    pub fn snapshot(&self) -> (String, String) {
        let buffers = self.buffers.lock();
        (
            String::from_utf8_lossy(&buffers.stdout).into_owned(),
            String::from_utf8_lossy(&buffers.stderr).into_owned(),
        )
    }

    /// Read `reader` to EOF or until the cap is hit
    pub async fn drain<R>(&self, stream: StreamKind, mut reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    if !self.push(stream, &chunk[..n]) {
                        break;
                    }
                }
                Err(err) => {
                    trace!(?stream, error = %err, "output stream read failed");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_cap() {
        let capture = OutputCapture::new(16);
        assert!(capture.push(StreamKind::Stdout, b"hello "));
        assert!(capture.push(StreamKind::Stderr, b"warn"));
        assert!(!capture.is_truncated());
        assert_eq!(capture.snapshot(), ("hello ".to_string(), "warn".to_string()));
    }

    #[test]
    fn test_combined_cap_truncates() {
        let capture = OutputCapture::new(8);
        assert!(capture.push(StreamKind::Stdout, b"12345"));
        assert!(!capture.push(StreamKind::Stderr, b"67890"));
        assert!(capture.is_truncated());
        assert_eq!(capture.captured(), 8);

        let (stdout, stderr) = capture.snapshot();
        assert_eq!(stdout, "12345");
        assert_eq!(stderr, format!("678{TRUNCATION_MARKER}"));
        assert!(!capture.push(StreamKind::Stdout, b"more"));
    }

    #[test]
    fn test_exact_fit_is_not_truncated() {
        let capture = OutputCapture::new(4);
        assert!(capture.push(StreamKind::Stdout, b"abcd"));
        assert!(!capture.is_truncated());
        assert!(!capture.push(StreamKind::Stdout, b"e"));
        assert!(capture.is_truncated());
    }

    #[test]
    fn test_simultaneous_overflow_marks_once() {
        for _ in 0..200 {
            let capture = OutputCapture::new(4);
            let barrier = std::sync::Barrier::new(2);
            std::thread::scope(|scope| {
                for stream in [StreamKind::Stdout, StreamKind::Stderr] {
                    let (capture, barrier) = (&capture, &barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        capture.push(stream, b"overflowing chunk");
                    });
                }
            });

            let (stdout, stderr) = capture.snapshot();
            let markers = stdout.matches(TRUNCATION_MARKER).count()
                + stderr.matches(TRUNCATION_MARKER).count();
            assert_eq!(markers, 1);
            assert_eq!(capture.captured(), 4);
        }
    }

    #[tokio::test]
    async fn test_overflow_notifies_late_waiter() {
        let capture = OutputCapture::new(1);
        capture.push(StreamKind::Stdout, b"xy");
        tokio::time::timeout(std::time::Duration::from_millis(100), capture.overflowed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_drain_reader() {
        let capture = OutputCapture::new(1024);
        capture.drain(StreamKind::Stdout, &b"line one\nline two\n"[..]).await;
        assert_eq!(capture.snapshot().0, "line one\nline two\n");
    }
}
