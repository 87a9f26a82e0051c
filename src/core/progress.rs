use anyhow::anyhow;
use crossbeam_channel::{Receiver, Sender};
use std::any::Any;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use tracing::info;

/// Best-effort status channel. Messages are UTF-8 bytes; a missing or
/// disconnected receiver is not an error.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    sender: Option<Sender<Vec<u8>>>,
}

impl ProgressReporter {
    pub fn new(sender: Sender<Vec<u8>>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn report(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        if let Some(sender) = &self.sender {
            let _ = sender.send(message.into_bytes());
        }
    }
}

/// Writes every progress message as one line from a background thread.
pub struct ProgressPrinter {
    handle: JoinHandle<()>,
}

impl ProgressPrinter {
    pub fn spawn<W>(receiver: Receiver<Vec<u8>>, mut out: W) -> Self
    where
        W: Write + Send + 'static,
    {
        let handle = thread::spawn(move || {
            for message in receiver {
                let _ = writeln!(out, "{}", String::from_utf8_lossy(&message));
            }
            let _ = out.flush();
        });
        Self { handle }
    }

    /// Waits until every sender is gone and the queue is drained. A panic on
    /// the printer thread comes back as an error.
    pub fn finish(self) -> anyhow::Result<()> {
        self.handle
            .join()
            .map_err(|panic| anyhow!("progress printer panicked: {}", panic_message(panic.as_ref())))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}

/// Fraction of raw call graph nodes whose edges have been visited.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    total: AtomicUsize,
    visited: AtomicUsize,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.visited.store(0, Ordering::SeqCst);
    }

    pub fn record_caller(&self) {
        self.visited.fetch_add(1, Ordering::SeqCst);
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> usize {
        self.visited.load(Ordering::SeqCst)
    }

    /// Always within `[0, 1]`; 0 before any graph is known.
    pub fn progress(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.visited() as f64 / total as f64).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn progress_is_clamped() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.progress(), 0.0);
        tracker.reset(2);
        tracker.record_caller();
        assert_eq!(tracker.progress(), 0.5);
        tracker.record_caller();
        tracker.record_caller();
        assert_eq!(tracker.progress(), 1.0);
    }

    #[test]
    fn reporter_ignores_closed_receiver() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let reporter = ProgressReporter::new(tx);
        reporter.report("first");
        assert_eq!(rx.recv().unwrap(), b"first".to_vec());
        drop(rx);
        reporter.report("second");
        ProgressReporter::disabled().report("nobody listens");
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            panic!("terminal went away");
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn printer_drains_every_message_before_finishing() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let buffer = SharedBuffer::default();
        let printer = ProgressPrinter::spawn(rx, buffer.clone());
        let reporter = ProgressReporter::new(tx);
        reporter.report("loading");
        reporter.report("saving");
        drop(reporter);

        printer.finish().unwrap();
        assert_eq!(buffer.0.lock().as_slice(), b"loading\nsaving\n");
    }

    #[test]
    fn printer_panic_is_reported_by_finish() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let printer = ProgressPrinter::spawn(rx, FailingWriter);
        ProgressReporter::new(tx).report("lost");

        let err = printer.finish().unwrap_err();
        assert!(err.to_string().contains("terminal went away"), "{err}");
    }
}
