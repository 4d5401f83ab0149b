//! Callback and await bridging.
//!
//! Every call settles one [`Completion`] exactly once. The completion either
//! feeds a [`Settlement`] future (await-style call sites) or invokes a
//! callback (callback-style call sites); both go through the same atomic
//! settled flag. Callbacks are delivered through a [`CallbackQueue`].

use crate::{Error, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone)]
enum QueueKind {
    Immediate,
    Runtime(Handle),
    Main(mpsc::UnboundedSender<Job>),
}

/// Where completion callbacks run.
///
/// # Examples
///
/// ```
/// use conduit::CallbackQueue;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let (queue, mut main) = CallbackQueue::main();
/// let hits = Arc::new(AtomicUsize::new(0));
///
/// let counter = hits.clone();
/// queue.execute(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
/// assert_eq!(hits.load(Ordering::SeqCst), 0);
///
/// assert_eq!(main.run_pending(), 1);
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone)]
pub struct CallbackQueue {
    kind: QueueKind,
}

impl CallbackQueue {
    /// Runs callbacks on whichever task completes the call.
    pub fn immediate() -> Self {
        Self {
            kind: QueueKind::Immediate,
        }
    }

    /// Spawns callbacks onto a tokio runtime.
    pub fn runtime(handle: Handle) -> Self {
        Self {
            kind: QueueKind::Runtime(handle),
        }
    }

    /// Creates a queue drained by an application-owned main loop.
    pub fn main() -> (Self, MainQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                kind: QueueKind::Main(tx),
            },
            MainQueue { rx },
        )
    }

    /// Schedules `job` on this queue.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        match &self.kind {
            QueueKind::Immediate => job(),
            QueueKind::Runtime(handle) => {
                handle.spawn(async move { job() });
            }
            QueueKind::Main(tx) => {
                if tx.send(Box::new(job)).is_err() {
                    tracing::warn!("Main queue is gone, dropping callback");
                }
            }
        }
    }
}

impl Default for CallbackQueue {
    fn default() -> Self {
        Self::immediate()
    }
}

impl std::fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            QueueKind::Immediate => "immediate",
            QueueKind::Runtime(_) => "runtime",
            QueueKind::Main(_) => "main",
        };
        f.debug_tuple("CallbackQueue").field(&kind).finish()
    }
}

/// The receiving end of [`CallbackQueue::main`].
///
/// The owner drains it from its main loop, so callbacks there never race
/// with UI state.
pub struct MainQueue {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl MainQueue {
    /// Runs every callback already queued and returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Waits for one callback and runs it. Returns `false` once every
    /// sender is gone.
    pub async fn run_one(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Runs callbacks until every sender is gone.
    pub async fn run(&mut self) {
        while self.run_one().await {}
    }
}

enum Sink<T> {
    Channel(oneshot::Sender<T>),
    Callback(Box<dyn FnOnce(T) + Send + 'static>),
}

struct CompletionInner<T> {
    settled: AtomicBool,
    sink: Mutex<Option<Sink<T>>>,
}

/// A single-resolution completion.
///
/// Clones share the same settled flag, so a value handed to several code
/// paths still resolves at most once.
pub struct Completion<T> {
    inner: Arc<CompletionInner<T>>,
}

impl<T: Send + 'static> Completion<T> {
    fn with_sink(sink: Sink<T>) -> Self {
        Self {
            inner: Arc::new(CompletionInner {
                settled: AtomicBool::new(false),
                sink: Mutex::new(Some(sink)),
            }),
        }
    }

    /// A completion whose value is awaited through the returned [`Settlement`].
    pub fn channel() -> (Self, Settlement<T>) {
        let (tx, rx) = oneshot::channel();
        (Self::with_sink(Sink::Channel(tx)), Settlement { rx })
    }

    /// A completion that passes its value to `callback`.
    pub fn callback(callback: impl FnOnce(T) + Send + 'static) -> Self {
        Self::with_sink(Sink::Callback(Box::new(callback)))
    }

    /// Settles the completion, reporting a second settlement as an error.
    ///
    /// ```
    /// use conduit::{Completion, Error};
    ///
    /// let completion = Completion::callback(|_: u32| {});
    /// assert!(completion.try_settle(1).is_ok());
    /// assert!(matches!(completion.try_settle(2), Err(Error::AlreadySettled)));
    /// ```
    pub fn try_settle(&self, value: T) -> Result<()> {
        if self.inner.settled.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadySettled);
        }
        let sink = self.inner.sink.lock().take();
        match sink {
            Some(Sink::Channel(tx)) => {
                if tx.send(value).is_err() {
                    tracing::debug!("Settlement dropped before the call completed");
                }
            }
            Some(Sink::Callback(callback)) => callback(value),
            None => {}
        }
        Ok(())
    }

    /// Settles the completion.
    ///
    /// # Panics
    ///
    /// Panics if the completion was already settled. Resolving a call twice
    /// is an internal invariant violation.
    pub fn settle(&self, value: T) {
        if self.try_settle(value).is_err() {
            panic!("completion settled more than once");
        }
    }

    pub fn is_settled(&self) -> bool {
        self.inner.settled.load(Ordering::Acquire)
    }
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("settled", &self.inner.settled.load(Ordering::Acquire))
            .finish()
    }
}

/// Await side of [`Completion::channel`].
///
/// Resolves to [`Error::Internal`] if every completion handle is dropped
/// without settling.
#[derive(Debug)]
pub struct Settlement<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for Settlement<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.map_err(|_| Error::Internal("call ended without settling".to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_channel_completion_resolves_settlement() {
        let (completion, settlement) = Completion::channel();
        completion.settle(7u32);
        assert!(completion.is_settled());
        assert_eq!(settlement.await.unwrap(), 7);
    }

    #[test]
    fn test_callback_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let completion = Completion::callback(move |_: &'static str| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let success_path = completion.clone();
        let failure_path = completion.clone();
        assert!(success_path.try_settle("ok").is_ok());
        assert!(matches!(
            failure_path.try_settle("failed"),
            Err(Error::AlreadySettled)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "settled more than once")]
    fn test_double_settle_panics() {
        let completion = Completion::callback(|_: u8| {});
        completion.settle(1);
        completion.settle(2);
    }

    #[tokio::test]
    async fn test_dropped_completion_is_internal_error() {
        let (completion, settlement) = Completion::<u8>::channel();
        drop(completion);
        assert!(matches!(settlement.await, Err(Error::Internal(_))));
    }

    #[test]
    fn test_immediate_queue_runs_inline() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        CallbackQueue::immediate().execute(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_main_queue_stops_when_senders_drop() {
        let (queue, mut main) = CallbackQueue::main();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = hits.clone();
            queue.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        drop(queue);
        main.run().await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_runtime_queue_spawns() {
        let (tx, rx) = oneshot::channel();
        CallbackQueue::runtime(Handle::current()).execute(move || {
            let _ = tx.send(std::thread::current().name().map(str::to_string));
        });
        assert!(rx.await.is_ok());
    }
}
