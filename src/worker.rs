//! Background threads and one-shot result slots.
//!
//! Model loading and hand detection are too slow to run inline with frame processing. Both are
//! handed off to a background thread that reports back through a [`Promise`]; the processing loop
//! polls the connected [`PromiseHandle`] without ever blocking on it.

use std::{
    io,
    panic::resume_unwind,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Receiver, Sender, TryRecvError};

/// Returns a fresh result slot and the handle that reads it.
pub fn promise<T>() -> (Promise<T>, PromiseHandle<T>) {
    // Capacity of 1 means that `Promise::fulfill` never blocks.
    let (sender, recv) = crossbeam::channel::bounded(1);
    (Promise { inner: sender }, PromiseHandle { recv })
}

/// Write side of a one-shot result slot.
pub struct Promise<T> {
    inner: Sender<T>,
}

impl<T> Promise<T> {
    /// Stores `value`. Never blocks; the value is discarded if nobody holds the handle anymore.
    pub fn fulfill(self, value: T) {
        self.inner.send(value).ok();
    }
}

/// The result of polling a [`PromiseHandle`].
#[derive(Debug, PartialEq, Eq)]
pub enum PromiseState<T> {
    /// The promise has not been fulfilled yet.
    Pending,
    Fulfilled(T),
    /// The [`Promise`] was dropped without being fulfilled, typically because its thread panicked.
    Dropped,
}

/// Read side of a one-shot result slot.
pub struct PromiseHandle<T> {
    recv: Receiver<T>,
}

impl<T> PromiseHandle<T> {
    /// Waits for the value.
    pub fn block(self) -> Result<T, PromiseDropped> {
        self.recv.recv().map_err(|_| PromiseDropped { _priv: () })
    }

    /// Takes the value if the promise has been fulfilled, without blocking.
    ///
    /// Once this has returned [`PromiseState::Fulfilled`] or [`PromiseState::Dropped`], further
    /// calls return [`PromiseState::Dropped`].
    pub fn poll(&mut self) -> PromiseState<T> {
        match self.recv.try_recv() {
            Ok(value) => PromiseState::Fulfilled(value),
            Err(TryRecvError::Empty) => PromiseState::Pending,
            Err(TryRecvError::Disconnected) => PromiseState::Dropped,
        }
    }

    /// Returns whether a value is waiting to be taken.
    pub fn is_fulfilled(&self) -> bool {
        !self.recv.is_empty()
    }
}

/// The [`Promise`] went away without a value.
#[derive(Debug, Clone, Copy)]
pub struct PromiseDropped {
    _priv: (),
}

/// Runs `f` on a new named thread and returns a handle to its result.
///
/// The thread is detached. If `f` panics, the handle resolves to [`PromiseState::Dropped`].
pub fn spawn_task<T, F>(name: &str, f: F) -> io::Result<PromiseHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (promise, handle) = promise();
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || promise.fulfill(f()))?;
    Ok(handle)
}

/// Configuration for a [`Worker`] thread.
#[derive(Clone)]
pub struct WorkerBuilder {
    name: Option<String>,
    capacity: usize,
}

impl WorkerBuilder {
    /// Thread name, used in panic messages and logs.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Number of messages that may queue up before [`Worker::send`] blocks. Defaults to 0, a
    /// rendezvous channel.
    pub fn capacity(self, capacity: usize) -> Self {
        Self { capacity, ..self }
    }

    /// Starts the thread. `handler` is invoked once per message, in order.
    pub fn spawn<I, F>(self, mut handler: F) -> io::Result<Worker<I>>
    where
        I: Send + 'static,
        F: FnMut(I) + Send + 'static,
    {
        let (sender, recv) = crossbeam::channel::bounded(self.capacity);
        let builder = match &self.name {
            Some(name) => thread::Builder::new().name(name.clone()),
            None => thread::Builder::new(),
        };
        let name = self.name.unwrap_or_else(|| "<unnamed>".into());
        let handle = builder.spawn(move || {
            log::trace!("worker '{name}' starting");
            for message in recv {
                handler(message);
            }
            log::trace!("worker '{name}' exiting");
        })?;

        Ok(Worker {
            sender: Some(sender),
            handle: Some(handle),
        })
    }
}

/// Long-lived thread consuming messages of type `I`.
///
/// Dropping the `Worker` closes its queue and joins the thread, re-raising a panic of the worker
/// on the dropping thread.
pub struct Worker<I: Send + 'static> {
    sender: Option<Sender<I>>,
    handle: Option<JoinHandle<()>>,
}

impl<I: Send + 'static> Drop for Worker<I> {
    fn drop(&mut self) {
        // The thread exits once its queue is closed.
        self.sender = None;
        self.join();
    }
}

impl Worker<()> {
    #[inline]
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder {
            name: None,
            capacity: 0,
        }
    }
}

impl<I: Send + 'static> Worker<I> {
    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(payload) = handle.join() {
                if !thread::panicking() {
                    resume_unwind(payload);
                }
            }
        }
    }

    /// Queues `msg`, blocking while the queue is full. Re-raises the worker's panic if it died.
    pub fn send(&mut self, msg: I) {
        let sent = match &self.sender {
            Some(sender) => sender.send(msg).is_ok(),
            None => return,
        };
        if !sent {
            self.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    use super::*;

    /// Panics without running the panic hook.
    fn quiet_panic(msg: &str) {
        resume_unwind(Box::new(msg.to_string()));
    }

    #[test]
    fn panic_resurfaces_on_drop() {
        let mut worker = Worker::builder()
            .spawn(|_: ()| quiet_panic("worker panic"))
            .unwrap();
        worker.send(());
        catch_unwind(AssertUnwindSafe(|| drop(worker))).unwrap_err();
    }

    #[test]
    fn worker_processes_messages_in_order() {
        let (sender, recv) = crossbeam::channel::unbounded();
        let mut worker = Worker::builder()
            .name("doubler")
            .spawn(move |n: u32| sender.send(n * 2).unwrap())
            .unwrap();
        worker.send(1);
        worker.send(2);
        drop(worker);
        assert_eq!(recv.iter().collect::<Vec<_>>(), [2, 4]);
    }

    #[test]
    fn promise_poll() {
        let (promise, mut handle) = promise();
        assert_eq!(handle.poll(), PromiseState::Pending);
        assert!(!handle.is_fulfilled());
        promise.fulfill(7);
        assert!(handle.is_fulfilled());
        assert_eq!(handle.poll(), PromiseState::Fulfilled(7));
        assert_eq!(handle.poll(), PromiseState::Dropped);
    }

    #[test]
    fn dropped_promise() {
        let (promise, mut handle) = promise::<()>();
        drop(promise);
        assert_eq!(handle.poll(), PromiseState::Dropped);
    }

    #[test]
    fn spawn_task_resolves() {
        let handle = spawn_task("answer", || 42).unwrap();
        assert_eq!(handle.block().unwrap(), 42);
    }

    #[test]
    fn spawn_task_panic_drops_promise() {
        let handle = spawn_task("boom", || -> u8 {
            quiet_panic("task panic");
            0
        })
        .unwrap();
        assert!(handle.block().is_err());
    }
}
