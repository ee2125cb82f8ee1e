//! Callback executors

use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, warn};

use crate::app::sync::lock;

/// A unit of listener work
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs listener tasks on the caller's chosen thread
pub trait CallbackExecutor: Send + Sync {
    fn execute(&self, task: Task);
}

fn run_task(task: Task) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        error!("Listener panicked while handling a request event");
    }
}

/// Runs tasks immediately on the posting thread
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl CallbackExecutor for InlineExecutor {
    fn execute(&self, task: Task) {
        run_task(task);
    }
}

/// Runs tasks in FIFO order on one dedicated thread
#[derive(Debug)]
pub struct ThreadExecutor {
    name: String,
    sender: Mutex<Option<Sender<Task>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadExecutor {
    pub fn new(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let (sender, receiver) = crossbeam_channel::unbounded::<Task>();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            for task in receiver {
                run_task(task);
            }
        })?;
        debug!("Delivery thread {} started", name);

        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Run every task already posted, then stop the thread
    pub fn shutdown(&self) {
        lock(&self.sender).take();
        if let Some(handle) = lock(&self.handle).take() {
            if handle.join().is_err() {
                warn!("Delivery thread {} terminated abnormally", self.name);
            }
            debug!("Delivery thread {} stopped", self.name);
        }
    }
}

impl CallbackExecutor for ThreadExecutor {
    fn execute(&self, task: Task) {
        match lock(&self.sender).as_ref() {
            Some(sender) => {
                if sender.send(task).is_err() {
                    warn!("Delivery thread {} is gone, dropping event", self.name);
                }
            }
            None => debug!("Delivery thread {} shut down, dropping event", self.name),
        }
    }
}

impl Drop for ThreadExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Posts tasks to a channel drained by a [`ChannelPump`]
#[derive(Debug, Clone)]
pub struct ChannelExecutor {
    sender: Sender<Task>,
}

/// Receiving half of a [`ChannelExecutor`], driven by the owning thread
#[derive(Debug)]
pub struct ChannelPump {
    receiver: Receiver<Task>,
}

impl ChannelExecutor {
    pub fn pair() -> (ChannelExecutor, ChannelPump) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (ChannelExecutor { sender }, ChannelPump { receiver })
    }
}

impl CallbackExecutor for ChannelExecutor {
    fn execute(&self, task: Task) {
        if self.sender.send(task).is_err() {
            debug!("Channel pump dropped, discarding event");
        }
    }
}

impl ChannelPump {
    /// Run every task currently queued without blocking
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        for task in self.receiver.try_iter() {
            run_task(task);
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one task and run it
    pub fn run_next(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(task) => {
                run_task(task);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Run tasks as they arrive until `done` holds or `timeout` elapses
    ///
    /// Returns whether `done` was satisfied.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while !done() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.receiver.recv_timeout(remaining) {
                Ok(task) => run_task(task),
                Err(RecvTimeoutError::Timeout) => return done(),
                Err(RecvTimeoutError::Disconnected) => return done(),
            }
        }
        true
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}
