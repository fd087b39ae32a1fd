use std::collections::VecDeque;
use std::pin::pin;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

use crate::{DataPlatformError, Result};

struct Inner<T> {
    queue: VecDeque<T>,
    shutdown: bool,
}

/// A FIFO hand-off buffer for wire messages: many producers, any number of
/// consumers. Bounded buffers block producers when full. Construction
/// activates the buffer; `shutdown` stops intake while consumers drain what
/// remains; `shutdown_now` also discards the backlog.
pub struct MessageBuffer<T> {
    inner: Mutex<Inner<T>>,
    capacity: Option<usize>,
    readable: Notify,
    writable: Notify,
}

impl<T> MessageBuffer<T> {
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity.max(1)))
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        MessageBuffer {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                shutdown: false,
            }),
            capacity,
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    /// True once the buffer is shut down and nothing is left to consume.
    pub fn is_drained(&self) -> bool {
        let inner = self.lock();
        inner.shutdown && inner.queue.is_empty()
    }

    fn push_or_give_back(&self, item: T) -> Result<std::result::Result<(), T>> {
        let mut inner = self.lock();
        if inner.shutdown {
            return Err(DataPlatformError::Interrupted(
                "message buffer: enqueue after shutdown".to_string(),
            ));
        }
        if self.capacity.map_or(true, |cap| inner.queue.len() < cap) {
            inner.queue.push_back(item);
            self.readable.notify_one();
            Ok(Ok(()))
        } else {
            Ok(Err(item))
        }
    }

    /// Appends one message, waiting for space when the buffer is bounded and
    /// full. Fails with `Interrupted` if the buffer shuts down first.
    pub async fn enqueue(&self, item: T) -> Result<()> {
        let mut item = item;
        loop {
            let mut writable = pin!(self.writable.notified());
            writable.as_mut().enable();
            match self.push_or_give_back(item)? {
                Ok(()) => return Ok(()),
                Err(back) => item = back,
            }
            writable.await;
        }
    }

    /// Like `enqueue` but gives up after `timeout`, failing with `Resource`.
    pub async fn enqueue_timeout(&self, item: T, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.enqueue(item)).await {
            Ok(result) => result,
            Err(_) => Err(DataPlatformError::Resource(format!(
                "message buffer: no space within {timeout:?}"
            ))),
        }
    }

    /// Appends one message without waiting. Fails with `Resource` when full.
    pub fn try_enqueue(&self, item: T) -> Result<()> {
        match self.push_or_give_back(item)? {
            Ok(()) => Ok(()),
            Err(_) => Err(DataPlatformError::Resource(
                "message buffer: full".to_string(),
            )),
        }
    }

    /// Removes the next message, waiting for one to arrive. Returns `None`
    /// once the buffer is shut down and empty.
    pub async fn take(&self) -> Option<T> {
        loop {
            let mut readable = pin!(self.readable.notified());
            readable.as_mut().enable();
            {
                let mut inner = self.lock();
                if let Some(item) = inner.queue.pop_front() {
                    self.writable.notify_one();
                    return Some(item);
                }
                if inner.shutdown {
                    return None;
                }
            }
            readable.await;
        }
    }

    /// Removes the next message if one is immediately available.
    pub fn poll(&self) -> Option<T> {
        let mut inner = self.lock();
        let item = inner.queue.pop_front();
        if item.is_some() {
            self.writable.notify_one();
        }
        item
    }

    /// Like `take` but returns `None` if nothing arrives within `timeout`.
    pub async fn poll_timeout(&self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.take()).await.ok().flatten()
    }

    /// Stops intake. Consumers keep draining; `take` returns `None` once the
    /// backlog is exhausted.
    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }

    /// Stops intake and discards the backlog, returning how many messages
    /// were dropped.
    pub fn shutdown_now(&self) -> usize {
        let dropped = {
            let mut inner = self.lock();
            inner.shutdown = true;
            let dropped = inner.queue.len();
            inner.queue.clear();
            dropped
        };
        self.readable.notify_waiters();
        self.writable.notify_waiters();
        dropped
    }
}
