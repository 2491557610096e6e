// src/io/channel.rs
//
// Outbound command queue between callers and the link worker.
// Any number of producers, one consumer. Unbounded, strict FIFO.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct CommandChannel {
    queue: Mutex<VecDeque<String>>,
    available: Condvar,
}

impl CommandChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a command. Never blocks on the consumer.
    pub fn push(&self, command: String) {
        let mut queue = self.lock();
        queue.push_back(command);
        self.available.notify_one();
    }

    pub fn try_pop(&self) -> Option<String> {
        self.lock().pop_front()
    }

    /// Take the oldest command, waiting up to `timeout` for one to arrive.
    /// A timeout too large to add to the clock waits without a deadline.
    pub fn blocking_pop(&self, timeout: Duration) -> Option<String> {
        let deadline = Instant::now().checked_add(timeout);
        let mut queue = self.lock();
        loop {
            if let Some(cmd) = queue.pop_front() {
                return Some(cmd);
            }
            // Spurious wakeups just go round the loop again
            queue = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return None;
                    }
                    match self.available.wait_timeout(queue, remaining) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => self
                    .available
                    .wait(queue)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            };
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop everything still queued. Returns how many commands were discarded.
    pub fn clear(&self) -> usize {
        let mut queue = self.lock();
        let n = queue.len();
        queue.clear();
        n
    }

    // A producer panicking mid-push cannot leave the deque half-written,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
