//! Bounded blocking job queue
//!
//! A fixed-capacity ring buffer shared between the acceptor (producer) and
//! the worker pool (consumers). `push` blocks while the ring is full, which
//! throttles accepting to the rate workers drain it; `pop` blocks while the
//! ring is empty.
//!
//! Unlike the runtime's work queues this one is allowed to sleep: callers are
//! plain OS threads, so a mutex plus two condition variables is the whole
//! synchronization story.

use parking_lot::{Condvar, Mutex};

use crate::error::{CoreError, CoreResult, PushError};

/// Ring storage, only touched with the queue mutex held
struct Ring<T> {
    slots: Box<[Option<T>]>,
    /// Index of the oldest element
    head: usize,
    /// Number of occupied slots
    len: usize,
    /// Set once by `close()`
    closed: bool,
}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            closed: false,
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    fn push_back(&mut self, value: T) {
        debug_assert!(!self.is_full());
        let tail = (self.head + self.len) % self.capacity();
        self.slots[tail] = Some(value);
        self.len += 1;
    }

    fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let value = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        value
    }
}

/// Bounded MPMC FIFO of pending jobs
///
/// # Example
///
/// ```
/// use kvhttpd_core::JobQueue;
///
/// let queue = JobQueue::new(2).unwrap();
/// queue.push(1).unwrap();
/// queue.push(2).unwrap();
/// assert_eq!(queue.pop(), Some(1));
/// assert_eq!(queue.pop(), Some(2));
/// ```
pub struct JobQueue<T> {
    ring: Mutex<Ring<T>>,
    /// Signalled when a slot frees up
    not_full: Condvar,
    /// Signalled when a job arrives
    not_empty: Condvar,
}

impl<T> JobQueue<T> {
    /// Create a queue holding at most `capacity` jobs
    pub fn new(capacity: usize) -> CoreResult<Self> {
        if capacity == 0 {
            return Err(CoreError::InvalidCapacity);
        }
        Ok(Self {
            ring: Mutex::new(Ring::with_capacity(capacity)),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        })
    }

    /// Append `job` at the tail, blocking while the queue is full
    ///
    /// Fails only if the queue is (or becomes, while waiting) closed; the job
    /// is handed back inside the error.
    pub fn push(&self, job: T) -> Result<(), PushError<T>> {
        let mut ring = self.ring.lock();
        while ring.is_full() && !ring.closed {
            self.not_full.wait(&mut ring);
        }
        if ring.closed {
            return Err(PushError::new(CoreError::QueueClosed, job));
        }
        ring.push_back(job);
        drop(ring);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Append `job` only if a slot is free right now
    pub fn try_push(&self, job: T) -> Result<(), PushError<T>> {
        let mut ring = self.ring.lock();
        if ring.closed {
            return Err(PushError::new(CoreError::QueueClosed, job));
        }
        if ring.is_full() {
            return Err(PushError::new(CoreError::QueueFull, job));
        }
        ring.push_back(job);
        drop(ring);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the head, blocking while the queue is empty
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub fn pop(&self) -> Option<T> {
        let mut ring = self.ring.lock();
        loop {
            if let Some(job) = ring.pop_front() {
                drop(ring);
                self.not_full.notify_one();
                return Some(job);
            }
            if ring.closed {
                return None;
            }
            self.not_empty.wait(&mut ring);
        }
    }

    /// Remove the head without blocking
    pub fn try_pop(&self) -> CoreResult<T> {
        let mut ring = self.ring.lock();
        match ring.pop_front() {
            Some(job) => {
                drop(ring);
                self.not_full.notify_one();
                Ok(job)
            }
            None if ring.closed => Err(CoreError::QueueClosed),
            None => Err(CoreError::QueueEmpty),
        }
    }

    /// Stop accepting jobs and wake every blocked caller
    ///
    /// Jobs already queued remain poppable.
    pub fn close(&self) {
        self.ring.lock().closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.ring.lock().closed
    }

    /// Number of queued jobs (a snapshot)
    pub fn len(&self) -> usize {
        self.ring.lock().len
    }

    /// Whether the queue currently holds no jobs
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued jobs
    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }
}

impl<T> std::fmt::Debug for JobQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.ring.lock();
        f.debug_struct("JobQueue")
            .field("len", &ring.len)
            .field("capacity", &ring.capacity())
            .field("closed", &ring.closed)
            .finish()
    }
}
