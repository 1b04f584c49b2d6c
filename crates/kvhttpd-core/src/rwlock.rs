//! Fair reader-writer lock, one per resource
//!
//! Requests are admitted strictly in arrival order. Only the oldest pending
//! request may be admitted:
//! - a writer when nobody holds the lock;
//! - a reader when no writer holds the lock and fewer than `reader_batch`
//!   readers do.
//!
//! Readers that arrive back to back (no writer between them) therefore share
//! the lock, up to `reader_batch` at a time. A reader never passes an older
//! waiting writer and a writer never passes an older waiting reader, so
//! neither side can be starved.
//!
//! All bookkeeping sits behind one mutex with a single condition variable.
//! Holders get RAII guards; the unlock half runs in `Drop`, so an unwinding
//! handler still releases its lock.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Read,
    Write,
}

/// A request that has arrived but not been admitted
#[derive(Debug, Clone, Copy)]
struct Pending {
    ticket: u64,
    mode: Mode,
}

#[derive(Debug, Default)]
struct State {
    /// Readers currently holding the lock
    readers: usize,
    /// A writer currently holds the lock
    writer: bool,
    /// Not-yet-admitted requests, oldest first
    pending: VecDeque<Pending>,
    /// Arrival counter
    next_ticket: u64,
}

impl State {
    fn take_ticket(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        ticket
    }

    fn is_front(&self, ticket: u64) -> bool {
        self.pending.front().map(|p| p.ticket) == Some(ticket)
    }

    fn front_mode(&self) -> Option<Mode> {
        self.pending.front().map(|p| p.mode)
    }
}

/// Point-in-time view of a lock, for diagnostics and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSnapshot {
    /// Readers holding the lock
    pub readers: usize,
    /// Whether a writer holds the lock
    pub writer: bool,
    /// Requests blocked waiting for admission
    pub waiting: usize,
}

/// Per-resource fair reader-writer lock
///
/// # Example
///
/// ```
/// use kvhttpd_core::ResourceLock;
///
/// let lock = ResourceLock::new(2);
/// {
///     let _a = lock.reader_lock();
///     let _b = lock.reader_lock(); // readers share, up to the batch size
/// }
/// let w = lock.writer_lock();
/// assert!(lock.try_reader_lock().is_none());
/// w.unlock();
/// ```
pub struct ResourceLock {
    state: Mutex<State>,
    changed: Condvar,
    reader_batch: usize,
}

impl ResourceLock {
    /// Create a lock letting up to `reader_batch` consecutive readers share it
    ///
    /// A bound of zero is treated as one.
    pub fn new(reader_batch: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            changed: Condvar::new(),
            reader_batch: reader_batch.max(1),
        }
    }

    /// The configured reader batch bound
    pub fn reader_batch(&self) -> usize {
        self.reader_batch
    }

    /// Acquire in shared mode, blocking until admitted
    pub fn reader_lock(&self) -> ReaderGuard<'_> {
        self.acquire(Mode::Read);
        ReaderGuard { lock: self }
    }

    /// Acquire in exclusive mode, blocking until admitted
    pub fn writer_lock(&self) -> WriterGuard<'_> {
        self.acquire(Mode::Write);
        WriterGuard { lock: self }
    }

    /// Acquire in shared mode only if a reader arriving now would go
    /// straight in
    pub fn try_reader_lock(&self) -> Option<ReaderGuard<'_>> {
        let mut s = self.state.lock();
        if !s.pending.is_empty() || !self.reader_fits(&s) {
            return None;
        }
        s.take_ticket();
        s.readers += 1;
        Some(ReaderGuard { lock: self })
    }

    /// Acquire in exclusive mode only if the lock is idle with nobody queued
    pub fn try_writer_lock(&self) -> Option<WriterGuard<'_>> {
        let mut s = self.state.lock();
        if s.writer || s.readers > 0 || !s.pending.is_empty() {
            return None;
        }
        s.take_ticket();
        s.writer = true;
        Some(WriterGuard { lock: self })
    }

    /// Current holders and queue depth
    pub fn snapshot(&self) -> LockSnapshot {
        let s = self.state.lock();
        LockSnapshot {
            readers: s.readers,
            writer: s.writer,
            waiting: s.pending.len(),
        }
    }

    fn reader_fits(&self, s: &State) -> bool {
        !s.writer && s.readers < self.reader_batch
    }

    fn admissible(&self, s: &State, ticket: u64, mode: Mode) -> bool {
        if !s.is_front(ticket) {
            return false;
        }
        match mode {
            Mode::Write => !s.writer && s.readers == 0,
            Mode::Read => self.reader_fits(s),
        }
    }

    fn acquire(&self, mode: Mode) {
        let mut s = self.state.lock();
        let ticket = s.take_ticket();
        s.pending.push_back(Pending { ticket, mode });

        while !self.admissible(&s, ticket, mode) {
            self.changed.wait(&mut s);
        }
        s.pending.pop_front();

        match mode {
            Mode::Read => {
                s.readers += 1;
                // The next reader in line may be able to join this batch.
                let wake = s.front_mode() == Some(Mode::Read) && self.reader_fits(&s);
                drop(s);
                if wake {
                    self.changed.notify_all();
                }
            }
            Mode::Write => s.writer = true,
        }
    }

    fn reader_unlock(&self) {
        let mut s = self.state.lock();
        debug_assert!(s.readers > 0 && !s.writer);
        s.readers -= 1;
        let wake = !s.pending.is_empty();
        drop(s);
        if wake {
            self.changed.notify_all();
        }
    }

    fn writer_unlock(&self) {
        let mut s = self.state.lock();
        debug_assert!(s.writer && s.readers == 0);
        s.writer = false;
        drop(s);
        self.changed.notify_all();
    }
}

impl Default for ResourceLock {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_READER_BATCH)
    }
}

impl std::fmt::Debug for ResourceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLock")
            .field("reader_batch", &self.reader_batch)
            .field("state", &self.snapshot())
            .finish()
    }
}

/// Shared hold on a [`ResourceLock`]; released on drop
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReaderGuard<'a> {
    lock: &'a ResourceLock,
}

impl ReaderGuard<'_> {
    /// Release explicitly
    pub fn unlock(self) {
        drop(self);
    }
}

impl Drop for ReaderGuard<'_> {
    fn drop(&mut self) {
        self.lock.reader_unlock();
    }
}

/// Exclusive hold on a [`ResourceLock`]; released on drop
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct WriterGuard<'a> {
    lock: &'a ResourceLock,
}

impl WriterGuard<'_> {
    /// Release explicitly
    pub fn unlock(self) {
        drop(self);
    }
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        self.lock.writer_unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::{Duration, Instant};

    /// Spin until `waiting` requests are parked on the lock
    fn wait_for_waiting(lock: &ResourceLock, waiting: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while lock.snapshot().waiting != waiting {
            assert!(Instant::now() < deadline, "timed out: {:?}", lock.snapshot());
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_basic_read_write() {
        let lock = ResourceLock::new(1);
        {
            let _r = lock.reader_lock();
            assert_eq!(lock.snapshot(), LockSnapshot { readers: 1, writer: false, waiting: 0 });
            assert!(lock.try_writer_lock().is_none());
        }
        {
            let _w = lock.writer_lock();
            assert_eq!(lock.snapshot(), LockSnapshot { readers: 0, writer: true, waiting: 0 });
            assert!(lock.try_reader_lock().is_none());
            assert!(lock.try_writer_lock().is_none());
        }
        assert_eq!(lock.snapshot(), LockSnapshot { readers: 0, writer: false, waiting: 0 });
    }

    #[test]
    fn test_zero_batch_clamped() {
        assert_eq!(ResourceLock::new(0).reader_batch(), 1);
    }

    #[test]
    fn test_readers_share_without_writer() {
        const READERS: usize = 16;
        let lock = Arc::new(ResourceLock::new(READERS));
        let all_in = Arc::new(Barrier::new(READERS));

        let handles: Vec<_> = (0..READERS)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let all_in = Arc::clone(&all_in);
                thread::spawn(move || {
                    let _g = lock.reader_lock();
                    // Deadlocks unless every reader holds the lock at once.
                    all_in.wait();
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(lock.snapshot().readers, 0);
    }

    #[test]
    fn test_writer_blocks_until_readers_leave() {
        let lock = Arc::new(ResourceLock::new(1));
        let r = lock.reader_lock();

        let writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let _w = lock.writer_lock();
                lock.snapshot()
            })
        };

        wait_for_waiting(&lock, 1);
        assert!(!writer.is_finished());
        r.unlock();

        let seen = writer.join().unwrap();
        assert!(seen.writer);
        assert_eq!(seen.readers, 0);
    }

    #[test]
    fn test_reader_waits_behind_older_writer() {
        let lock = Arc::new(ResourceLock::new(4));
        let order = Arc::new(Mutex::new(Vec::new()));
        let r1 = lock.reader_lock();

        let writer = {
            let lock = Arc::clone(&lock);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                let _w = lock.writer_lock();
                order.lock().push("W");
                thread::sleep(Duration::from_millis(20));
            })
        };
        wait_for_waiting(&lock, 1);

        // Room in the batch, but the writer arrived first.
        assert!(lock.try_reader_lock().is_none());
        assert_eq!(lock.snapshot(), LockSnapshot { readers: 1, writer: false, waiting: 1 });

        let reader = {
            let lock = Arc::clone(&lock);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                let _r = lock.reader_lock();
                order.lock().push("R2");
            })
        };
        wait_for_waiting(&lock, 2);

        r1.unlock();
        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(*order.lock(), vec!["W", "R2"]);
        assert_eq!(lock.snapshot(), LockSnapshot { readers: 0, writer: false, waiting: 0 });
    }

    #[test]
    fn test_consecutive_readers_capped_by_batch() {
        let lock = ResourceLock::new(2);
        let r1 = lock.try_reader_lock();
        let r2 = lock.try_reader_lock();
        assert!(r1.is_some() && r2.is_some());
        assert!(lock.try_reader_lock().is_none());

        drop(r1);
        assert!(lock.try_reader_lock().is_some());
        drop(r2);
    }

    #[test]
    fn test_readers_queued_behind_writer_share_once_it_leaves() {
        let lock = Arc::new(ResourceLock::new(2));
        let w = lock.writer_lock();
        let both_in = Arc::new(Barrier::new(2));

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let both_in = Arc::clone(&both_in);
                thread::spawn(move || {
                    let _r = lock.reader_lock();
                    // Deadlocks unless both readers are admitted together.
                    both_in.wait();
                })
            })
            .collect();
        wait_for_waiting(&lock, 2);

        w.unlock();
        for h in readers {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_writer_granted_under_reader_stream() {
        // Readers keep arriving and overlapping; the writer must still get in.
        let lock = Arc::new(ResourceLock::new(3));
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let readers: Vec<_> = (0..6)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        let _g = lock.reader_lock();
                        thread::sleep(Duration::from_micros(200));
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        for _ in 0..20 {
            let _w = lock.writer_lock();
        }
        stop.store(true, Ordering::Relaxed);
        for h in readers {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_arrival_order_after_writer() {
        // W1 holds; R then W2 arrive. R is older, so it goes before W2.
        let lock = Arc::new(ResourceLock::new(1));
        let order = Arc::new(Mutex::new(Vec::new()));
        let w1 = lock.writer_lock();

        let reader = {
            let lock = Arc::clone(&lock);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                let _g = lock.reader_lock();
                order.lock().push("R");
                thread::sleep(Duration::from_millis(20));
            })
        };
        wait_for_waiting(&lock, 1);

        let writer = {
            let lock = Arc::clone(&lock);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                let _g = lock.writer_lock();
                order.lock().push("W2");
            })
        };
        wait_for_waiting(&lock, 2);

        w1.unlock();
        reader.join().unwrap();
        writer.join().unwrap();
        assert_eq!(*order.lock(), vec!["R", "W2"]);
    }

    #[test]
    fn test_mutual_exclusion_stress() {
        let lock = Arc::new(ResourceLock::new(2));
        let readers_in = Arc::new(AtomicUsize::new(0));
        let writers_in = Arc::new(AtomicUsize::new(0));
        let writes = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for t in 0..8 {
            let lock = Arc::clone(&lock);
            let readers_in = Arc::clone(&readers_in);
            let writers_in = Arc::clone(&writers_in);
            let writes = Arc::clone(&writes);
            handles.push(thread::spawn(move || {
                for i in 0..300 {
                    if (t + i) % 4 == 0 {
                        let _w = lock.writer_lock();
                        assert_eq!(writers_in.fetch_add(1, Ordering::SeqCst), 0);
                        assert_eq!(readers_in.load(Ordering::SeqCst), 0);
                        writes.fetch_add(1, Ordering::SeqCst);
                        writers_in.fetch_sub(1, Ordering::SeqCst);
                    } else {
                        let _r = lock.reader_lock();
                        readers_in.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(writers_in.load(Ordering::SeqCst), 0);
                        readers_in.fetch_sub(1, Ordering::SeqCst);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(writes.load(Ordering::SeqCst), 8 * 300 / 4);
        assert_eq!(lock.snapshot(), LockSnapshot { readers: 0, writer: false, waiting: 0 });
    }

    #[test]
    fn test_guard_released_on_panic() {
        let lock = Arc::new(ResourceLock::new(1));
        let result = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let _w = lock.writer_lock();
                panic!("handler blew up");
            })
            .join()
        };
        assert!(result.is_err());
        assert!(lock.try_writer_lock().is_some());
    }
}
