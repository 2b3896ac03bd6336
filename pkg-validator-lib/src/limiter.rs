//! Bounded parallelism for outbound work.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

const LOG_TARGET: &str = "   limiter";

/// Minimum extension required for a new pause to override an active one, so
/// tasks that all saw the same rate-limit reset don't each restart the pause.
const MIN_PAUSE_EXTENSION: Duration = Duration::from_secs(1);

/// A counting gate that admits at most `max_concurrent` operations at a time.
///
/// [`acquire`](Self::acquire) suspends the calling task (never the thread) until a
/// slot is free; dropping the returned [`Permit`] releases it. Any task can also
/// [`pause_for`](Self::pause_for) a while to stop new work from being admitted, which
/// is how a rate-limit hit in one task holds back all the others.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
    paused: AtomicBool,
    resume: Notify,
    resume_at: Mutex<Option<Instant>>,
}

/// A slot in a [`ConcurrencyLimiter`], released when dropped.
#[derive(Debug)]
pub struct Permit(#[expect(dead_code, reason = "held only for its drop")] OwnedSemaphorePermit);

impl Permit {
    /// Give the slot back early.
    pub fn release(self) {
        drop(self);
    }
}

impl ConcurrencyLimiter {
    /// A limiter admitting `max_concurrent` operations; zero is treated as one.
    #[must_use]
    pub fn new(max_concurrent: usize) -> Arc<Self> {
        let max_concurrent = max_concurrent.max(1);
        Arc::new(Self {
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            paused: AtomicBool::new(false),
            resume: Notify::new(),
            resume_at: Mutex::new(None),
        })
    }

    /// Wait until unpaused and a slot is free, then take it.
    pub async fn acquire(&self) -> Permit {
        loop {
            // Register interest before checking the flag so a resume in between isn't lost
            let resumed = self.resume.notified();
            if self.paused.load(Ordering::Acquire) {
                resumed.await;
                continue;
            }

            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .expect("semaphore is never closed");
            return Permit(permit);
        }
    }

    #[must_use]
    pub const fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of permits currently held.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Stop admitting new work for `duration`, then resume automatically.
    ///
    /// Work already admitted keeps running. Returns `false` without changing
    /// anything if a pause ending at about the same time or later is already active.
    pub fn pause_for(self: &Arc<Self>, duration: Duration) -> bool {
        let new_resume_at = Instant::now() + duration;

        {
            let mut guard = self.resume_at.lock().expect("lock poisoned");
            if guard.is_some_and(|existing| existing + MIN_PAUSE_EXTENSION >= new_resume_at) {
                return false;
            }
            *guard = Some(new_resume_at);
        }

        log::debug!(target: LOG_TARGET, "Pausing new work for {}s", duration.as_secs());
        self.paused.store(true, Ordering::Release);

        let this = Arc::clone(self);
        drop(tokio::spawn(async move {
            tokio::time::sleep(duration).await;

            let should_resume = {
                let mut guard = this.resume_at.lock().expect("lock poisoned");
                if guard.is_some_and(|t| Instant::now() >= t) {
                    *guard = None;
                    true
                } else {
                    // a longer pause was scheduled after ours
                    false
                }
            };

            if should_resume {
                this.paused.store(false, Ordering::Release);
                this.resume.notify_waiters();
                log::debug!(target: LOG_TARGET, "Resuming work");
            }
        }));

        true
    }
}
