//! Timed turn-off tasks owned by a session.
//!
//! Each task sleeps on a channel until its deadline, then runs its action.
//! Sending on the channel (or dropping the sender) wakes it early; the
//! action runs either way, so an expedited timer still turns its LEDs off.

use crate::error::{Error, Result};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

struct TimerTask {
    wake: Sender<()>,
    handle: JoinHandle<()>,
}

/// Bounded set of outstanding timer tasks.
pub(crate) struct TimerSet {
    tasks: Vec<TimerTask>,
    limit: usize,
    /// Make the next spawn fail.
    #[cfg(test)]
    pub(crate) fail_spawn: bool,
}

impl TimerSet {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            tasks: Vec::new(),
            limit,
            #[cfg(test)]
            fail_spawn: false,
        }
    }

    /// Number of tasks that have not been joined yet.
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Join tasks whose action already ran.
    pub(crate) fn reap(&mut self) {
        let (done, pending): (Vec<_>, Vec<_>) = self
            .tasks
            .drain(..)
            .partition(|task| task.handle.is_finished());
        self.tasks = pending;
        for task in done {
            join(task);
        }
    }

    /// Reap, then fail if no slot is free for another task.
    pub(crate) fn ensure_capacity(&mut self) -> Result<()> {
        self.reap();
        if self.tasks.len() >= self.limit {
            return Err(Error::TimerLimit { limit: self.limit });
        }
        Ok(())
    }

    /// Run `action` on a background thread after `delay`.
    pub(crate) fn schedule<F>(&mut self, delay: Duration, action: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_capacity()?;
        if self.refuse_spawn() {
            return Err(Error::TimerSpawn(std::io::Error::new(
                std::io::ErrorKind::Other,
                "spawn refused",
            )));
        }

        let (wake, sleeper) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("beacon-timer".into())
            .spawn(move || {
                match sleeper.recv_timeout(delay) {
                    Err(RecvTimeoutError::Timeout) => debug!("timer deadline reached"),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => debug!("timer expedited"),
                }
                action();
            })
            .map_err(Error::TimerSpawn)?;

        self.tasks.push(TimerTask { wake, handle });
        debug!(pending = self.tasks.len(), delay_ms = delay.as_millis() as u64, "timer scheduled");
        Ok(())
    }

    #[cfg(test)]
    fn refuse_spawn(&mut self) -> bool {
        std::mem::take(&mut self.fail_spawn)
    }

    #[cfg(not(test))]
    fn refuse_spawn(&mut self) -> bool {
        false
    }

    /// Wait for every task to run its action at its own deadline.
    pub(crate) fn join_all(&mut self) {
        for task in self.tasks.drain(..) {
            join(task);
        }
    }

    /// Wake every task now, then wait for all of them.
    pub(crate) fn expedite_all(&mut self) {
        for task in &self.tasks {
            // A finished task has dropped its receiver.
            let _ = task.wake.send(());
        }
        self.join_all();
    }
}

fn join(task: TimerTask) {
    if task.handle.join().is_err() {
        warn!("timer task panicked");
    }
}
