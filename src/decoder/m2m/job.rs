// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decode jobs and their completion.
//!
//! A job ends either with the completion interrupt of the hardware or with its watchdog expiring.
//! Both paths race to complete the same [`JobCompletion`], and only the first one has an effect.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;

use crate::decoder::m2m::queue::BufferState;
use crate::decoder::m2m::M2mError;

/// How a job ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    /// The hardware reported a successful decode.
    Done,
    /// The hardware reported an error.
    Error,
    /// The hardware did not report anything before the watchdog expired.
    Timeout,
}

impl JobOutcome {
    /// State in which the buffers of the job are returned to the client.
    pub fn buffer_state(self) -> BufferState {
        match self {
            JobOutcome::Done => BufferState::Done,
            JobOutcome::Error | JobOutcome::Timeout => BufferState::Error,
        }
    }
}

/// Single-assignment completion slot of a job.
#[derive(Debug, Default)]
pub struct JobCompletion {
    completed: AtomicBool,
    outcome: Mutex<Option<JobOutcome>>,
    cond: Condvar,
}

impl JobCompletion {
    pub fn new() -> Self {
        Default::default()
    }

    /// Completes the job with `outcome`. Returns `false` if it was already completed, in which
    /// case nothing happens.
    pub fn complete(&self, outcome: JobOutcome) -> bool {
        if self
            .completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("job already completed, ignoring {:?}", outcome);
            return false;
        }

        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
        self.cond.notify_all();

        true
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Returns the outcome of the job if it has completed.
    pub fn outcome(&self) -> Option<JobOutcome> {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for the job to complete, for at most `timeout` if specified.
    pub fn wait(&self, timeout: Option<Duration>) -> Option<JobOutcome> {
        let outcome = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);

        match timeout {
            None => *self
                .cond
                .wait_while(outcome, |o| o.is_none())
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                *self
                    .cond
                    .wait_timeout_while(outcome, timeout, |o| o.is_none())
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        }
    }
}

/// Timer running a callback if it is not cancelled in time.
#[derive(Debug)]
pub struct Watchdog {
    cancel: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl Watchdog {
    /// Arms a watchdog calling `on_timeout` after `timeout`.
    pub fn arm<F>(timeout: Duration, on_timeout: F) -> Result<Self, M2mError>
    where
        F: FnOnce() + Send + 'static,
    {
        let (cancel, cancelled) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("hantro-watchdog".into())
            .spawn(move || {
                if let Err(mpsc::RecvTimeoutError::Timeout) = cancelled.recv_timeout(timeout) {
                    on_timeout();
                }
            })
            .context("while spawning watchdog thread")?;

        Ok(Self { cancel, thread })
    }

    /// Cancels the watchdog and waits for its thread to exit. Must not be called from the
    /// watchdog callback.
    pub fn cancel(self) {
        drop(self.cancel);
        if self.thread.join().is_err() {
            log::warn!("watchdog thread panicked");
        }
    }
}

/// A decode job: a source and a destination buffer being processed together.
#[derive(Debug)]
pub struct Job {
    pub src: usize,
    pub dst: usize,
    pub completion: Arc<JobCompletion>,
}
