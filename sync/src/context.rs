//! Main-context scheduling.
//!
//! Read-model state must only be touched from one logical execution
//! context. [`MainContext`] makes that constraint concrete: it is a
//! [`Scheduler`] that queues jobs onto an unbounded channel, and a
//! [`MainContextPump`] drains the channel on whatever task the embedder
//! designates as "main". Store commits from background threads and
//! tracker completions are thereby redelivered before they touch
//! controllers, listeners or consumer callbacks.

use std::sync::Arc;
use tokio::sync::mpsc;
use vantage_engine::{Job, Scheduler};

/// Queueing scheduler handing jobs to a [`MainContextPump`].
pub struct MainContext {
    tx: mpsc::UnboundedSender<Job>,
}

impl MainContext {
    /// Create the context and its pump.
    pub fn new() -> (Arc<Self>, MainContextPump) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), MainContextPump { rx })
    }
}

impl Scheduler for MainContext {
    fn schedule(&self, job: Job) {
        // A dropped pump means the main context is gone; jobs are
        // discarded rather than run on the wrong thread.
        let _ = self.tx.send(job);
    }
}

/// Drains and runs scheduled jobs in FIFO order.
pub struct MainContextPump {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl MainContextPump {
    /// Run jobs until every `MainContext` handle is dropped.
    ///
    /// Spawn this (or select on it) from the task that owns read-model
    /// state; jobs may themselves spawn onto the surrounding runtime.
    pub async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            job();
        }
    }

    /// Run currently queued jobs without waiting; returns how many ran.
    ///
    /// Deterministic pumping for tests and render loops.
    pub fn run_until_idle(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }
}
