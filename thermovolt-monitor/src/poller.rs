// Thermovolt Monitor - Change-aware poll loop
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Change-aware poll loop.
//!
//! Each tick fetches the full batch, rebuilds the live view if the batch
//! changed (or reuses the previous one if it did not) and renders it. The loop
//! runs while the shared toggle is on. Switching it off wakes the sleeper, but
//! a tick that has already started always finishes its render first. The
//! toggle can only be switched back on while a loop task is alive.

use crate::metrics::{record_tick, update_view_metrics};
use crate::sink::PresentationSink;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thermovolt::{LiveView, PipelineContext, RawBatch, RecordSource};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Shared state of the poll loop.
#[derive(Debug, Default)]
pub struct PollerState {
    /// Toggle. The loop exits at the next tick boundary once this is false.
    pub running: AtomicBool,
    /// Ticks started.
    pub ticks: AtomicU64,
    /// Ticks that rebuilt the view from a changed batch.
    pub refreshes: AtomicU64,
    /// Ticks that reused the previous view.
    pub reuses: AtomicU64,
    /// Ticks whose fetch failed.
    pub failures: AtomicU64,
    /// Last rendered view.
    pub latest: RwLock<Option<LiveView>>,
    /// A loop task is alive.
    active: AtomicBool,
    wake: Notify,
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollerStats {
    pub running: bool,
    pub ticks: u64,
    pub refreshes: u64,
    pub reuses: u64,
    pub failures: u64,
}

impl PollerState {
    /// Current counters.
    pub fn stats(&self) -> PollerStats {
        PollerStats {
            running: self.running.load(Ordering::SeqCst),
            ticks: self.ticks.load(Ordering::SeqCst),
            refreshes: self.refreshes.load(Ordering::SeqCst),
            reuses: self.reuses.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
        }
    }
}

/// Controls a running poller from outside.
#[derive(Debug, Clone)]
pub struct PollerHandle {
    state: Arc<PollerState>,
}

impl PollerHandle {
    /// Flip the toggle and wake a sleeping loop.
    ///
    /// Turning it on after the loop has exited is refused and returns false;
    /// only [`Poller::spawn`] starts a loop.
    pub fn set_running(&self, running: bool) -> bool {
        if !running {
            self.state.running.store(false, Ordering::SeqCst);
            self.state.wake.notify_waiters();
            return true;
        }

        self.state.running.store(true, Ordering::SeqCst);
        // The loop clears `active` before `running` on exit.
        if !self.state.active.load(Ordering::SeqCst) {
            self.state.running.store(false, Ordering::SeqCst);
            warn!("poller is not running; spawn it to start polling");
            return false;
        }
        true
    }

    /// Toggle state.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Shared state.
    pub fn state(&self) -> Arc<PollerState> {
        Arc::clone(&self.state)
    }
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Batch changed (or first tick); view rebuilt and rendered.
    Refreshed,
    /// Batch unchanged; previous view rendered again.
    Reused,
    /// Fetch failed; nothing rendered, previous render stays.
    FetchFailed,
}

impl TickOutcome {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            TickOutcome::Refreshed => "refreshed",
            TickOutcome::Reused => "reused",
            TickOutcome::FetchFailed => "fetch_failed",
        }
    }
}

struct LastBatch {
    fingerprint: u64,
    batch: RawBatch,
    view: LiveView,
}

type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Poll loop over one source and one sink.
pub struct Poller {
    context: Arc<PipelineContext>,
    source: Arc<dyn RecordSource>,
    sink: Arc<dyn PresentationSink>,
    state: Arc<PollerState>,
    interval: Duration,
    clock: Clock,
    last: Option<LastBatch>,
}

impl Poller {
    /// Create a poller using the context's configured interval.
    pub fn new(
        context: Arc<PipelineContext>,
        source: Arc<dyn RecordSource>,
        sink: Arc<dyn PresentationSink>,
    ) -> Self {
        let interval = context.config().poll_interval();
        Self {
            context,
            source,
            sink,
            state: Arc::new(PollerState::default()),
            interval,
            clock: Arc::new(|| chrono::Local::now().naive_local()),
            last: None,
        }
    }

    /// Override the tick interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override the wall clock used for timestamp rebasing.
    pub fn with_clock(
        mut self,
        clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static,
    ) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Handle sharing this poller's state.
    pub fn handle(&self) -> PollerHandle {
        PollerHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Turn the toggle on and run the loop on a tokio task.
    ///
    /// The task returns the poller once the toggle goes off, so it can be
    /// started again with its last batch intact.
    pub fn spawn(self) -> (PollerHandle, JoinHandle<Poller>) {
        let handle = self.handle();
        self.state.active.store(true, Ordering::SeqCst);
        self.state.running.store(true, Ordering::SeqCst);
        let task = tokio::spawn(async move {
            let mut poller = self;
            poller.run().await;
            poller
        });
        (handle, task)
    }

    /// Run ticks until the toggle is off.
    ///
    /// The first tick always runs, so a loop stopped right after it was
    /// started still renders once.
    pub async fn run(&mut self) {
        info!(
            "polling {} every {:?}",
            self.source.describe(),
            self.interval
        );
        self.state.active.store(true, Ordering::SeqCst);

        loop {
            self.tick().await;

            // Register for the wake-up before checking the toggle so a stop
            // in between is not missed. No permit outlives the loop.
            let wake = self.state.wake.notified();
            tokio::pin!(wake);
            wake.as_mut().enable();

            if !self.state.running.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                _ = sleep(self.interval) => {}
                _ = wake => {
                    debug!("poller woken early");
                }
            }
            if !self.state.running.load(Ordering::SeqCst) {
                break;
            }
        }

        self.state.active.store(false, Ordering::SeqCst);
        self.state.running.store(false, Ordering::SeqCst);
        info!("poller stopped after {} ticks", self.state.ticks.load(Ordering::SeqCst));
    }

    /// One complete fetch, clean, classify and render cycle.
    pub async fn tick(&mut self) -> TickOutcome {
        let started = Instant::now();
        self.state.ticks.fetch_add(1, Ordering::SeqCst);

        let source = Arc::clone(&self.source);
        let fetched = tokio::task::spawn_blocking(move || source.fetch_all_records()).await;

        let batch = match fetched {
            Ok(Ok(batch)) => batch,
            Ok(Err(e)) => return self.fetch_failed(started, &e),
            Err(e) => return self.fetch_failed(started, &e),
        };

        let now = (self.clock)();
        let fingerprint = batch.fingerprint();
        let unchanged = self
            .last
            .as_ref()
            .map(|last| last.fingerprint == fingerprint && last.batch == batch);

        let (outcome, view) = match (unchanged, self.last.take()) {
            (Some(true), Some(last)) => {
                let view = if self.context.config().refresh_timestamps_on_reuse {
                    self.context.restamp(&last.view, now)
                } else {
                    last.view
                };
                self.state.reuses.fetch_add(1, Ordering::SeqCst);
                debug!("batch unchanged ({:016x}), reusing view", fingerprint);
                (TickOutcome::Reused, view)
            }
            _ => {
                let view = self.context.run_live(&batch, now);
                self.state.refreshes.fetch_add(1, Ordering::SeqCst);
                debug!(
                    "batch changed ({:016x}), {} readings",
                    fingerprint,
                    view.len()
                );
                (TickOutcome::Refreshed, view)
            }
        };

        if let Err(e) = self.sink.render_live(&view) {
            warn!("render failed: {}", e);
        }
        update_view_metrics(&view);
        *self.state.latest.write().await = Some(view.clone());

        self.last = Some(LastBatch {
            fingerprint,
            batch,
            view,
        });

        record_tick(outcome.as_str(), started.elapsed().as_secs_f64());
        outcome
    }

    fn fetch_failed(&self, started: Instant, error: &dyn std::fmt::Display) -> TickOutcome {
        self.state.failures.fetch_add(1, Ordering::SeqCst);
        warn!("fetch from {} failed: {}", self.source.describe(), error);
        record_tick(
            TickOutcome::FetchFailed.as_str(),
            started.elapsed().as_secs_f64(),
        );
        TickOutcome::FetchFailed
    }
}
