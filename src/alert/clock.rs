//! Tick sources for the countdown.
//!
//! The controller never sleeps on its own. It asks a [`Clock`] for a
//! [`TickSource`] when a session starts and awaits one tick per second from
//! it, so hosts use [`IntervalClock`] and tests can drive the countdown
//! by hand with [`ManualClock`].

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    sync::{mpsc, oneshot},
    time::{self, Instant, Interval, MissedTickBehavior},
};

#[async_trait]
pub trait TickSource: Send {
    /// Resolves once per period. The first tick arrives one full period after
    /// the source was created, never immediately.
    async fn tick(&mut self);
}

pub trait Clock: Send + Sync {
    fn ticker(&self, period: Duration) -> Box<dyn TickSource>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IntervalClock;

impl Clock for IntervalClock {
    fn ticker(&self, period: Duration) -> Box<dyn TickSource> {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Box::new(IntervalTicks(interval))
    }
}

struct IntervalTicks(Interval);

#[async_trait]
impl TickSource for IntervalTicks {
    async fn tick(&mut self) {
        self.0.tick().await;
    }
}

type TickRequest = oneshot::Sender<()>;

/// Clock advanced explicitly by the caller.
///
/// Each [`ManualClock::advance`] hands one tick to the most recently created
/// ticker and resolves only once the countdown has finished handling it:
/// either the ticker asked for its next tick or it was dropped.
#[derive(Clone, Default)]
pub struct ManualClock {
    current: Arc<Mutex<Option<mpsc::UnboundedSender<TickRequest>>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when no ticker is listening.
    pub async fn advance(&self) -> bool {
        let sender = {
            let guard = self.current.lock().unwrap_or_else(|p| p.into_inner());
            guard.clone()
        };
        let Some(sender) = sender else {
            return false;
        };

        let (done_tx, done_rx) = oneshot::channel();
        if sender.send(done_tx).is_err() {
            return false;
        }
        // An Err here means the ticker went away mid-tick, which still counts
        // as handled.
        let _ = done_rx.await;
        true
    }

    pub async fn advance_by(&self, ticks: u32) -> u32 {
        let mut delivered = 0;
        for _ in 0..ticks {
            if !self.advance().await {
                break;
            }
            delivered += 1;
        }
        delivered
    }
}

impl Clock for ManualClock {
    fn ticker(&self, _period: Duration) -> Box<dyn TickSource> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = Some(tx);
        Box::new(ManualTicks {
            requests: rx,
            in_progress: None,
        })
    }
}

struct ManualTicks {
    requests: mpsc::UnboundedReceiver<TickRequest>,
    in_progress: Option<TickRequest>,
}

#[async_trait]
impl TickSource for ManualTicks {
    async fn tick(&mut self) {
        if let Some(done) = self.in_progress.take() {
            let _ = done.send(());
        }
        match self.requests.recv().await {
            Some(done) => self.in_progress = Some(done),
            // Clock dropped: never tick again.
            None => std::future::pending::<()>().await,
        }
    }
}

impl Drop for ManualTicks {
    fn drop(&mut self) {
        if let Some(done) = self.in_progress.take() {
            let _ = done.send(());
        }
    }
}
