//! Background re-validation of the session.
//!
//! The watchdog runs `SessionManager::check_token_validity`:
//! - periodically, while the console is visible and a session exists
//! - when the console becomes visible after being hidden for a while
//! - when the console regains focus after a period without activity
//!
//! Frontends feed visibility, focus and interaction events through an
//! `ActivitySender`; the watchdog owns the activity bookkeeping.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::SessionTimings;

use super::SessionManager;

/// Events beyond this are dropped rather than blocking the UI thread
const ACTIVITY_CHANNEL_SIZE: usize = 64;

/// Something the user or the windowing environment did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    /// The console was shown (`true`) or hidden (`false`)
    Visibility(bool),
    /// The console window regained focus
    Focus,
    /// Keypress, click or scroll
    Interaction,
}

/// Tracks the last activity and how long the console has been hidden.
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    last_activity: Instant,
    hidden_since: Option<Instant>,
    visibility_threshold: Duration,
    idle_threshold: Duration,
}

impl ActivityTracker {
    pub fn new(now: Instant, timings: &SessionTimings) -> Self {
        Self {
            last_activity: now,
            hidden_since: None,
            visibility_threshold: timings.visibility_threshold(),
            idle_threshold: timings.idle_focus_threshold(),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.hidden_since.is_none()
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Record an event. Returns true when the session should be
    /// re-validated because of it.
    pub fn record(&mut self, event: ActivityEvent, now: Instant) -> bool {
        match event {
            ActivityEvent::Interaction => {
                self.last_activity = now;
                false
            }
            ActivityEvent::Visibility(false) => {
                if self.hidden_since.is_none() {
                    self.hidden_since = Some(now);
                }
                self.last_activity = now;
                false
            }
            ActivityEvent::Visibility(true) => {
                let hidden_for = self
                    .hidden_since
                    .take()
                    .map(|since| now.saturating_duration_since(since));
                self.last_activity = now;
                hidden_for.is_some_and(|hidden| hidden > self.visibility_threshold)
            }
            ActivityEvent::Focus => {
                let idle = now.saturating_duration_since(self.last_activity);
                self.last_activity = now;
                idle > self.idle_threshold
            }
        }
    }
}

/// Cloneable sender for activity events.
#[derive(Debug, Clone)]
pub struct ActivitySender {
    tx: mpsc::Sender<ActivityEvent>,
}

impl ActivitySender {
    pub fn notify(&self, event: ActivityEvent) {
        if let Err(e) = self.tx.try_send(event) {
            debug!(?event, error = %e, "Dropped activity event");
        }
    }
}

/// Handle to a running watchdog. Dropping it stops the task.
#[derive(Debug)]
pub struct WatchdogHandle {
    events: ActivitySender,
    task: Option<JoinHandle<()>>,
}

impl WatchdogHandle {
    pub fn notify(&self, event: ActivityEvent) {
        self.events.notify(event);
    }

    pub fn sender(&self) -> ActivitySender {
        self.events.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the watchdog and wait for the task to wind down
    pub async fn dispose(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(error = %e, "Session watchdog panicked");
                }
            }
            debug!("Session watchdog stopped");
        }
    }
}

impl Drop for WatchdogHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub(crate) fn spawn(manager: SessionManager) -> WatchdogHandle {
    let (tx, rx) = mpsc::channel(ACTIVITY_CHANNEL_SIZE);
    let task = tokio::spawn(run(manager, rx));
    WatchdogHandle {
        events: ActivitySender { tx },
        task: Some(task),
    }
}

async fn run(manager: SessionManager, mut events: mpsc::Receiver<ActivityEvent>) {
    let timings = manager.timings().clone();
    let period = timings.poll_interval();
    let mut tracker = ActivityTracker::new(Instant::now(), &timings);

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(poll_secs = period.as_secs(), "Session watchdog started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if tracker.is_visible() && manager.has_session() {
                    debug!("Periodic session check");
                    manager.check_token_validity().await;
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("Activity channel closed");
                    break;
                };
                if tracker.record(event, Instant::now()) && manager.has_session() {
                    debug!(?event, "Session check after inactivity");
                    manager.check_token_validity().await;
                }
            }
        }
    }
}
