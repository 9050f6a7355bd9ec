//! Controller-side counterpart of the module's telemetry relay.
//!
//! Frames arrive on the channel reader thread. State and ring live under one mutex; callbacks and
//! subscriber sends happen after it is released.

use crossbeam::channel::{unbounded, Receiver, Sender};
use log::debug;
use shared::constants::{DEFAULT_RECENT_EVENTS, EVENT_RING_CAPACITY};
use shared::protocol::TelemetryFrame;
use shared::telemetry::{EventRing, GameEvent, GameState};
use std::sync::{Arc, Mutex, MutexGuard};

type StateCallback = Arc<dyn Fn(&GameState) + Send + Sync>;
type EventCallback = Arc<dyn Fn(&GameEvent) + Send + Sync>;

/// Result of one host-side poll.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryPoll {
    pub state: GameState,
    /// Events that arrived since the previous poll, oldest first.
    pub events: Vec<GameEvent>,
    /// At least one state frame arrived since the previous poll.
    pub state_changed: bool,
}

struct Inner {
    state: GameState,
    recent: EventRing,
    unpolled: EventRing,
    state_changed: bool,
}

pub struct TelemetryHub {
    inner: Mutex<Inner>,
    on_state: Mutex<Option<StateCallback>>,
    on_event: Mutex<Option<EventCallback>>,
    subscribers: Mutex<Vec<Sender<TelemetryFrame>>>,
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(EVENT_RING_CAPACITY)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl TelemetryHub {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: GameState::default(),
                recent: EventRing::with_capacity(event_capacity),
                unpolled: EventRing::with_capacity(event_capacity),
                state_changed: false,
            }),
            on_state: Mutex::new(None),
            on_event: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Invoked once per state frame with the updated snapshot, from the channel reader thread.
    pub fn on_state<F>(&self, f: F)
    where
        F: Fn(&GameState) + Send + Sync + 'static,
    {
        *lock(&self.on_state) = Some(Arc::new(f));
    }

    /// Invoked once per event, from the channel reader thread.
    pub fn on_event<F>(&self, f: F)
    where
        F: Fn(&GameEvent) + Send + Sync + 'static,
    {
        *lock(&self.on_event) = Some(Arc::new(f));
    }

    /// Every frame, in arrival order, for consumers with their own thread.
    pub fn subscribe(&self) -> Receiver<TelemetryFrame> {
        let (tx, rx) = unbounded();
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Parses one channel line. Returns false for lines that are neither state nor event.
    pub fn ingest_line(&self, line: &str) -> bool {
        match TelemetryFrame::parse(line) {
            Some(frame) => {
                self.ingest(frame);
                true
            }
            None => {
                debug!("ignoring channel line: {line}");
                false
            }
        }
    }

    pub fn ingest(&self, frame: TelemetryFrame) {
        match &frame {
            TelemetryFrame::State(update) => {
                let snapshot = {
                    let mut inner = lock(&self.inner);
                    inner.state.apply(update);
                    inner.state_changed = true;
                    inner.state.clone()
                };
                let cb = lock(&self.on_state).clone();
                if let Some(cb) = cb {
                    cb(&snapshot);
                }
            }
            TelemetryFrame::Event(event) => {
                let mut event = event.clone();
                if event.timestamp == 0 {
                    event.timestamp = chrono::Utc::now().timestamp_millis().max(0) as u64;
                }
                {
                    let mut inner = lock(&self.inner);
                    inner.recent.push(event.clone());
                    inner.unpolled.push(event.clone());
                }
                let cb = lock(&self.on_event).clone();
                if let Some(cb) = cb {
                    cb(&event);
                }
            }
        }

        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| tx.send(frame.clone()).is_ok());
    }

    pub fn state(&self) -> GameState {
        lock(&self.inner).state.clone()
    }

    /// Up to `max` most recent events, newest last.
    pub fn recent_events(&self, max: usize) -> Vec<GameEvent> {
        lock(&self.inner).recent.recent(max)
    }

    pub fn recent_events_default(&self) -> Vec<GameEvent> {
        self.recent_events(DEFAULT_RECENT_EVENTS)
    }

    pub fn event_count(&self) -> usize {
        lock(&self.inner).recent.len()
    }

    /// Once-per-frame host call.
    pub fn poll(&self) -> TelemetryPoll {
        let mut inner = lock(&self.inner);
        let events = inner.unpolled.recent(usize::MAX);
        inner.unpolled.clear();
        let state_changed = std::mem::take(&mut inner.state_changed);
        TelemetryPoll { state: inner.state.clone(), events, state_changed }
    }

    /// Forgets state and events, e.g. after the target process went away.
    pub fn reset(&self) {
        let mut inner = lock(&self.inner);
        inner.state = GameState::default();
        inner.recent.clear();
        inner.unpolled.clear();
        inner.state_changed = false;
    }
}
