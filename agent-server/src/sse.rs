//! Per-task event channels and the Server-Sent Events endpoint.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use agent::io::events::{EventSink, TaskEvent};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Delay between a task's last event and closing its streams, so clients
/// can drain what was already sent.
pub const CLOSE_DELAY: Duration = Duration::from_secs(2);
/// How long a closed task's backlog stays available for replay.
pub const BACKLOG_RETENTION: Duration = Duration::from_secs(60);
const CHANNEL_CAPACITY: usize = 256;
const BACKLOG_LIMIT: usize = 512;

struct TaskChannel {
    /// `None` once the stream is closed; receivers then see `Closed`.
    tx: Option<broadcast::Sender<TaskEvent>>,
    backlog: Vec<TaskEvent>,
    closing: bool,
}

impl TaskChannel {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx: Some(tx),
            backlog: Vec::new(),
            closing: false,
        }
    }
}

type Channels = Arc<Mutex<HashMap<String, TaskChannel>>>;

/// Event sink that fans task events out to SSE subscribers.
///
/// Events are kept in a bounded per-task backlog so a client that connects
/// after the run started (or finished) still sees the whole stream.
pub struct ChannelSink {
    channels: Channels,
    close_delay: Duration,
    retention: Duration,
}

impl Default for ChannelSink {
    fn default() -> Self {
        Self::new(CLOSE_DELAY)
    }
}

impl ChannelSink {
    pub fn new(close_delay: Duration) -> Self {
        Self {
            channels: Arc::default(),
            close_delay,
            retention: BACKLOG_RETENTION,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Backlog so far plus a receiver for what follows, taken atomically.
    /// The receiver is `None` when the task's stream is already closed.
    pub fn subscribe(
        &self,
        task_id: &str,
    ) -> (Vec<TaskEvent>, Option<broadcast::Receiver<TaskEvent>>) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let channel = channels
            .entry(task_id.to_string())
            .or_insert_with(TaskChannel::new);
        let rx = channel.tx.as_ref().map(broadcast::Sender::subscribe);
        (channel.backlog.clone(), rx)
    }
}

fn finish(channels: &Channels, task_id: &str) {
    let mut channels = channels.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(channel) = channels.get_mut(task_id)
        && channel.tx.take().is_some()
    {
        info!(%task_id, "event stream closed");
    }
}

/// Drop a closed task's backlog. The emptied entry stays so later
/// subscribers see a closed stream rather than a fresh open one.
fn release(channels: &Channels, task_id: &str) {
    let mut channels = channels.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(channel) = channels.get_mut(task_id) {
        channel.tx = None;
        debug!(%task_id, dropped = channel.backlog.len(), "event backlog released");
        channel.backlog = Vec::new();
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: TaskEvent) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let channel = channels
            .entry(event.task_id.clone())
            .or_insert_with(TaskChannel::new);
        let Some(tx) = &channel.tx else {
            debug!(task_id = %event.task_id, "event after close dropped");
            return;
        };
        if channel.backlog.len() < BACKLOG_LIMIT {
            channel.backlog.push(event.clone());
        }
        // No subscribers is normal; the backlog still has the event.
        let _ = tx.send(event);
    }

    fn close(&self, task_id: &str) {
        {
            let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(channel) = channels.get_mut(task_id) else {
                return;
            };
            if channel.closing {
                return;
            }
            channel.closing = true;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let channels = Arc::clone(&self.channels);
                let task_id = task_id.to_string();
                let delay = self.close_delay;
                let retention = self.retention;
                if delay.is_zero() {
                    finish(&channels, &task_id);
                }
                handle.spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                        finish(&channels, &task_id);
                    }
                    tokio::time::sleep(retention).await;
                    release(&channels, &task_id);
                });
            }
            Err(_) => finish(&self.channels, task_id),
        }
    }
}

fn log_event(event: &TaskEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event("log").data(json)),
        Err(err) => {
            warn!(%err, "failed to serialize task event");
            None
        }
    }
}

/// GET /api/tasks/{id}/events - live event stream for one task.
///
/// Sends a connection event, replays the backlog, then forwards live events
/// until the task's stream is closed.
pub async fn events_handler(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    if !state.orchestrator.registry().contains(&task_id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let (backlog, rx) = state.sink.subscribe(&task_id);
    debug!(%task_id, replay = backlog.len(), live = rx.is_some(), "event subscriber connected");

    let stream = async_stream::stream! {
        if let Some(event) = log_event(&TaskEvent::connection_established(task_id.clone())) {
            yield Ok(event);
        }
        for event in &backlog {
            if let Some(event) = log_event(event) {
                yield Ok(event);
            }
        }
        if let Some(mut rx) = rx {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Some(event) = log_event(&event) {
                            yield Ok(event);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "SSE client lagged, some events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

#[cfg(test)]
mod tests {
    use agent::io::events::EventKind;

    use super::*;

    fn event(task_id: &str, message: &str) -> TaskEvent {
        TaskEvent::new(EventKind::AnalysisStep, task_id, message)
    }

    #[tokio::test]
    async fn late_subscriber_gets_backlog_then_live_events() {
        let sink = ChannelSink::new(Duration::ZERO);
        sink.emit(event("t-1", "first"));
        let (backlog, rx) = sink.subscribe("t-1");
        assert_eq!(backlog.len(), 1);
        let mut rx = rx.expect("stream open");
        sink.emit(event("t-1", "second"));
        assert_eq!(rx.recv().await.expect("live").message, "second");
    }

    #[tokio::test]
    async fn close_ends_live_stream_and_is_idempotent() {
        let sink = ChannelSink::new(Duration::ZERO);
        sink.emit(event("t-1", "only"));
        let (_, rx) = sink.subscribe("t-1");
        let mut rx = rx.expect("stream open");
        sink.close("t-1");
        sink.close("t-1");
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        let (backlog, rx) = sink.subscribe("t-1");
        assert_eq!(backlog.len(), 1);
        assert!(rx.is_none());
    }

    #[test]
    fn close_without_events_is_a_no_op() {
        let sink = ChannelSink::default();
        sink.close("never-seen");
        sink.close("never-seen");
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_delayed() {
        let sink = ChannelSink::new(CLOSE_DELAY);
        sink.emit(event("t-1", "done"));
        sink.close("t-1");
        assert!(sink.subscribe("t-1").1.is_some());
        tokio::time::sleep(CLOSE_DELAY + Duration::from_millis(10)).await;
        assert!(sink.subscribe("t-1").1.is_none());
    }

    /// Verifies a closed task's backlog is dropped after the retention
    /// period and late subscribers then get a closed, empty stream.
    #[tokio::test(start_paused = true)]
    async fn backlog_is_released_after_retention() {
        let sink = ChannelSink::new(Duration::ZERO).with_retention(Duration::from_secs(5));
        sink.emit(event("t-1", "done"));
        sink.close("t-1");

        let (backlog, rx) = sink.subscribe("t-1");
        assert_eq!(backlog.len(), 1);
        assert!(rx.is_none());

        tokio::time::sleep(Duration::from_secs(6)).await;
        let (backlog, rx) = sink.subscribe("t-1");
        assert!(backlog.is_empty());
        assert!(rx.is_none());

        sink.emit(event("t-1", "straggler"));
        assert!(sink.subscribe("t-1").0.is_empty());
    }

    #[test]
    fn tasks_are_isolated() {
        let sink = ChannelSink::default();
        sink.emit(event("a", "for a"));
        sink.emit(event("b", "for b"));
        let (backlog, _) = sink.subscribe("a");
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].task_id, "a");
    }
}
