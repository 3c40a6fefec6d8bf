//! SSE stream sessions
//!
//! A `StreamSession` bridges one long-lived SSE response to one bus
//! subscription. It emits a `connection.established` frame, then waits
//! cooperatively on the subscription queue, a heartbeat timer and the
//! connection's lifetime; any of client-gone, queue-closed or process
//! shutdown ends the loop, and dropping the subscription unsubscribes it.

use crate::domain::{Event, EventType};
use crate::infra::Subscription;
use bytes::Bytes;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Duration, Instant};
use tracing::debug;

/// Event types forwarded on location-tracking streams
pub const LOCATION_EVENTS: &[EventType] = &[
    EventType::LocationUpdated,
    EventType::GeofenceArrived,
    EventType::TrackingStarted,
    EventType::TrackingStopped,
];

/// Format one event as an SSE frame
pub fn event_frame(event: &Event) -> Bytes {
    Bytes::from(format!("event: {}\ndata: {}\n\n", event.event_type, event.data_json()))
}

/// Keep-alive comment frame, no payload
pub fn heartbeat_frame() -> Bytes {
    Bytes::from_static(b": heartbeat\n\n")
}

/// One outbound streaming connection bound to a bus subscription
pub struct StreamSession {
    sub: Subscription,
    out: mpsc::Sender<Bytes>,
    heartbeat: Duration,
    /// Allow-list of forwarded event types; `None` forwards everything
    filter: Option<&'static [EventType]>,
}

impl StreamSession {
    pub fn new(
        sub: Subscription,
        out: mpsc::Sender<Bytes>,
        heartbeat: Duration,
        filter: Option<&'static [EventType]>,
    ) -> Self {
        Self { sub, out, heartbeat, filter }
    }

    fn wants(&self, event_type: EventType) -> bool {
        match self.filter {
            Some(allowed) => allowed.contains(&event_type),
            None => true,
        }
    }

    /// Drive the session until the connection or the process goes away.
    ///
    /// The subscription is dropped on return, which unsubscribes it from
    /// the bus exactly once regardless of how the loop ended.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let audience = self.sub.audience();
        let scope = self.sub.scope().to_string();

        let hello = Event::new(
            EventType::ConnectionEstablished,
            json!({
                "audience": audience.as_str(),
                "scope": scope,
            }),
        );
        if self.out.send(event_frame(&hello)).await.is_err() {
            return;
        }

        let mut heartbeat = interval_at(Instant::now() + self.heartbeat, self.heartbeat);

        loop {
            tokio::select! {
                event = self.sub.recv() => {
                    match event {
                        Some(event) => {
                            if self.wants(event.event_type)
                                && self.out.send(event_frame(&event)).await.is_err()
                            {
                                break;
                            }
                        }
                        // Bus side torn down
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    if self.out.send(heartbeat_frame()).await.is_err() {
                        break;
                    }
                }
                // Client disconnected: hyper dropped the response body
                _ = self.out.closed() => break,
                changed = shutdown.changed() => {
                    // A closed shutdown channel counts as shutdown
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!(audience = %audience.as_str(), scope = %scope, "stream_session_closed");
    }
}
