use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use log::{debug, error, warn};
use parking_lot::RwLock;

use super::{BusEvent, EventKind, NetworkEvent};

type Handler = Arc<dyn Fn(NetworkEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Publish/subscribe broker with one subscriber list per event kind.
///
/// `publish` runs every handler registered for the event's kind concurrently
/// and returns once all of them completed. A failing or panicking handler is
/// logged and otherwise ignored.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<E, F, Fut>(&self, handler: F)
    where
        E: BusEvent,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |event: NetworkEvent| match E::from_event(event) {
            Some(payload) => handler(payload).boxed(),
            None => future::ok(()).boxed(),
        });

        self.handlers.write().entry(E::KIND).or_default().push(handler);
        debug!("Subscribed handler for {:?}", E::KIND);
    }

    pub async fn publish<E: BusEvent>(&self, event: E) {
        // Snapshot: handlers added while this publish runs do not see the event
        let handlers = self
            .handlers
            .read()
            .get(&E::KIND)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            return;
        }

        let event = event.into_event();
        let runs = handlers.into_iter().enumerate().map(|(index, handler)| {
            let event = event.clone();
            async move {
                let started = std::panic::catch_unwind(AssertUnwindSafe(|| handler(event)));
                let outcome = match started {
                    Ok(run) => AssertUnwindSafe(run).catch_unwind().await,
                    Err(panic) => Err(panic),
                };

                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!("Event handler #{} for {:?} failed: {}", index, E::KIND, e);
                    }
                    Err(_) => {
                        error!("Event handler #{} for {:?} panicked", index, E::KIND);
                    }
                }
            }
        });

        future::join_all(runs).await;
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<EventKind, usize> = self
            .handlers
            .read()
            .iter()
            .map(|(kind, handlers)| (*kind, handlers.len()))
            .collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}
