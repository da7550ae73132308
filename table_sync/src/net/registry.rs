//! Message-type keyed subscriber registry.
//!
//! Any number of independent handlers may listen to one message type.
//! Handlers run in insertion order, but a failing handler (an `Err` return
//! or a panic) is logged and skipped; the remaining handlers still run.

use log::{error, warn};
use std::{
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
};
use thiserror::Error;

use super::{
    envelope::Envelope,
    messages::{MessageKind, ServerMessage},
};

/// Identifies one registered handler so it can be removed again.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct HandlerId(u64);

/// A handler invoked with each inbound envelope of its message type.
pub type Handler = Box<dyn FnMut(&Envelope<ServerMessage>) -> anyhow::Result<()> + Send>;

/// A handler that failed while processing one envelope.
#[derive(Debug, Error)]
#[error("handler {handler:?} for '{kind}' failed: {reason}")]
pub struct HandlerError {
    pub kind: MessageKind,
    pub handler: HandlerId,
    pub reason: String,
}

/// Outcome of dispatching one envelope.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failures: Vec<HandlerError>,
}

#[derive(Default)]
pub struct EventRegistry {
    next_id: u64,
    handlers: HashMap<MessageKind, Vec<(HandlerId, Handler)>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one message type.
    pub fn on<F>(&mut self, kind: MessageKind, handler: F) -> HandlerId
    where
        F: FnMut(&Envelope<ServerMessage>) -> anyhow::Result<()> + Send + 'static,
    {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Remove one handler, or every handler for `kind` when `handler` is
    /// `None`. Returns how many handlers were removed.
    pub fn off(&mut self, kind: MessageKind, handler: Option<HandlerId>) -> usize {
        match handler {
            None => self.handlers.remove(&kind).map_or(0, |removed| removed.len()),
            Some(id) => {
                let Some(handlers) = self.handlers.get_mut(&kind) else {
                    return 0;
                };
                let before = handlers.len();
                handlers.retain(|(existing, _)| *existing != id);
                let removed = before - handlers.len();
                if handlers.is_empty() {
                    self.handlers.remove(&kind);
                }
                removed
            }
        }
    }

    pub fn handler_count(&self, kind: MessageKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver an envelope to every handler registered for its type.
    pub fn dispatch(&mut self, envelope: &Envelope<ServerMessage>) -> DispatchReport {
        let kind = envelope.kind();
        let mut report = DispatchReport::default();
        let Some(handlers) = self.handlers.get_mut(&kind) else {
            return report;
        };

        for (id, handler) in handlers.iter_mut() {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(envelope)));
            let reason = match outcome {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(e)) => {
                    warn!("Handler for '{}' returned an error: {:#}", kind, e);
                    format!("{e:#}")
                }
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "panic".to_string());
                    error!("Handler for '{}' panicked: {}", kind, reason);
                    reason
                }
            };
            report.failures.push(HandlerError {
                kind,
                handler: *id,
                reason,
            });
        }

        report
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> = self
            .handlers
            .iter()
            .map(|(kind, handlers)| (kind.as_str(), handlers.len()))
            .collect();
        f.debug_struct("EventRegistry")
            .field("handlers", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::messages::Heartbeat;
    use std::sync::{Arc, Mutex};

    fn ping() -> Envelope<ServerMessage> {
        Envelope::new(ServerMessage::HeartbeatPing(Heartbeat { seq: 1 }))
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Handler {
        let log = Arc::clone(log);
        Box::new(move |_| {
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    #[test]
    fn test_multiple_handlers_in_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = EventRegistry::new();
        registry.on(MessageKind::HeartbeatPing, recorder(&log, "first"));
        registry.on(MessageKind::HeartbeatPing, recorder(&log, "second"));

        let report = registry.dispatch(&ping());
        assert_eq!(report.delivered, 2);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_dispatch_only_matching_kind() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = EventRegistry::new();
        registry.on(MessageKind::HeartbeatPong, recorder(&log, "pong"));

        let report = registry.dispatch(&ping());
        assert_eq!(report.delivered, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_off_single_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = EventRegistry::new();
        let first = registry.on(MessageKind::HeartbeatPing, recorder(&log, "first"));
        registry.on(MessageKind::HeartbeatPing, recorder(&log, "second"));

        assert_eq!(registry.off(MessageKind::HeartbeatPing, Some(first)), 1);
        registry.dispatch(&ping());
        assert_eq!(*log.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn test_off_all_handlers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = EventRegistry::new();
        registry.on(MessageKind::HeartbeatPing, recorder(&log, "first"));
        registry.on(MessageKind::HeartbeatPing, recorder(&log, "second"));

        assert_eq!(registry.off(MessageKind::HeartbeatPing, None), 2);
        assert_eq!(registry.handler_count(MessageKind::HeartbeatPing), 0);
        registry.dispatch(&ping());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failing_handlers_are_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = EventRegistry::new();
        registry.on(MessageKind::HeartbeatPing, |_| anyhow::bail!("bad payload"));
        registry.on(MessageKind::HeartbeatPing, |_| panic!("handler blew up"));
        registry.on(MessageKind::HeartbeatPing, recorder(&log, "survivor"));

        let report = registry.dispatch(&ping());
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures[0].reason.contains("bad payload"));
        assert!(report.failures[1].reason.contains("handler blew up"));
        assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
    }

    #[test]
    fn test_off_unknown_handler_is_noop() {
        let mut registry = EventRegistry::new();
        let id = registry.on(MessageKind::HeartbeatPing, |_| Ok(()));
        assert_eq!(registry.off(MessageKind::HeartbeatPong, Some(id)), 0);
        assert_eq!(registry.handler_count(MessageKind::HeartbeatPing), 1);
    }
}
