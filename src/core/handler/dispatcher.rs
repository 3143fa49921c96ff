// src/core/handler/dispatcher.rs

//! Routes classified messages to the handlers registered for their type.

use super::{HandlerContext, HandlerResult, MessageHandler, RequestMessage};
use crate::core::Jt808Error;
use crate::core::message_type::MessageType;
use crate::core::metrics;
use bytes::Bytes;
use dashmap::DashMap;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, info_span};

/// Holds the ordered handler list for every message type.
#[derive(Default)]
pub struct MessageDispatcher {
    handlers: DashMap<u16, Vec<Arc<dyn MessageHandler>>>,
}

impl fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for entry in self.handlers.iter() {
            map.entry(&format_args!("0x{:04X}", entry.key()), &entry.value().len());
        }
        map.finish()
    }
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the handlers of `message_type`.
    pub fn register(&self, message_type: &MessageType, handler: Arc<dyn MessageHandler>) {
        debug!("Registering handler for {}", message_type);
        self.handlers
            .entry(message_type.id())
            .or_default()
            .push(handler);
    }

    /// Registers a plain closure as a handler.
    pub fn register_fn<F>(&self, message_type: &MessageType, handler: F)
    where
        F: Fn(&RequestMessage, &HandlerContext<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(message_type, Arc::new(handler));
    }

    pub fn handler_count(&self, message_id: u16) -> usize {
        self.handlers.get(&message_id).map_or(0, |e| e.value().len())
    }

    /// Runs every handler for the request's type, in registration order, and
    /// collects their unescaped responses.
    ///
    /// The first handler that errors or panics stops the dispatch; the fault is
    /// returned as [`Jt808Error::HandlerFault`]. Nothing is retried.
    pub async fn dispatch(
        &self,
        request: &RequestMessage,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<Bytes>, Jt808Error> {
        let message_id = request.message_id();
        // Clone the list so no map guard is held while handlers run.
        let handlers = self
            .handlers
            .get(&message_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        if handlers.is_empty() {
            debug!("No handler registered for {}", request.message_type());
            return Ok(Vec::new());
        }

        let span = info_span!(
            "dispatch",
            message_type = %request.message_type(),
            terminal_id = %request.terminal_id(),
            session_id = %ctx.session_id(),
        );

        async move {
            let start_time = Instant::now();
            let mut responses = Vec::new();
            for handler in handlers {
                let outcome = AssertUnwindSafe(handler.handle(request, ctx))
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(Some(response))) => responses.push(response),
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => {
                        return Err(Jt808Error::HandlerFault {
                            message_id,
                            reason: format!("{e:#}"),
                        });
                    }
                    Err(panic) => {
                        return Err(Jt808Error::HandlerFault {
                            message_id,
                            reason: format!("handler panicked: {}", panic_message(&*panic)),
                        });
                    }
                }
            }
            metrics::DISPATCH_LATENCY_SECONDS.observe(start_time.elapsed().as_secs_f64());
            Ok(responses)
        }
        .instrument(span)
        .await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
