//! Purpose: Per-instance diagnostic context owning the logger registration.
//! Exports: `Context`, `LogSink`.
//! Role: The one place library internals hand messages to caller-supplied sinks.
//! Invariants: At most one sink per context; replacing releases the prior sink first.
//! Invariants: Messages without a sink are discarded, never buffered.

/// Caller-supplied message sink. Receives each message exactly once,
/// synchronously, on the emitting thread.
pub type LogSink = Box<dyn Fn(&[u8]) + Send>;

pub struct Context {
    sink: Option<LogSink>,
}

impl Context {
    pub fn new() -> Self {
        Self { sink: None }
    }

    /// Installs a sink, or clears it with `None`. The previous sink is
    /// dropped before the replacement is installed.
    pub fn set_sink(&mut self, sink: Option<LogSink>) {
        let prior = self.sink.take();
        drop(prior);
        self.sink = sink;
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Dispatches one message to the registered sink, if any. The bytes are
    /// length-delimited and not NUL-terminated.
    pub fn emit(&self, message: &str) {
        tracing::debug!(target: "siderite::context", message);
        if let Some(sink) = &self.sink {
            sink(message.as_bytes());
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
