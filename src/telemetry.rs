//! Telemetry: a span primitive emitting `start`/`stop`/`exception` triples
//! with consistent metadata per subsystem, matching the teacher's
//! `#[instrument]` usage in `crates/ares-vector/src/lib.rs` and
//! `src/rag/*.rs`. Implemented as a thin wrapper over `tracing::Span` plus
//! a counter/event sink trait so the self-correction counters
//! (`rag.self_correct`) have a concrete home.

use std::time::Instant;

use tracing::{event, info_span, Level, Span};

/// Receives span lifecycle events and standalone counters. Two
/// implementations ship, matching the teacher's "text logger + JSON
/// logger" pattern: [`TracingTelemetrySink`] forwards to `tracing`,
/// [`NullTelemetrySink`] is the test default.
pub trait TelemetrySink: Send + Sync {
    fn span_start(&self, name: &str, fields: &[(&str, &str)]);
    fn span_stop(&self, name: &str, duration: std::time::Duration, fields: &[(&str, &str)]);
    fn span_exception(&self, name: &str, error: &str);
    fn counter(&self, name: &str, fields: &[(&str, &str)]);
}

/// Emits `tracing::info_span!`/`tracing::event!` with the field names the
/// specification's telemetry-events table names (`embedder.embed`,
/// `llm.complete`, `vector_store.search`, `rag.rewrite`, `rag.self_correct`,
/// ...).
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn span_start(&self, name: &str, fields: &[(&str, &str)]) {
        let _span = info_span!("span_start", name, fields = ?fields).entered();
        event!(Level::INFO, name, event = "start");
    }

    fn span_stop(&self, name: &str, duration: std::time::Duration, fields: &[(&str, &str)]) {
        event!(
            Level::INFO,
            name,
            event = "stop",
            duration_ms = duration.as_millis() as u64,
            fields = ?fields
        );
    }

    fn span_exception(&self, name: &str, error: &str) {
        event!(Level::WARN, name, event = "exception", error);
    }

    fn counter(&self, name: &str, fields: &[(&str, &str)]) {
        event!(Level::INFO, name, event = "counter", fields = ?fields);
    }
}

/// Discards every event. The default for tests so assertions aren't
/// interleaved with log noise.
#[derive(Default)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {
    fn span_start(&self, _name: &str, _fields: &[(&str, &str)]) {}
    fn span_stop(&self, _name: &str, _duration: std::time::Duration, _fields: &[(&str, &str)]) {}
    fn span_exception(&self, _name: &str, _error: &str) {}
    fn counter(&self, _name: &str, _fields: &[(&str, &str)]) {}
}

/// A started span; call [`Telemetry::stop`] or [`Telemetry::exception`] to
/// close it. Dropping without closing is allowed (no stop event fires) —
/// callers that want unconditional closing should use [`guard`].
pub struct ActiveSpan<'a> {
    sink: &'a dyn TelemetrySink,
    name: String,
    started_at: Instant,
    span: Span,
}

impl<'a> ActiveSpan<'a> {
    pub fn stop(self, fields: &[(&str, &str)]) {
        let _entered = self.span.enter();
        self.sink.span_stop(&self.name, self.started_at.elapsed(), fields);
    }

    pub fn exception(self, error: &str) {
        let _entered = self.span.enter();
        self.sink.span_exception(&self.name, error);
    }
}

/// Entry point for emitting spans against a [`TelemetrySink`].
pub struct Telemetry<'a> {
    sink: &'a dyn TelemetrySink,
}

impl<'a> Telemetry<'a> {
    pub fn new(sink: &'a dyn TelemetrySink) -> Self {
        Self { sink }
    }

    pub fn start(&self, name: &str, fields: &[(&str, &str)]) -> ActiveSpan<'a> {
        self.sink.span_start(name, fields);
        ActiveSpan {
            sink: self.sink,
            name: name.to_string(),
            started_at: Instant::now(),
            span: tracing::Span::current(),
        }
    }

    pub fn counter(&self, name: &str, fields: &[(&str, &str)]) {
        self.sink.counter(name, fields);
    }
}
