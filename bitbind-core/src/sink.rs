//! Decode lifecycle observers
//!
//! An [`EventSink`] is told when a codec starts decoding, when it is done and
//! when it failed. Sinks are diagnostics only: a sink that panics aborts the
//! decode it observes.
//!
//! The built-in sinks track nesting depth as plain per-instance state. Use
//! one sink instance per decode session; sharing an instance between decodes
//! running on different threads interleaves their depth updates.

use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(feature = "logging")]
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// How a decoded value is rendered in diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueView {
    /// An integer, in decimal and lower-case hexadecimal
    Integral {
        /// Decimal digits
        decimal: String,
        /// Hexadecimal digits without prefix
        hex: String,
    },
    /// No value
    Absent,
    /// Any other value, already stringified
    Text(String),
}

impl fmt::Display for ValueView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueView::Integral { decimal, hex } => write!(f, "{} (0x{})", decimal, hex),
            ValueView::Absent => f.write_str("null"),
            ValueView::Text(text) => f.write_str(text),
        }
    }
}

/// Values that can be reported to an [`EventSink`]
pub trait Inspect: fmt::Debug {
    /// The rendering of this value; defaults to its `Debug` form
    fn view(&self) -> ValueView {
        ValueView::Text(format!("{:?}", self))
    }
}

macro_rules! inspect_integral {
    ($($ty:ty),*) => {
        $(
            impl Inspect for $ty {
                fn view(&self) -> ValueView {
                    ValueView::Integral {
                        decimal: self.to_string(),
                        hex: format!("{:x}", self),
                    }
                }
            }
        )*
    };
}

inspect_integral!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

macro_rules! inspect_display {
    ($($ty:ty),*) => {
        $(
            impl Inspect for $ty {
                fn view(&self) -> ValueView {
                    ValueView::Text(self.to_string())
                }
            }
        )*
    };
}

inspect_display!(bool, char, String, f32, f64);

impl Inspect for () {}

impl<T: fmt::Debug> Inspect for Vec<T> {}

impl Inspect for bytes::Bytes {}

impl<T: Inspect> Inspect for Option<T> {
    fn view(&self) -> ValueView {
        match self {
            Some(value) => value.view(),
            None => ValueView::Absent,
        }
    }
}

/// Expected number of bits a decode will consume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "i64")]
pub enum ExpectedSize {
    /// Not known before decoding
    Unknown,
    /// Exactly this many bits
    Bits(u64),
}

impl ExpectedSize {
    /// The size as a signed number, `-1` when unknown
    pub const fn as_i64(self) -> i64 {
        match self {
            ExpectedSize::Unknown => -1,
            ExpectedSize::Bits(bits) => bits as i64,
        }
    }

    /// The size in bits, if known
    pub const fn bits(self) -> Option<u64> {
        match self {
            ExpectedSize::Unknown => None,
            ExpectedSize::Bits(bits) => Some(bits),
        }
    }
}

impl From<ExpectedSize> for i64 {
    fn from(size: ExpectedSize) -> Self {
        size.as_i64()
    }
}

/// Receives decode lifecycle events
pub trait EventSink: Send + Sync {
    /// A codec starts decoding at `position`
    fn on_start(&self, codec: &dyn fmt::Display, position: u64, size: ExpectedSize);

    /// A codec decoded `value`, leaving the cursor at `position`
    ///
    /// `bits_read` is the cursor's forward distance from the start position,
    /// clamped to 0 when the codec left the cursor behind where it started.
    fn on_done(&self, codec: &dyn fmt::Display, position: u64, bits_read: u64, value: &dyn Inspect);

    /// The most recently started codec failed
    fn on_failed(&self);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct RendererState<W> {
    out: W,
    depth: usize,
}

impl<W: Write> RendererState<W> {
    fn print(&mut self, message: &str) -> io::Result<()> {
        for _ in 0..self.depth {
            self.out.write_all(b" ")?;
        }
        writeln!(self.out, "{}", message)
    }
}

/// Renders events as indented text, one space per nesting level
///
/// ```text
/// Start decoding at 0 (maximal up to 8) Codec: uint(8)
/// Done decoding at 8 (8 bits) : 255 (0xff) Codec: uint(8)
/// ```
pub struct TextRenderer<W> {
    state: Mutex<RendererState<W>>,
}

impl TextRenderer<io::Stdout> {
    /// Render to standard output
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TextRenderer<W> {
    /// Render to `out`
    pub fn new(out: W) -> Self {
        Self {
            state: Mutex::new(RendererState { out, depth: 0 }),
        }
    }

    /// Current nesting depth
    pub fn depth(&self) -> usize {
        lock(&self.state).depth
    }

    /// Run `f` against the underlying writer
    pub fn with_output<R>(&self, f: impl FnOnce(&W) -> R) -> R {
        f(&lock(&self.state).out)
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .out
    }

    fn report(result: io::Result<()>) {
        // Write errors are logged and dropped.
        if let Err(_e) = result {
            #[cfg(feature = "logging")]
            warn!("Failed to render decode event: {}", _e);
        }
    }
}

impl<W: Write + Send> EventSink for TextRenderer<W> {
    fn on_start(&self, codec: &dyn fmt::Display, position: u64, size: ExpectedSize) {
        let mut state = lock(&self.state);
        let bound = match size.bits() {
            Some(bits) => format!(" (maximal up to {})", position.saturating_add(bits)),
            None => String::new(),
        };
        let message = format!("Start decoding at {}{} Codec: {}", position, bound, codec);
        Self::report(state.print(&message));
        state.depth += 1;
    }

    fn on_done(&self, codec: &dyn fmt::Display, position: u64, bits_read: u64, value: &dyn Inspect) {
        let mut state = lock(&self.state);
        state.depth = state.depth.saturating_sub(1);
        let message = format!(
            "Done decoding at {} ({} bits) : {} Codec: {}",
            position,
            bits_read,
            value.view(),
            codec
        );
        Self::report(state.print(&message).and_then(|_| writeln!(state.out)));
    }

    fn on_failed(&self) {
        let mut state = lock(&self.state);
        state.depth = state.depth.saturating_sub(1);
        Self::report(state.print("Failed decoding."));
    }
}

/// One recorded lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum DecodeEvent {
    /// Decoding started
    Start {
        /// Display name of the codec
        codec: String,
        /// Bit position before decoding
        position: u64,
        /// Expected size, `-1` when unknown
        size: ExpectedSize,
    },
    /// Decoding produced a value
    Done {
        /// Display name of the codec
        codec: String,
        /// Bit position after decoding
        position: u64,
        /// Bits consumed
        bits_read: u64,
        /// Rendered value
        value: String,
    },
    /// Decoding failed
    Failed,
}

/// Lifecycle phase of a [`DecodeEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// See [`DecodeEvent::Start`]
    Start,
    /// See [`DecodeEvent::Done`]
    Done,
    /// See [`DecodeEvent::Failed`]
    Failed,
}

impl DecodeEvent {
    /// The event's phase
    pub fn phase(&self) -> Phase {
        match self {
            DecodeEvent::Start { .. } => Phase::Start,
            DecodeEvent::Done { .. } => Phase::Done,
            DecodeEvent::Failed => Phase::Failed,
        }
    }
}

/// Collects events in arrival order
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DecodeEvent>>,
}

impl RecordingSink {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events so far
    pub fn events(&self) -> Vec<DecodeEvent> {
        lock(&self.events).clone()
    }

    /// Remove and return the events so far
    pub fn take(&self) -> Vec<DecodeEvent> {
        std::mem::take(&mut *lock(&self.events))
    }

    fn push(&self, event: DecodeEvent) {
        lock(&self.events).push(event);
    }
}

impl EventSink for RecordingSink {
    fn on_start(&self, codec: &dyn fmt::Display, position: u64, size: ExpectedSize) {
        self.push(DecodeEvent::Start {
            codec: codec.to_string(),
            position,
            size,
        });
    }

    fn on_done(&self, codec: &dyn fmt::Display, position: u64, bits_read: u64, value: &dyn Inspect) {
        self.push(DecodeEvent::Done {
            codec: codec.to_string(),
            position,
            bits_read,
            value: value.view().to_string(),
        });
    }

    fn on_failed(&self) {
        self.push(DecodeEvent::Failed);
    }
}

/// Forwards events to `tracing` at debug level
#[cfg(feature = "logging")]
#[derive(Debug, Default)]
pub struct TracingSink {
    depth: AtomicUsize,
}

#[cfg(feature = "logging")]
impl TracingSink {
    /// Create a sink at depth 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of decodes started and not yet finished
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    fn leave(&self) -> usize {
        let previous = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| Some(d.saturating_sub(1)))
            .unwrap_or(0);
        previous.saturating_sub(1)
    }
}

#[cfg(feature = "logging")]
impl EventSink for TracingSink {
    fn on_start(&self, codec: &dyn fmt::Display, position: u64, size: ExpectedSize) {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed);
        debug!(
            depth,
            position,
            size = size.as_i64(),
            codec = %codec,
            "start decoding"
        );
    }

    fn on_done(&self, codec: &dyn fmt::Display, position: u64, bits_read: u64, value: &dyn Inspect) {
        let depth = self.leave();
        debug!(
            depth,
            position,
            bits_read,
            value = %value.view(),
            codec = %codec,
            "done decoding"
        );
    }

    fn on_failed(&self) {
        let depth = self.leave();
        warn!(depth, "failed decoding");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(renderer: &TextRenderer<Vec<u8>>) -> String {
        renderer.with_output(|out| String::from_utf8_lossy(out).into_owned())
    }

    #[test]
    fn test_value_views() {
        assert_eq!(255u64.view().to_string(), "255 (0xff)");
        assert_eq!((-1i8).view().to_string(), "-1 (0xff)");
        assert_eq!(None::<u32>.view().to_string(), "null");
        assert_eq!(Some(16u32).view().to_string(), "16 (0x10)");
        assert_eq!(true.view().to_string(), "true");
        assert_eq!(vec![1u8, 2].view().to_string(), "[1, 2]");
    }

    #[test]
    fn test_expected_size_raw_form() {
        assert_eq!(ExpectedSize::Unknown.as_i64(), -1);
        assert_eq!(ExpectedSize::Bits(8).as_i64(), 8);
        assert_eq!(ExpectedSize::Bits(8).bits(), Some(8));
    }

    #[test]
    fn test_renderer_lines() {
        let renderer = TextRenderer::new(Vec::new());
        renderer.on_start(&"uint(8)", 0, ExpectedSize::Bits(8));
        assert_eq!(renderer.depth(), 1);
        renderer.on_done(&"uint(8)", 8, 8, &255u64);
        assert_eq!(renderer.depth(), 0);

        assert_eq!(
            rendered(&renderer),
            "Start decoding at 0 (maximal up to 8) Codec: uint(8)\n\
             Done decoding at 8 (8 bits) : 255 (0xff) Codec: uint(8)\n\
             \n"
        );
    }

    #[test]
    fn test_renderer_indents_nested_events() {
        let renderer = TextRenderer::new(Vec::new());
        renderer.on_start(&"outer", 0, ExpectedSize::Unknown);
        renderer.on_start(&"inner", 0, ExpectedSize::Bits(4));
        renderer.on_failed();
        renderer.on_failed();

        let text = rendered(&renderer);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Start decoding at 0 Codec: outer");
        assert_eq!(lines[1], " Start decoding at 0 (maximal up to 4) Codec: inner");
        assert_eq!(lines[2], " Failed decoding.");
        assert_eq!(lines[3], "Failed decoding.");
        assert_eq!(renderer.depth(), 0);
    }

    #[test]
    fn test_renderer_depth_never_underflows() {
        let renderer = TextRenderer::new(Vec::new());
        renderer.on_failed();
        assert_eq!(renderer.depth(), 0);
        assert_eq!(renderer.into_inner(), b"Failed decoding.\n".to_vec());
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.on_start(&"flag", 3, ExpectedSize::Bits(1));
        sink.on_done(&"flag", 4, 1, &true);
        sink.on_failed();

        let events = sink.take();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].phase(), Phase::Start);
        assert_eq!(
            events[1],
            DecodeEvent::Done {
                codec: "flag".into(),
                position: 4,
                bits_read: 1,
                value: "true".into(),
            }
        );
        assert_eq!(events[2], DecodeEvent::Failed);
        assert!(sink.events().is_empty());
    }

    #[cfg(feature = "logging")]
    #[test]
    fn test_tracing_sink_depth() {
        let sink = TracingSink::new();
        sink.on_start(&"record", 0, ExpectedSize::Unknown);
        sink.on_start(&"uint(4)", 0, ExpectedSize::Bits(4));
        assert_eq!(sink.depth(), 2);
        sink.on_done(&"uint(4)", 4, 4, &9u64);
        assert_eq!(sink.depth(), 1);
        sink.on_failed();
        assert_eq!(sink.depth(), 0);

        sink.on_failed();
        assert_eq!(sink.depth(), 0);
    }
}
