//! Decode instrumentation
//!
//! [`InstrumentingDecorator`] wraps every codec it is given in an
//! [`InstrumentingCodec`], which reports each `decode` call to an
//! [`EventSink`] without changing what is decoded. The wrapper is decode-only:
//! its `encode` always fails with [`CodecError::UnsupportedOperation`].

use crate::buffer::{BitBuffer, BitChannel};
use crate::codec::{Codec, CodecDescriptor, TypeInfo};
use crate::decorator::{CodecDecorator, ResolverContext};
use crate::error::CodecError;
use crate::expr::{Resolver, SizeExpr};
use crate::metadata::Metadata;
use crate::sink::{EventSink, ExpectedSize, Inspect, TextRenderer};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::warn;

/// A decorator that instruments every codec, regardless of metadata
#[derive(Clone)]
pub struct InstrumentingDecorator {
    sink: Arc<dyn EventSink>,
}

impl InstrumentingDecorator {
    /// Report to `sink`
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Report to standard output through a [`TextRenderer`]
    pub fn stdout() -> Self {
        Self::new(Arc::new(TextRenderer::stdout()))
    }

    /// The sink events are reported to
    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }
}

impl fmt::Debug for InstrumentingDecorator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentingDecorator").finish_non_exhaustive()
    }
}

impl<T: Inspect + 'static> CodecDecorator<T> for InstrumentingDecorator {
    fn decorate(
        &self,
        codec: Arc<dyn Codec<T>>,
        _metadata: &dyn Metadata,
        _declared: TypeInfo,
        _context: &ResolverContext,
    ) -> Arc<dyn Codec<T>> {
        Arc::new(InstrumentingCodec::new(codec, self.sink.clone()))
    }
}

/// A codec reporting decode events for the codec it wraps
pub struct InstrumentingCodec<T> {
    inner: Arc<dyn Codec<T>>,
    sink: Arc<dyn EventSink>,
}

impl<T> InstrumentingCodec<T> {
    /// Wrap `inner`, reporting to `sink`
    pub fn new(inner: Arc<dyn Codec<T>>, sink: Arc<dyn EventSink>) -> Self {
        Self { inner, sink }
    }

    /// The wrapped codec
    pub fn inner(&self) -> &Arc<dyn Codec<T>> {
        &self.inner
    }
}

/// Expected size of a decode: unknown unless the size expression exists and
/// every parameter it references is bound by `resolver`
pub fn expected_size(size: Option<&SizeExpr>, resolver: &dyn Resolver) -> ExpectedSize {
    match size {
        Some(expr) if expr.is_closed(resolver) => expr
            .eval(resolver)
            .map(ExpectedSize::Bits)
            .unwrap_or(ExpectedSize::Unknown),
        _ => ExpectedSize::Unknown,
    }
}

/// Reports a failure when dropped while armed, so unwinding out of the inner
/// decode still closes the event pair.
struct FailureGuard<'s> {
    sink: &'s dyn EventSink,
    armed: bool,
}

impl FailureGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for FailureGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.sink.on_failed();
        }
    }
}

impl<T> fmt::Display for InstrumentingCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner, f)
    }
}

impl<T: Inspect + 'static> Codec<T> for InstrumentingCodec<T> {
    fn decode(&self, buffer: &mut BitBuffer, resolver: &dyn Resolver) -> Result<T, CodecError> {
        let start = buffer.position();
        let size = expected_size(self.inner.size().as_ref(), resolver);
        self.sink.on_start(self, start, size);

        let mut guard = FailureGuard {
            sink: &*self.sink,
            armed: true,
        };
        let value = self.inner.decode(buffer, resolver)?;
        guard.disarm();

        let end = buffer.position();
        #[cfg(feature = "logging")]
        if end < start {
            warn!("{} moved the cursor back from {} to {}", self, start, end);
        }
        self.sink
            .on_done(self, end, end.saturating_sub(start), &value);
        Ok(value)
    }

    fn encode(
        &self,
        _value: &T,
        _channel: &mut BitChannel,
        _resolver: &dyn Resolver,
    ) -> Result<(), CodecError> {
        Err(CodecError::UnsupportedOperation {
            operation: "encode",
            codec: self.to_string(),
        })
    }

    fn can_encode(&self) -> bool {
        false
    }

    fn size(&self) -> Option<SizeExpr> {
        self.inner.size()
    }

    fn value_type(&self) -> TypeInfo {
        self.inner.value_type()
    }

    fn value_types(&self) -> Vec<TypeInfo> {
        self.inner.value_types()
    }

    fn descriptor(&self) -> CodecDescriptor {
        CodecDescriptor::pass_through(self.inner.descriptor())
    }
}
