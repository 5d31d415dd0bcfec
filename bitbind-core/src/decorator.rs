//! Post-construction codec decoration
//!
//! After a codec is built for a field it is passed through every registered
//! [`CodecDecorator`], in registration order. Each decorator may return the
//! codec unchanged or wrap it.

use crate::codec::{Codec, TypeInfo};
use crate::metadata::Metadata;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Where a codec is being resolved
///
/// Holds the enclosing scope's name and the parameter names already bound
/// when the field is decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverContext {
    scope: String,
    bound: Vec<String>,
}

impl ResolverContext {
    /// Context for fields of `scope` with nothing bound yet
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            bound: Vec::new(),
        }
    }

    /// Name of the enclosing scope
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Record that `name` is bound for subsequent fields
    pub fn bind(&mut self, name: impl Into<String>) {
        self.bound.push(name.into());
    }

    /// True if `name` is bound in this context
    pub fn is_bound(&self, name: &str) -> bool {
        self.bound.iter().any(|bound| bound == name)
    }
}

/// Wraps or replaces a freshly built codec
pub trait CodecDecorator<T>: Send + Sync {
    /// Return the codec to use in place of `codec`
    fn decorate(
        &self,
        codec: Arc<dyn Codec<T>>,
        metadata: &dyn Metadata,
        declared: TypeInfo,
        context: &ResolverContext,
    ) -> Arc<dyn Codec<T>>;
}

/// Decorators applied in registration order
pub struct DecoratorChain<T> {
    decorators: Vec<Arc<dyn CodecDecorator<T>>>,
}

impl<T> Default for DecoratorChain<T> {
    fn default() -> Self {
        Self {
            decorators: Vec::new(),
        }
    }
}

impl<T> Clone for DecoratorChain<T> {
    fn clone(&self) -> Self {
        Self {
            decorators: self.decorators.clone(),
        }
    }
}

impl<T> fmt::Debug for DecoratorChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorChain")
            .field("len", &self.decorators.len())
            .finish()
    }
}

impl<T> DecoratorChain<T> {
    /// An empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decorator after the existing ones
    pub fn push(&mut self, decorator: Arc<dyn CodecDecorator<T>>) {
        self.decorators.push(decorator);
    }

    /// Builder-style variant of [`DecoratorChain::push`]
    pub fn with(mut self, decorator: Arc<dyn CodecDecorator<T>>) -> Self {
        self.push(decorator);
        self
    }

    /// Number of registered decorators
    pub fn len(&self) -> usize {
        self.decorators.len()
    }

    /// True if no decorator is registered
    pub fn is_empty(&self) -> bool {
        self.decorators.is_empty()
    }

    /// Pass `codec` through every decorator, each wrapping the previous result
    pub fn apply(
        &self,
        codec: Arc<dyn Codec<T>>,
        metadata: &dyn Metadata,
        declared: TypeInfo,
        context: &ResolverContext,
    ) -> Arc<dyn Codec<T>> {
        #[cfg(feature = "logging")]
        debug!(
            "Applying {} decorators to {} on {}",
            self.decorators.len(),
            codec,
            metadata.site()
        );

        self.decorators.iter().fold(codec, |codec, decorator| {
            decorator.decorate(codec, metadata, declared, context)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BitBuffer, BitChannel};
    use crate::codec::{CodecDescriptor, UintCodec};
    use crate::error::CodecError;
    use crate::expr::{EmptyResolver, Resolver, SizeExpr};
    use crate::metadata::{DeclaredMetadata, TagHierarchy};

    /// Adds a fixed amount to every decoded value and names itself after it
    struct Offset(u64);

    struct OffsetCodec {
        inner: Arc<dyn Codec<u64>>,
        amount: u64,
    }

    impl fmt::Display for OffsetCodec {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "offset{}({})", self.amount, self.inner)
        }
    }

    impl Codec<u64> for OffsetCodec {
        fn decode(&self, buffer: &mut BitBuffer, resolver: &dyn Resolver) -> Result<u64, CodecError> {
            Ok(self.inner.decode(buffer, resolver)? + self.amount)
        }

        fn encode(
            &self,
            value: &u64,
            channel: &mut BitChannel,
            resolver: &dyn Resolver,
        ) -> Result<(), CodecError> {
            self.inner.encode(&(value - self.amount), channel, resolver)
        }

        fn size(&self) -> Option<SizeExpr> {
            self.inner.size()
        }

        fn value_type(&self) -> TypeInfo {
            self.inner.value_type()
        }

        fn descriptor(&self) -> CodecDescriptor {
            self.inner.descriptor()
        }
    }

    impl CodecDecorator<u64> for Offset {
        fn decorate(
            &self,
            codec: Arc<dyn Codec<u64>>,
            _metadata: &dyn Metadata,
            _declared: TypeInfo,
            _context: &ResolverContext,
        ) -> Arc<dyn Codec<u64>> {
            Arc::new(OffsetCodec {
                inner: codec,
                amount: self.0,
            })
        }
    }

    #[test]
    fn test_chain_applies_in_registration_order() {
        let chain: DecoratorChain<u64> = DecoratorChain::new()
            .with(Arc::new(Offset(1)))
            .with(Arc::new(Offset(10)));
        assert_eq!(chain.len(), 2);

        let meta = DeclaredMetadata::new("value", Arc::new(TagHierarchy::new()));
        let codec = chain.apply(
            Arc::new(UintCodec::fixed(8)),
            &meta,
            TypeInfo::of::<u64>(),
            &ResolverContext::new("Test"),
        );

        // The last registered decorator is the outermost wrapper.
        assert_eq!(codec.to_string(), "offset10(offset1(uint(8)))");
        let mut buffer = BitBuffer::new(vec![5]);
        assert_eq!(codec.decode(&mut buffer, &EmptyResolver).unwrap(), 16);
    }

    #[test]
    fn test_empty_chain_returns_codec_unchanged() {
        let chain: DecoratorChain<u64> = DecoratorChain::new();
        assert!(chain.is_empty());
        let meta = DeclaredMetadata::new("value", Arc::new(TagHierarchy::new()));
        let codec = chain.apply(
            Arc::new(UintCodec::fixed(4)),
            &meta,
            TypeInfo::of::<u64>(),
            &ResolverContext::default(),
        );
        assert_eq!(codec.to_string(), "uint(4)");
    }

    #[test]
    fn test_resolver_context_bindings() {
        let mut context = ResolverContext::new("Header");
        assert!(!context.is_bound("len"));
        context.bind("len");
        assert!(context.is_bound("len"));
        assert_eq!(context.scope(), "Header");
    }
}
