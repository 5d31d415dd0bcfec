//! # Bitbind Core
//!
//! Declarative bit-level decoding: codecs are selected from tags attached to
//! declaration sites, then passed through decorators before use.
//!
//! ## Modules
//!
//! - `buffer`: Bit cursor and bit channel
//! - `expr`: Size expressions and resolvers
//! - `metadata`: Tags, tag compatibility, and tag overrides
//! - `codec`: The codec contract and built-in codecs
//! - `decorator`: Codec decorators and decorator chains
//! - `instrument`: Decorator reporting decode lifecycle events
//! - `sink`: Event sinks (text renderer, recorder, tracing)
//! - `factory`: Codec construction from tags

#![warn(missing_docs)]

pub mod buffer;
pub mod codec;
pub mod decorator;
pub mod error;
pub mod expr;
pub mod factory;
pub mod instrument;
pub mod metadata;
pub mod sink;

// Re-export commonly used types
pub use codec::{Codec, CodecDescriptor, TypeInfo};
pub use decorator::{CodecDecorator, DecoratorChain, ResolverContext};
pub use error::CodecError;
pub use instrument::{InstrumentingCodec, InstrumentingDecorator};
pub use metadata::{Metadata, MetadataOverride, Tag, TagHierarchy, TagType};
pub use sink::{EventSink, ExpectedSize, Inspect, TextRenderer};

/// Result type alias for Bitbind operations
pub type Result<T> = core::result::Result<T, CodecError>;
