//! The codec contract and the built-in codecs
//!
//! A [`Codec`] turns bits from a [`BitBuffer`] into a typed value and, when
//! it supports it, writes the value back to a [`BitChannel`].

use crate::buffer::{BitBuffer, BitChannel};
use crate::error::CodecError;
use crate::expr::{Bindings, Resolver, SizeExpr};
use crate::sink::{Inspect, ValueView};
use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

/// Runtime identity of a decoded value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    id: TypeId,
    name: &'static str,
}

impl TypeInfo {
    /// Type information for `T`
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Fully qualified type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True if this describes `T`
    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

/// Documentation metadata describing a codec's shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecDescriptor {
    /// Short name of the encoding
    pub label: String,

    /// One-line description for generated documentation
    pub summary: String,

    /// Set on wrappers that must not be documented as a separate codec
    pub transparent: bool,
}

impl CodecDescriptor {
    /// Describe a codec that appears in generated documentation
    pub fn new(label: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            summary: summary.into(),
            transparent: false,
        }
    }

    /// Defer all content to `inner`, flagged as a transparent wrapper
    pub fn pass_through(inner: CodecDescriptor) -> Self {
        Self {
            transparent: true,
            ..inner
        }
    }
}

/// A unit that decodes (and optionally encodes) one value
///
/// The [`fmt::Display`] form names the codec in diagnostics.
pub trait Codec<T>: fmt::Display + Send + Sync {
    /// Read a value starting at the buffer's current position
    fn decode(&self, buffer: &mut BitBuffer, resolver: &dyn Resolver) -> Result<T, CodecError>;

    /// Write `value` to `channel`
    fn encode(
        &self,
        value: &T,
        channel: &mut BitChannel,
        resolver: &dyn Resolver,
    ) -> Result<(), CodecError>;

    /// False for decode-only codecs whose `encode` always fails
    fn can_encode(&self) -> bool {
        true
    }

    /// The number of bits a value occupies, if expressible
    fn size(&self) -> Option<SizeExpr>;

    /// The type of the decoded value
    fn value_type(&self) -> TypeInfo;

    /// All types this codec may produce
    fn value_types(&self) -> Vec<TypeInfo> {
        vec![self.value_type()]
    }

    /// Documentation metadata
    fn descriptor(&self) -> CodecDescriptor;
}

/// Unsigned integer, most significant bit first
#[derive(Debug, Clone)]
pub struct UintCodec {
    size: SizeExpr,
}

impl UintCodec {
    /// Integer occupying `size` bits (at most 64 once evaluated)
    pub fn new(size: impl Into<SizeExpr>) -> Self {
        Self { size: size.into() }
    }

    /// Integer of a constant width
    pub fn fixed(bits: u64) -> Self {
        Self::new(SizeExpr::Const(bits))
    }

    fn width(&self, resolver: &dyn Resolver) -> Result<u32, CodecError> {
        let bits = self.size.eval(resolver)?;
        u32::try_from(bits)
            .ok()
            .filter(|bits| *bits <= 64)
            .ok_or_else(|| CodecError::InvalidValue(format!("{} bits exceed a u64", bits)))
    }
}

impl fmt::Display for UintCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uint({})", self.size)
    }
}

impl Codec<u64> for UintCodec {
    fn decode(&self, buffer: &mut BitBuffer, resolver: &dyn Resolver) -> Result<u64, CodecError> {
        let width = self.width(resolver)?;
        buffer.read_bits(width)
    }

    fn encode(
        &self,
        value: &u64,
        channel: &mut BitChannel,
        resolver: &dyn Resolver,
    ) -> Result<(), CodecError> {
        let width = self.width(resolver)?;
        channel.write_bits(*value, width)
    }

    fn size(&self) -> Option<SizeExpr> {
        Some(self.size.clone())
    }

    fn value_type(&self) -> TypeInfo {
        TypeInfo::of::<u64>()
    }

    fn descriptor(&self) -> CodecDescriptor {
        CodecDescriptor::new(
            "uint",
            format!("unsigned integer of {} bits, most significant bit first", self.size),
        )
    }
}

/// A single bit read as a boolean
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagCodec;

impl fmt::Display for FlagCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("flag")
    }
}

impl Codec<bool> for FlagCodec {
    fn decode(&self, buffer: &mut BitBuffer, _resolver: &dyn Resolver) -> Result<bool, CodecError> {
        Ok(buffer.read_bits(1)? == 1)
    }

    fn encode(
        &self,
        value: &bool,
        channel: &mut BitChannel,
        _resolver: &dyn Resolver,
    ) -> Result<(), CodecError> {
        channel.write_bits(u64::from(*value), 1)
    }

    fn size(&self) -> Option<SizeExpr> {
        Some(SizeExpr::Const(1))
    }

    fn value_type(&self) -> TypeInfo {
        TypeInfo::of::<bool>()
    }

    fn descriptor(&self) -> CodecDescriptor {
        CodecDescriptor::new("flag", "single bit, set means true")
    }
}

/// Named integer fields decoded by a [`RecordCodec`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, u64)>,
}

impl Record {
    /// Create a record from field values in declaration order
    pub fn new(fields: Vec<(String, u64)>) -> Self {
        Self { fields }
    }

    /// Value of the named field
    pub fn get(&self, name: &str) -> Option<u64> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| *value)
    }

    /// Field values in declaration order
    pub fn fields(&self) -> &[(String, u64)] {
        &self.fields
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        f.write_str("}")
    }
}

impl Inspect for Record {
    fn view(&self) -> ValueView {
        ValueView::Text(self.to_string())
    }
}

/// An ordered sequence of named integer fields
///
/// Each decoded field is bound under its name, so later fields may use it
/// in their size expressions.
pub struct RecordCodec {
    name: String,
    fields: Vec<(String, Arc<dyn Codec<u64>>)>,
}

impl RecordCodec {
    /// Create a record codec without fields
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field
    pub fn field(mut self, name: impl Into<String>, codec: Arc<dyn Codec<u64>>) -> Self {
        self.fields.push((name.into(), codec));
        self
    }
}

impl fmt::Display for RecordCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {}", self.name)
    }
}

impl Codec<Record> for RecordCodec {
    fn decode(&self, buffer: &mut BitBuffer, resolver: &dyn Resolver) -> Result<Record, CodecError> {
        let mut scope = Bindings::nested(resolver);
        let mut values = Vec::with_capacity(self.fields.len());
        for (name, codec) in &self.fields {
            let value = codec.decode(buffer, &scope)?;
            scope.bind(name.clone(), value);
            values.push((name.clone(), value));
        }
        Ok(Record::new(values))
    }

    fn encode(
        &self,
        value: &Record,
        channel: &mut BitChannel,
        resolver: &dyn Resolver,
    ) -> Result<(), CodecError> {
        let mut scope = Bindings::nested(resolver);
        for (name, codec) in &self.fields {
            let field = value
                .get(name)
                .ok_or_else(|| CodecError::InvalidValue(format!("record lacks field {}", name)))?;
            codec.encode(&field, channel, &scope)?;
            scope.bind(name.clone(), field);
        }
        Ok(())
    }

    fn can_encode(&self) -> bool {
        self.fields.iter().all(|(_, codec)| codec.can_encode())
    }

    fn size(&self) -> Option<SizeExpr> {
        let mut total: Option<SizeExpr> = None;
        for (_, codec) in &self.fields {
            let size = codec.size()?;
            total = Some(match total {
                None => size,
                Some(sum) => SizeExpr::Add(Box::new(sum), Box::new(size)),
            });
        }
        Some(total.unwrap_or(SizeExpr::Const(0)))
    }

    fn value_type(&self) -> TypeInfo {
        TypeInfo::of::<Record>()
    }

    fn value_types(&self) -> Vec<TypeInfo> {
        vec![TypeInfo::of::<Record>(), TypeInfo::of::<u64>()]
    }

    fn descriptor(&self) -> CodecDescriptor {
        let names: Vec<&str> = self.fields.iter().map(|(name, _)| name.as_str()).collect();
        CodecDescriptor::new(
            self.name.clone(),
            format!("record of fields {}", names.join(", ")),
        )
    }
}
