//! Building codecs from declaration-site tags
//!
//! Recognized tags:
//! - `Bits(size = EXPR)`: unsigned integer of `EXPR` bits
//! - `Flag`: a single bit
//!
//! A field's metadata may be overridden by site name before the codec is
//! selected; the override goes through [`MetadataOverride`].

use crate::codec::{Codec, FlagCodec, Record, RecordCodec, TypeInfo, UintCodec};
use crate::decorator::{CodecDecorator, DecoratorChain, ResolverContext};
use crate::error::CodecError;
use crate::expr::SizeExpr;
use crate::instrument::InstrumentingDecorator;
use crate::metadata::{DeclaredMetadata, Metadata, MetadataOverride, Tag, TagHierarchy, TagType};
use crate::sink::EventSink;
use hashbrown::HashMap;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Tag type selecting an unsigned integer codec
pub const BITS_TAG: &str = "Bits";

/// Tag type selecting a one-bit flag codec
pub const FLAG_TAG: &str = "Flag";

/// Attribute of [`BITS_TAG`] holding the size expression
pub const SIZE_ATTRIBUTE: &str = "size";

/// Builds decorated codecs from field metadata
#[derive(Debug, Clone)]
pub struct CodecFactory {
    hierarchy: Arc<TagHierarchy>,
    overrides: HashMap<String, Tag>,
    uints: DecoratorChain<u64>,
    flags: DecoratorChain<bool>,
    records: DecoratorChain<Record>,
}

impl CodecFactory {
    /// A factory resolving tag compatibility through `hierarchy`
    pub fn new(hierarchy: Arc<TagHierarchy>) -> Self {
        Self {
            hierarchy,
            overrides: HashMap::new(),
            uints: DecoratorChain::new(),
            flags: DecoratorChain::new(),
            records: DecoratorChain::new(),
        }
    }

    /// The tag compatibility relation in use
    pub fn hierarchy(&self) -> &Arc<TagHierarchy> {
        &self.hierarchy
    }

    /// Substitute `tag` into the metadata of the declaration site `site`
    pub fn with_override(mut self, site: impl Into<String>, tag: Tag) -> Self {
        self.overrides.insert(site.into(), tag);
        self
    }

    /// Register a decorator for integer codecs
    pub fn with_uint_decorator(mut self, decorator: Arc<dyn CodecDecorator<u64>>) -> Self {
        self.uints.push(decorator);
        self
    }

    /// Register a decorator for flag codecs
    pub fn with_flag_decorator(mut self, decorator: Arc<dyn CodecDecorator<bool>>) -> Self {
        self.flags.push(decorator);
        self
    }

    /// Register a decorator for record codecs
    pub fn with_record_decorator(mut self, decorator: Arc<dyn CodecDecorator<Record>>) -> Self {
        self.records.push(decorator);
        self
    }

    /// Instrument every codec this factory builds, reporting to `sink`
    pub fn instrumented(self, sink: Arc<dyn EventSink>) -> Self {
        let decorator = Arc::new(InstrumentingDecorator::new(sink));
        self.with_uint_decorator(decorator.clone())
            .with_flag_decorator(decorator.clone())
            .with_record_decorator(decorator)
    }

    /// The metadata used for `metadata`'s site, with any override applied
    pub fn effective<'m>(&self, metadata: &'m dyn Metadata) -> Box<dyn Metadata + 'm> {
        match self.overrides.get(metadata.site()) {
            Some(tag) => Box::new(MetadataOverride::new(
                metadata,
                tag.clone(),
                self.hierarchy.clone(),
            )),
            None => Box::new(metadata),
        }
    }

    /// Build the integer codec for a field
    ///
    /// Every parameter of the size expression must be bound in `context`.
    pub fn build_uint(
        &self,
        metadata: &dyn Metadata,
        context: &ResolverContext,
    ) -> Result<Arc<dyn Codec<u64>>, CodecError> {
        let effective = self.effective(metadata);
        let codec = self.select_uint(&*effective, context)?;
        Ok(self
            .uints
            .apply(codec, &*effective, TypeInfo::of::<u64>(), context))
    }

    /// Build the flag codec for a field
    pub fn build_flag(
        &self,
        metadata: &dyn Metadata,
        context: &ResolverContext,
    ) -> Result<Arc<dyn Codec<bool>>, CodecError> {
        let effective = self.effective(metadata);
        if !effective.has_tag(&TagType::new(FLAG_TAG)) {
            return Err(CodecError::MissingTag(metadata.site().to_string()));
        }
        Ok(self.flags.apply(
            Arc::new(FlagCodec),
            &*effective,
            TypeInfo::of::<bool>(),
            context,
        ))
    }

    /// Build a record codec named `name` from its fields' metadata
    ///
    /// Each field may reference the fields declared before it.
    pub fn build_record(
        &self,
        name: &str,
        fields: &[DeclaredMetadata],
    ) -> Result<Arc<dyn Codec<Record>>, CodecError> {
        let mut context = ResolverContext::new(name);
        let mut record = RecordCodec::new(name);
        for field in fields {
            let codec = self.build_uint(field, &context)?;
            let field_name = field_name(field.site());
            record = record.field(field_name, codec);
            context.bind(field_name);
        }

        let site = DeclaredMetadata::new(name, self.hierarchy.clone());
        Ok(self.records.apply(
            Arc::new(record),
            &site,
            TypeInfo::of::<Record>(),
            &ResolverContext::new(name),
        ))
    }

    fn select_uint(
        &self,
        metadata: &dyn Metadata,
        context: &ResolverContext,
    ) -> Result<Arc<dyn Codec<u64>>, CodecError> {
        let site = metadata.site();

        if let Some(tag) = metadata.query_tag(&TagType::new(BITS_TAG)) {
            let text = tag
                .attribute(SIZE_ATTRIBUTE)
                .ok_or_else(|| CodecError::MissingTag(format!("{} ({}.{})", site, tag, SIZE_ATTRIBUTE)))?;
            let size = SizeExpr::parse(text)?;
            if let Some(unbound) = size.references().into_iter().find(|name| !context.is_bound(name)) {
                return Err(CodecError::UnresolvedReference(format!(
                    "{} in size of {}",
                    unbound, site
                )));
            }

            #[cfg(feature = "logging")]
            debug!("Selected uint({}) for {} from {}", size, site, tag);

            return Ok(Arc::new(UintCodec::new(size)));
        }

        if metadata.query_tag(&TagType::new(FLAG_TAG)).is_some() {
            #[cfg(feature = "logging")]
            debug!("Selected uint(1) for flag field {}", site);

            return Ok(Arc::new(UintCodec::fixed(1)));
        }

        Err(CodecError::MissingTag(site.to_string()))
    }
}

/// Last dotted component of a site name, `Header.len` -> `len`
fn field_name(site: &str) -> &str {
    site.rsplit('.').next().unwrap_or(site)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BitBuffer;
    use crate::expr::EmptyResolver;
    use crate::sink::{DecodeEvent, RecordingSink};

    fn hierarchy() -> Arc<TagHierarchy> {
        Arc::new(TagHierarchy::new().with("Nibble", BITS_TAG))
    }

    fn field(site: &str, tag: Tag) -> DeclaredMetadata {
        DeclaredMetadata::new(site, hierarchy()).tag(tag)
    }

    fn bits(size: &str) -> Tag {
        Tag::new(BITS_TAG).with(SIZE_ATTRIBUTE, size)
    }

    #[test]
    fn test_build_uint_from_tag() {
        let factory = CodecFactory::new(hierarchy());
        let codec = factory
            .build_uint(&field("x", bits("12")), &ResolverContext::default())
            .unwrap();
        assert_eq!(codec.to_string(), "uint(12)");
    }

    #[test]
    fn test_missing_tag() {
        let factory = CodecFactory::new(hierarchy());
        let meta = DeclaredMetadata::new("Header.pad", hierarchy());
        assert_eq!(
            factory.build_uint(&meta, &ResolverContext::default()).err(),
            Some(CodecError::MissingTag("Header.pad".into()))
        );
        assert!(factory.build_flag(&meta, &ResolverContext::default()).is_err());
    }

    #[test]
    fn test_unbound_size_reference_rejected() {
        let factory = CodecFactory::new(hierarchy());
        let result = factory.build_uint(&field("body", bits("len * 8")), &ResolverContext::new("R"));
        assert!(matches!(result, Err(CodecError::UnresolvedReference(_))));
    }

    #[test]
    fn test_override_changes_selected_codec() {
        let factory = CodecFactory::new(hierarchy()).with_override("Header.len", bits("16"));
        let codec = factory
            .build_uint(&field("Header.len", bits("8")), &ResolverContext::default())
            .unwrap();
        assert_eq!(codec.to_string(), "uint(16)");

        // Other sites are untouched.
        let other = factory
            .build_uint(&field("Header.kind", bits("8")), &ResolverContext::default())
            .unwrap();
        assert_eq!(other.to_string(), "uint(8)");
    }

    #[test]
    fn test_override_with_subtype_tag() {
        let nibble = Tag::new("Nibble").with(SIZE_ATTRIBUTE, "4");
        let factory = CodecFactory::new(hierarchy()).with_override("v", nibble.clone());
        let meta = field("v", bits("8"));

        let codec = factory.build_uint(&meta, &ResolverContext::default()).unwrap();
        assert_eq!(codec.to_string(), "uint(4)");
        assert_eq!(factory.effective(&meta).list_all_tags(), vec![nibble]);
    }

    #[test]
    fn test_flag_override_on_plain_field() {
        let factory = CodecFactory::new(hierarchy()).with_override("ready", Tag::new(FLAG_TAG));
        let meta = DeclaredMetadata::new("ready", hierarchy());
        let codec = factory.build_flag(&meta, &ResolverContext::default()).unwrap();
        let mut buffer = BitBuffer::new(vec![0x80]);
        assert!(codec.decode(&mut buffer, &EmptyResolver).unwrap());
    }

    #[test]
    fn test_build_record_with_dependent_field() {
        let factory = CodecFactory::new(hierarchy());
        let record = factory
            .build_record(
                "Chunk",
                &[
                    field("Chunk.len", bits("4")),
                    field("Chunk.body", bits("len * 2")),
                    field("Chunk.last", Tag::new(FLAG_TAG)),
                ],
            )
            .unwrap();

        let mut buffer = BitBuffer::new(vec![0b0010_1011, 0b1000_0000]);
        let value = record.decode(&mut buffer, &EmptyResolver).unwrap();
        assert_eq!(value.get("len"), Some(2));
        assert_eq!(value.get("body"), Some(0b1011));
        assert_eq!(value.get("last"), Some(1));
        assert_eq!(buffer.position(), 9);
    }

    #[test]
    fn test_instrumented_factory_wraps_everything() {
        let sink = Arc::new(RecordingSink::new());
        let factory = CodecFactory::new(hierarchy()).instrumented(sink.clone());
        let record = factory
            .build_record("Pair", &[field("Pair.a", bits("4")), field("Pair.b", bits("a"))])
            .unwrap();
        assert!(!record.can_encode());
        assert!(record.descriptor().transparent);

        let mut buffer = BitBuffer::new(vec![0x3a]);
        record.decode(&mut buffer, &EmptyResolver).unwrap();

        let events = sink.take();
        assert_eq!(events.len(), 6);
        // Record size depends on its own fields, so it is unknown up front;
        // field b's size is known once a is bound.
        assert!(matches!(
            &events[0],
            DecodeEvent::Start { size, .. } if size.as_i64() == -1
        ));
        assert!(matches!(
            &events[3],
            DecodeEvent::Start { position: 4, size, .. } if size.as_i64() == 3
        ));
    }
}
