//! Fuzzing entry points for bitbind-core
//!
//! To use with cargo-fuzz:
//! 1. Install cargo-fuzz: cargo install cargo-fuzz
//! 2. Run fuzzer: cargo fuzz run fuzz_decode

use bitbind_core::{
    buffer::BitBuffer,
    expr::{EmptyResolver, SizeExpr},
    factory::{CodecFactory, BITS_TAG, SIZE_ATTRIBUTE},
    metadata::DeclaredMetadata,
    sink::RecordingSink,
    Tag, TagHierarchy,
};
use bytes::Bytes;
use std::sync::Arc;

/// Decode a length-prefixed record through instrumented codecs
pub fn fuzz_decode(data: &[u8]) {
    let hierarchy = Arc::new(TagHierarchy::new());
    let field = |name: &str, size: &str| {
        DeclaredMetadata::new(format!("Fuzz.{}", name), hierarchy.clone())
            .tag(Tag::new(BITS_TAG).with(SIZE_ATTRIBUTE, size))
    };
    let factory = CodecFactory::new(hierarchy.clone()).instrumented(Arc::new(RecordingSink::new()));
    let Ok(record) = factory.build_record("Fuzz", &[field("len", "6"), field("body", "len")]) else {
        return;
    };

    // Should either decode or fail, never panic
    let mut buffer = BitBuffer::new(Bytes::copy_from_slice(data));
    let _ = record.decode(&mut buffer, &EmptyResolver);
}

/// Parse arbitrary text as a size expression
pub fn fuzz_size_expr(data: &[u8]) {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(expr) = SizeExpr::parse(text) {
            let _ = expr.eval(&EmptyResolver);
        }
    }
}
