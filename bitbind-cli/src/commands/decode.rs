use crate::schema::{parse_override, Schema};
use anyhow::{Context, Result};
use bitbind_core::{
    buffer::BitBuffer,
    codec::Record,
    expr::EmptyResolver,
    factory::CodecFactory,
    sink::{DecodeEvent, EventSink, RecordingSink, TracingSink},
    TextRenderer,
};
use bytes::Bytes;
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::sync::Arc;
use tracing::{info, warn};

/// Where the bits to decode come from
#[derive(Debug, Clone)]
pub enum Input {
    /// A file path, `-` for stdin
    File(String),
    /// Hex digits given on the command line
    Hex(String),
}

/// Options for a decode run
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Print indented decode events to stdout
    pub trace: bool,
    /// Record decode events into the report
    pub record_events: bool,
    /// Write recorded decode events as JSON to this file
    pub events_path: Option<String>,
    /// Forward decode events to the log at debug level
    pub log_events: bool,
    /// `FIELD=TAG[:key=value,...]` overrides
    pub overrides: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FieldValue {
    pub name: String,
    pub value: u64,
}

/// Result of decoding one record
#[derive(Debug, Serialize)]
pub struct DecodeReport {
    pub record: String,
    pub fields: Vec<FieldValue>,
    pub bits_read: u64,
    pub bits_left: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<DecodeEvent>,
}

/// Build a factory for `schema` with the requested overrides and sinks
pub fn build_factory(
    schema: &Schema,
    overrides: &[String],
    sinks: &[Arc<dyn EventSink>],
) -> Result<CodecFactory> {
    let mut factory = CodecFactory::new(schema.tag_hierarchy());
    for text in overrides {
        let (field, tag) = parse_override(text)?;
        if !schema.fields.iter().any(|f| f.name == field) {
            warn!("Override for unknown field {} has no effect", field);
        }
        info!("Overriding {} with {}", field, tag);
        factory = factory.with_override(schema.site(&field), tag);
    }
    for sink in sinks {
        factory = factory.instrumented(sink.clone());
    }
    Ok(factory)
}

/// Decode one record of `schema` from the start of `data`
pub fn run(schema: &Schema, data: Bytes, options: &DecodeOptions) -> Result<DecodeReport> {
    let recorder = Arc::new(RecordingSink::new());
    let mut sinks: Vec<Arc<dyn EventSink>> = Vec::new();
    if options.record_events || options.events_path.is_some() {
        sinks.push(recorder.clone());
    }
    if options.trace {
        sinks.push(Arc::new(TextRenderer::stdout()));
    }
    if options.log_events {
        sinks.push(Arc::new(TracingSink::new()));
    }

    let factory = build_factory(schema, &options.overrides, &sinks)?;
    let fields = schema.field_metadata(factory.hierarchy());
    let codec = factory
        .build_record(&schema.name, &fields)
        .with_context(|| format!("Failed to build codec for {}", schema.name))?;

    let mut buffer = BitBuffer::new(data);
    let record: Record = codec
        .decode(&mut buffer, &EmptyResolver)
        .with_context(|| format!("Failed to decode {}", schema.name))?;

    Ok(DecodeReport {
        record: schema.name.clone(),
        fields: record
            .fields()
            .iter()
            .map(|(name, value)| FieldValue {
                name: name.clone(),
                value: *value,
            })
            .collect(),
        bits_read: buffer.position(),
        bits_left: buffer.remaining(),
        events: recorder.take(),
    })
}

fn read_input(input: &Input) -> Result<Bytes> {
    let data = match input {
        Input::File(path) if path == "-" => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf)?;
            buf
        }
        Input::File(path) => {
            fs::read(path).with_context(|| format!("Failed to read input file: {}", path))?
        }
        Input::Hex(digits) => {
            let compact: String = digits.chars().filter(|c| !c.is_whitespace()).collect();
            hex::decode(compact).context("Input is not valid hex")?
        }
    };
    Ok(Bytes::from(data))
}

pub fn execute(
    schema_path: &str,
    input: &Input,
    output: Option<&str>,
    options: &DecodeOptions,
) -> Result<()> {
    info!("Decoding with schema: {}", schema_path);

    let schema = Schema::load(schema_path)?;
    let data = read_input(input)?;
    info!("Input size: {} bytes", data.len());

    let mut report = run(&schema, data, options)?;

    if let Some(events_path) = &options.events_path {
        let json = serde_json::to_string_pretty(&report.events)
            .with_context(|| "Failed to serialize decode events")?;
        fs::write(events_path, json)
            .with_context(|| format!("Failed to write events file: {}", events_path))?;
        info!("{} decode events written to: {}", report.events.len(), events_path);
        if !options.record_events {
            report.events.clear();
        }
    }

    if let Some(output_path) = output {
        let json = serde_json::to_string_pretty(&report)
            .with_context(|| "Failed to serialize decode report")?;
        fs::write(output_path, json)
            .with_context(|| format!("Failed to write output file: {}", output_path))?;
        info!("Decode report written to: {}", output_path);
    } else {
        println!("=== {} ===", report.record);
        for field in &report.fields {
            println!("{:<16} {} (0x{:x})", field.name, field.value, field.value);
        }
        println!();
        println!("Bits read:         {}", report.bits_read);
        println!("Bits left:         {}", report.bits_left);
    }

    Ok(())
}
