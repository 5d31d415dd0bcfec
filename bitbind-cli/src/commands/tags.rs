use crate::commands::decode::build_factory;
use crate::schema::Schema;
use anyhow::{Context, Result};
use bitbind_core::{Metadata, ResolverContext, Tag};
use colored::*;
use serde::Serialize;
use std::fs;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct FieldTags {
    pub field: String,
    pub tags: Vec<Tag>,
    pub own: Vec<Tag>,
    pub codec: Option<String>,
    pub error: Option<String>,
}

/// Effective tags and selected codec of every field, overrides applied
pub fn collect(schema: &Schema, overrides: &[String]) -> Result<Vec<FieldTags>> {
    let factory = build_factory(schema, overrides, &[])?;
    let mut context = ResolverContext::new(&schema.name);
    let mut report = Vec::new();

    for (spec, field) in schema
        .fields
        .iter()
        .zip(schema.field_metadata(factory.hierarchy()))
    {
        let effective = factory.effective(&field);
        let built = factory.build_uint(&field, &context);
        context.bind(spec.name.as_str());

        report.push(FieldTags {
            field: spec.name.clone(),
            tags: effective.list_all_tags(),
            own: effective.list_own_tags(),
            codec: built.as_ref().ok().map(|c| c.to_string()),
            error: built.err().map(|e| e.to_string()),
        });
    }

    Ok(report)
}

pub fn execute(schema_path: &str, overrides: &[String], output: Option<&str>) -> Result<()> {
    info!("Listing tags of schema: {}", schema_path);

    let schema = Schema::load(schema_path)?;
    let report = collect(&schema, overrides)?;

    if let Some(output_path) = output {
        let json = serde_json::to_string_pretty(&report)
            .with_context(|| "Failed to serialize tag report")?;
        fs::write(output_path, json)
            .with_context(|| format!("Failed to write output file: {}", output_path))?;
        info!("Tag report written to: {}", output_path);
        return Ok(());
    }

    println!("\n=== {} ===", schema.name);
    for (spec, entry) in schema.fields.iter().zip(&report) {
        let tags: Vec<String> = entry
            .tags
            .iter()
            .map(|tag| {
                if spec.tags.contains(tag) || spec.inherited.contains(tag) {
                    tag.to_string()
                } else {
                    tag.to_string().yellow().to_string()
                }
            })
            .collect();
        let codec = match (&entry.codec, &entry.error) {
            (Some(codec), _) => format!("{} {}", "✓".green(), codec),
            (None, Some(error)) => format!("{} {}", "✗".red(), error),
            (None, None) => String::new(),
        };
        println!("{:<16} {:<40} {}", entry.field, tags.join(" "), codec);
    }

    Ok(())
}
