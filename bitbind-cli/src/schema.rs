//! JSON record schemas and tag override parsing

use anyhow::{bail, Context, Result};
use bitbind_core::{metadata::DeclaredMetadata, Tag, TagHierarchy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

/// A record layout: named fields with their tags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    /// Record name
    pub name: String,

    /// Fields in decode order
    pub fields: Vec<FieldSpec>,

    /// Tag compatibility, sub type -> super type
    #[serde(default)]
    pub hierarchy: BTreeMap<String, String>,
}

/// One field of a [`Schema`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name, usable in later fields' size expressions
    pub name: String,

    /// Tags declared on the field
    #[serde(default)]
    pub tags: Vec<Tag>,

    /// Tags inherited from the record
    #[serde(default)]
    pub inherited: Vec<Tag>,
}

impl Schema {
    /// Read a schema from a JSON file
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file: {}", path))?;
        Self::from_json(&content).with_context(|| format!("Invalid schema in {}", path))
    }

    /// Parse a schema from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let schema: Schema = serde_json::from_str(text).context("Failed to parse schema JSON")?;
        if schema.fields.is_empty() {
            bail!("Schema {} declares no fields", schema.name);
        }
        Ok(schema)
    }

    /// The tag compatibility relation declared by the schema
    pub fn tag_hierarchy(&self) -> Arc<TagHierarchy> {
        let hierarchy = self
            .hierarchy
            .iter()
            .fold(TagHierarchy::new(), |h, (sub, sup)| h.with(sub.as_str(), sup.as_str()));
        Arc::new(hierarchy)
    }

    /// Site name of a field, `Record.field`
    pub fn site(&self, field: &str) -> String {
        format!("{}.{}", self.name, field)
    }

    /// Metadata of every field, in declaration order
    pub fn field_metadata(&self, hierarchy: &Arc<TagHierarchy>) -> Vec<DeclaredMetadata> {
        self.fields
            .iter()
            .map(|field| {
                let own = field
                    .tags
                    .iter()
                    .cloned()
                    .fold(DeclaredMetadata::new(self.site(&field.name), hierarchy.clone()), DeclaredMetadata::tag);
                field.inherited.iter().cloned().fold(own, DeclaredMetadata::inherit)
            })
            .collect()
    }
}

/// Parse `FIELD=TAG[:key=value,...]` into the field name and its replacement tag
///
/// ```
/// let (field, tag) = bitbind_cli::schema::parse_override("len=Bits:size=16").unwrap();
/// assert_eq!(field, "len");
/// assert_eq!(tag.attribute("size"), Some("16"));
/// ```
pub fn parse_override(text: &str) -> Result<(String, Tag)> {
    let (field, spec) = text
        .split_once('=')
        .with_context(|| format!("Override {:?} is not FIELD=TAG", text))?;
    let (tag_type, attrs) = match spec.split_once(':') {
        Some((tag_type, attrs)) => (tag_type, Some(attrs)),
        None => (spec, None),
    };
    if field.trim().is_empty() || tag_type.trim().is_empty() {
        bail!("Override {:?} needs both a field and a tag type", text);
    }

    let mut tag = Tag::new(tag_type.trim());
    for pair in attrs.into_iter().flat_map(|a| a.split(',')).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Tag attribute {:?} is not key=value", pair))?;
        tag = tag.with(key.trim(), value.trim());
    }
    Ok((field.trim().to_string(), tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitbind_core::{Metadata, TagType};

    const SCHEMA: &str = r#"{
        "name": "Packet",
        "hierarchy": { "Nibble": "Bits" },
        "fields": [
            { "name": "len", "tags": [ { "type": "Bits", "attributes": { "size": "4" } } ] },
            { "name": "ok", "tags": [ { "type": "Flag" } ], "inherited": [ { "type": "Doc" } ] }
        ]
    }"#;

    #[test]
    fn test_schema_metadata() {
        let schema = Schema::from_json(SCHEMA).unwrap();
        let hierarchy = schema.tag_hierarchy();
        assert!(hierarchy.is_assignable(&TagType::new("Bits"), &TagType::new("Nibble")));

        let fields = schema.field_metadata(&hierarchy);
        assert_eq!(fields[0].site(), "Packet.len");
        assert_eq!(fields[1].list_all_tags().len(), 2);
        assert_eq!(fields[1].list_own_tags().len(), 1);
    }

    #[test]
    fn test_empty_schema_rejected() {
        assert!(Schema::from_json(r#"{ "name": "E", "fields": [] }"#).is_err());
    }

    #[test]
    fn test_parse_override() {
        let (field, tag) = parse_override("body = Bits:size=len * 8, order=msb").unwrap();
        assert_eq!(field, "body");
        assert_eq!(tag.tag_type, TagType::new("Bits"));
        assert_eq!(tag.attribute("size"), Some("len * 8"));
        assert_eq!(tag.attribute("order"), Some("msb"));

        let (_, flag) = parse_override("ready=Flag").unwrap();
        assert!(flag.attributes.is_empty());

        assert!(parse_override("nothing").is_err());
        assert!(parse_override("=Bits").is_err());
        assert!(parse_override("x=Bits:size").is_err());
    }
}
