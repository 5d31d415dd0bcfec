//! Declaration-site tags and tag substitution
//!
//! A [`Metadata`] source answers which tags are present at one declaration
//! site (a record field or parameter). Tag types form an explicit
//! compatibility relation, [`TagHierarchy`], instead of a runtime type
//! hierarchy: a tag of type `S` is assignable to type `T` when `S == T` or
//! when `T` is reachable from `S` through declared sub-to-super edges.
//!
//! Lookups come in two flavours and they are not interchangeable:
//! - assignable matching: [`Metadata::query_tag`], [`Metadata::list_all_tags`]
//! - exact matching: [`Metadata::list_own_tags`], [`Metadata::has_tag`] (for
//!   [`MetadataOverride`])

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Identity of a kind of tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagType(String);

impl TagType {
    /// Create a tag type from its name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The tag type's name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TagType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A tag instance: its type plus named attribute values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// The tag's type
    #[serde(rename = "type")]
    pub tag_type: TagType,

    /// Attribute values, keyed by attribute name
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Tag {
    /// Create a tag with no attributes
    pub fn new(tag_type: impl Into<TagType>) -> Self {
        Self {
            tag_type: tag_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up an attribute value
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.tag_type)?;
        if !self.attributes.is_empty() {
            let attrs: Vec<String> = self
                .attributes
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "({})", attrs.join(", "))?;
        }
        Ok(())
    }
}

/// Compatibility relation between tag types
///
/// Each tag type has at most one declared super type.
#[derive(Debug, Clone, Default)]
pub struct TagHierarchy {
    supers: HashMap<TagType, TagType>,
}

impl TagHierarchy {
    /// Create a relation where every type is only compatible with itself
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `sub` to be assignable to `sup`
    pub fn declare(&mut self, sub: impl Into<TagType>, sup: impl Into<TagType>) {
        self.supers.insert(sub.into(), sup.into());
    }

    /// Builder-style variant of [`TagHierarchy::declare`]
    pub fn with(mut self, sub: impl Into<TagType>, sup: impl Into<TagType>) -> Self {
        self.declare(sub, sup);
        self
    }

    /// True if a tag of type `source` can be used where `target` is asked for
    pub fn is_assignable(&self, target: &TagType, source: &TagType) -> bool {
        let mut current = source;
        // Bounded walk so a cyclic declaration cannot loop forever.
        for _ in 0..=self.supers.len() {
            if current == target {
                return true;
            }
            match self.supers.get(current) {
                Some(sup) => current = sup,
                None => return false,
            }
        }
        false
    }
}

/// A queryable set of tags at one declaration site
pub trait Metadata {
    /// Name of the declaration site
    fn site(&self) -> &str;

    /// The tag usable as `tag_type`, if any
    fn query_tag(&self, tag_type: &TagType) -> Option<Tag>;

    /// All tags visible at the site, declared and inherited
    fn list_all_tags(&self) -> Vec<Tag>;

    /// Tags declared directly at the site
    fn list_own_tags(&self) -> Vec<Tag>;

    /// True if a tag of `tag_type` is present
    fn has_tag(&self, tag_type: &TagType) -> bool;
}

impl<M: Metadata + ?Sized> Metadata for &M {
    fn site(&self) -> &str {
        (**self).site()
    }

    fn query_tag(&self, tag_type: &TagType) -> Option<Tag> {
        (**self).query_tag(tag_type)
    }

    fn list_all_tags(&self) -> Vec<Tag> {
        (**self).list_all_tags()
    }

    fn list_own_tags(&self) -> Vec<Tag> {
        (**self).list_own_tags()
    }

    fn has_tag(&self, tag_type: &TagType) -> bool {
        (**self).has_tag(tag_type)
    }
}

/// Tags written at a declaration site, plus tags it inherits
#[derive(Debug, Clone)]
pub struct DeclaredMetadata {
    site: String,
    own: Vec<Tag>,
    inherited: Vec<Tag>,
    hierarchy: Arc<TagHierarchy>,
}

impl DeclaredMetadata {
    /// Create an empty site
    pub fn new(site: impl Into<String>, hierarchy: Arc<TagHierarchy>) -> Self {
        Self {
            site: site.into(),
            own: Vec::new(),
            inherited: Vec::new(),
            hierarchy,
        }
    }

    /// Add a tag declared at this site
    pub fn tag(mut self, tag: Tag) -> Self {
        self.own.push(tag);
        self
    }

    /// Add a tag inherited from an enclosing declaration
    pub fn inherit(mut self, tag: Tag) -> Self {
        self.inherited.push(tag);
        self
    }
}

impl Metadata for DeclaredMetadata {
    fn site(&self) -> &str {
        &self.site
    }

    fn query_tag(&self, tag_type: &TagType) -> Option<Tag> {
        self.own
            .iter()
            .chain(self.inherited.iter())
            .find(|tag| self.hierarchy.is_assignable(tag_type, &tag.tag_type))
            .cloned()
    }

    fn list_all_tags(&self) -> Vec<Tag> {
        self.own.iter().chain(self.inherited.iter()).cloned().collect()
    }

    fn list_own_tags(&self) -> Vec<Tag> {
        self.own.clone()
    }

    fn has_tag(&self, tag_type: &TagType) -> bool {
        self.query_tag(tag_type).is_some()
    }
}

/// A tag source with one tag substituted by a replacement
///
/// Unrelated tags of the base source stay visible unchanged. Note the
/// matching modes differ per operation: `query_tag` and `list_all_tags`
/// match by assignability while `list_own_tags` and `has_tag` require the
/// replacement's exact type.
#[derive(Debug, Clone)]
pub struct MetadataOverride<M> {
    base: M,
    replacement: Tag,
    hierarchy: Arc<TagHierarchy>,
}

impl<M: Metadata> MetadataOverride<M> {
    /// Wrap `base`, substituting `replacement`
    pub fn new(base: M, replacement: Tag, hierarchy: Arc<TagHierarchy>) -> Self {
        #[cfg(feature = "logging")]
        debug!("Overriding {} on {}", replacement, base.site());

        Self {
            base,
            replacement,
            hierarchy,
        }
    }

    /// The substituted tag
    pub fn replacement(&self) -> &Tag {
        &self.replacement
    }

    /// The wrapped source
    pub fn base(&self) -> &M {
        &self.base
    }
}

impl<M: Metadata> Metadata for MetadataOverride<M> {
    fn site(&self) -> &str {
        self.base.site()
    }

    fn query_tag(&self, tag_type: &TagType) -> Option<Tag> {
        if self
            .hierarchy
            .is_assignable(tag_type, &self.replacement.tag_type)
        {
            Some(self.replacement.clone())
        } else {
            self.base.query_tag(tag_type)
        }
    }

    fn list_all_tags(&self) -> Vec<Tag> {
        self.base
            .list_all_tags()
            .into_iter()
            .map(|tag| {
                if self
                    .hierarchy
                    .is_assignable(&tag.tag_type, &self.replacement.tag_type)
                {
                    self.replacement.clone()
                } else {
                    tag
                }
            })
            .collect()
    }

    fn list_own_tags(&self) -> Vec<Tag> {
        self.base
            .list_own_tags()
            .into_iter()
            .map(|tag| {
                if tag.tag_type == self.replacement.tag_type {
                    self.replacement.clone()
                } else {
                    tag
                }
            })
            .collect()
    }

    fn has_tag(&self, tag_type: &TagType) -> bool {
        self.base.has_tag(tag_type) || self.replacement.tag_type == *tag_type
    }
}
