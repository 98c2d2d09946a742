//! # Domain Model
//!
//! A registry node is a [`Resource`]. Collections are resources with
//! `is_collection` set; their `children` field lists the absolute paths of
//! their direct children and is filled in by the storage backend on read.
//! A symlink is a resource whose `link_target` names another path.
//!
//! Metadata that hangs off a resource lives in separate records:
//! [`Association`] (typed cross reference), [`Comment`] and [`Rating`].
//! Tags are plain strings.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RegistryError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    /// Absolute path, assigned by the store on write.
    #[serde(default)]
    pub path: String,
    pub media_type: Option<String>,
    #[serde(default)]
    pub content: Vec<u8>,
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub is_collection: bool,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub link_target: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            path: String::new(),
            media_type: None,
            content: content.into(),
            properties: BTreeMap::new(),
            is_collection: false,
            children: Vec::new(),
            link_target: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn collection() -> Self {
        Self {
            is_collection: true,
            ..Self::new(Vec::<u8>::new())
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_property(name, value);
        self
    }

    pub fn add_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    /// First value of a property.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn content_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }

    pub fn is_link(&self) -> bool {
        self.link_target.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Association {
    pub source: String,
    pub target: String,
    pub kind: String,
}

impl Association {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: kind.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Assigned by the store; zero until then.
    #[serde(default)]
    pub id: u64,
    pub text: String,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: 0,
            text: text.into(),
            author: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingValue(u8);

impl RatingValue {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(RegistryError::InvalidParameter(format!(
                "rating must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub user: String,
    pub value: RatingValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_accessors() {
        let r = Resource::new("body")
            .with_property("owner", "alice")
            .with_property("owner", "bob");
        assert_eq!(r.property("owner"), Some("alice"));
        assert_eq!(r.properties["owner"].len(), 2);
        assert_eq!(r.content_str(), Some("body"));
    }

    #[test]
    fn test_collection_constructor() {
        let c = Resource::collection();
        assert!(c.is_collection);
        assert!(c.content.is_empty());
    }

    #[test]
    fn test_rating_bounds() {
        assert!(RatingValue::new(0).is_err());
        assert!(RatingValue::new(6).is_err());
        assert_eq!(RatingValue::new(5).unwrap().get(), 5);
    }

    #[test]
    fn test_resource_serde_round_trip() {
        let r = Resource::new("x").with_media_type("text/plain");
        let json = serde_json::to_string(&r).unwrap();
        let back: Resource = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
    }
}
