//! Document definitions for the scraper's MongoDB database.
//!
//! Each entity is a plain serde struct that knows its collection. Links are
//! stored as `{ "$ref", "$id" }` pairs; back-links are not stored and are
//! only described by [`catalog`].

pub mod convert;
pub mod documents;
pub mod link;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use convert::{document_from_output, update_document_from_output};
pub use documents::*;
pub use link::Link;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkField {
    pub field: &'static str,
    pub target: &'static str,
    pub many: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeStamped {
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl TimeStamped {
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for TimeStamped {
    fn default() -> Self {
        Self::now()
    }
}

pub trait Document: Serialize + DeserializeOwned {
    const NAME: &'static str;
    const COLLECTION: &'static str;
    /// Keys that may be filled from loose output. Excludes `_id` and timestamps.
    const FIELDS: &'static [&'static str];
    const LINKS: &'static [LinkField];

    fn timestamps(&self) -> &TimeStamped;
    fn timestamps_mut(&mut self) -> &mut TimeStamped;

    fn touch(&mut self) {
        self.timestamps_mut().updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub entity: &'static str,
    pub collection: &'static str,
    pub fields: Vec<&'static str>,
    pub links: Vec<LinkField>,
    /// `collection.field` entries elsewhere that point here
    pub referenced_by: Vec<String>,
}

fn info<T: Document>() -> CollectionInfo {
    CollectionInfo {
        entity: T::NAME,
        collection: T::COLLECTION,
        fields: T::FIELDS.to_vec(),
        links: T::LINKS.to_vec(),
        referenced_by: Vec::new(),
    }
}

/// All collections with their forward links and the derived back-links.
pub fn catalog() -> Vec<CollectionInfo> {
    let mut collections = vec![
        info::<Person>(),
        info::<Channel>(),
        info::<Episode>(),
        info::<Transcript>(),
        info::<BioMarker>(),
        info::<Protocol>(),
        info::<BioHack>(),
        info::<Business>(),
        info::<Product>(),
        info::<Claim>(),
        info::<Resource>(),
        info::<Treatment>(),
        info::<CaseStudy>(),
        info::<SuccessStory>(),
        info::<Compound>(),
        info::<MedicalTreatment>(),
    ];

    let edges: Vec<(&'static str, String)> = collections
        .iter()
        .flat_map(|c| {
            c.links
                .iter()
                .map(move |link| (link.target, format!("{}.{}", c.collection, link.field)))
        })
        .collect();
    for collection in &mut collections {
        collection.referenced_by = edges
            .iter()
            .filter(|(target, _)| *target == collection.collection)
            .map(|(_, source)| source.clone())
            .collect();
    }
    collections
}
