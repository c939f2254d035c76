use super::{Document, Link, LinkField, TimeStamped};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

macro_rules! document {
    (
        $ty:ident, $collection:literal,
        fields: [$($field:literal),* $(,)?],
        links: [$(($link:literal, $target:ident, $many:literal)),* $(,)?]
    ) => {
        impl Document for $ty {
            const NAME: &'static str = stringify!($ty);
            const COLLECTION: &'static str = $collection;
            const FIELDS: &'static [&'static str] = &[$($field),*];
            const LINKS: &'static [LinkField] = &[$(LinkField {
                field: $link,
                target: <$target as Document>::COLLECTION,
                many: $many,
            }),*];

            fn timestamps(&self) -> &TimeStamped {
                &self.timestamps
            }

            fn timestamps_mut(&mut self) -> &mut TimeStamped {
                &mut self.timestamps
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonKind {
    Host,
    Guest,
    Doctor,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Causal,
    Quantitative,
    Experiential,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompoundKind {
    Supplement,
    Food,
    Herb,
    #[default]
    #[serde(other)]
    Other,
}

/// Whether the transcript itself backs a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Evidence {
    Yes,
    #[default]
    No,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub timestamps: TimeStamped,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<PersonKind>,
}

document!(Person, "persons", fields: ["name", "type"], links: []);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub timestamps: TimeStamped,
    pub name: String,
    pub owner: Option<Link<Person>>,
}

document!(Channel, "channels", fields: ["name", "owner"], links: [("owner", Person, false)]);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub timestamps: TimeStamped,
    pub channel: Link<Channel>,
    pub episode_page_url: Option<String>,
    pub transcript_url: Option<String>,
    pub webpage_summary: Option<String>,
    pub internal_summary: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub episode_number: Option<i64>,
    pub transcript: Option<Link<Transcript>>,
    pub guests: Option<Vec<Link<Person>>>,
    pub webpage_resources: Option<Vec<Link<Resource>>>,
    pub sponsors: Option<Vec<Value>>,
    pub learning_claims: Option<Vec<String>>,
    pub purpose: Option<String>,
    pub participants: Option<Vec<String>>,
    pub main_sections: Option<Vec<Value>>,
    pub key_takeaways: Option<Vec<String>>,
    pub overview_attribution_quotes: Option<Vec<Value>>,
    pub products: Option<Vec<Link<Product>>>,
    pub protocols: Option<Vec<Link<Protocol>>>,
    pub biohacks: Option<Vec<Link<BioHack>>>,
    pub businesses: Option<Vec<Link<Business>>>,
    pub claims: Option<Vec<Link<Claim>>>,
    pub treatments: Option<Vec<Link<Treatment>>>,
    pub success_stories: Option<Vec<Link<SuccessStory>>>,
}

document!(
    Episode, "episodes",
    fields: [
        "channel", "episode_page_url", "transcript_url", "webpage_summary",
        "internal_summary", "release_date", "episode_number", "transcript", "guests",
        "webpage_resources", "sponsors", "learning_claims", "purpose", "participants",
        "main_sections", "key_takeaways", "overview_attribution_quotes", "products",
        "protocols", "biohacks", "businesses", "claims", "treatments", "success_stories",
    ],
    links: [
        ("channel", Channel, false),
        ("transcript", Transcript, false),
        ("guests", Person, true),
        ("webpage_resources", Resource, true),
        ("products", Product, true),
        ("protocols", Protocol, true),
        ("biohacks", BioHack, true),
        ("businesses", Business, true),
        ("claims", Claim, true),
        ("treatments", Treatment, true),
        ("success_stories", SuccessStory, true),
    ]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub timestamps: TimeStamped,
    pub product_summary: Option<String>,
    pub business_summary: Option<String>,
    pub medical_treatment_summary: Option<String>,
    pub claims_made_summary: Option<String>,
    pub high_level_overview_summary: Option<String>,
    pub master_aggregate_summary: Option<String>,
    pub timeline: Option<Vec<Value>>,
    pub structured_product_information: Option<Value>,
    pub structured_medical_treatment: Option<Value>,
    pub structured_high_level_overview: Option<Value>,
    pub structured_claims_made: Option<Value>,
    pub structured_businesses_entities: Option<Value>,
}

document!(
    Transcript, "transcripts",
    fields: [
        "product_summary", "business_summary", "medical_treatment_summary",
        "claims_made_summary", "high_level_overview_summary", "master_aggregate_summary",
        "timeline", "structured_product_information", "structured_medical_treatment",
        "structured_high_level_overview", "structured_claims_made",
        "structured_businesses_entities",
    ],
    links: []
);

/// A web page, paper or video cited on an episode page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub timestamps: TimeStamped,
    pub url: String,
    pub title: Option<String>,
    /// Free text such as `paper`, `video` or `blog`.
    pub kind: Option<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

document!(Resource, "resources", fields: ["url", "title", "kind", "meta"], links: []);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BioMarker {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub timestamps: TimeStamped,
    pub name: String,
    /// e.g. `{"min": 20, "max": 40}`
    pub age_range_optimal: Option<Value>,
    #[serde(default)]
    pub needs_lab: bool,
    pub affected_by: Option<Vec<Link<Product>>>,
}

document!(
    BioMarker, "biomarkers",
    fields: ["name", "age_range_optimal", "needs_lab", "affected_by"],
    links: [("affected_by", Product, true)]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub timestamps: TimeStamped,
    pub name: String,
    pub description: Option<String>,
}

document!(Protocol, "protocols", fields: ["name", "description"], links: []);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BioHack {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub timestamps: TimeStamped,
    pub description: Option<String>,
    pub effects: Option<Vec<Link<BioMarker>>>,
    pub involved_in: Option<Vec<Link<Protocol>>>,
    pub products: Option<Vec<Link<Product>>>,
    pub recommended_by: Option<Vec<Link<Person>>>,
}

document!(
    BioHack, "biohacks",
    fields: ["description", "effects", "involved_in", "products", "recommended_by"],
    links: [
        ("effects", BioMarker, true),
        ("involved_in", Protocol, true),
        ("products", Product, true),
        ("recommended_by", Person, true),
    ]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Business {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub timestamps: TimeStamped,
    pub owner: Option<Link<Person>>,
    pub products: Option<Vec<Link<Product>>>,
    pub biography: Option<String>,
    pub market_cap: Option<f64>,
    pub mentioned_in: Option<Vec<Link<Transcript>>>,
    pub canonical_name: Option<String>,
    pub aliases: Option<Vec<String>>,
    pub role_or_relevance: Option<String>,
    pub first_timestamp: Option<String>,
    pub attribution_quotes: Option<Vec<Value>>,
}

document!(
    Business, "businesses",
    fields: [
        "owner", "products", "biography", "market_cap", "mentioned_in", "canonical_name",
        "aliases", "role_or_relevance", "first_timestamp", "attribution_quotes",
    ],
    links: [
        ("owner", Person, false),
        ("products", Product, true),
        ("mentioned_in", Transcript, true),
    ]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub timestamps: TimeStamped,
    pub name: String,
    pub company: Option<Link<Business>>,
    pub helps_with: Option<Vec<Link<BioHack>>>,
    pub cost: Option<i64>,
    pub buy_links: Option<Vec<String>>,
    pub description: Option<String>,
    pub recommended_by: Option<Vec<Link<Person>>>,
    pub features: Option<Vec<String>>,
    /// Protocol names as stated, not links.
    pub protocols: Option<Vec<String>>,
    pub benefits_as_stated: Option<Vec<String>>,
    pub attribution_quotes: Option<Vec<Value>>,
}

document!(
    Product, "products",
    fields: [
        "name", "company", "helps_with", "cost", "buy_links", "description", "recommended_by",
        "features", "protocols", "benefits_as_stated", "attribution_quotes",
    ],
    links: [
        ("company", Business, false),
        ("helps_with", BioHack, true),
        ("recommended_by", Person, true),
    ]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub timestamps: TimeStamped,
    pub name: String,
    pub description: Option<String>,
    pub products: Option<Vec<Link<Product>>>,
    pub protocols: Option<Vec<Link<Protocol>>>,
    pub biomarkers: Option<Vec<Link<BioMarker>>>,
    pub procedure_or_protocol: Option<Vec<String>>,
    pub outcomes_as_reported: Option<Vec<String>>,
    pub risks_or_contraindications: Option<Vec<String>>,
    #[serde(default)]
    pub confidence: Confidence,
    pub attribution_quotes: Option<Vec<Value>>,
}

document!(
    Treatment, "treatments",
    fields: [
        "name", "description", "products", "protocols", "biomarkers", "procedure_or_protocol",
        "outcomes_as_reported", "risks_or_contraindications", "confidence", "attribution_quotes",
    ],
    links: [
        ("products", Product, true),
        ("protocols", Protocol, true),
        ("biomarkers", BioMarker, true),
    ]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseStudy {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub timestamps: TimeStamped,
    pub title: String,
    pub description: Option<String>,
    pub resources: Option<Vec<Link<Resource>>>,
    pub products: Option<Vec<Link<Product>>>,
    pub businesses: Option<Vec<Link<Business>>>,
    pub treatments: Option<Vec<Link<Treatment>>>,
}

document!(
    CaseStudy, "case_studies",
    fields: ["title", "description", "resources", "products", "businesses", "treatments"],
    links: [
        ("resources", Resource, true),
        ("products", Product, true),
        ("businesses", Business, true),
        ("treatments", Treatment, true),
    ]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessStory {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub timestamps: TimeStamped,
    pub title: String,
    pub summary: Option<String>,
    pub person: Option<Link<Person>>,
    pub product: Option<Link<Product>>,
    pub business: Option<Link<Business>>,
    pub resources: Option<Vec<Link<Resource>>>,
    pub case_study: Option<Link<CaseStudy>>,
}

document!(
    SuccessStory, "success_stories",
    fields: ["title", "summary", "person", "product", "business", "resources", "case_study"],
    links: [
        ("person", Person, false),
        ("product", Product, false),
        ("business", Business, false),
        ("resources", Resource, true),
        ("case_study", CaseStudy, false),
    ]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub timestamps: TimeStamped,
    pub text: String,
    pub description: Option<String>,
    #[serde(default)]
    pub claim_type: ClaimType,
    pub speaker: Option<String>,
    #[serde(default)]
    pub evidence_present_in_transcript: Evidence,
    pub attribution_quotes: Option<Vec<Value>>,
    pub persons: Option<Vec<Link<Person>>>,
    pub products: Option<Vec<Link<Product>>>,
    pub treatments: Option<Vec<Link<Treatment>>>,
    pub biomarkers: Option<Vec<Link<BioMarker>>>,
    pub businesses: Option<Vec<Link<Business>>>,
    pub protocols: Option<Vec<Link<Protocol>>>,
    pub transcript: Option<Link<Transcript>>,
    pub resources: Option<Vec<Link<Resource>>>,
    pub compounds: Option<Vec<Link<Compound>>>,
}

document!(
    Claim, "claims",
    fields: [
        "text", "description", "claim_type", "speaker", "evidence_present_in_transcript",
        "attribution_quotes", "persons", "products", "treatments", "biomarkers", "businesses",
        "protocols", "transcript", "resources", "compounds",
    ],
    links: [
        ("persons", Person, true),
        ("products", Product, true),
        ("treatments", Treatment, true),
        ("biomarkers", BioMarker, true),
        ("businesses", Business, true),
        ("protocols", Protocol, true),
        ("transcript", Transcript, false),
        ("resources", Resource, true),
        ("compounds", Compound, true),
    ]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compound {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub timestamps: TimeStamped,
    pub name: String,
    pub description: Option<String>,
    pub products: Option<Vec<Link<Product>>>,
    pub protocols: Option<Vec<Link<Protocol>>>,
    pub claims: Option<Vec<Link<Claim>>>,
    #[serde(rename = "type", default)]
    pub kind: CompoundKind,
    pub benefits_as_stated: Option<Vec<String>>,
}

document!(
    Compound, "compounds",
    fields: ["name", "description", "products", "protocols", "claims", "type", "benefits_as_stated"],
    links: [
        ("products", Product, true),
        ("protocols", Protocol, true),
        ("claims", Claim, true),
    ]
);

/// Clinic-side treatment with a price, as opposed to a [`Treatment`] described on air.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalTreatment {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub timestamps: TimeStamped,
    pub name: String,
    pub description: Option<String>,
    pub cost: Option<f64>,
    pub persons: Option<Vec<Link<Person>>>,
    pub businesses: Option<Vec<Link<Business>>>,
    pub products: Option<Vec<Link<Product>>>,
    pub protocols: Option<Vec<Link<Protocol>>>,
    pub biomarkers: Option<Vec<Link<BioMarker>>>,
    pub success_stories: Option<Vec<Link<SuccessStory>>>,
}

document!(
    MedicalTreatment, "medical_treatments",
    fields: [
        "name", "description", "cost", "persons", "businesses", "products", "protocols",
        "biomarkers", "success_stories",
    ],
    links: [
        ("persons", Person, true),
        ("businesses", Business, true),
        ("products", Product, true),
        ("protocols", Protocol, true),
        ("biomarkers", BioMarker, true),
        ("success_stories", SuccessStory, true),
    ]
);

#[cfg(test)]
mod tests {
    use super::*;

    fn keys<T: Document>(doc: &T) -> Vec<String> {
        serde_json::to_value(doc)
            .unwrap()
            .as_object()
            .unwrap()
            .keys()
            .filter(|k| !matches!(k.as_str(), "_id" | "created_at" | "updated_at"))
            .cloned()
            .collect()
    }

    #[test]
    fn test_declared_fields_match_serialized_keys() {
        let claim: Claim = serde_json::from_value(serde_json::json!({"text": "x"})).unwrap();
        let mut declared: Vec<String> = Claim::FIELDS.iter().map(|s| s.to_string()).collect();
        let mut serialized = keys(&claim);
        declared.sort();
        serialized.sort();
        assert_eq!(declared, serialized);

        let episode: Episode = serde_json::from_value(serde_json::json!({
            "channel": {"$ref": "channels", "$id": "c1"}
        }))
        .unwrap();
        let mut declared: Vec<String> = Episode::FIELDS.iter().map(|s| s.to_string()).collect();
        let mut serialized = keys(&episode);
        declared.sort();
        serialized.sort();
        assert_eq!(declared, serialized);
    }

    fn assert_fields_declared<T: Document>(doc: &T) {
        let mut declared: Vec<String> = T::FIELDS.iter().map(|s| s.to_string()).collect();
        let mut serialized = keys(doc);
        declared.sort();
        serialized.sort();
        assert_eq!(declared, serialized, "{}", T::COLLECTION);
    }

    #[test]
    fn test_remaining_collections_declare_their_fields() {
        use serde_json::json;

        let treatment: Treatment = serde_json::from_value(json!({"name": "Red light"})).unwrap();
        assert_fields_declared(&treatment);
        let resource: Resource = serde_json::from_value(json!({"url": "https://x"})).unwrap();
        assert_fields_declared(&resource);
        let case_study: CaseStudy = serde_json::from_value(json!({"title": "t"})).unwrap();
        assert_fields_declared(&case_study);
        let story: SuccessStory = serde_json::from_value(json!({"title": "t"})).unwrap();
        assert_fields_declared(&story);
        let compound: Compound = serde_json::from_value(json!({"name": "NMN"})).unwrap();
        assert_fields_declared(&compound);
        let medical: MedicalTreatment = serde_json::from_value(json!({"name": "IV drip"})).unwrap();
        assert_fields_declared(&medical);
    }

    #[test]
    fn test_treatment_and_compound_defaults() {
        let treatment: Treatment = serde_json::from_value(serde_json::json!({
            "name": "Hyperbaric oxygen",
            "biomarkers": [{"$ref": "biomarkers", "$id": "b1"}]
        }))
        .unwrap();
        assert_eq!(treatment.confidence, Confidence::Medium);
        assert_eq!(treatment.biomarkers.as_ref().map(Vec::len), Some(1));

        let compound: Compound = serde_json::from_value(serde_json::json!({
            "name": "Creatine",
            "type": "mineral"
        }))
        .unwrap();
        assert_eq!(compound.kind, CompoundKind::Other);
        assert_eq!(serde_json::to_value(&compound).unwrap()["type"], "other");

        let resource: Resource = serde_json::from_value(serde_json::json!({
            "url": "https://pubmed.example/123"
        }))
        .unwrap();
        assert!(resource.meta.is_empty());
    }

    #[test]
    fn test_claim_defaults() {
        let claim: Claim = serde_json::from_value(serde_json::json!({
            "text": "Cold plunges raise dopamine by 250%"
        }))
        .unwrap();
        assert_eq!(claim.claim_type, ClaimType::Other);
        assert_eq!(claim.evidence_present_in_transcript, Evidence::No);
        assert!(claim.timestamps.created_at <= Utc::now());
    }

    #[test]
    fn test_person_kind_wire_name() {
        let person: Person = serde_json::from_value(serde_json::json!({
            "name": "Dr. Example",
            "type": "researcher"
        }))
        .unwrap();
        assert_eq!(person.kind, Some(PersonKind::Other));

        let json = serde_json::to_value(Person {
            kind: Some(PersonKind::Host),
            ..person
        })
        .unwrap();
        assert_eq!(json["type"], "host");
        assert!(json.get("_id").is_none());
    }
}
