use super::Document;
use crate::utils::error::{ProvisionError, Result};
use serde_json::{Map, Value};

fn document_error<T: Document>(message: impl Into<String>) -> ProvisionError {
    ProvisionError::DocumentError {
        collection: T::COLLECTION.to_string(),
        message: message.into(),
    }
}

fn as_object<'a, T: Document>(output: &'a Value) -> Result<&'a Map<String, Value>> {
    output
        .as_object()
        .ok_or_else(|| document_error::<T>(format!("expected a JSON object, got {}", output)))
}

/// Builds a new document from loose extraction output.
///
/// Keys the document does not declare are dropped, as are nulls. `overrides`
/// are applied afterwards under the same rule. Timestamps are set to now.
pub fn document_from_output<T: Document>(output: &Value, overrides: &Map<String, Value>) -> Result<T> {
    let mut filtered: Map<String, Value> = as_object::<T>(output)?
        .iter()
        .filter(|(key, value)| T::FIELDS.contains(&key.as_str()) && !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    for (key, value) in overrides {
        if T::FIELDS.contains(&key.as_str()) {
            filtered.insert(key.clone(), value.clone());
        }
    }

    serde_json::from_value(Value::Object(filtered)).map_err(|e| document_error::<T>(e.to_string()))
}

/// Overlays the declared, non-null keys of `output` onto `document` and
/// touches `updated_at`. On error the document is left as it was.
pub fn update_document_from_output<T: Document>(document: &mut T, output: &Value) -> Result<()> {
    let patch = as_object::<T>(output)?;

    let mut current = match serde_json::to_value(&*document)? {
        Value::Object(map) => map,
        other => return Err(document_error::<T>(format!("document serialized to {}", other))),
    };
    for (key, value) in patch {
        if T::FIELDS.contains(&key.as_str()) && !value.is_null() {
            current.insert(key.clone(), value.clone());
        }
    }

    let mut updated: T =
        serde_json::from_value(Value::Object(current)).map_err(|e| document_error::<T>(e.to_string()))?;
    updated.touch();
    *document = updated;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ClaimType, Claim, Episode, Link, Person, Product};
    use serde_json::json;

    #[test]
    fn test_from_output_keeps_declared_keys() {
        let output = json!({
            "name": "Red light panel",
            "cost": 499,
            "buy_links": ["https://shop.example/panel"],
            "confidence": "high",
            "description": null
        });
        let product: Product = document_from_output(&output, &Map::new()).unwrap();
        assert_eq!(product.name, "Red light panel");
        assert_eq!(product.cost, Some(499));
        assert_eq!(product.description, None);
        assert!(product.id.is_none());
    }

    #[test]
    fn test_overrides_apply_only_to_declared_keys() {
        let output = json!({"text": "Sauna lowers all-cause mortality", "claim_type": "causal"});
        let mut overrides = Map::new();
        overrides.insert(
            "transcript".to_string(),
            json!({"$ref": "transcripts", "$id": "t-42"}),
        );
        overrides.insert("not_a_field".to_string(), json!(true));

        let claim: Claim = document_from_output(&output, &overrides).unwrap();
        assert_eq!(claim.claim_type, ClaimType::Causal);
        assert_eq!(claim.transcript.unwrap().id(), "t-42");
    }

    #[test]
    fn test_from_output_requires_mandatory_fields() {
        let err = document_from_output::<Episode>(&json!({"purpose": "intro"}), &Map::new()).unwrap_err();
        assert!(matches!(err, ProvisionError::DocumentError { ref collection, .. } if collection == "episodes"));
        assert!(document_from_output::<Person>(&json!("not an object"), &Map::new()).is_err());
    }

    #[test]
    fn test_update_overlays_and_touches() {
        let mut person: Person = document_from_output(&json!({"name": "Guest"}), &Map::new()).unwrap();
        person.id = Some("p1".to_string());
        let created = person.timestamps.created_at;
        let before = person.timestamps.updated_at;

        update_document_from_output(&mut person, &json!({"type": "doctor", "name": null, "_id": "x"})).unwrap();

        assert_eq!(person.name, "Guest");
        assert_eq!(person.id.as_deref(), Some("p1"));
        assert_eq!(person.timestamps.created_at, created);
        assert!(person.timestamps.updated_at >= before);
        assert_eq!(serde_json::to_value(&person).unwrap()["type"], "doctor");
    }

    #[test]
    fn test_failed_update_leaves_document_unchanged() {
        let mut episode: Episode = document_from_output(
            &json!({"channel": {"$ref": "channels", "$id": "c1"}}),
            &Map::new(),
        )
        .unwrap();
        let snapshot = episode.clone();

        let result = update_document_from_output(
            &mut episode,
            &json!({"channel": {"$ref": "persons", "$id": "p1"}}),
        );
        assert!(result.is_err());
        assert_eq!(episode, snapshot);
        assert_eq!(episode.channel, Link::new("c1"));
    }
}
