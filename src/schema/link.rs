use super::Document;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Reference to a document in another collection, stored as
/// `{ "$ref": <collection>, "$id": <id> }`.
///
/// Nothing checks that the target exists; resolution is left to the reader.
pub struct Link<T: Document> {
    id: String,
    target: PhantomData<fn() -> T>,
}

impl<T: Document> Link<T> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: PhantomData,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn collection(&self) -> &'static str {
        T::COLLECTION
    }
}

impl<T: Document> Clone for Link<T> {
    fn clone(&self) -> Self {
        Self::new(self.id.clone())
    }
}

impl<T: Document> PartialEq for Link<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: Document> Eq for Link<T> {}

impl<T: Document> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link({}/{})", T::COLLECTION, self.id)
    }
}

impl<T: Document> Serialize for Link<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("$ref", T::COLLECTION)?;
        map.serialize_entry("$id", &self.id)?;
        map.end()
    }
}

struct LinkVisitor<T>(PhantomData<fn() -> T>);

impl<'de, T: Document> Visitor<'de> for LinkVisitor<T> {
    type Value = Link<T>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a reference into the '{}' collection", T::COLLECTION)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut collection: Option<String> = None;
        let mut id: Option<String> = None;
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "$ref" => collection = Some(map.next_value()?),
                "$id" => id = Some(map.next_value()?),
                _ => {
                    map.next_value::<de::IgnoredAny>()?;
                }
            }
        }
        let collection = collection.ok_or_else(|| de::Error::missing_field("$ref"))?;
        if collection != T::COLLECTION {
            return Err(de::Error::custom(format!(
                "reference points at '{}', expected '{}'",
                collection,
                T::COLLECTION
            )));
        }
        let id = id.ok_or_else(|| de::Error::missing_field("$id"))?;
        Ok(Link::new(id))
    }
}

impl<'de, T: Document> Deserialize<'de> for Link<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(LinkVisitor(PhantomData))
    }
}
