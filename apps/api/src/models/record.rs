#![allow(dead_code)]

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Field names owned by the store. They live in `Meta`, never in a document body,
/// and cannot be written through a patch.
pub const RESERVED_FIELDS: &[&str] = &[
    "id",
    "_id",
    "created_by",
    "created_at",
    "updated_at",
    "deleted",
    "deleted_by",
    "deleted_at",
    "revision",
    "seq",
];

pub fn is_reserved(field: &str) -> bool {
    RESERVED_FIELDS.contains(&field)
}

/// A persisted entity kind. `COLLECTION` doubles as the resource name that
/// permissions are granted on.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;
}

/// Audit and soft-delete metadata carried by every stored document.
///
/// `deleted_by`, `deleted_at`, `revision` and `seq` are internal and never
/// appear in the serialized (API-facing) form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Meta {
    pub id: Uuid,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
    #[serde(skip_serializing, default)]
    pub deleted_by: Option<Uuid>,
    #[serde(skip_serializing, default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing, default)]
    pub revision: i64,
    /// Insertion order, assigned by the store. Breaks sort ties.
    #[serde(skip_serializing, default)]
    pub seq: i64,
}

impl Meta {
    pub fn new(created_by: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_by,
            created_at: now,
            updated_at: now,
            deleted: false,
            deleted_by: None,
            deleted_at: None,
            revision: 0,
            seq: 0,
        }
    }

    /// Stamps the soft-delete markers. Callers check `deleted` first; a second
    /// stamp would overwrite the original actor.
    pub fn mark_deleted(&mut self, actor: Option<Uuid>, at: DateTime<Utc>) {
        self.deleted = true;
        self.deleted_by = actor;
        self.deleted_at = Some(at);
        self.revision += 1;
    }

    pub fn clear_deleted(&mut self) {
        self.deleted = false;
        self.deleted_by = None;
        self.deleted_at = None;
        self.revision += 1;
    }

    /// `deleted_by`/`deleted_at` are set iff `deleted` is.
    pub fn delete_markers_consistent(&self) -> bool {
        self.deleted == self.deleted_at.is_some()
            && (self.deleted || self.deleted_by.is_none())
    }
}

/// Untyped stored form: metadata plus a JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub meta: Meta,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(created_by: Option<Uuid>, mut fields: Map<String, Value>) -> Self {
        fields.retain(|k, _| !is_reserved(k));
        Self {
            meta: Meta::new(created_by),
            fields,
        }
    }

    pub fn id(&self) -> Uuid {
        self.meta.id
    }

    /// Resolves a field by name, including the metadata fields. Ids and timestamps
    /// resolve to the strings they serialize as.
    pub fn field(&self, name: &str) -> Option<Value> {
        let meta = &self.meta;
        match name {
            "id" | "_id" => Some(Value::String(meta.id.to_string())),
            "created_by" => Some(uuid_value(meta.created_by)),
            "created_at" => Some(time_value(Some(meta.created_at))),
            "updated_at" => Some(time_value(Some(meta.updated_at))),
            "deleted" => Some(Value::Bool(meta.deleted)),
            "deleted_by" => Some(uuid_value(meta.deleted_by)),
            "deleted_at" => Some(time_value(meta.deleted_at)),
            "revision" => Some(Value::from(meta.revision)),
            other => self.fields.get(other).cloned(),
        }
    }

    pub fn into_record<T: DeserializeOwned>(self) -> Result<Record<T>, serde_json::Error> {
        let data = serde_json::from_value(Value::Object(self.fields))?;
        Ok(Record {
            meta: self.meta,
            data,
        })
    }
}

fn uuid_value(id: Option<Uuid>) -> Value {
    id.map(|id| Value::String(id.to_string()))
        .unwrap_or(Value::Null)
}

fn time_value(at: Option<DateTime<Utc>>) -> Value {
    at.map(instant_value).unwrap_or(Value::Null)
}

/// Fixed-width UTC RFC 3339, so string order is time order.
pub fn instant_value(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

/// A typed entity with its metadata. Serializes flat:
/// `{"id": ..., "created_at": ..., "deleted": false, "name": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record<T> {
    #[serde(flatten)]
    pub meta: Meta,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> Record<T> {
    pub fn id(&self) -> Uuid {
        self.meta.id
    }

    pub fn to_document(&self) -> Result<Document, serde_json::Error> {
        Ok(Document {
            meta: self.meta.clone(),
            fields: body_fields(&self.data)?,
        })
    }
}

/// Serializes an entity body into document fields, dropping reserved keys.
pub fn body_fields<T: Serialize>(data: &T) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(data)? {
        Value::Object(mut map) => {
            map.retain(|k, _| !is_reserved(k));
            Ok(map)
        }
        other => Err(serde::de::Error::custom(format!(
            "entity body must serialize to an object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Note {
        title: String,
    }

    #[test]
    fn test_serialized_record_hides_internal_fields() {
        let mut meta = Meta::new(Some(Uuid::new_v4()));
        meta.mark_deleted(Some(Uuid::new_v4()), Utc::now());
        let record = Record {
            meta,
            data: Note {
                title: "hello".into(),
            },
        };

        let value = serde_json::to_value(&record).unwrap();
        let obj = value.as_object().unwrap();
        for hidden in ["deleted_by", "deleted_at", "revision", "seq"] {
            assert!(!obj.contains_key(hidden), "{hidden} leaked");
        }
        for shown in ["id", "created_by", "created_at", "updated_at", "deleted", "title"] {
            assert!(obj.contains_key(shown), "{shown} missing");
        }
        assert_eq!(obj["deleted"], json!(true));
    }

    #[test]
    fn test_new_document_strips_reserved_fields() {
        let fields = json!({"id": "spoofed", "deleted": true, "title": "x"});
        let doc = Document::new(None, fields.as_object().unwrap().clone());
        assert_eq!(doc.fields.len(), 1);
        assert!(!doc.meta.deleted);
        assert_ne!(doc.field("id"), Some(json!("spoofed")));
    }

    #[test]
    fn test_field_resolves_metadata() {
        let actor = Uuid::new_v4();
        let doc = Document::new(Some(actor), Map::new());
        assert_eq!(doc.field("created_by"), Some(json!(actor.to_string())));
        assert_eq!(doc.field("deleted"), Some(json!(false)));
        assert_eq!(doc.field("deleted_at"), Some(Value::Null));
        assert_eq!(doc.field("missing"), None);
    }

    #[test]
    fn test_delete_markers_invariant() {
        let mut meta = Meta::new(None);
        assert!(meta.delete_markers_consistent());
        meta.mark_deleted(Some(Uuid::new_v4()), Utc::now());
        assert!(meta.delete_markers_consistent());
        meta.clear_deleted();
        assert!(meta.delete_markers_consistent());
        assert_eq!(meta.revision, 2);
    }

    #[test]
    fn test_document_record_conversion() {
        let record = Record {
            meta: Meta::new(None),
            data: Note {
                title: "t".into(),
            },
        };
        let doc = record.to_document().unwrap();
        let back: Record<Note> = doc.into_record().unwrap();
        assert_eq!(back, record);
    }
}
