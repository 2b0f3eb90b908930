//! Flat task records as delivered by the task service.
//!
//! The service has shipped the parent reference under several spellings and
//! types over time. A record keeps the raw wire value and normalizes it on
//! demand; serialization always writes the single canonical `parent_id` field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{EvtError, Result};
use crate::fields::Status;

/// One unit of work with an optional parent reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireTask")]
pub struct TaskRecord {
    pub id: u64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<u64>,
    #[serde(rename = "parent_id", serialize_with = "serialize_parent")]
    raw_parent: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_points: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// A pending task without a parent.
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        TaskRecord {
            id,
            title: title.into(),
            description: None,
            event_id: None,
            assigned_to: None,
            raw_parent: None,
            priority: None,
            status: Status::Pending,
            story_points: None,
            created_at: None,
        }
    }

    /// Effective parent id after normalization.
    pub fn parent_id(&self) -> Option<u64> {
        normalize_parent(self.raw_parent.as_ref())
    }

    /// The parent reference as received, if any alias was present.
    pub fn raw_parent(&self) -> Option<&Value> {
        self.raw_parent.as_ref()
    }

    pub fn set_parent(&mut self, parent: Option<u64>) {
        self.raw_parent = Some(parent.map_or(Value::Null, Value::from));
    }

    /// Rewrite the stored parent reference into its canonical form.
    pub fn normalize(&mut self) {
        let parent = self.parent_id();
        self.set_parent(parent);
    }
}

/// Fixture builders.
#[cfg(test)]
impl TaskRecord {
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Attach a raw parent reference exactly as it would arrive on the wire.
    pub fn with_raw_parent(mut self, raw: impl Into<Value>) -> Self {
        self.raw_parent = Some(raw.into());
        self
    }

    pub fn with_parent(self, parent: u64) -> Self {
        self.with_raw_parent(parent)
    }
}

/// Resolve a raw parent reference to a task id.
///
/// `null`, `0`, empty or unparseable strings, negative or fractional numbers
/// and non-scalar values all mean "no parent". Strings are read like a
/// leading-integer parse, so `" 12abc"` resolves to 12.
pub fn normalize_parent(raw: Option<&Value>) -> Option<u64> {
    let id = match raw? {
        Value::Number(n) => number_id(n)?,
        Value::String(s) => leading_integer(s)?,
        _ => return None,
    };
    (id > 0).then_some(id)
}

fn number_id(n: &serde_json::Number) -> Option<u64> {
    if let Some(id) = n.as_u64() {
        return Some(id);
    }
    if n.is_i64() {
        return None;
    }
    let f = n.as_f64()?;
    (f.is_finite() && f > 0.0 && f.fract() == 0.0 && f < u64::MAX as f64).then_some(f as u64)
}

fn leading_integer(s: &str) -> Option<u64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 || negative {
        return None;
    }
    digits[..end].parse().ok()
}

fn serialize_parent<S: Serializer>(raw: &Option<Value>, s: S) -> std::result::Result<S::Ok, S::Error> {
    normalize_parent(raw.as_ref()).serialize(s)
}

fn present<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

/// Wire shape of a task, with every known parent spelling as its own slot.
///
/// Preference order is `parent_id`, `ParentId`, `parentId`, `parent-id`. The
/// first key that is present wins, even when its value is `null`.
#[derive(Deserialize)]
struct WireTask {
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    event_id: Option<u64>,
    #[serde(default)]
    assigned_to: Option<u64>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    status: Status,
    #[serde(default)]
    story_points: Option<u32>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "parent_id", deserialize_with = "present")]
    parent_snake: Option<Value>,
    #[serde(default, rename = "ParentId", deserialize_with = "present")]
    parent_pascal: Option<Value>,
    #[serde(default, rename = "parentId", deserialize_with = "present")]
    parent_camel: Option<Value>,
    #[serde(default, rename = "parent-id", deserialize_with = "present")]
    parent_kebab: Option<Value>,
}

impl From<WireTask> for TaskRecord {
    fn from(w: WireTask) -> Self {
        let raw_parent = [w.parent_snake, w.parent_pascal, w.parent_camel, w.parent_kebab]
            .into_iter()
            .flatten()
            .next();
        TaskRecord {
            id: w.id,
            title: w.title,
            description: w.description,
            event_id: w.event_id,
            assigned_to: w.assigned_to,
            raw_parent,
            priority: w.priority,
            status: w.status,
            story_points: w.story_points,
            created_at: w.created_at,
        }
    }
}

/// A task list as returned by the list endpoints: either a page object
/// `{"tasks": [...], "total": n}` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TaskFeed {
    Page {
        tasks: Vec<TaskRecord>,
        #[serde(default)]
        total: Option<u64>,
    },
    Bare(Vec<TaskRecord>),
}

impl TaskFeed {
    pub fn into_tasks(self) -> Vec<TaskRecord> {
        match self {
            TaskFeed::Page { tasks, total } => {
                if let Some(total) = total {
                    if total as usize != tasks.len() {
                        tracing::debug!(total, received = tasks.len(), "partial task page");
                    }
                }
                tasks
            }
            TaskFeed::Bare(tasks) => tasks,
        }
    }
}

/// Parse a fetched task list and normalize every parent reference.
pub fn parse_feed(json: &str) -> Result<Vec<TaskRecord>> {
    let feed: TaskFeed = serde_json::from_str(json).map_err(|e| {
        EvtError::invalid_input(format!("not a task list ({e})"))
    })?;
    let mut tasks = feed.into_tasks();
    for t in tasks.iter_mut() {
        t.normalize();
    }
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: Value) -> TaskRecord {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn numeric_and_string_parents_are_equivalent() {
        let a = parse(json!({"id": 1, "title": "a", "status": "pending", "parent_id": 5}));
        let b = parse(json!({"id": 1, "title": "a", "status": "pending", "parent_id": "5"}));
        assert_eq!(a.parent_id(), Some(5));
        assert_eq!(b.parent_id(), Some(5));
    }

    #[test]
    fn zero_empty_and_garbage_mean_no_parent() {
        for raw in [json!(0), json!("0"), json!(""), json!("   "), json!("abc"), json!(null),
                    json!(-3), json!("-3"), json!(2.5), json!(true), json!([1]), json!({"id": 1})] {
            let t = parse(json!({"id": 1, "title": "a", "parent_id": raw.clone()}));
            assert_eq!(t.parent_id(), None, "raw parent {raw}");
        }
        let absent = parse(json!({"id": 1, "title": "a"}));
        assert_eq!(absent.parent_id(), None);
        assert!(absent.raw_parent().is_none());
    }

    #[test]
    fn strings_parse_their_leading_integer() {
        assert_eq!(normalize_parent(Some(&json!(" 12abc"))), Some(12));
        assert_eq!(normalize_parent(Some(&json!("+7"))), Some(7));
        assert_eq!(normalize_parent(Some(&json!(4.0))), Some(4));
    }

    #[test]
    fn aliases_are_read_in_preference_order() {
        let pascal = parse(json!({"id": 1, "title": "a", "ParentId": 3}));
        let camel = parse(json!({"id": 1, "title": "a", "parentId": "4"}));
        let kebab = parse(json!({"id": 1, "title": "a", "parent-id": 6}));
        assert_eq!(pascal.parent_id(), Some(3));
        assert_eq!(camel.parent_id(), Some(4));
        assert_eq!(kebab.parent_id(), Some(6));

        let both = parse(json!({"id": 1, "title": "a", "parentId": 4, "ParentId": 3}));
        assert_eq!(both.parent_id(), Some(3));

        // A present null is "defined" and beats later spellings.
        let null_first = parse(json!({"id": 1, "title": "a", "parent_id": null, "parentId": 9}));
        assert_eq!(null_first.parent_id(), None);
    }

    #[test]
    fn serialization_uses_the_canonical_field_only() {
        let t = parse(json!({"id": 2, "title": "b", "status": "completed", "parent-id": "8"}));
        let out = serde_json::to_value(&t).unwrap();
        assert_eq!(out["parent_id"], json!(8));
        assert!(out.get("parent-id").is_none());
        assert_eq!(out["status"], json!("completed"));

        let root = serde_json::to_value(TaskRecord::new(3, "c")).unwrap();
        assert_eq!(root["parent_id"], Value::Null);
    }

    #[test]
    fn passengers_survive_a_round_trip() {
        let t = parse(json!({
            "id": 10, "title": "Book venue", "description": "call them", "event_id": 2,
            "assigned_to": 7, "priority": "high", "status": "in_progress", "story_points": 3,
            "created_at": "2024-05-01T10:00:00Z", "parent_id": null
        }));
        let back: TaskRecord = serde_json::from_value(serde_json::to_value(&t).unwrap()).unwrap();
        assert_eq!(back, t);
        assert_eq!(back.assigned_to, Some(7));
        assert_eq!(back.story_points, Some(3));
        assert!(back.created_at.is_some());
    }

    #[test]
    fn feed_accepts_pages_and_arrays() {
        let page = r#"{"tasks":[{"id":1,"title":"a","parentId":"0"},{"id":2,"title":"b","parent_id":"1"}],"total":2}"#;
        let tasks = parse_feed(page).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].raw_parent(), Some(&Value::Null));
        assert_eq!(tasks[1].raw_parent(), Some(&json!(1)));

        let bare = r#"[{"id":1,"title":"a"}]"#;
        assert_eq!(parse_feed(bare).unwrap().len(), 1);

        assert!(parse_feed(r#"{"nope": true}"#).is_err());
    }
}
