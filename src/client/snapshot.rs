//! Payload snapshotting
//!
//! Turns the current state of the form into the opaque [`Document`] the draft
//! store keeps. Snapshotting is pure: no I/O, no mutation, safe to call on
//! every scheduler tick.

use crate::payload::Document;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Anything that can produce a snapshot of the form.
pub trait Snapshotter: Send + Sync {
    /// Capture the current form state.
    fn snapshot(&self) -> Document;
}

/// One field (or field group) of the form.
#[derive(Debug, Clone, PartialEq)]
pub enum FormField {
    /// A named input. Fields of any kind sharing a name collapse into a list
    /// of their values in document order.
    Single {
        /// Field name
        name: String,
        /// Current value
        value: Value,
    },
    /// A repeatable input; always captured as a list, even with one row.
    Repeated {
        /// Field name
        name: String,
        /// Rows in display order
        rows: Vec<Value>,
    },
    /// A fieldset captured as a nested object.
    Group {
        /// Group name
        name: String,
        /// Member fields
        fields: Vec<FormField>,
    },
    /// A repeatable fieldset (e.g. author rows) captured as a list of objects.
    RepeatedGroup {
        /// Group name
        name: String,
        /// One field list per row
        rows: Vec<Vec<FormField>>,
    },
}

impl FormField {
    fn name(&self) -> &str {
        match self {
            FormField::Single { name, .. }
            | FormField::Repeated { name, .. }
            | FormField::Group { name, .. }
            | FormField::RepeatedGroup { name, .. } => name,
        }
    }
}

/// In-memory form model.
///
/// # Examples
///
/// ```
/// use metadraft::client::snapshot::{FormState, Snapshotter};
/// use serde_json::json;
///
/// let form = FormState::new()
///     .field("title", json!("Sea ice extent"))
///     .repeated("keywords", vec![json!("ice"), json!("arctic")]);
/// let doc = form.snapshot();
/// assert_eq!(doc.get("keywords"), Some(&json!(["ice", "arctic"])));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormState {
    fields: Vec<FormField>,
}

impl FormState {
    /// Empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single-valued field.
    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.push(FormField::Single {
            name: name.into(),
            value,
        });
        self
    }

    /// Add a repeatable field.
    pub fn repeated(mut self, name: impl Into<String>, rows: Vec<Value>) -> Self {
        self.fields.push(FormField::Repeated {
            name: name.into(),
            rows,
        });
        self
    }

    /// Add a grouped fieldset.
    pub fn group(mut self, name: impl Into<String>, group: FormState) -> Self {
        self.fields.push(FormField::Group {
            name: name.into(),
            fields: group.fields,
        });
        self
    }

    /// Add a repeatable fieldset.
    pub fn repeated_group(mut self, name: impl Into<String>, rows: Vec<FormState>) -> Self {
        self.fields.push(FormField::RepeatedGroup {
            name: name.into(),
            rows: rows.into_iter().map(|row| row.fields).collect(),
        });
        self
    }

    /// Set the value of a top-level single field, adding it if absent.
    pub fn set(&mut self, name: &str, value: Value) {
        for field in &mut self.fields {
            if let FormField::Single { name: n, value: v } = field {
                if n == name {
                    *v = value;
                    return;
                }
            }
        }
        self.fields.push(FormField::Single {
            name: name.to_string(),
            value,
        });
    }

    /// Remove every top-level field called `name`.
    pub fn remove(&mut self, name: &str) {
        self.fields.retain(|field| field.name() != name);
    }

    /// Top-level fields.
    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    /// Rebuild a form from a stored document.
    ///
    /// Objects become groups, lists of objects become repeated groups, other
    /// lists become repeated fields. Snapshotting the result yields a
    /// document equal to `doc`.
    pub fn from_document(doc: &Document) -> Self {
        Self {
            fields: fields_from_map(doc.as_map()),
        }
    }
}

fn fields_from_map(map: &Map<String, Value>) -> Vec<FormField> {
    map.iter()
        .map(|(name, value)| {
            let name = name.clone();
            match value {
                Value::Object(inner) => FormField::Group {
                    name,
                    fields: fields_from_map(inner),
                },
                Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
                    FormField::RepeatedGroup {
                        name,
                        rows: items
                            .iter()
                            .filter_map(Value::as_object)
                            .map(fields_from_map)
                            .collect(),
                    }
                }
                Value::Array(items) => FormField::Repeated {
                    name,
                    rows: items.clone(),
                },
                scalar => FormField::Single {
                    name,
                    value: scalar.clone(),
                },
            }
        })
        .collect()
}

fn capture(fields: &[FormField]) -> Map<String, Value> {
    let mut out = Map::new();
    // Keys whose value is a list built from colliding fields, as opposed to
    // a field whose own value happens to be a list.
    let mut collapsed: HashSet<String> = HashSet::new();
    for field in fields {
        let name = field.name();
        let value = match field {
            FormField::Single { value, .. } => value.clone(),
            FormField::Repeated { rows, .. } => Value::Array(rows.clone()),
            FormField::Group { fields, .. } => Value::Object(capture(fields)),
            FormField::RepeatedGroup { rows, .. } => {
                Value::Array(rows.iter().map(|row| Value::Object(capture(row))).collect())
            }
        };
        match out.get_mut(name) {
            None => {
                out.insert(name.to_string(), value);
            }
            Some(Value::Array(existing)) if collapsed.contains(name) => existing.push(value),
            Some(previous) => {
                let first = previous.take();
                *previous = Value::Array(vec![first, value]);
                collapsed.insert(name.to_string());
            }
        }
    }
    out
}

impl Snapshotter for FormState {
    fn snapshot(&self) -> Document {
        Document::from(capture(&self.fields))
    }
}

/// A form shared between the UI side (which edits it) and the autosave
/// scheduler (which snapshots it).
#[derive(Debug, Clone, Default)]
pub struct SharedForm {
    inner: Arc<RwLock<FormState>>,
}

impl SharedForm {
    /// Wrap an initial form state.
    pub fn new(state: FormState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Mutate the form.
    pub fn edit<R>(&self, f: impl FnOnce(&mut FormState) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }

    /// Replace the whole form.
    pub fn replace(&self, state: FormState) {
        *self.inner.write().unwrap_or_else(|p| p.into_inner()) = state;
    }
}

impl Snapshotter for SharedForm {
    fn snapshot(&self) -> Document {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .snapshot()
    }
}
