use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const FIELD_MESSAGE: &str = "message";
pub const FIELD_TIMESTAMP: &str = "@timestamp";
pub const FIELD_TAGS: &str = "tags";

/// Template key holding the event's own message, timestamp and tags
pub const TEMPLATE_EVENT_KEY: &str = "event";

static TEMPLATES: Lazy<Handlebars<'static>> = Lazy::new(|| {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
});

/// One structured log record flowing through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(rename = "@timestamp", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default)]
    pub message: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LogEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            tags: Vec::new(),
            message: message.into(),
            extra: Map::new(),
        }
    }

    /// Build an event from one line of input: JSON objects are decoded,
    /// anything else becomes the message of a fresh event.
    pub fn from_line(line: &str) -> Self {
        serde_json::from_str(line).unwrap_or_else(|_| Self::new(line))
    }

    pub fn add_tag<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            let tag = tag.as_ref();
            if !self.tags.iter().any(|t| t == tag) {
                self.tags.push(tag.to_string());
            }
        }
    }

    pub fn remove_tag<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            let tag = tag.as_ref();
            self.tags.retain(|t| t != tag);
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Write a value addressed by `path`.
    ///
    /// `message`, `@timestamp` and `tags` address the top-level fields; any
    /// other path is a dot-separated path into `extra`. Missing or non-object
    /// intermediates are replaced by objects.
    pub fn set_value(&mut self, path: &str, value: Value) {
        match path {
            FIELD_MESSAGE => {
                self.message = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
            }
            FIELD_TIMESTAMP => {
                if let Some(ts) = value
                    .as_str()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                {
                    self.timestamp = ts.with_timezone(&Utc);
                }
            }
            FIELD_TAGS => {
                if let Value::Array(items) = value {
                    self.tags.clear();
                    self.add_tag(items.iter().filter_map(Value::as_str));
                }
            }
            _ => set_path(&mut self.extra, path, value),
        }
    }

    pub fn get_value(&self, path: &str) -> Option<Value> {
        match path {
            FIELD_MESSAGE => Some(Value::String(self.message.clone())),
            FIELD_TIMESTAMP => Some(Value::String(self.timestamp.to_rfc3339())),
            FIELD_TAGS => Some(Value::from(self.tags.clone())),
            _ => get_path(&self.extra, path).cloned(),
        }
    }

    /// Remove a field, returning the previous value. The timestamp cannot be
    /// removed; `message` and `tags` are cleared instead.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        match path {
            FIELD_MESSAGE => Some(Value::String(std::mem::take(&mut self.message))),
            FIELD_TIMESTAMP => None,
            FIELD_TAGS => Some(Value::from(std::mem::take(&mut self.tags))),
            _ => remove_path(&mut self.extra, path),
        }
    }

    /// Read the array stored at `path` in `extra`. Top-level fields are
    /// never consulted.
    pub fn get_sequence(&self, path: &str) -> Result<Vec<Value>> {
        match get_path(&self.extra, path) {
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(_) => Err(AppError::NotASequence(path.to_string())),
            None => Err(AppError::MissingField(path.to_string())),
        }
    }

    /// Write into `extra` only, even when `path` names a top-level field.
    pub fn set_extra(&mut self, path: &str, value: Value) {
        set_path(&mut self.extra, path, value);
    }

    /// Remove from `extra` only, even when `path` names a top-level field.
    pub fn remove_extra(&mut self, path: &str) -> Option<Value> {
        remove_path(&mut self.extra, path)
    }

    /// Interpolate a handlebars template against the event's fields.
    ///
    /// `{{host}}` reads `extra`, `{{event.timestamp}}` the event timestamp.
    /// Templates that fail to render are returned unchanged.
    pub fn format(&self, template: &str) -> String {
        if !template.contains("{{") {
            return template.to_string();
        }

        match TEMPLATES.render_template(template, &self.template_context()) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::debug!("Failed to render template {:?}: {}", template, e);
                template.to_string()
            }
        }
    }

    /// `extra` at top level, plus `message`, `tags` and the event's own
    /// fields under `event`. Keys already present in `extra` are never
    /// shadowed.
    fn template_context(&self) -> Value {
        let mut context = self.extra.clone();
        context
            .entry(FIELD_MESSAGE)
            .or_insert_with(|| Value::String(self.message.clone()));
        context
            .entry(FIELD_TAGS)
            .or_insert_with(|| Value::from(self.tags.clone()));
        context.entry(TEMPLATE_EVENT_KEY).or_insert_with(|| {
            serde_json::json!({
                "message": self.message,
                "timestamp": self.timestamp.to_rfc3339(),
                "tags": self.tags,
            })
        });
        Value::Object(context)
    }
}

fn get_path<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(value) = map.get(path) {
        return Some(value);
    }

    let (head, rest) = path.split_once('.')?;
    match map.get(head)? {
        Value::Object(inner) => get_path(inner, rest),
        _ => None,
    }
}

fn set_path(map: &mut Map<String, Value>, path: &str, value: Value) {
    if map.contains_key(path) {
        map.insert(path.to_string(), value);
        return;
    }

    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(inner) = entry {
                set_path(inner, rest, value);
            }
        }
    }
}

fn remove_path(map: &mut Map<String, Value>, path: &str) -> Option<Value> {
    if let Some(value) = map.remove(path) {
        return Some(value);
    }

    let (head, rest) = path.split_once('.')?;
    match map.get_mut(head)? {
        Value::Object(inner) => remove_path(inner, rest),
        _ => None,
    }
}
