use std::borrow::{Borrow, Cow};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(Cow<'static, str>);

impl FieldKey {
    pub const fn from_static(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(Cow::Owned(value.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of one cell inside a repeatable group, e.g. `vehicles.2.vin`.
    pub fn row(group: &str, index: usize, field: &str) -> Self {
        Self::new(format!("{group}.{index}.{field}"))
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for FieldKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for FieldKey {
    fn from(value: &'static str) -> Self {
        Self::from_static(value)
    }
}

impl From<String> for FieldKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&FieldKey> for FieldKey {
    fn from(value: &FieldKey) -> Self {
        value.clone()
    }
}

/// A file picked by the user. Contents are shared so cloning form values is cheap.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(skip)]
    pub contents: Arc<[u8]>,
}

impl FileRef {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, contents: Vec<u8>) -> Self {
        let contents: Arc<[u8]> = contents.into();
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: contents.len() as u64,
            contents,
        }
    }

    /// Metadata-only reference, for size checks on files not yet read into memory.
    pub fn sized(name: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size,
            contents: Arc::from(Vec::new()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum FieldValue {
    #[default]
    Null,
    Text(String),
    Bool(bool),
    Number(Decimal),
    List(Vec<FieldValue>),
    Object(BTreeMap<String, FieldValue>),
    File(FileRef),
    Files(Vec<FileRef>),
}

impl FieldValue {
    /// Empty values are skipped by every format validator; only `required` rejects them.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(text) => text.is_empty(),
            FieldValue::Bool(value) => !value,
            FieldValue::Number(_) => false,
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Object(entries) => entries.is_empty(),
            FieldValue::File(_) => false,
            FieldValue::Files(files) => files.is_empty(),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(text) => text.trim().is_empty(),
            other => other.is_empty(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, FieldValue::File(_) | FieldValue::Files(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Text form used by validators and text bindings.
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Text(text) => text.clone(),
            FieldValue::Bool(value) => value.to_string(),
            FieldValue::Number(number) => number.normalize().to_string(),
            FieldValue::List(_) | FieldValue::Object(_) => self.to_json().to_string(),
            FieldValue::File(file) => file.name.clone(),
            FieldValue::Files(files) => files
                .iter()
                .map(|file| file.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Character count for text, item count for collections.
    pub fn len(&self) -> usize {
        match self {
            FieldValue::List(items) => items.len(),
            FieldValue::Files(files) => files.len(),
            FieldValue::Object(entries) => entries.len(),
            other => other.to_text().chars().count(),
        }
    }

    pub fn files(&self) -> Vec<FileRef> {
        match self {
            FieldValue::File(file) => vec![file.clone()],
            FieldValue::Files(files) => files.clone(),
            _ => Vec::new(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::Null => JsonValue::Null,
            FieldValue::Text(text) => JsonValue::String(text.clone()),
            FieldValue::Bool(value) => JsonValue::Bool(*value),
            FieldValue::Number(number) => decimal_to_json(*number),
            FieldValue::List(items) => JsonValue::Array(items.iter().map(Self::to_json).collect()),
            FieldValue::Object(entries) => JsonValue::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            FieldValue::File(file) => file_json(file),
            FieldValue::Files(files) => JsonValue::Array(files.iter().map(file_json).collect()),
        }
    }

    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => FieldValue::Null,
            JsonValue::Bool(value) => FieldValue::Bool(value),
            JsonValue::Number(number) => number
                .as_i64()
                .map(Decimal::from)
                .or_else(|| number.as_f64().and_then(Decimal::from_f64))
                .map(FieldValue::Number)
                .unwrap_or(FieldValue::Null),
            JsonValue::String(text) => FieldValue::Text(text),
            JsonValue::Array(items) => {
                FieldValue::List(items.into_iter().map(Self::from_json).collect())
            }
            JsonValue::Object(entries) => FieldValue::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Self::from_json(value)))
                    .collect(),
            ),
        }
    }
}

fn decimal_to_json(number: Decimal) -> JsonValue {
    let normalized = number.normalize();
    if normalized.scale() == 0 {
        if let Some(integer) = normalized.to_i64() {
            return JsonValue::from(integer);
        }
    }
    normalized
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(normalized.to_string()))
}

fn file_json(file: &FileRef) -> JsonValue {
    serde_json::json!({
        "name": file.name,
        "type": file.mime_type,
        "size": file.size,
    })
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(Decimal::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Number(Decimal::from(value))
    }
}

impl From<FileRef> for FieldValue {
    fn from(value: FileRef) -> Self {
        FieldValue::File(value)
    }
}

impl From<Vec<FileRef>> for FieldValue {
    fn from(value: Vec<FileRef>) -> Self {
        FieldValue::Files(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::List(value.into_iter().map(FieldValue::Text).collect())
    }
}

impl<T> From<Option<T>> for FieldValue
where
    T: Into<FieldValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("field `{field}` expected {expected}")]
pub struct FieldValueError {
    pub field: String,
    pub expected: &'static str,
}

/// Typed extraction used by `#[derive(FormModel)]`.
pub trait FromFieldValue: Sized {
    const EXPECTED: &'static str;

    fn from_field_value(value: &FieldValue) -> Option<Self>;

    fn extract(values: &FormValues, field: &str) -> Result<Self, FieldValueError> {
        let value = values.get(field).unwrap_or(&FieldValue::Null);
        Self::from_field_value(value).ok_or_else(|| FieldValueError {
            field: field.to_string(),
            expected: Self::EXPECTED,
        })
    }
}

impl FromFieldValue for String {
    const EXPECTED: &'static str = "text";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => Some(String::new()),
            FieldValue::Text(text) => Some(text.clone()),
            FieldValue::Number(number) => Some(number.normalize().to_string()),
            _ => None,
        }
    }
}

impl FromFieldValue for bool {
    const EXPECTED: &'static str = "a boolean";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => Some(false),
            FieldValue::Bool(value) => Some(*value),
            FieldValue::Text(text) => text.parse().ok(),
            _ => None,
        }
    }
}

impl FromFieldValue for Decimal {
    const EXPECTED: &'static str = "a number";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Number(number) => Some(*number),
            FieldValue::Text(text) => Decimal::from_str(text.trim()).ok(),
            _ => None,
        }
    }
}

impl FromFieldValue for i64 {
    const EXPECTED: &'static str = "an integer";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        Decimal::from_field_value(value).and_then(|number| number.to_i64())
    }
}

impl FromFieldValue for u32 {
    const EXPECTED: &'static str = "a non-negative integer";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        Decimal::from_field_value(value).and_then(|number| number.to_u32())
    }
}

impl FromFieldValue for FileRef {
    const EXPECTED: &'static str = "a file";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::File(file) => Some(file.clone()),
            FieldValue::Files(files) => files.first().cloned(),
            _ => None,
        }
    }
}

impl FromFieldValue for Vec<FileRef> {
    const EXPECTED: &'static str = "a file list";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => Some(Vec::new()),
            FieldValue::File(_) | FieldValue::Files(_) => Some(value.files()),
            _ => None,
        }
    }
}

impl FromFieldValue for Vec<String> {
    const EXPECTED: &'static str = "a text list";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => Some(Vec::new()),
            FieldValue::List(items) => items.iter().map(String::from_field_value).collect(),
            _ => None,
        }
    }
}

impl<T> FromFieldValue for Option<T>
where
    T: FromFieldValue,
{
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        if value.is_empty() {
            return Some(None);
        }
        T::from_field_value(value).map(Some)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormValues(BTreeMap<FieldKey, FieldValue>);

impl FormValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<FieldKey>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<FieldKey>, value: impl Into<FieldValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &FieldKey> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, &FieldValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_files(&self) -> bool {
        self.0.values().any(FieldValue::is_file)
    }

    /// Last writer wins per key.
    pub fn merge(&mut self, other: &FormValues) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.0
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_json()))
                .collect(),
        )
    }

    pub fn from_json(value: JsonValue) -> Self {
        match FieldValue::from_json(value) {
            FieldValue::Object(entries) => Self(
                entries
                    .into_iter()
                    .map(|(key, value)| (FieldKey::new(key), value))
                    .collect(),
            ),
            _ => Self::default(),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for FormValues
where
    K: Into<FieldKey>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl IntoIterator for FormValues {
    type Item = (FieldKey, FieldValue);
    type IntoIter = std::collections::btree_map::IntoIter<FieldKey, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
