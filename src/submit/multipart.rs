use crate::value::{FieldValue, FileRef, FormValues};

#[derive(Clone, Debug, PartialEq)]
pub enum PartBody {
    Text(String),
    File(FileRef),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Part {
    pub name: String,
    pub body: PartBody,
}

/// Ordered multipart payload. Repeated names are allowed, one part per file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MultipartForm {
    parts: Vec<Part>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// File lists become one part per file, objects and lists are sent as
    /// JSON text, scalars as their text form.
    pub fn from_values(values: &FormValues) -> Self {
        let mut form = Self::new();
        for (key, value) in values.iter() {
            match value {
                FieldValue::File(file) => form.push_file(key.as_str(), file.clone()),
                FieldValue::Files(files) => {
                    for file in files {
                        form.push_file(key.as_str(), file.clone());
                    }
                }
                FieldValue::List(_) | FieldValue::Object(_) => {
                    form.push_text(key.as_str(), value.to_json().to_string())
                }
                FieldValue::Null => form.push_text(key.as_str(), "null"),
                FieldValue::Text(_) | FieldValue::Bool(_) | FieldValue::Number(_) => {
                    form.push_text(key.as_str(), value.to_text())
                }
            }
        }
        form
    }

    pub fn push_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parts.push(Part {
            name: name.into(),
            body: PartBody::Text(value.into()),
        });
    }

    pub fn push_file(&mut self, name: impl Into<String>, file: FileRef) {
        self.parts.push(Part {
            name: name.into(),
            body: PartBody::File(file),
        });
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn files(&self) -> impl Iterator<Item = &FileRef> {
        self.parts.iter().filter_map(|part| match &part.body {
            PartBody::File(file) => Some(file),
            PartBody::Text(_) => None,
        })
    }

    /// Payload bytes, used as the denominator for upload progress.
    pub fn total_bytes(&self) -> u64 {
        self.parts
            .iter()
            .map(|part| match &part.body {
                PartBody::Text(text) => text.len() as u64,
                PartBody::File(file) => file.size,
            })
            .sum()
    }
}
