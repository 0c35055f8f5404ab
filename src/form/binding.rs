use super::controller::{FormResult, FormStore, read_lock};
use crate::value::{FieldKey, FieldValue};

#[derive(Clone, Debug, PartialEq)]
pub enum FieldInput {
    Checkbox { checked: bool },
    Value(FieldValue),
}

impl FieldInput {
    pub fn checkbox(checked: bool) -> Self {
        FieldInput::Checkbox { checked }
    }

    pub fn value(value: impl Into<FieldValue>) -> Self {
        FieldInput::Value(value.into())
    }

    pub fn into_value(self) -> FieldValue {
        match self {
            FieldInput::Checkbox { checked } => FieldValue::Bool(checked),
            FieldInput::Value(value) => value,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldProps {
    pub id: String,
    pub name: String,
    pub value: String,
    pub aria_invalid: bool,
    pub aria_describedby: Option<String>,
}

#[derive(Clone)]
pub struct FieldAccessor {
    store: FormStore,
    key: FieldKey,
}

impl FormStore {
    pub fn field(&self, key: impl Into<FieldKey>) -> FieldAccessor {
        FieldAccessor {
            store: self.clone(),
            key: key.into(),
        }
    }
}

impl FieldAccessor {
    pub fn key(&self) -> &FieldKey {
        &self.key
    }

    pub fn value(&self) -> FormResult<FieldValue> {
        Ok(self.store.value(self.key.as_str())?.unwrap_or_default())
    }

    pub fn text(&self) -> FormResult<String> {
        Ok(self.value()?.to_text())
    }

    pub fn error(&self) -> FormResult<Option<String>> {
        self.store.error(self.key.as_str())
    }

    /// Error to render: hidden until the field is touched or a submit was attempted.
    pub fn error_for_display(&self) -> FormResult<Option<String>> {
        let state = read_lock(&self.store.state, "reading display error")?;
        let Some(meta) = state.field_meta.get(self.key.as_str()) else {
            return Ok(None);
        };
        if !meta.touched && state.submit_count == 0 {
            return Ok(None);
        }
        Ok(meta.error.clone())
    }

    pub fn touched(&self) -> FormResult<bool> {
        self.store.is_touched(self.key.as_str())
    }

    pub fn on_change(&self, input: FieldInput) -> FormResult<()> {
        self.store
            .handle_change(self.key.clone(), input.into_value())
    }

    pub fn on_blur(&self) -> FormResult<()> {
        self.store.handle_blur(self.key.clone())
    }

    pub fn set_value(&self, value: impl Into<FieldValue>) -> FormResult<()> {
        self.store.set_field_value(self.key.clone(), value)
    }

    pub fn set_error(&self, message: impl Into<String>) -> FormResult<()> {
        self.store.set_field_error(self.key.clone(), message)
    }

    pub fn clear_error(&self) -> FormResult<()> {
        self.store.clear_field_error(self.key.clone())
    }

    pub fn validate(&self) -> FormResult<bool> {
        self.store.validate_field(self.key.clone())
    }

    pub fn props(&self) -> FormResult<FieldProps> {
        let name = self.key.to_string();
        let error = self.error()?;
        Ok(FieldProps {
            id: name.clone(),
            value: self.text()?,
            aria_invalid: error.is_some(),
            aria_describedby: error.map(|_| format!("{name}-error")),
            name,
        })
    }
}
