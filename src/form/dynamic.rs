use std::collections::BTreeSet;
use std::sync::Arc;

use super::controller::{FormError, FormResult, FormStore};
use super::validation::{FieldRules, ValidationSchema, Validator};
use super::validators;
use crate::value::{FieldKey, FieldValue, FormValues};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TextKind {
    #[default]
    Plain,
    Email,
    Password,
    Number,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

pub type Condition = Arc<dyn Fn(&FieldValue) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum FieldKind {
    Text(TextKind),
    Select { options: Vec<SelectOption> },
    Checkbox,
    Textarea,
    /// Zero or more rows; each row instantiates `template` under `name.index.field`.
    Repeatable { template: Vec<FieldSpec> },
    Conditional {
        condition: Condition,
        fields: Vec<FieldSpec>,
    },
}

impl std::fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Text(kind) => f.debug_tuple("Text").field(kind).finish(),
            FieldKind::Select { options } => {
                f.debug_struct("Select").field("options", options).finish()
            }
            FieldKind::Checkbox => f.write_str("Checkbox"),
            FieldKind::Textarea => f.write_str("Textarea"),
            FieldKind::Repeatable { template } => f
                .debug_struct("Repeatable")
                .field("template", template)
                .finish(),
            FieldKind::Conditional { fields, .. } => f
                .debug_struct("Conditional")
                .field("fields", fields)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub name: String,
    pub label: Option<String>,
    pub placeholder: Option<String>,
    pub required: bool,
    pub rules: Vec<Validator>,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label: None,
            placeholder: None,
            required: false,
            rules: Vec::new(),
            kind,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text(TextKind::Plain))
    }

    pub fn email(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text(TextKind::Email))
    }

    pub fn checkbox(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Checkbox)
    }

    pub fn label(mut self, value: impl Into<String>) -> Self {
        self.label = Some(value.into());
        self
    }

    pub fn placeholder(mut self, value: impl Into<String>) -> Self {
        self.placeholder = Some(value.into());
        self
    }

    pub fn required(mut self, value: bool) -> Self {
        self.required = value;
        self
    }

    pub fn rule(mut self, validator: Validator) -> Self {
        self.rules.push(validator);
        self
    }

    fn default_value(&self) -> Option<FieldValue> {
        match &self.kind {
            FieldKind::Text(_) | FieldKind::Textarea => Some(FieldValue::from("")),
            FieldKind::Select { options } => Some(FieldValue::from(
                options
                    .first()
                    .map(|option| option.value.clone())
                    .unwrap_or_default(),
            )),
            FieldKind::Checkbox => Some(FieldValue::Bool(false)),
            FieldKind::Repeatable { .. } => None,
            FieldKind::Conditional { .. } => Some(FieldValue::Null),
        }
    }

    fn rules_for(&self, key: &FieldKey) -> Option<FieldRules> {
        let mut chain = Vec::new();
        if self.required {
            chain.push(match &self.kind {
                // The group key never holds a value; rows live under `key.N.field`.
                FieldKind::Repeatable { .. } => {
                    let group = key.to_string();
                    Validator::with_form(move |_, form| {
                        (row_count(form, &group) == 0)
                            .then(|| validators::REQUIRED_MESSAGE.to_string())
                    })
                }
                _ => validators::required(),
            });
        }
        match &self.kind {
            FieldKind::Text(TextKind::Email) => chain.push(validators::email()),
            FieldKind::Text(TextKind::Number) => chain.push(validators::number(None, None)),
            FieldKind::Select { options } if !options.is_empty() => {
                let allowed = options
                    .iter()
                    .map(|option| option.value.clone())
                    .collect::<BTreeSet<_>>();
                chain.push(Validator::new(move |value| {
                    let text = value.to_text();
                    (!text.is_empty() && !allowed.contains(&text))
                        .then(|| "Please select a valid option".to_string())
                }));
            }
            FieldKind::Text(TextKind::Plain | TextKind::Password)
            | FieldKind::Select { .. }
            | FieldKind::Checkbox
            | FieldKind::Textarea
            | FieldKind::Repeatable { .. }
            | FieldKind::Conditional { .. } => {}
        }
        chain.extend(self.rules.iter().cloned());
        (!chain.is_empty()).then_some(FieldRules::Chain(chain))
    }
}

#[derive(Clone, Debug)]
pub struct ActiveField {
    pub key: FieldKey,
    pub spec: FieldSpec,
}

#[derive(Clone, Debug, Default)]
pub struct DynamicForm {
    fields: Vec<FieldSpec>,
}

impl DynamicForm {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn initial_values(&self) -> FormValues {
        let mut values = FormValues::new();
        seed_defaults(&self.fields, "", &mut values);
        values
    }

    pub fn active_fields(&self, values: &FormValues) -> Vec<ActiveField> {
        let mut active = Vec::new();
        collect_active(&self.fields, "", values, &mut active);
        active
    }

    pub fn schema(&self, values: &FormValues) -> ValidationSchema {
        let mut schema = ValidationSchema::new();
        for field in self.active_fields(values) {
            if let Some(rules) = field.spec.rules_for(&field.key) {
                schema.insert(field.key, rules);
            }
        }
        schema
    }

    pub fn store(&self) -> FormStore {
        let values = self.initial_values();
        let schema = self.schema(&values);
        FormStore::new(values, schema)
    }

    pub fn sync_schema(&self, store: &FormStore) -> FormResult<()> {
        let values = store.values()?;
        store.replace_schema(self.schema(&values))
    }

    pub fn row_count(&self, values: &FormValues, group: &str) -> usize {
        row_count(values, group)
    }

    pub fn append_row(&self, store: &FormStore, group: &str) -> FormResult<usize> {
        let Some(template) = self.template(group) else {
            return Err(FormError::UnknownField(group.to_string()));
        };
        let mut index = 0;
        store.edit("appending repeatable row", |values, _meta| {
            index = row_count(values, group);
            let prefix = format!("{group}.{index}.");
            seed_defaults(template, &prefix, values);
        })?;
        self.sync_schema(store)?;
        Ok(index)
    }

    /// Removes row `index`; later rows shift down by one.
    pub fn remove_row(&self, store: &FormStore, group: &str, index: usize) -> FormResult<()> {
        store.edit("removing repeatable row", |values, meta| {
            let rows = row_count(values, group);
            if index >= rows {
                return;
            }
            let row_prefix = |row: usize| format!("{group}.{row}.");
            let mut shifted = FormValues::new();
            for (key, value) in std::mem::take(values) {
                let location =
                    row_of(key.as_str(), group).map(|(row, rest)| (row, rest.to_string()));
                match location {
                    Some((row, _)) if row == index => {}
                    Some((row, rest)) if row > index => {
                        shifted.insert(format!("{}{rest}", row_prefix(row - 1)), value);
                    }
                    _ => shifted.insert(key, value),
                }
            }
            *values = shifted;
            meta.retain(|key, _| row_of(key.as_str(), group).is_none());
        })?;
        self.sync_schema(store)
    }

    fn template(&self, group: &str) -> Option<&Vec<FieldSpec>> {
        find_template(&self.fields, group)
    }
}

fn find_template<'a>(fields: &'a [FieldSpec], group: &str) -> Option<&'a Vec<FieldSpec>> {
    fields.iter().find_map(|field| match &field.kind {
        FieldKind::Repeatable { template } if field.name == group => Some(template),
        FieldKind::Conditional { fields, .. } => find_template(fields, group),
        FieldKind::Text(_)
        | FieldKind::Select { .. }
        | FieldKind::Checkbox
        | FieldKind::Textarea
        | FieldKind::Repeatable { .. } => None,
    })
}

fn seed_defaults(fields: &[FieldSpec], prefix: &str, values: &mut FormValues) {
    for field in fields {
        let key = format!("{prefix}{}", field.name);
        if let Some(value) = field.default_value() {
            values.insert(key, value);
        }
        if let FieldKind::Conditional { fields, .. } = &field.kind {
            seed_defaults(fields, prefix, values);
        }
    }
}

fn collect_active(
    fields: &[FieldSpec],
    prefix: &str,
    values: &FormValues,
    out: &mut Vec<ActiveField>,
) {
    for field in fields {
        let key = FieldKey::new(format!("{prefix}{}", field.name));
        match &field.kind {
            FieldKind::Text(_)
            | FieldKind::Select { .. }
            | FieldKind::Checkbox
            | FieldKind::Textarea => {
                out.push(ActiveField {
                    key,
                    spec: field.clone(),
                });
            }
            FieldKind::Repeatable { template } => {
                out.push(ActiveField {
                    key: key.clone(),
                    spec: field.clone(),
                });
                for row in 0..row_count(values, key.as_str()) {
                    let row_prefix = format!("{key}.{row}.");
                    collect_active(template, &row_prefix, values, out);
                }
            }
            FieldKind::Conditional { condition, fields } => {
                let current = values.get(key.as_str()).unwrap_or(&FieldValue::Null);
                let show = condition(current);
                out.push(ActiveField {
                    key,
                    spec: field.clone(),
                });
                if show {
                    collect_active(fields, prefix, values, out);
                }
            }
        }
    }
}

fn row_of<'a>(key: &'a str, group: &str) -> Option<(usize, &'a str)> {
    let rest = key.strip_prefix(group)?.strip_prefix('.')?;
    let (index, field) = rest.split_once('.')?;
    Some((index.parse().ok()?, field))
}

fn row_count(values: &FormValues, group: &str) -> usize {
    values
        .keys()
        .filter_map(|key| row_of(key.as_str(), group).map(|(row, _)| row + 1))
        .max()
        .unwrap_or(0)
}
