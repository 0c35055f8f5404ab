use std::collections::BTreeMap;
use std::sync::Arc;

use crate::value::{FieldKey, FieldValue, FormValues};

pub(super) type ValidatorFn = Arc<dyn Fn(&FieldValue, &FormValues) -> Option<String> + Send + Sync>;

/// A pure field rule: `None` means the value passes.
#[derive(Clone)]
pub struct Validator {
    check: ValidatorFn,
}

impl Validator {
    pub fn new(check: impl Fn(&FieldValue) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            check: Arc::new(move |value, _form| check(value)),
        }
    }

    pub fn with_form(
        check: impl Fn(&FieldValue, &FormValues) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            check: Arc::new(check),
        }
    }

    pub fn validate(&self, value: &FieldValue) -> Option<String> {
        (self.check)(value, &FormValues::default())
    }

    pub fn validate_in(&self, value: &FieldValue, form: &FormValues) -> Option<String> {
        (self.check)(value, form)
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Validator")
    }
}

pub fn compose_validators(validators: impl IntoIterator<Item = Validator>) -> Validator {
    let chain: Vec<Validator> = validators.into_iter().collect();
    Validator::with_form(move |value, form| {
        chain
            .iter()
            .find_map(|validator| validator.validate_in(value, form))
    })
}

#[derive(Clone, Debug)]
pub enum FieldRules {
    Single(Validator),
    Chain(Vec<Validator>),
}

impl FieldRules {
    pub fn check(&self, value: &FieldValue, form: &FormValues) -> Option<String> {
        match self {
            FieldRules::Single(validator) => validator.validate_in(value, form),
            FieldRules::Chain(validators) => validators
                .iter()
                .find_map(|validator| validator.validate_in(value, form)),
        }
    }
}

impl From<Validator> for FieldRules {
    fn from(value: Validator) -> Self {
        FieldRules::Single(value)
    }
}

impl From<Vec<Validator>> for FieldRules {
    fn from(value: Vec<Validator>) -> Self {
        FieldRules::Chain(value)
    }
}

impl<const N: usize> From<[Validator; N]> for FieldRules {
    fn from(value: [Validator; N]) -> Self {
        FieldRules::Chain(value.into())
    }
}

#[derive(Clone, Debug, Default)]
pub struct ValidationSchema {
    rules: BTreeMap<FieldKey, FieldRules>,
}

impl ValidationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<FieldKey>, rules: impl Into<FieldRules>) -> Self {
        self.insert(key, rules);
        self
    }

    pub fn insert(&mut self, key: impl Into<FieldKey>, rules: impl Into<FieldRules>) {
        self.rules.insert(key.into(), rules.into());
    }

    pub fn get(&self, key: &str) -> Option<&FieldRules> {
        self.rules.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.rules.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &FieldKey> {
        self.rules.keys()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn check_field(&self, key: &str, values: &FormValues) -> Option<String> {
        let rules = self.rules.get(key)?;
        let value = values.get(key).unwrap_or(&FieldValue::Null);
        rules.check(value, values)
    }
}

pub fn validate_form(values: &FormValues, schema: &ValidationSchema) -> BTreeMap<FieldKey, String> {
    schema
        .rules
        .iter()
        .filter_map(|(key, rules)| {
            let value = values.get(key.as_str()).unwrap_or(&FieldValue::Null);
            rules.check(value, values).map(|message| (key.clone(), message))
        })
        .collect()
}
