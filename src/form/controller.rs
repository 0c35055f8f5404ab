use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::model::FormModel;
use super::validation::{ValidationSchema, validate_form};
use crate::scope::ScopeToken;
use crate::value::{FieldKey, FieldValue, FieldValueError, FormValues};

pub const SUBMIT_ERROR_KEY: &str = "submit";
pub const DEFAULT_SUBMIT_ERROR: &str = "An error occurred during submission";

// Allocated ids live in the upper half so they never meet ids chosen by callers.
static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1 << 63);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitState {
    Idle,
    Validating,
    Submitting,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldMeta {
    pub dirty: bool,
    pub touched: bool,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormSnapshot {
    pub values: FormValues,
    pub errors: BTreeMap<FieldKey, String>,
    pub touched: BTreeSet<FieldKey>,
    pub submit_state: SubmitState,
    pub submit_count: u32,
    pub is_submitting: bool,
    pub is_dirty: bool,
    pub is_valid: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SubmitOutcome<R = ()> {
    Invalid,
    Submitted(R),
    /// The callback failed; the message is stored under [`SUBMIT_ERROR_KEY`].
    Failed(String),
    /// The form scope ended, or the form was reset, before the submit settled.
    /// No state was written.
    Detached,
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("invalid submit state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: SubmitState, to: SubmitState },
    #[error("form submit is already in progress")]
    AlreadySubmitting,
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("failed to build model: {0}")]
    Model(#[from] FieldValueError),
    #[error("failed to load draft: {0}")]
    DraftLoadFailed(String),
    #[error("failed to save draft: {0}")]
    DraftSaveFailed(String),
    #[error("failed to clear draft: {0}")]
    DraftClearFailed(String),
}

pub type FormResult<T> = Result<T, FormError>;

pub(super) struct FormState {
    pub(super) id: FormId,
    pub(super) initial_values: FormValues,
    pub(super) values: FormValues,
    pub(super) submit_state: SubmitState,
    pub(super) submit_count: u32,
    pub(super) submit_generation: u64,
    pub(super) submit_error: Option<String>,
    pub(super) field_meta: BTreeMap<FieldKey, FieldMeta>,
}

impl FormState {
    pub(super) fn ensure_meta(&mut self, key: &FieldKey) -> &mut FieldMeta {
        self.field_meta.entry(key.clone()).or_default()
    }

    fn refresh_dirty(&mut self, key: &FieldKey) {
        let dirty = self.values.get(key.as_str()) != self.initial_values.get(key.as_str());
        self.ensure_meta(key).dirty = dirty;
    }
}

#[derive(Clone)]
pub struct FormStore {
    pub(super) state: Arc<RwLock<FormState>>,
    pub(super) schema: Arc<RwLock<ValidationSchema>>,
    pub(super) scope: ScopeToken,
}

impl FormStore {
    pub fn new(initial: FormValues, schema: ValidationSchema) -> Self {
        Self::with_scope(initial, schema, ScopeToken::new())
    }

    pub fn with_scope(initial: FormValues, schema: ValidationSchema, scope: ScopeToken) -> Self {
        Self::build(FormId::next(), initial, schema, scope)
    }

    /// Store with a caller-chosen id, so drafts saved by an earlier instance
    /// of the same form can be loaded again.
    pub fn with_id(id: FormId, initial: FormValues, schema: ValidationSchema) -> Self {
        Self::build(id, initial, schema, ScopeToken::new())
    }

    fn build(id: FormId, initial: FormValues, schema: ValidationSchema, scope: ScopeToken) -> Self {
        Self {
            state: Arc::new(RwLock::new(FormState {
                id,
                initial_values: initial.clone(),
                values: initial,
                submit_state: SubmitState::Idle,
                submit_count: 0,
                submit_generation: 0,
                submit_error: None,
                field_meta: BTreeMap::new(),
            })),
            schema: Arc::new(RwLock::new(schema)),
            scope,
        }
    }

    pub fn from_model<M: FormModel>(model: &M, schema: ValidationSchema) -> Self {
        Self::new(model.to_values(), schema)
    }

    pub fn model<M: FormModel>(&self) -> FormResult<M> {
        let state = read_lock(&self.state, "reading values for model")?;
        Ok(M::from_values(&state.values)?)
    }

    pub fn form_id(&self) -> FormResult<FormId> {
        Ok(read_lock(&self.state, "reading form id")?.id)
    }

    pub fn scope(&self) -> ScopeToken {
        self.scope.clone()
    }

    pub fn close(&self) {
        self.scope.end();
    }

    pub fn is_active(&self) -> bool {
        self.scope.is_active()
    }

    pub fn schema(&self) -> FormResult<ValidationSchema> {
        Ok(read_lock(&self.schema, "reading schema")?.clone())
    }

    pub fn replace_schema(&self, schema: ValidationSchema) -> FormResult<()> {
        {
            let mut current = write_lock(&self.schema, "replacing schema")?;
            *current = schema.clone();
        }
        let Some(mut state) = self.live_state("pruning errors after schema change")? else {
            return Ok(());
        };
        for (key, meta) in state.field_meta.iter_mut() {
            if !schema.contains(key.as_str()) {
                meta.error = None;
            }
        }
        Ok(())
    }

    pub fn handle_change(
        &self,
        key: impl Into<FieldKey>,
        value: impl Into<FieldValue>,
    ) -> FormResult<()> {
        let key = key.into();
        let schema = self.schema()?;
        let Some(mut state) = self.live_state("applying field change")? else {
            return Ok(());
        };
        state.values.insert(key.clone(), value.into());
        state.refresh_dirty(&key);

        let touched = state.ensure_meta(&key).touched;
        if touched && schema.contains(key.as_str()) {
            let error = schema.check_field(key.as_str(), &state.values);
            state.ensure_meta(&key).error = error;
        }
        Ok(())
    }

    pub fn set_field_value(
        &self,
        key: impl Into<FieldKey>,
        value: impl Into<FieldValue>,
    ) -> FormResult<()> {
        self.handle_change(key, value)
    }

    pub fn handle_blur(&self, key: impl Into<FieldKey>) -> FormResult<()> {
        let key = key.into();
        let schema = self.schema()?;
        let Some(mut state) = self.live_state("touching field")? else {
            return Ok(());
        };
        state.ensure_meta(&key).touched = true;
        if schema.contains(key.as_str()) {
            let error = schema.check_field(key.as_str(), &state.values);
            state.ensure_meta(&key).error = error;
        }
        Ok(())
    }

    pub fn validate_field(&self, key: impl Into<FieldKey>) -> FormResult<bool> {
        let key = key.into();
        let schema = self.schema()?;
        if !schema.contains(key.as_str()) {
            return Ok(true);
        }
        let values = self.values()?;
        let error = schema.check_field(key.as_str(), &values);
        let valid = error.is_none();
        if let Some(mut state) = self.live_state("writing field validation result")? {
            state.ensure_meta(&key).error = error;
        }
        Ok(valid)
    }

    pub fn validate_fields<K>(&self, keys: impl IntoIterator<Item = K>) -> FormResult<bool>
    where
        K: Into<FieldKey>,
    {
        let mut valid = true;
        for key in keys {
            valid &= self.validate_field(key)?;
        }
        Ok(valid)
    }

    pub fn touch_fields<K>(&self, keys: impl IntoIterator<Item = K>) -> FormResult<()>
    where
        K: Into<FieldKey>,
    {
        let Some(mut state) = self.live_state("touching fields")? else {
            return Ok(());
        };
        for key in keys {
            state.ensure_meta(&key.into()).touched = true;
        }
        Ok(())
    }

    pub fn validate_all_fields(&self) -> FormResult<bool> {
        let schema = self.schema()?;
        let values = self.values()?;
        let mut errors = validate_form(&values, &schema);
        let valid = errors.is_empty();

        if let Some(mut state) = self.live_state("applying form validation result")? {
            state.submit_error = None;
            for (key, meta) in state.field_meta.iter_mut() {
                meta.error = errors.remove(key.as_str());
            }
            for (key, error) in errors {
                state.ensure_meta(&key).error = Some(error);
            }
        }
        Ok(valid)
    }

    /// Touches and validates every schema field, then hands the values to
    /// `on_submit`. Callback failures land under [`SUBMIT_ERROR_KEY`] and are
    /// never returned as `Err`.
    pub async fn handle_submit<F, Fut, R, E>(&self, on_submit: F) -> FormResult<SubmitOutcome<R>>
    where
        F: FnOnce(FormValues) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: Display,
    {
        let schema_keys = self.schema()?.keys().cloned().collect::<Vec<_>>();
        let generation = {
            let Some(mut state) = self.live_state("preparing submit")? else {
                return Ok(SubmitOutcome::Detached);
            };
            if state.submit_state == SubmitState::Submitting {
                return Err(FormError::AlreadySubmitting);
            }
            transition_submit_state(&mut state, SubmitState::Validating)?;
            state.submit_count = state.submit_count.saturating_add(1);
            state.submit_generation = state.submit_generation.wrapping_add(1);
            for key in &schema_keys {
                state.ensure_meta(key).touched = true;
            }
            state.submit_generation
        };

        if !self.validate_all_fields()? {
            if let Some(mut state) = self.live_state("handling submit validation failure")? {
                transition_submit_state(&mut state, SubmitState::Failed)?;
            }
            tracing::debug!("submit blocked by validation errors");
            return Ok(SubmitOutcome::Invalid);
        }

        let values = {
            let Some(mut state) = self.live_state("moving submit state to submitting")? else {
                return Ok(SubmitOutcome::Detached);
            };
            transition_submit_state(&mut state, SubmitState::Submitting)?;
            state.values.clone()
        };

        let _pending = PendingSubmit {
            store: self,
            generation,
        };
        let result = on_submit(values).await;

        let Some(mut state) = self.live_state("completing submit")? else {
            tracing::debug!("form scope ended while submitting; result dropped");
            return Ok(SubmitOutcome::Detached);
        };
        if state.submit_generation != generation || state.submit_state != SubmitState::Submitting
        {
            tracing::debug!(
                state = ?state.submit_state,
                "submit superseded by a reset; result dropped"
            );
            return Ok(SubmitOutcome::Detached);
        }
        match result {
            Ok(response) => {
                transition_submit_state(&mut state, SubmitState::Succeeded)?;
                Ok(SubmitOutcome::Submitted(response))
            }
            Err(error) => {
                let mut message = error.to_string();
                if message.trim().is_empty() {
                    message = DEFAULT_SUBMIT_ERROR.to_string();
                }
                tracing::warn!(error = %message, "form submit failed");
                transition_submit_state(&mut state, SubmitState::Failed)?;
                state.submit_error = Some(message.clone());
                Ok(SubmitOutcome::Failed(message))
            }
        }
    }

    pub fn reset_form(&self) -> FormResult<()> {
        let Some(mut state) = self.live_state("resetting form")? else {
            return Ok(());
        };
        state.values = state.initial_values.clone();
        state.field_meta.clear();
        state.submit_error = None;
        state.submit_count = 0;
        state.submit_generation = state.submit_generation.wrapping_add(1);
        state.submit_state = SubmitState::Idle;
        Ok(())
    }

    pub fn set_field_error(
        &self,
        key: impl Into<FieldKey>,
        message: impl Into<String>,
    ) -> FormResult<()> {
        let key = key.into();
        let message = message.into();
        if key.as_str() == SUBMIT_ERROR_KEY {
            if let Some(mut state) = self.live_state("setting submit error")? {
                state.submit_error = Some(message);
            }
            return Ok(());
        }
        let declared = self.schema()?.contains(key.as_str());
        let Some(mut state) = self.live_state("setting field error")? else {
            return Ok(());
        };
        if !declared && !state.values.contains_key(key.as_str()) {
            return Err(FormError::UnknownField(key.to_string()));
        }
        state.ensure_meta(&key).error = Some(message);
        Ok(())
    }

    pub fn clear_field_error(&self, key: impl Into<FieldKey>) -> FormResult<()> {
        let key = key.into();
        let Some(mut state) = self.live_state("clearing field error")? else {
            return Ok(());
        };
        if key.as_str() == SUBMIT_ERROR_KEY {
            state.submit_error = None;
        } else if let Some(meta) = state.field_meta.get_mut(key.as_str()) {
            meta.error = None;
        }
        Ok(())
    }

    pub fn values(&self) -> FormResult<FormValues> {
        Ok(read_lock(&self.state, "reading values")?.values.clone())
    }

    pub fn value(&self, key: &str) -> FormResult<Option<FieldValue>> {
        Ok(read_lock(&self.state, "reading value")?
            .values
            .get(key)
            .cloned())
    }

    pub fn error(&self, key: &str) -> FormResult<Option<String>> {
        let state = read_lock(&self.state, "reading field error")?;
        if key == SUBMIT_ERROR_KEY {
            return Ok(state.submit_error.clone());
        }
        Ok(state
            .field_meta
            .get(key)
            .and_then(|meta| meta.error.clone()))
    }

    pub fn is_touched(&self, key: &str) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading touched flag")?
            .field_meta
            .get(key)
            .is_some_and(|meta| meta.touched))
    }

    pub fn field_meta(&self, key: &str) -> FormResult<Option<FieldMeta>> {
        Ok(read_lock(&self.state, "reading field meta")?
            .field_meta
            .get(key)
            .cloned())
    }

    pub fn is_submitting(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading submit state")?.submit_state == SubmitState::Submitting)
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot> {
        let state = read_lock(&self.state, "creating form snapshot")?;
        let mut errors = state
            .field_meta
            .iter()
            .filter_map(|(key, meta)| meta.error.clone().map(|error| (key.clone(), error)))
            .collect::<BTreeMap<_, _>>();
        if let Some(error) = &state.submit_error {
            errors.insert(FieldKey::from_static(SUBMIT_ERROR_KEY), error.clone());
        }
        let touched = state
            .field_meta
            .iter()
            .filter(|(_, meta)| meta.touched)
            .map(|(key, _)| key.clone())
            .collect();
        Ok(FormSnapshot {
            values: state.values.clone(),
            is_valid: errors.is_empty(),
            errors,
            touched,
            submit_state: state.submit_state,
            submit_count: state.submit_count,
            is_submitting: state.submit_state == SubmitState::Submitting,
            is_dirty: state.field_meta.values().any(|meta| meta.dirty),
        })
    }

    pub(super) fn edit(
        &self,
        context: &'static str,
        edit: impl FnOnce(&mut FormValues, &mut BTreeMap<FieldKey, FieldMeta>),
    ) -> FormResult<()> {
        let Some(mut state) = self.live_state(context)? else {
            return Ok(());
        };
        let FormState {
            values,
            field_meta,
            initial_values,
            ..
        } = &mut *state;
        edit(values, field_meta);
        for (key, meta) in field_meta.iter_mut() {
            meta.dirty = values.get(key.as_str()) != initial_values.get(key.as_str());
        }
        Ok(())
    }

    pub(super) fn live_state(
        &self,
        context: &'static str,
    ) -> FormResult<Option<RwLockWriteGuard<'_, FormState>>> {
        if !self.scope.is_active() {
            tracing::debug!(context, "form scope ended; state write suppressed");
            return Ok(None);
        }
        write_lock(&self.state, context).map(Some)
    }
}

// Returns the form to `Idle` when a submit future is dropped mid-flight.
struct PendingSubmit<'a> {
    store: &'a FormStore,
    generation: u64,
}

impl Drop for PendingSubmit<'_> {
    fn drop(&mut self) {
        let Ok(Some(mut state)) = self.store.live_state("releasing dropped submit") else {
            return;
        };
        if state.submit_generation == self.generation
            && state.submit_state == SubmitState::Submitting
        {
            tracing::debug!("submit dropped before settling; state returned to idle");
            state.submit_state = SubmitState::Idle;
        }
    }
}

pub(super) fn transition_submit_state(state: &mut FormState, next: SubmitState) -> FormResult<()> {
    let current = state.submit_state;
    if current == next {
        return Ok(());
    }

    let allowed = matches!(
        (current, next),
        (SubmitState::Idle, SubmitState::Validating)
            | (SubmitState::Validating, SubmitState::Submitting)
            | (SubmitState::Validating, SubmitState::Failed)
            | (SubmitState::Submitting, SubmitState::Succeeded)
            | (SubmitState::Submitting, SubmitState::Failed)
            | (SubmitState::Succeeded, SubmitState::Validating)
            | (SubmitState::Failed, SubmitState::Validating)
            | (_, SubmitState::Idle)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }
    state.submit_state = next;
    Ok(())
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
