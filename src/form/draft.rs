use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::FutureExt;
use futures_timer::Delay;

use super::controller::{FormError, FormId, FormResult, FormStore, read_lock};
use crate::value::FormValues;

pub trait FormDraftStore: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn save(&self, form_id: FormId, values: &FormValues) -> Result<(), Self::Error>;
    fn load(&self, form_id: FormId) -> Result<Option<FormValues>, Self::Error>;
    fn clear(&self, form_id: FormId) -> Result<(), Self::Error>;
}

#[derive(Clone, Default)]
pub struct InMemoryDraftStore {
    state: Arc<RwLock<BTreeMap<FormId, FormValues>>>,
}

impl InMemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FormDraftStore for InMemoryDraftStore {
    type Error = Infallible;

    fn save(&self, form_id: FormId, values: &FormValues) -> Result<(), Self::Error> {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.insert(form_id, values.clone());
        Ok(())
    }

    fn load(&self, form_id: FormId) -> Result<Option<FormValues>, Self::Error> {
        let state = match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(state.get(&form_id).cloned())
    }

    fn clear(&self, form_id: FormId) -> Result<(), Self::Error> {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.remove(&form_id);
        Ok(())
    }
}

impl FormStore {
    pub fn save_draft<S>(&self, store: &S) -> FormResult<()>
    where
        S: FormDraftStore,
    {
        let state = read_lock(&self.state, "saving draft")?;
        store
            .save(state.id, &state.values)
            .map_err(|error| FormError::DraftSaveFailed(error.to_string()))
    }

    pub fn load_draft<S>(&self, store: &S) -> FormResult<bool>
    where
        S: FormDraftStore,
    {
        let form_id = self.form_id()?;
        let Some(draft) = store
            .load(form_id)
            .map_err(|error| FormError::DraftLoadFailed(error.to_string()))?
        else {
            return Ok(false);
        };

        let Some(mut state) = self.live_state("loading draft into form")? else {
            return Ok(false);
        };
        state.values = draft;
        state.submit_state = super::controller::SubmitState::Idle;
        state.submit_count = 0;
        state.submit_error = None;
        let keys = state.values.keys().cloned().collect::<Vec<_>>();
        for meta in state.field_meta.values_mut() {
            meta.error = None;
        }
        for key in keys {
            let dirty = state.values.get(key.as_str()) != state.initial_values.get(key.as_str());
            state.ensure_meta(&key).dirty = dirty;
        }
        Ok(true)
    }

    pub fn clear_draft<S>(&self, store: &S) -> FormResult<()>
    where
        S: FormDraftStore,
    {
        let form_id = self.form_id()?;
        store
            .clear(form_id)
            .map_err(|error| FormError::DraftClearFailed(error.to_string()))
    }

    /// Saves a draft every `interval` while the form has unsaved edits.
    /// Resolves when the form scope ends.
    pub async fn autosave<S>(&self, store: &S, interval: Duration) -> FormResult<()>
    where
        S: FormDraftStore,
    {
        let mut last_saved: Option<FormValues> = None;
        loop {
            let ended = self.scope.ended().fuse();
            let tick = Delay::new(interval).fuse();
            futures::pin_mut!(ended, tick);
            futures::select! {
                _ = ended => return Ok(()),
                _ = tick => {}
            }

            let snapshot = self.snapshot()?;
            if !snapshot.is_dirty || last_saved.as_ref() == Some(&snapshot.values) {
                continue;
            }
            self.save_draft(store)?;
            tracing::debug!(fields = snapshot.values.len(), "form draft autosaved");
            last_saved = Some(snapshot.values);
        }
    }
}
