use std::collections::BTreeSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use super::controller::{
    DEFAULT_SUBMIT_ERROR, FormResult, FormStore, SUBMIT_ERROR_KEY, read_lock, write_lock,
};
use crate::value::{FieldKey, FormValues};

#[derive(Clone, Debug, Default)]
pub struct Step {
    pub title: String,
    pub description: Option<String>,
    pub fields: Vec<FieldKey>,
}

impl Step {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, value: impl Into<String>) -> Self {
        self.description = Some(value.into());
        self
    }

    pub fn field(mut self, key: impl Into<FieldKey>) -> Self {
        self.fields.push(key.into());
        self
    }

    pub fn fields<K>(mut self, keys: impl IntoIterator<Item = K>) -> Self
    where
        K: Into<FieldKey>,
    {
        self.fields.extend(keys.into_iter().map(Into::into));
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepStatus {
    Idle,
    InProgress,
    Complete,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MultiStepSnapshot {
    pub current_step: usize,
    pub completed_steps: BTreeSet<usize>,
    pub accumulated_values: FormValues,
    pub status: StepStatus,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepOutcome {
    Blocked,
    Advanced(usize),
    Completed,
    /// The completion handler failed; its message is on the form under `submit`.
    Failed,
    /// The store's scope ended first; step state was left untouched.
    Detached,
}

struct MultiStepState {
    current: usize,
    completed: BTreeSet<usize>,
    accumulated: FormValues,
    complete: bool,
}

#[derive(Clone)]
pub struct MultiStepForm {
    steps: Arc<[Step]>,
    store: FormStore,
    state: Arc<RwLock<MultiStepState>>,
}

impl MultiStepForm {
    pub fn new(steps: Vec<Step>, store: FormStore) -> Self {
        let steps = if steps.is_empty() {
            vec![Step::default()]
        } else {
            steps
        };
        Self {
            steps: steps.into(),
            store,
            state: Arc::new(RwLock::new(MultiStepState {
                current: 0,
                completed: BTreeSet::new(),
                accumulated: FormValues::new(),
                complete: false,
            })),
        }
    }

    pub fn store(&self) -> &FormStore {
        &self.store
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn current_step(&self) -> FormResult<usize> {
        Ok(read_lock(&self.state, "reading current step")?.current)
    }

    pub fn is_last_step(&self) -> FormResult<bool> {
        Ok(self.current_step()? + 1 == self.steps.len())
    }

    pub fn can_visit(&self, target: usize) -> FormResult<bool> {
        let state = read_lock(&self.state, "checking step reachability")?;
        Ok(target < self.steps.len() && target <= furthest_reachable(&state))
    }

    pub fn snapshot(&self) -> FormResult<MultiStepSnapshot> {
        let state = read_lock(&self.state, "creating step snapshot")?;
        let status = if state.complete {
            StepStatus::Complete
        } else if state.current == 0 && state.completed.is_empty() {
            StepStatus::Idle
        } else {
            StepStatus::InProgress
        };
        Ok(MultiStepSnapshot {
            current_step: state.current,
            completed_steps: state.completed.clone(),
            accumulated_values: state.accumulated.clone(),
            status,
        })
    }

    pub fn go_to_next_step(&self) -> FormResult<bool> {
        let current = self.current_step()?;
        if !self.validate_step(current)? {
            tracing::debug!(step = current, "step validation failed");
            return Ok(false);
        }
        let values = self.store.values()?;
        let Some(mut state) = self.live_steps("advancing step")? else {
            return Ok(false);
        };
        state.accumulated.merge(&values);
        state.completed.insert(current);
        state.current = (current + 1).min(self.steps.len() - 1);
        Ok(true)
    }

    pub fn go_to_previous_step(&self) -> FormResult<()> {
        let Some(mut state) = self.live_steps("moving to previous step")? else {
            return Ok(());
        };
        state.current = state.current.saturating_sub(1);
        Ok(())
    }

    pub fn go_to_step(&self, target: usize) -> FormResult<bool> {
        let Some(mut state) = self.live_steps("jumping to step")? else {
            return Ok(false);
        };
        if target >= self.steps.len() || target > furthest_reachable(&state) {
            return Ok(false);
        }
        state.current = target;
        Ok(true)
    }

    /// Advances on inner steps. On the last step the merged values of every
    /// step go to `on_complete`.
    pub async fn submit_step<F, Fut, E>(&self, on_complete: F) -> FormResult<StepOutcome>
    where
        F: FnOnce(FormValues) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        if !self.store.is_active() {
            return Ok(StepOutcome::Detached);
        }
        if !self.is_last_step()? {
            let current = self.current_step()?;
            return Ok(if self.go_to_next_step()? {
                StepOutcome::Advanced((current + 1).min(self.steps.len() - 1))
            } else {
                StepOutcome::Blocked
            });
        }

        let current = self.current_step()?;
        if !self.validate_step(current)? {
            return Ok(StepOutcome::Blocked);
        }
        let merged = {
            let values = self.store.values()?;
            let Some(mut state) = self.live_steps("merging final step")? else {
                return Ok(StepOutcome::Detached);
            };
            state.accumulated.merge(&values);
            state.completed.insert(current);
            state.accumulated.clone()
        };

        let result = on_complete(merged).await;
        let Some(mut state) = self.live_steps("completing steps")? else {
            tracing::debug!("form scope ended during step completion; result dropped");
            return Ok(StepOutcome::Detached);
        };
        match result {
            Ok(()) => {
                state.complete = true;
                Ok(StepOutcome::Completed)
            }
            Err(error) => {
                let mut message = error.to_string();
                if message.trim().is_empty() {
                    message = DEFAULT_SUBMIT_ERROR.to_string();
                }
                drop(state);
                tracing::warn!(error = %message, "multi-step completion failed");
                self.store.set_field_error(SUBMIT_ERROR_KEY, message)?;
                Ok(StepOutcome::Failed)
            }
        }
    }

    fn live_steps(
        &self,
        context: &'static str,
    ) -> FormResult<Option<RwLockWriteGuard<'_, MultiStepState>>> {
        if !self.store.is_active() {
            tracing::debug!(context, "form scope ended; step state write suppressed");
            return Ok(None);
        }
        write_lock(&self.state, context).map(Some)
    }

    fn validate_step(&self, index: usize) -> FormResult<bool> {
        let fields = &self.steps[index].fields;
        self.store.touch_fields(fields.iter().cloned())?;
        self.store.validate_fields(fields.iter().cloned())
    }
}

fn furthest_reachable(state: &MultiStepState) -> usize {
    state
        .completed
        .iter()
        .copied()
        .max()
        .unwrap_or(0)
        .max(state.current)
}
