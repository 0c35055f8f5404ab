mod binding;
mod controller;
mod draft;
mod dynamic;
mod model;
mod steps;
mod validation;
pub mod validators;

#[cfg(test)]
mod tests;

pub use binding::{FieldAccessor, FieldInput, FieldProps};
pub use controller::{
    DEFAULT_SUBMIT_ERROR, FieldMeta, FormError, FormId, FormResult, FormSnapshot, FormStore,
    SUBMIT_ERROR_KEY, SubmitOutcome, SubmitState,
};
pub use draft::{FormDraftStore, InMemoryDraftStore};
pub use dynamic::{
    ActiveField, Condition, DynamicForm, FieldKind, FieldSpec, SelectOption, TextKind,
};
pub use formflow_derive::FormModel;
pub use model::FormModel;
pub use steps::{MultiStepForm, MultiStepSnapshot, Step, StepOutcome, StepStatus};
pub use validation::{FieldRules, ValidationSchema, Validator, compose_validators, validate_form};
