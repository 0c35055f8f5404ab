pub mod config;
pub mod form;
pub mod scope;
pub mod submit;
pub mod value;

pub use config::FormflowConfig;
pub use form::{FieldAccessor, FormError, FormResult, FormStore, MultiStepForm};
pub use scope::ScopeToken;
pub use value::{FieldKey, FieldValue, FileRef, FormValues};
