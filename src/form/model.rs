use crate::value::{FieldValueError, FormValues};

pub trait FormModel: Sized {
    type Fields;

    fn fields() -> Self::Fields;
    fn to_values(&self) -> FormValues;
    fn from_values(values: &FormValues) -> Result<Self, FieldValueError>;
}
