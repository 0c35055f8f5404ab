use formflow::form::{FormModel, FormStore, ValidationSchema};
use formflow::value::{FieldValue, FormValues};

#[derive(Clone, Debug, PartialEq, FormModel)]
struct MembershipForm {
    email: String,
    #[form(rename = "accepted_terms")]
    terms: bool,
    vehicles: Option<u32>,
    #[form(skip)]
    referral_checked: bool,
}

fn main() {
    let fields = MembershipForm::fields();
    assert_eq!(fields.email().as_str(), "email");
    assert_eq!(fields.terms().as_str(), "accepted_terms");

    let model = MembershipForm {
        email: "ada@example.com".to_string(),
        terms: true,
        vehicles: Some(2),
        referral_checked: true,
    };
    let values = model.to_values();
    assert_eq!(values.get("accepted_terms"), Some(&FieldValue::Bool(true)));
    assert!(!values.contains_key("referral_checked"));

    let store = FormStore::from_model(&model, ValidationSchema::new());
    store
        .handle_change(fields.vehicles(), FieldValue::from(3_u32))
        .expect("change should apply");
    let read_back = store.model::<MembershipForm>().expect("model should rebuild");
    assert_eq!(read_back.vehicles, Some(3));
    assert!(!read_back.referral_checked);

    let missing = MembershipForm::from_values(&FormValues::new().with("vehicles", "many"));
    assert!(missing.is_err());
}
