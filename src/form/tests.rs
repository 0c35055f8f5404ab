use super::validators::{self, EMAIL_MESSAGE, REQUIRED_MESSAGE};
use super::*;
use futures::FutureExt;
use futures::executor::block_on;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::value::{FieldKey, FieldValue, FormValues};

#[allow(dead_code)]
#[derive(Clone, Debug, PartialEq, FormModel)]
struct ProfileForm {
    email: String,
    password: String,
    confirm_password: String,
    enabled: bool,
    amount: Decimal,
    tags: Vec<String>,
}

fn base_form() -> ProfileForm {
    ProfileForm {
        email: "user@example.com".into(),
        password: "pass".into(),
        confirm_password: "pass".into(),
        enabled: false,
        amount: Decimal::from_i128_with_scale(1200, 2),
        tags: vec!["a".into()],
    }
}

fn contact_schema() -> ValidationSchema {
    ValidationSchema::new()
        .field("name", validators::required())
        .field("email", [validators::required(), validators::email()])
}

fn contact_store(name: &str, email: &str) -> FormStore {
    FormStore::new(
        FormValues::new().with("name", name).with("email", email),
        contact_schema(),
    )
}

fn errors_of(store: &FormStore) -> BTreeMap<FieldKey, String> {
    store.snapshot().expect("snapshot should be readable").errors
}

#[test]
fn compose_is_fail_fast_in_declaration_order() {
    let rule = compose_validators([validators::required(), validators::email()]);
    assert_eq!(
        rule.validate(&FieldValue::from("")).as_deref(),
        Some(REQUIRED_MESSAGE)
    );
    assert_eq!(
        rule.validate(&FieldValue::from("not-an-email")).as_deref(),
        Some(EMAIL_MESSAGE)
    );
    assert_eq!(rule.validate(&FieldValue::from("ada@example.com")), None);
}

#[test]
fn validate_all_fields_reports_every_failing_field() {
    let store = contact_store("", "bad");

    let valid = store.validate_all_fields().expect("validation should run");

    assert!(!valid);
    let expected = BTreeMap::from([
        (FieldKey::from("email"), EMAIL_MESSAGE.to_string()),
        (FieldKey::from("name"), REQUIRED_MESSAGE.to_string()),
    ]);
    assert_eq!(errors_of(&store), expected);
    assert!(!store.snapshot().expect("snapshot").is_valid);
}

#[test]
fn validate_all_fields_is_idempotent() {
    let store = contact_store("", "bad");
    store.validate_all_fields().expect("first run");
    let first = errors_of(&store);
    store.validate_all_fields().expect("second run");
    assert_eq!(first, errors_of(&store));
}

#[test]
fn validate_all_fields_replaces_stale_errors() {
    let store = contact_store("Ada", "ada@example.com");
    store
        .set_field_error("name", "Taken")
        .expect("declared field accepts errors");
    store
        .set_field_error(SUBMIT_ERROR_KEY, "Server unavailable")
        .expect("submit key accepts errors");

    assert!(store.validate_all_fields().expect("validation should run"));
    assert!(errors_of(&store).is_empty());
}

#[test]
fn change_revalidates_only_touched_fields() {
    let store = contact_store("Ada", "");

    store
        .handle_change("email", "still-bad")
        .expect("change should apply");
    assert_eq!(store.error("email").expect("error read"), None);

    store.handle_blur("email").expect("blur should apply");
    assert_eq!(
        store.error("email").expect("error read").as_deref(),
        Some(EMAIL_MESSAGE)
    );
    assert!(store.is_touched("email").expect("touched read"));

    store
        .handle_change("email", "ada@example.com")
        .expect("change should apply");
    assert_eq!(store.error("email").expect("error read"), None);
}

#[test]
fn validate_field_skips_fields_without_rules() {
    let store = contact_store("", "");
    assert!(store.validate_field("nickname").expect("validation should run"));
    assert!(!store.validate_field("name").expect("validation should run"));
    assert!(!store.is_touched("name").expect("touched read"));
}

#[test]
fn reset_restores_initial_snapshot() {
    let store = contact_store("", "");
    let initial = store.values().expect("values read");

    store.handle_change("name", "Ada").expect("change");
    store.handle_blur("name").expect("blur");
    store.handle_change("email", "bad").expect("change");
    store.handle_blur("email").expect("blur");
    assert!(store.snapshot().expect("snapshot").is_dirty);

    store.reset_form().expect("reset should apply");

    let snapshot = store.snapshot().expect("snapshot");
    assert_eq!(snapshot.values, initial);
    assert!(snapshot.errors.is_empty());
    assert!(snapshot.touched.is_empty());
    assert!(!snapshot.is_dirty);
    assert!(!snapshot.is_submitting);
    assert_eq!(snapshot.submit_count, 0);
}

#[test]
fn submit_failure_lands_under_submit_key() {
    let store = contact_store("Ada", "ada@example.com");

    let outcome = block_on(store.handle_submit(|_values| async {
        Err::<(), _>("Server unavailable".to_string())
    }))
    .expect("submit should settle");

    assert_eq!(outcome, SubmitOutcome::Failed("Server unavailable".into()));
    assert_eq!(
        store.error(SUBMIT_ERROR_KEY).expect("error read").as_deref(),
        Some("Server unavailable")
    );
    let snapshot = store.snapshot().expect("snapshot");
    assert!(!snapshot.is_submitting);
    assert_eq!(snapshot.submit_state, SubmitState::Failed);
    assert_eq!(
        snapshot.errors.get(SUBMIT_ERROR_KEY).map(String::as_str),
        Some("Server unavailable")
    );
}

#[test]
fn blank_submit_errors_get_default_message() {
    let store = contact_store("Ada", "ada@example.com");
    let outcome = block_on(store.handle_submit(|_| async { Err::<(), _>("  ") }))
        .expect("submit should settle");
    assert_eq!(outcome, SubmitOutcome::Failed(DEFAULT_SUBMIT_ERROR.into()));
}

#[test]
fn invalid_submit_touches_schema_fields_and_skips_callback() {
    let store = contact_store("", "");
    let calls = AtomicUsize::new(0);

    let outcome = block_on(store.handle_submit(|_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok::<(), String>(()) }
    }))
    .expect("submit should settle");

    assert_eq!(outcome, SubmitOutcome::Invalid);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let snapshot = store.snapshot().expect("snapshot");
    assert!(snapshot.touched.contains("name"));
    assert!(snapshot.touched.contains("email"));
    assert_eq!(snapshot.submit_count, 1);
    assert_eq!(snapshot.submit_state, SubmitState::Failed);
}

#[test]
fn successful_submit_receives_values_and_settles() {
    let store = contact_store("Ada", "ada@example.com");
    let observer = store.clone();

    let outcome = block_on(store.handle_submit(|values| async move {
        assert!(observer.is_submitting().expect("submit state read"));
        Ok::<_, String>(values.get("name").cloned())
    }))
    .expect("submit should settle");

    assert_eq!(outcome, SubmitOutcome::Submitted(Some(FieldValue::from("Ada"))));
    assert!(!store.is_submitting().expect("submit state read"));
    assert_eq!(
        store.snapshot().expect("snapshot").submit_state,
        SubmitState::Succeeded
    );
}

#[test]
fn overlapping_submit_is_rejected() {
    let store = contact_store("Ada", "ada@example.com");
    let inner = store.clone();

    let outcome = block_on(store.handle_submit(|_| async move {
        let nested = inner
            .handle_submit(|_| async { Ok::<(), String>(()) })
            .await;
        assert!(matches!(nested, Err(FormError::AlreadySubmitting)));
        Ok::<(), String>(())
    }))
    .expect("outer submit should settle");

    assert_eq!(outcome, SubmitOutcome::Submitted(()));
}

#[test]
fn closed_scope_drops_late_results_and_writes() {
    let store = contact_store("Ada", "ada@example.com");
    let closer = store.clone();

    let outcome = block_on(store.handle_submit(|_| async move {
        closer.close();
        Err::<(), _>("too late")
    }))
    .expect("submit should settle");

    assert_eq!(outcome, SubmitOutcome::Detached);
    assert_eq!(store.error(SUBMIT_ERROR_KEY).expect("error read"), None);

    store.handle_change("name", "Grace").expect("change is a no-op");
    assert_eq!(
        store.value("name").expect("value read"),
        Some(FieldValue::from("Ada"))
    );
    assert!(!store.is_active());
}

#[test]
fn reset_during_submit_drops_the_late_result() {
    let store = contact_store("Ada", "ada@example.com");
    let resetter = store.clone();

    let outcome = block_on(store.handle_submit(|_| async move {
        resetter.reset_form().expect("reset mid-submit");
        Err::<(), _>("Server unavailable")
    }))
    .expect("submit should settle without an error");

    assert_eq!(outcome, SubmitOutcome::Detached);
    let snapshot = store.snapshot().expect("snapshot");
    assert_eq!(snapshot.submit_state, SubmitState::Idle);
    assert_eq!(store.error(SUBMIT_ERROR_KEY).expect("error read"), None);
    assert!(snapshot.errors.is_empty());
}

#[test]
fn newer_submit_after_reset_keeps_its_own_result() {
    let store = contact_store("Ada", "ada@example.com");
    let inner = store.clone();

    let outcome = block_on(store.handle_submit(|_| async move {
        inner.reset_form().expect("reset mid-submit");
        let newer = inner
            .handle_submit(|_| async { Ok::<(), String>(()) })
            .await
            .expect("newer submit settles");
        assert_eq!(newer, SubmitOutcome::Submitted(()));
        Err::<(), _>("stale failure")
    }))
    .expect("outer submit settles");

    assert_eq!(outcome, SubmitOutcome::Detached);
    assert_eq!(
        store.snapshot().expect("snapshot").submit_state,
        SubmitState::Succeeded
    );
    assert_eq!(store.error(SUBMIT_ERROR_KEY).expect("error read"), None);
}

#[test]
fn dropped_submit_does_not_leave_the_form_submitting() {
    let store = contact_store("Ada", "ada@example.com");
    {
        let submit =
            store.handle_submit(|_| futures::future::pending::<Result<(), String>>());
        futures::pin_mut!(submit);
        assert!(submit.as_mut().now_or_never().is_none());
        assert!(store.is_submitting().expect("state read"));
    }

    assert!(!store.is_submitting().expect("state read"));
    assert_eq!(
        store.snapshot().expect("snapshot").submit_state,
        SubmitState::Idle
    );
    let outcome = block_on(store.handle_submit(|_| async { Ok::<(), String>(()) }))
        .expect("later submit is accepted");
    assert_eq!(outcome, SubmitOutcome::Submitted(()));
}

#[test]
fn errors_are_limited_to_known_fields() {
    let store = contact_store("", "");
    let error = store
        .set_field_error("ghost", "Nope")
        .expect_err("unknown field should be rejected");
    assert_eq!(error, FormError::UnknownField("ghost".into()));

    store.set_field_error("name", "Taken").expect("declared field");
    store.clear_field_error("name").expect("clear");
    assert_eq!(store.error("name").expect("error read"), None);
}

#[test]
fn accessor_normalizes_checkbox_and_value_input() {
    let store = FormStore::new(
        FormValues::new()
            .with("terms", false)
            .with("nickname", ""),
        ValidationSchema::new().field("terms", validators::required()),
    );
    let terms = store.field("terms");

    terms
        .on_change(FieldInput::checkbox(true))
        .expect("checkbox input");
    assert_eq!(terms.value().expect("value"), FieldValue::Bool(true));

    let nickname = store.field("nickname");
    nickname
        .on_change(FieldInput::value("Ace"))
        .expect("plain input");
    assert_eq!(nickname.text().expect("text"), "Ace");
    assert_eq!(store.field("unset").text().expect("text"), "");
}

#[test]
fn accessor_hides_errors_until_touched_or_submitted() {
    let store = contact_store("", "");
    let name = store.field("name");

    assert!(!name.validate().expect("validate"));
    assert_eq!(name.error().expect("error").as_deref(), Some(REQUIRED_MESSAGE));
    assert_eq!(name.error_for_display().expect("display error"), None);

    name.on_blur().expect("blur");
    assert_eq!(
        name.error_for_display().expect("display error").as_deref(),
        Some(REQUIRED_MESSAGE)
    );

    let props = name.props().expect("props");
    assert_eq!(props.name, "name");
    assert!(props.aria_invalid);
    assert_eq!(props.aria_describedby.as_deref(), Some("name-error"));

    name.set_value("Ada").expect("set value");
    let props = name.props().expect("props");
    assert!(!props.aria_invalid);
    assert_eq!(props.aria_describedby, None);
    assert_eq!(props.value, "Ada");
}

fn three_step_form() -> MultiStepForm {
    let store = FormStore::new(
        FormValues::new()
            .with("name", "")
            .with("email", "")
            .with("vin", "")
            .with("plan", "basic"),
        ValidationSchema::new()
            .field("name", validators::required())
            .field("email", [validators::required(), validators::email()])
            .field("vin", [validators::required(), validators::length(Some(17), Some(17))]),
    );
    MultiStepForm::new(
        vec![
            Step::new("Member").fields(["name", "email"]),
            Step::new("Vehicle").field("vin"),
            Step::new("Plan").field("plan"),
        ],
        store,
    )
}

#[test]
fn steps_cannot_be_skipped_before_completion() {
    let form = three_step_form();

    assert!(!form.go_to_step(2).expect("jump"));
    assert_eq!(form.current_step().expect("step"), 0);
    assert_eq!(form.snapshot().expect("snapshot").status, StepStatus::Idle);

    let store = form.store().clone();
    store.handle_change("name", "Ada").expect("change");
    store.handle_change("email", "ada@example.com").expect("change");
    assert!(form.go_to_next_step().expect("next"));
    store.handle_change("vin", "1HGCM82633A004352").expect("change");
    assert!(form.go_to_next_step().expect("next"));

    assert!(form.go_to_step(2).expect("jump"));
    assert_eq!(form.current_step().expect("step"), 2);

    assert!(form.go_to_step(0).expect("jump back"));
    assert!(form.can_visit(1).expect("reachability"));
    assert!(!form.go_to_step(2).expect("step 2 was never completed"));
    assert_eq!(form.current_step().expect("step"), 0);

    let snapshot = form.snapshot().expect("snapshot");
    assert_eq!(snapshot.completed_steps.len(), 2);
    assert_eq!(
        snapshot.accumulated_values.get("vin"),
        Some(&FieldValue::from("1HGCM82633A004352"))
    );
    assert_eq!(snapshot.status, StepStatus::InProgress);
}

#[test]
fn revisited_steps_are_validated_again() {
    let form = three_step_form();
    let store = form.store().clone();
    store.handle_change("name", "Ada").expect("change");
    store.handle_change("email", "ada@example.com").expect("change");
    assert!(form.go_to_next_step().expect("next"));

    form.go_to_previous_step().expect("back");
    store.handle_change("email", "broken").expect("change");

    assert!(!form.go_to_next_step().expect("next"));
    assert_eq!(form.current_step().expect("step"), 0);
    assert_eq!(
        store.error("email").expect("error").as_deref(),
        Some(EMAIL_MESSAGE)
    );
    assert!(form.snapshot().expect("snapshot").completed_steps.contains(&0));
}

#[test]
fn final_step_hands_merged_values_to_completion() {
    let form = three_step_form();
    let store = form.store().clone();
    store.handle_change("name", "Ada").expect("change");
    store.handle_change("email", "ada@example.com").expect("change");
    store.handle_change("vin", "1HGCM82633A004352").expect("change");

    assert_eq!(
        block_on(form.submit_step(|_| async { Ok::<(), String>(()) })).expect("step"),
        StepOutcome::Advanced(1)
    );
    assert_eq!(
        block_on(form.submit_step(|_| async { Ok::<(), String>(()) })).expect("step"),
        StepOutcome::Advanced(2)
    );

    store.handle_change("plan", "gold").expect("change");
    let outcome = block_on(form.submit_step(|values| async move {
        assert_eq!(values.get("plan"), Some(&FieldValue::from("gold")));
        assert_eq!(values.get("name"), Some(&FieldValue::from("Ada")));
        Ok::<(), String>(())
    }))
    .expect("final step");

    assert_eq!(outcome, StepOutcome::Completed);
    assert_eq!(form.current_step().expect("step"), 2);
    assert_eq!(form.snapshot().expect("snapshot").status, StepStatus::Complete);
}

#[test]
fn failed_completion_is_reported_on_the_form() {
    let form = MultiStepForm::new(
        vec![Step::new("Only").field("name")],
        FormStore::new(
            FormValues::new().with("name", "Ada"),
            ValidationSchema::new().field("name", validators::required()),
        ),
    );

    let outcome = block_on(form.submit_step(|_| async { Err::<(), _>("Booking closed") }))
        .expect("final step");

    assert_eq!(outcome, StepOutcome::Failed);
    assert_eq!(
        form.store().error(SUBMIT_ERROR_KEY).expect("error").as_deref(),
        Some("Booking closed")
    );
}

#[test]
fn step_completion_after_scope_end_is_dropped() {
    let store = FormStore::new(
        FormValues::new().with("name", "Ada"),
        ValidationSchema::new().field("name", validators::required()),
    );
    let form = MultiStepForm::new(vec![Step::new("Only").field("name")], store.clone());
    let closer = store.clone();

    let outcome = block_on(form.submit_step(|_| async move {
        closer.close();
        Ok::<(), String>(())
    }))
    .expect("final step");

    assert_eq!(outcome, StepOutcome::Detached);
    assert_ne!(form.snapshot().expect("snapshot").status, StepStatus::Complete);

    let again = block_on(form.submit_step(|_| async { Ok::<(), String>(()) })).expect("step");
    assert_eq!(again, StepOutcome::Detached);
}

#[test]
fn closed_store_freezes_step_navigation() {
    let form = three_step_form();
    let store = form.store().clone();
    store.handle_change("name", "Ada").expect("change");
    store.handle_change("email", "ada@example.com").expect("change");
    store.close();

    assert!(!form.go_to_next_step().expect("next"));
    let snapshot = form.snapshot().expect("snapshot");
    assert_eq!(snapshot.current_step, 0);
    assert!(snapshot.completed_steps.is_empty());
    assert!(snapshot.accumulated_values.is_empty());
}

fn roadside_form() -> DynamicForm {
    DynamicForm::new(vec![
        FieldSpec::text("name").label("Full name").required(true),
        FieldSpec::email("email").required(true),
        FieldSpec::new(
            "plan",
            FieldKind::Select {
                options: vec![
                    SelectOption::new("basic", "Basic"),
                    SelectOption::new("plus", "Plus"),
                ],
            },
        ),
        FieldSpec::new(
            "has_trailer",
            FieldKind::Conditional {
                condition: Arc::new(|value| value.as_bool() == Some(true)),
                fields: vec![FieldSpec::text("trailer_vin").required(true)],
            },
        ),
        FieldSpec::new(
            "drivers",
            FieldKind::Repeatable {
                template: vec![
                    FieldSpec::text("name").required(true),
                    FieldSpec::email("email"),
                ],
            },
        ),
    ])
}

#[test]
fn dynamic_form_seeds_defaults_and_rules() {
    let form = roadside_form();
    let values = form.initial_values();

    assert_eq!(values.get("name"), Some(&FieldValue::from("")));
    assert_eq!(values.get("plan"), Some(&FieldValue::from("basic")));
    assert_eq!(values.get("trailer_vin"), Some(&FieldValue::from("")));
    assert_eq!(form.row_count(&values, "drivers"), 0);

    let schema = form.schema(&values);
    assert!(schema.contains("name"));
    assert!(schema.contains("email"));
    assert!(!schema.contains("trailer_vin"));
    assert_eq!(
        schema.check_field("email", &values.clone().with("email", "nope")).as_deref(),
        Some(EMAIL_MESSAGE)
    );
    assert_eq!(
        schema.check_field("plan", &values.with("plan", "platinum")).as_deref(),
        Some("Please select a valid option")
    );
}

#[test]
fn conditional_fields_join_the_schema_when_shown() {
    let form = roadside_form();
    let store = form.store();
    store.handle_change("name", "Ada").expect("change");
    store.handle_change("email", "ada@example.com").expect("change");
    assert!(store.validate_all_fields().expect("validate"));

    store.handle_change("has_trailer", true).expect("change");
    form.sync_schema(&store).expect("sync");

    assert!(!store.validate_all_fields().expect("validate"));
    assert_eq!(
        store.error("trailer_vin").expect("error").as_deref(),
        Some(REQUIRED_MESSAGE)
    );

    store.handle_change("has_trailer", false).expect("change");
    form.sync_schema(&store).expect("sync");
    assert_eq!(store.error("trailer_vin").expect("error"), None);
}

#[test]
fn repeatable_rows_shift_down_on_removal() {
    let form = roadside_form();
    let store = form.store();

    assert_eq!(form.append_row(&store, "drivers").expect("append"), 0);
    assert_eq!(form.append_row(&store, "drivers").expect("append"), 1);
    store
        .handle_change(FieldKey::row("drivers", 0, "name"), "Ada")
        .expect("change");
    store
        .handle_change(FieldKey::row("drivers", 1, "name"), "Grace")
        .expect("change");
    assert!(store.schema().expect("schema").contains("drivers.1.name"));

    form.remove_row(&store, "drivers", 0).expect("remove");

    let values = store.values().expect("values");
    assert_eq!(form.row_count(&values, "drivers"), 1);
    assert_eq!(values.get("drivers.0.name"), Some(&FieldValue::from("Grace")));
    assert!(!values.contains_key("drivers.1.name"));
    assert!(!store.schema().expect("schema").contains("drivers.1.name"));

    let error = form
        .append_row(&store, "name")
        .expect_err("plain fields have no rows");
    assert_eq!(error, FormError::UnknownField("name".into()));
}

#[test]
fn required_repeatable_group_counts_rows() {
    let form = DynamicForm::new(vec![FieldSpec::new(
        "vehicles",
        FieldKind::Repeatable {
            template: vec![FieldSpec::text("make").required(true)],
        },
    )
    .required(true)]);
    let store = form.store();

    assert!(!store.validate_all_fields().expect("validate"));
    assert_eq!(
        store.error("vehicles").expect("error").as_deref(),
        Some(REQUIRED_MESSAGE)
    );

    form.append_row(&store, "vehicles").expect("append");
    store
        .handle_change(FieldKey::row("vehicles", 0, "make"), "Volvo")
        .expect("change");

    assert!(store.validate_all_fields().expect("validate"));
    assert_eq!(store.error("vehicles").expect("error"), None);
}

#[test]
fn drafts_round_trip_through_the_store() {
    let drafts = InMemoryDraftStore::new();
    let store = contact_store("", "");
    store.handle_change("name", "Ada").expect("change");
    store.save_draft(&drafts).expect("save");

    store.reset_form().expect("reset");
    assert!(store.load_draft(&drafts).expect("load"));

    assert_eq!(
        store.value("name").expect("value"),
        Some(FieldValue::from("Ada"))
    );
    assert!(store.field_meta("name").expect("meta").is_some_and(|meta| meta.dirty));

    store.clear_draft(&drafts).expect("clear");
    assert!(!store.load_draft(&drafts).expect("load"));
}

#[test]
fn drafts_reload_into_a_new_store_with_the_same_id() {
    let drafts = InMemoryDraftStore::new();
    let id = FormId(42);
    let first = FormStore::with_id(
        id,
        FormValues::new().with("name", "").with("email", ""),
        contact_schema(),
    );
    first.handle_change("name", "Ada").expect("change");
    first.save_draft(&drafts).expect("save");
    first.close();

    let unrelated = contact_store("", "");
    assert!(!unrelated.load_draft(&drafts).expect("load"));

    let second = FormStore::with_id(
        id,
        FormValues::new().with("name", "").with("email", ""),
        contact_schema(),
    );
    assert_eq!(second.form_id().expect("form id"), id);
    assert!(second.load_draft(&drafts).expect("load"));
    assert_eq!(
        second.value("name").expect("value"),
        Some(FieldValue::from("Ada"))
    );
}

#[test]
fn autosave_persists_edits_until_scope_ends() {
    let drafts = InMemoryDraftStore::new();
    let store = contact_store("", "");
    let editor = store.clone();

    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        editor.handle_change("name", "Ada").expect("change");
        thread::sleep(Duration::from_millis(80));
        editor.close();
    });
    block_on(store.autosave(&drafts, Duration::from_millis(5))).expect("autosave");
    handle.join().expect("editor thread should finish");

    let saved = drafts
        .load(store.form_id().expect("form id"))
        .expect("in-memory load")
        .expect("a draft should have been saved");
    assert_eq!(saved.get("name"), Some(&FieldValue::from("Ada")));
}

#[test]
fn derived_model_round_trips_through_store() {
    let fields = ProfileForm::fields();
    assert_eq!(fields.confirm_password().as_str(), "confirm_password");

    let store = FormStore::from_model(
        &base_form(),
        ValidationSchema::new().field(
            fields.confirm_password(),
            validators::matches_field(fields.password(), "Passwords"),
        ),
    );
    store
        .handle_change(fields.confirm_password(), "other")
        .expect("change");
    assert!(!store.validate_field(fields.confirm_password()).expect("validate"));
    assert_eq!(
        store.error("confirm_password").expect("error").as_deref(),
        Some("Passwords must match")
    );

    store.handle_change(fields.amount(), 15_i64).expect("change");
    let model = store.model::<ProfileForm>().expect("model");
    assert_eq!(model.amount, Decimal::from(15));
    assert_eq!(model.tags, vec!["a".to_string()]);
    assert_eq!(model.confirm_password, "other");
}

#[test]
fn stores_are_shared_safely_across_threads() {
    let store = FormStore::new(FormValues::new(), ValidationSchema::new());
    let handles = (0..4)
        .map(|worker| {
            let store = store.clone();
            thread::spawn(move || {
                for index in 0..25 {
                    store
                        .handle_change(format!("w{worker}.f{index}"), index as i64)
                        .expect("change should apply");
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().expect("worker should finish");
    }
    assert_eq!(store.values().expect("values").len(), 100);
}

#[test]
fn separate_stores_never_share_state() {
    let first = contact_store("", "");
    let second = contact_store("", "");
    first.handle_change("name", "Ada").expect("change");
    assert_ne!(first.form_id().expect("id"), second.form_id().expect("id"));
    assert_eq!(
        second.value("name").expect("value"),
        Some(FieldValue::from(""))
    );
}
