//! Purpose: Enforce the constant-parameter contract across the requests of one stream.
//! Exports: `MutabilityValidator`, `MutabilityValidatingRequest`, `MutabilityRecord`.
//! Role: Outermost validation layer; the only pipeline state that outlives a request.
//! Invariants: A constant keeps its first non-null value for the rest of the stream.
//! Invariants: A failed or abandoned step never advances the committed value.
//! Invariants: Step N is folded before step N+1 is wrapped; steps never overlap.
use std::collections::HashMap;

use serde_json::Value;

use crate::core::endpoint::{ParameterDescriptor, ParameterId};
use crate::core::error::{Error, ErrorKind};
use crate::core::request::{Request, RequestMetadata};

/// Observed values of one constant parameter.
///
/// `backup` is the value committed by the last successful step; `last` is the
/// value the current step must match (or just introduced).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MutabilityRecord {
    backup: Option<Value>,
    last: Option<Value>,
}

impl MutabilityRecord {
    pub fn backup(&self) -> Option<&Value> {
        self.backup.as_ref()
    }

    pub fn last(&self) -> Option<&Value> {
        self.last.as_ref()
    }
}

#[derive(Debug, Default)]
pub struct MutabilityValidator {
    records: HashMap<ParameterId, MutabilityRecord>,
    failed: bool,
    steps: u64,
}

impl MutabilityValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the previous step and wraps `request` as the next one.
    pub fn validate<R: Request>(&mut self, request: R) -> MutabilityValidatingRequest<'_, R> {
        if self.steps > 0 {
            self.reduce();
        }
        self.steps += 1;
        MutabilityValidatingRequest {
            state: self,
            request,
        }
    }

    pub fn record(&self, id: ParameterId) -> Option<&MutabilityRecord> {
        self.records.get(&id)
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Whether the current (not yet folded) step has failed.
    pub fn current_step_failed(&self) -> bool {
        self.failed
    }

    fn reduce(&mut self) {
        let failed = self.failed;
        for record in self.records.values_mut() {
            if failed {
                record.last = record.backup.clone();
            } else {
                record.backup = record.last.clone();
            }
        }
        tracing::trace!(step = self.steps, failed, "folded mutability state");
        self.failed = false;
    }

    fn check(&mut self, parameter: &ParameterDescriptor, value: &Value) -> Result<(), Error> {
        if !parameter.is_constant() || value.is_null() {
            return Ok(());
        }
        let record = self.records.entry(parameter.id()).or_default();
        match &record.last {
            None => {
                record.last = Some(value.clone());
                Ok(())
            }
            Some(fixed) if fixed == value => Ok(()),
            Some(fixed) => Err(Error::new(ErrorKind::BadInput)
                .with_message(format!(
                    "constant parameter '{}' changed value",
                    parameter.name()
                ))
                .with_parameter(parameter.name())
                .with_hint(format!(
                    "The value was fixed to {fixed} earlier in this stream; received {value}."
                ))),
        }
    }
}

pub struct MutabilityValidatingRequest<'s, R> {
    state: &'s mut MutabilityValidator,
    request: R,
}

impl<'s, R: Request> MutabilityValidatingRequest<'s, R> {
    pub fn inner(&self) -> &R {
        &self.request
    }

    pub fn state(&self) -> &MutabilityValidator {
        self.state
    }

    /// Gives up on this step; nothing it observed will be committed.
    pub fn abandon(self) {
        self.state.failed = true;
    }
}

impl<'s, R: Request> Request for MutabilityValidatingRequest<'s, R> {
    fn retrieve_value(&mut self, parameter: &ParameterDescriptor) -> Result<Value, Error> {
        let value = match self.request.retrieve_value(parameter) {
            Ok(value) => value,
            Err(err) => {
                self.state.failed = true;
                return Err(err);
            }
        };
        if let Err(err) = self.state.check(parameter, &value) {
            self.state.failed = true;
            return Err(err);
        }
        Ok(value)
    }

    fn metadata(&self) -> &RequestMetadata {
        self.request.metadata()
    }

    fn note_failure(&mut self) {
        self.state.failed = true;
        self.request.note_failure();
    }
}

#[cfg(test)]
mod tests {
    use super::MutabilityValidator;
    use crate::core::endpoint::{ParameterDescriptor, ParameterId};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::request::{Request, RequestMetadata};
    use serde_json::{Value, json};
    use std::collections::HashMap;

    struct StaticRequest {
        values: HashMap<ParameterId, Value>,
        metadata: RequestMetadata,
    }

    impl Request for StaticRequest {
        fn retrieve_value(&mut self, parameter: &ParameterDescriptor) -> Result<Value, Error> {
            self.values.get(&parameter.id()).cloned().ok_or_else(|| {
                Error::bad_input(format!("missing required parameter '{}'", parameter.name()))
            })
        }

        fn metadata(&self) -> &RequestMetadata {
            &self.metadata
        }
    }

    fn request(values: Vec<(&ParameterDescriptor, Value)>) -> StaticRequest {
        StaticRequest {
            values: values
                .into_iter()
                .map(|(parameter, value)| (parameter.id(), value))
                .collect(),
            metadata: RequestMetadata::default(),
        }
    }

    fn limit() -> ParameterDescriptor {
        ParameterDescriptor::with_id(ParameterId::from_u128(1), "limit").constant()
    }

    fn name() -> ParameterDescriptor {
        ParameterDescriptor::with_id(ParameterId::from_u128(2), "name")
    }

    #[test]
    fn repeated_constant_value_is_accepted() {
        let limit = limit();
        let mut validator = MutabilityValidator::new();
        for _ in 0..3 {
            let mut step = validator.validate(request(vec![(&limit, json!(5))]));
            assert_eq!(step.retrieve_value(&limit).expect("limit"), json!(5));
        }
        assert_eq!(validator.steps(), 3);
    }

    #[test]
    fn changed_constant_value_is_rejected() {
        let limit = limit();
        let mut validator = MutabilityValidator::new();

        let mut first = validator.validate(request(vec![(&limit, json!(5))]));
        first.retrieve_value(&limit).expect("first");

        let mut second = validator.validate(request(vec![(&limit, json!(7))]));
        let err = second.retrieve_value(&limit).expect_err("changed");
        assert_eq!(err.kind(), ErrorKind::BadInput);
        assert_eq!(err.message(), Some("constant parameter 'limit' changed value"));
        assert!(validator.current_step_failed());
    }

    #[test]
    fn failed_step_does_not_advance_committed_value() {
        let limit = limit();
        let name = name();
        let mut validator = MutabilityValidator::new();

        let mut first = validator.validate(request(vec![(&limit, json!(5)), (&name, json!("a"))]));
        first.retrieve_value(&limit).expect("limit");
        first.retrieve_value(&name).expect("name");

        // The second step fails on `name`, unrelated to `limit`.
        let mut second = validator.validate(request(vec![(&limit, json!(5))]));
        second.retrieve_value(&limit).expect("limit");
        second.retrieve_value(&name).expect_err("name missing");

        let mut third = validator.validate(request(vec![(&limit, json!(5)), (&name, json!("c"))]));
        assert_eq!(third.retrieve_value(&limit).expect("limit"), json!(5));
    }

    #[test]
    fn value_first_seen_in_failed_step_is_forgotten() {
        let limit = limit();
        let name = name();
        let mut validator = MutabilityValidator::new();

        let mut first = validator.validate(request(vec![(&limit, json!(5))]));
        first.retrieve_value(&limit).expect("limit");
        first.retrieve_value(&name).expect_err("name missing");

        let mut second = validator.validate(request(vec![(&limit, json!(9))]));
        assert_eq!(second.retrieve_value(&limit).expect("new value"), json!(9));
    }

    #[test]
    fn abandoned_step_rolls_back() {
        let limit = limit();
        let mut validator = MutabilityValidator::new();

        let step = {
            let mut step = validator.validate(request(vec![(&limit, json!(5))]));
            step.retrieve_value(&limit).expect("limit");
            step
        };
        step.abandon();

        let mut next = validator.validate(request(vec![(&limit, json!(6))]));
        assert_eq!(next.retrieve_value(&limit).expect("fresh"), json!(6));
    }

    #[test]
    fn state_after_step_k_holds_only_data_up_to_k() {
        let limit = limit();
        let mut validator = MutabilityValidator::new();

        let mut first = validator.validate(request(vec![(&limit, json!(5))]));
        first.retrieve_value(&limit).expect("limit");
        let record = validator.record(limit.id()).expect("record");
        assert_eq!(record.last(), Some(&json!(5)));
        assert_eq!(record.backup(), None);

        let second = validator.validate(request(vec![(&limit, json!(5))]));
        let record = second.state().record(limit.id()).expect("record");
        assert_eq!(record.backup(), Some(&json!(5)));
        assert_eq!(record.last(), Some(&json!(5)));
    }

    #[test]
    fn null_and_variable_values_are_unconstrained() {
        let limit = limit();
        let name = name();
        let mut validator = MutabilityValidator::new();

        let mut first =
            validator.validate(request(vec![(&limit, Value::Null), (&name, json!("a"))]));
        first.retrieve_value(&limit).expect("null limit");
        first.retrieve_value(&name).expect("name");
        assert!(validator.record(limit.id()).is_none());

        let mut second = validator.validate(request(vec![(&limit, json!(3)), (&name, json!("b"))]));
        second.retrieve_value(&limit).expect("first real limit");
        second.retrieve_value(&name).expect("name may change");
    }

    #[test]
    fn note_failure_marks_step_failed() {
        let limit = limit();
        let mut validator = MutabilityValidator::new();

        let mut first = validator.validate(request(vec![(&limit, json!(5))]));
        first.retrieve_value(&limit).expect("limit");
        first.note_failure();

        let mut second = validator.validate(request(vec![(&limit, json!(8))]));
        second.retrieve_value(&limit).expect("previous value was never committed");
    }
}
