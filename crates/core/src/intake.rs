//! Patient intake.
//!
//! A nurse fills in an [`IntakeForm`]; it is validated into a [`NewPatientRecord`] and handed to
//! the store, which assigns the id and starts the record as `Pendiente`.

use crate::constants::MAX_PATIENT_AGE;
use crate::record::{ClinicalHistory, IntakeData, NewPatientRecord, RecordId, Sex, Vitals};
use crate::session::{Role, SessionContext};
use crate::store::RecordStore;
use crate::{PretriageError, PretriageResult};
use pretriage_types::NonEmptyText;
use serde::Deserialize;
use std::sync::Arc;

/// Raw intake payload as entered on the ward.
///
/// Has no `id` field. Identity is assigned by the store; payloads that carry one are rejected
/// at deserialisation.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntakeForm {
    pub name: String,
    pub age: u32,
    pub sex: String,
    #[serde(default)]
    pub weight_kg: f64,
    #[serde(default)]
    pub height_cm: f64,
    #[serde(default)]
    pub pulse_bpm: u32,
    #[serde(default)]
    pub spo2_pct: u32,
    #[serde(default)]
    pub temperature_c: f64,
    #[serde(default)]
    pub blood_pressure: String,
    #[serde(default)]
    pub chronic_conditions: String,
    #[serde(default)]
    pub allergies: String,
    #[serde(default)]
    pub previous_surgeries: String,
    #[serde(default)]
    pub permanent_medication: String,
    #[serde(default)]
    pub nurse_observations: String,
}

impl IntakeForm {
    /// Validate the form field by field.
    ///
    /// # Errors
    ///
    /// Returns [`PretriageError::Validation`] naming the first offending field.
    pub fn validate(self) -> PretriageResult<NewPatientRecord> {
        let name = NonEmptyText::new(&self.name).map_err(|e| invalid("name", e.to_string()))?;
        if self.age > MAX_PATIENT_AGE {
            return Err(invalid("age", format!("must be at most {MAX_PATIENT_AGE}")));
        }
        let sex = self.sex.parse::<Sex>()?;
        let weight_kg = non_negative("weight_kg", self.weight_kg)?;
        let height_cm = non_negative("height_cm", self.height_cm)?;
        let temperature_c = non_negative("temperature_c", self.temperature_c)?;
        let spo2_pct = u8::try_from(self.spo2_pct)
            .ok()
            .filter(|v| *v <= 100)
            .ok_or_else(|| invalid("spo2_pct", "must be between 0 and 100".into()))?;
        let blood_pressure = self.blood_pressure.trim().to_owned();
        if !blood_pressure.is_empty() && !looks_like_blood_pressure(&blood_pressure) {
            return Err(invalid(
                "blood_pressure",
                format!("expected systolic/diastolic such as 120/80, got '{blood_pressure}'"),
            ));
        }

        Ok(NewPatientRecord::new(IntakeData {
            name,
            age: self.age,
            sex,
            vitals: Vitals {
                weight_kg,
                height_cm,
                pulse_bpm: self.pulse_bpm,
                spo2_pct,
                temperature_c,
                blood_pressure,
            },
            history: ClinicalHistory {
                chronic_conditions: self.chronic_conditions.trim().to_owned(),
                allergies: self.allergies.trim().to_owned(),
                previous_surgeries: self.previous_surgeries.trim().to_owned(),
                permanent_medication: self.permanent_medication.trim().to_owned(),
                nurse_observations: self.nurse_observations.trim().to_owned(),
            },
        }))
    }
}

fn invalid(field: &'static str, reason: String) -> PretriageError {
    PretriageError::Validation { field, reason }
}

fn non_negative(field: &'static str, value: f64) -> PretriageResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(invalid(field, format!("must be a non-negative number, got {value}")))
    }
}

fn looks_like_blood_pressure(text: &str) -> bool {
    let Some((systolic, diastolic)) = text.split_once('/') else {
        return false;
    };
    let numeric = |s: &str| {
        let s = s.trim();
        !s.is_empty() && s.len() <= 3 && s.bytes().all(|b| b.is_ascii_digit())
    };
    numeric(systolic) && numeric(diastolic)
}

/// Nurse-facing entry point into the record store.
#[derive(Clone)]
pub struct IntakeService {
    store: Arc<dyn RecordStore>,
}

impl IntakeService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Validate `form` and create a record for it.
    ///
    /// # Errors
    ///
    /// - [`PretriageError::Forbidden`] unless `ctx` is a nurse session,
    /// - [`PretriageError::Validation`] for a malformed form,
    /// - store errors from `create`.
    pub fn register_patient(
        &self,
        ctx: &SessionContext,
        form: IntakeForm,
    ) -> PretriageResult<RecordId> {
        ctx.require(Role::Nurse, "register patients")?;
        let record = form.validate()?;
        let id = self.store.create(record)?;
        tracing::info!(%id, nurse = %ctx.username(), "patient registered, status Pendiente");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Status;
    use crate::store::MemoryRecordStore;

    fn form() -> IntakeForm {
        IntakeForm {
            name: "  Rosa Medina ".into(),
            age: 67,
            sex: "Femenino".into(),
            weight_kg: 70.2,
            height_cm: 158.0,
            pulse_bpm: 92,
            spo2_pct: 94,
            temperature_c: 38.1,
            blood_pressure: "140/90".into(),
            allergies: "penicilina".into(),
            ..Default::default()
        }
    }

    fn nurse() -> SessionContext {
        SessionContext::new(NonEmptyText::new("enf.lopez").unwrap(), Role::Nurse)
    }

    #[test]
    fn test_valid_form_is_accepted() {
        let record = form().validate().expect("form should validate");
        assert_eq!(record.intake().name.as_str(), "Rosa Medina");
        assert_eq!(record.intake().vitals.spo2_pct, 94);
        assert_eq!(record.intake().history.allergies, "penicilina");
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let err = IntakeForm {
            name: "   ".into(),
            ..form()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, PretriageError::Validation { field: "name", .. }));
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let cases = [
            (IntakeForm { age: 121, ..form() }, "age"),
            (IntakeForm { spo2_pct: 101, ..form() }, "spo2_pct"),
            (IntakeForm { weight_kg: -1.0, ..form() }, "weight_kg"),
            (IntakeForm { temperature_c: f64::NAN, ..form() }, "temperature_c"),
            (
                IntakeForm {
                    blood_pressure: "high".into(),
                    ..form()
                },
                "blood_pressure",
            ),
            (
                IntakeForm {
                    sex: "otro".into(),
                    ..form()
                },
                "sex",
            ),
        ];
        for (input, expected_field) in cases {
            match input.validate() {
                Err(PretriageError::Validation { field, .. }) => assert_eq!(field, expected_field),
                other => panic!("expected validation error on {expected_field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_empty_blood_pressure_is_allowed() {
        let record = IntakeForm {
            blood_pressure: " ".into(),
            ..form()
        }
        .validate()
        .unwrap();
        assert_eq!(record.intake().vitals.blood_pressure, "");
    }

    #[test]
    fn test_payload_with_id_is_rejected() {
        let json = r#"{"id": 4, "name": "Rosa", "age": 30, "sex": "Femenino"}"#;
        assert!(serde_json::from_str::<IntakeForm>(json).is_err());
    }

    #[test]
    fn test_nurse_registers_pending_record() {
        let store = Arc::new(MemoryRecordStore::new());
        let service = IntakeService::new(store.clone());
        let id = service.register_patient(&nurse(), form()).unwrap();

        let snapshot = store.fetch_all().unwrap();
        let record = snapshot.get(id).unwrap();
        assert_eq!(record.status, Status::Pending);
        assert_eq!(record.priority, None);
    }

    #[test]
    fn test_doctor_cannot_register() {
        let store = Arc::new(MemoryRecordStore::new());
        let service = IntakeService::new(store.clone());
        let doctor = SessionContext::new(NonEmptyText::new("dr.ruiz").unwrap(), Role::Doctor);
        assert!(matches!(
            service.register_patient(&doctor, form()),
            Err(PretriageError::Forbidden { .. })
        ));
        assert!(store.fetch_all().unwrap().is_empty());
    }
}
