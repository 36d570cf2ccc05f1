//! Patient record model.
//!
//! A [`PatientRecord`] is written once by intake and afterwards only its `priority` and
//! `status` change. Everything else is read-only in the core.
//!
//! Status and priority labels are the Spanish terms used on the ward. They are what gets
//! written to disk and sent over the wire.

use crate::{PretriageError, PretriageResult};
use chrono::{DateTime, Utc};
use pretriage_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store-assigned record identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = PretriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(RecordId)
            .map_err(|_| PretriageError::InvalidInput(format!("invalid record id: {s}")))
    }
}

// ============================================================================
// STATUS AND PRIORITY
// ============================================================================

/// Attention status of a record.
///
/// Variants are declared in workflow order; the derived `Ord` is the forward direction
/// used by the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "Pendiente")]
    Pending,
    #[serde(rename = "En Atención")]
    InAttention,
    #[serde(rename = "Atendido")]
    Attended,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::Pending => "Pendiente",
            Status::InAttention => "En Atención",
            Status::Attended => "Atendido",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Status {
    type Err = PretriageError;

    /// Accepts the ward label or the English variant name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pendiente" | "pending" => Ok(Status::Pending),
            "en atención" | "en atencion" | "inattention" | "in-attention" => {
                Ok(Status::InAttention)
            }
            "atendido" | "attended" => Ok(Status::Attended),
            _ => Err(PretriageError::Validation {
                field: "status",
                reason: format!("unknown status '{s}'"),
            }),
        }
    }
}

/// Triage priority.
///
/// The set contains the levels of every supported scale. Which of them a deployment
/// accepts is decided by its [`crate::vocabulary::PriorityScale`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Baja,
    Media,
    Alta,
    Normal,
    Prioritaria,
    Inmediata,
}

impl Priority {
    pub fn label(self) -> &'static str {
        match self {
            Priority::Baja => "Baja",
            Priority::Media => "Media",
            Priority::Alta => "Alta",
            Priority::Normal => "Normal",
            Priority::Prioritaria => "Prioritaria",
            Priority::Inmediata => "Inmediata",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Priority {
    type Err = PretriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "baja" => Ok(Priority::Baja),
            "media" => Ok(Priority::Media),
            "alta" => Ok(Priority::Alta),
            "normal" => Ok(Priority::Normal),
            "prioritaria" => Ok(Priority::Prioritaria),
            "inmediata" => Ok(Priority::Inmediata),
            _ => Err(PretriageError::Validation {
                field: "priority",
                reason: format!("unknown priority '{s}'"),
            }),
        }
    }
}

/// The two fields a doctor may change after intake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Status,
    Priority,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Status => f.write_str("status"),
            Field::Priority => f.write_str("priority"),
        }
    }
}

/// Value of a mutable field, as observed or requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Status(Status),
    Priority(Option<Priority>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Status(s) => write!(f, "{s}"),
            FieldValue::Priority(Some(p)) => write!(f, "{p}"),
            FieldValue::Priority(None) => f.write_str("(unset)"),
        }
    }
}

// ============================================================================
// INTAKE DATA
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "Masculino")]
    Male,
    #[serde(rename = "Femenino")]
    Female,
}

impl FromStr for Sex {
    type Err = PretriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "masculino" | "male" | "m" => Ok(Sex::Male),
            "femenino" | "female" | "f" => Ok(Sex::Female),
            _ => Err(PretriageError::Validation {
                field: "sex",
                reason: format!("unknown value '{s}'"),
            }),
        }
    }
}

/// Vital signs taken by the nurse at intake.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub weight_kg: f64,
    pub height_cm: f64,
    pub pulse_bpm: u32,
    pub spo2_pct: u8,
    pub temperature_c: f64,
    /// Free text in the usual `systolic/diastolic` form, e.g. `120/80`. May be empty.
    pub blood_pressure: String,
}

/// Free-text history captured at intake.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalHistory {
    pub chronic_conditions: String,
    pub allergies: String,
    pub previous_surgeries: String,
    pub permanent_medication: String,
    pub nurse_observations: String,
}

/// Demographics, vitals and notes. Written once, never modified.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntakeData {
    pub name: NonEmptyText,
    pub age: u32,
    pub sex: Sex,
    pub vitals: Vitals,
    pub history: ClinicalHistory,
}

/// A validated intake payload. It has no identity; the store assigns one on creation.
#[derive(Clone, Debug, PartialEq)]
pub struct NewPatientRecord {
    intake: IntakeData,
}

impl NewPatientRecord {
    pub(crate) fn new(intake: IntakeData) -> Self {
        Self { intake }
    }

    pub fn intake(&self) -> &IntakeData {
        &self.intake
    }

    /// Materialise the stored row. New records always start `Pending` with no priority.
    pub(crate) fn into_record(self, id: RecordId, created_at: DateTime<Utc>) -> PatientRecord {
        PatientRecord {
            id,
            intake: self.intake,
            priority: None,
            status: Status::Pending,
            created_at,
        }
    }
}

/// A stored patient record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: RecordId,
    pub intake: IntakeData,
    pub priority: Option<Priority>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

impl PatientRecord {
    pub fn value_of(&self, field: Field) -> FieldValue {
        match field {
            Field::Status => FieldValue::Status(self.status),
            Field::Priority => FieldValue::Priority(self.priority),
        }
    }

    pub(crate) fn assign(&mut self, value: FieldValue) {
        match value {
            FieldValue::Status(s) => self.status = s,
            FieldValue::Priority(p) => self.priority = p,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) fn sample_intake(name: &str) -> IntakeData {
        IntakeData {
            name: NonEmptyText::new(name).expect("valid name"),
            age: 42,
            sex: Sex::Female,
            vitals: Vitals {
                weight_kg: 61.5,
                height_cm: 164.0,
                pulse_bpm: 88,
                spo2_pct: 97,
                temperature_c: 37.2,
                blood_pressure: "120/80".into(),
            },
            history: ClinicalHistory::default(),
        }
    }

    pub(crate) fn sample_new_record(name: &str) -> NewPatientRecord {
        NewPatientRecord::new(sample_intake(name))
    }
}
