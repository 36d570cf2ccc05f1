//! Wire types for the REST API.
//!
//! Status, priority and sex travel as their ward labels (`"Pendiente"`, `"Inmediata"`,
//! `"Femenino"`), the same strings the core persists.

use chrono::{DateTime, Utc};
use pretriage_core::{
    FieldOutcome, IntakeForm, PatientRecord, Priority, ReconcileReport, RecordOutcome, Role, Sex,
    Status,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

// ============================================================================
// AUTH
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterReq {
    pub username: String,
    pub password: String,
    #[schema(value_type = String, example = "Doctor")]
    pub role: Role,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterRes {
    pub username: String,
    #[schema(value_type = String)]
    pub role: Role,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginReq {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginRes {
    /// Send back as the `x-session-token` header.
    pub token: Uuid,
    pub username: String,
    #[schema(value_type = String)]
    pub role: Role,
}

// ============================================================================
// RECORDS
// ============================================================================

/// Intake form. Records are identified by the server; an `id` field is rejected.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateRecordReq {
    pub name: String,
    pub age: u32,
    #[schema(example = "Femenino")]
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
    #[schema(example = "120/80")]
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

impl From<CreateRecordReq> for IntakeForm {
    fn from(req: CreateRecordReq) -> Self {
        IntakeForm {
            name: req.name,
            age: req.age,
            sex: req.sex,
            weight_kg: req.weight_kg,
            height_cm: req.height_cm,
            pulse_bpm: req.pulse_bpm,
            spo2_pct: req.spo2_pct,
            temperature_c: req.temperature_c,
            blood_pressure: req.blood_pressure,
            chronic_conditions: req.chronic_conditions,
            allergies: req.allergies,
            previous_surgeries: req.previous_surgeries,
            permanent_medication: req.permanent_medication,
            nurse_observations: req.nurse_observations,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateRecordRes {
    pub id: u64,
}

/// Optional filters for `GET /records`. Unset filters match every record.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListRecordsQuery {
    /// Case-insensitive substring of the patient name.
    pub name: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecordRes {
    pub id: u64,
    pub name: String,
    pub age: u32,
    #[schema(value_type = String)]
    pub sex: Sex,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub pulse_bpm: u32,
    pub spo2_pct: u8,
    pub temperature_c: f64,
    pub blood_pressure: String,
    pub chronic_conditions: String,
    pub allergies: String,
    pub previous_surgeries: String,
    pub permanent_medication: String,
    pub nurse_observations: String,
    #[schema(value_type = Option<String>)]
    pub priority: Option<Priority>,
    #[schema(value_type = String)]
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

impl From<&PatientRecord> for RecordRes {
    fn from(record: &PatientRecord) -> Self {
        let intake = &record.intake;
        Self {
            id: record.id.get(),
            name: intake.name.to_string(),
            age: intake.age,
            sex: intake.sex,
            weight_kg: intake.vitals.weight_kg,
            height_cm: intake.vitals.height_cm,
            pulse_bpm: intake.vitals.pulse_bpm,
            spo2_pct: intake.vitals.spo2_pct,
            temperature_c: intake.vitals.temperature_c,
            blood_pressure: intake.vitals.blood_pressure.clone(),
            chronic_conditions: intake.history.chronic_conditions.clone(),
            allergies: intake.history.allergies.clone(),
            previous_surgeries: intake.history.previous_surgeries.clone(),
            permanent_medication: intake.history.permanent_medication.clone(),
            nurse_observations: intake.history.nurse_observations.clone(),
            priority: record.priority,
            status: record.status,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListRecordsRes {
    /// When the snapshot behind this listing was read.
    pub taken_at: DateTime<Utc>,
    pub records: Vec<RecordRes>,
}

// ============================================================================
// RECONCILE
// ============================================================================

/// A status change, with the value the client saw before changing it.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusChangeReq {
    #[schema(value_type = String, example = "Pendiente")]
    pub observed: Status,
    #[schema(value_type = String, example = "En Atención")]
    pub requested: Status,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PriorityChangeReq {
    /// `null` clears the priority.
    #[schema(value_type = Option<String>, example = "Inmediata")]
    pub requested: Option<Priority>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordEditReq {
    pub id: u64,
    #[serde(default)]
    pub status: Option<StatusChangeReq>,
    #[serde(default)]
    pub priority: Option<PriorityChangeReq>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReconcileReq {
    pub records: Vec<RecordEditReq>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FieldResultRes {
    #[schema(example = "status")]
    pub field: String,
    /// `applied`, `conflict`, `invalid_transition`, `invalid`, `not_found` or `failed`.
    pub outcome: String,
    pub message: Option<String>,
    /// Stored status when the outcome is `conflict`.
    pub current: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecordResultRes {
    pub id: u64,
    /// Worst field outcome for the record.
    pub outcome: String,
    pub fields: Vec<FieldResultRes>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReconcileRes {
    pub applied: usize,
    pub rejected: usize,
    pub results: Vec<RecordResultRes>,
}

fn field_outcome_name(outcome: &FieldOutcome) -> &'static str {
    match outcome {
        FieldOutcome::Applied => "applied",
        FieldOutcome::Conflict { .. } => "conflict",
        FieldOutcome::InvalidTransition(_) => "invalid_transition",
        FieldOutcome::Invalid(_) => "invalid",
        FieldOutcome::NotFound => "not_found",
        FieldOutcome::Failed(_) => "failed",
    }
}

fn record_outcome_name(outcome: RecordOutcome) -> &'static str {
    match outcome {
        RecordOutcome::Applied => "applied",
        RecordOutcome::Conflict => "conflict",
        RecordOutcome::InvalidTransition => "invalid_transition",
        RecordOutcome::Invalid => "invalid",
        RecordOutcome::Failed => "failed",
    }
}

impl From<&ReconcileReport> for ReconcileRes {
    fn from(report: &ReconcileReport) -> Self {
        let results = report
            .results
            .iter()
            .map(|r| RecordResultRes {
                id: r.id.get(),
                outcome: record_outcome_name(r.outcome()).to_string(),
                fields: r
                    .fields
                    .iter()
                    .map(|f| FieldResultRes {
                        field: f.field.to_string(),
                        outcome: field_outcome_name(&f.outcome).to_string(),
                        message: (!f.outcome.is_applied()).then(|| f.outcome.to_string()),
                        current: match &f.outcome {
                            FieldOutcome::Conflict { current, .. } => Some(current.to_string()),
                            _ => None,
                        },
                    })
                    .collect(),
            })
            .collect();
        Self {
            applied: report.applied_count(),
            rejected: report.rejections().len(),
            results,
        }
    }
}
