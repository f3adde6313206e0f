//! Status and comment updates for a single meter record.

use meter_client::domain::{MeterRecord, ParameterStatus};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{error::AppError, store::MeterStore};

/// Body of `PATCH /meters/{unique_key}/status`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateRequest {
    pub param_name: Option<String>,
    pub new_status: Option<ParameterStatus>,
    pub comment: Option<String>,
}

impl UpdateRequest {
    pub fn status(param_name: impl Into<String>, new_status: ParameterStatus) -> Self {
        Self {
            param_name: Some(param_name.into()),
            new_status: Some(new_status),
            comment: None,
        }
    }

    pub fn comment(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..Self::default()
        }
    }

    /// Required-field checks. Returns the status change, if any.
    pub fn validate(&self) -> Result<Option<(&str, ParameterStatus)>, AppError> {
        let param_name = self.param_name.as_deref().filter(|p| !p.is_empty());
        match (param_name, self.new_status) {
            (None, None) if self.comment.is_none() => {
                Err(AppError::validation("paramName or comment must be provided"))
            }
            (None, None) => Ok(None),
            (Some(p), Some(s)) => Ok(Some((p, s))),
            (Some(_), None) => Err(AppError::validation("newStatus is required when paramName is provided")),
            (None, Some(_)) => Err(AppError::validation("paramName is required when newStatus is provided")),
        }
    }
}

/// Fields that actually changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<ParameterStatus>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated(UpdatedFields),
    NothingToUpdate,
}

/// Apply `req` to `record` in memory.
///
/// An unchanged status or comment is left untouched, including its
/// timestamp. Unknown parameters are rejected before anything is mutated.
pub fn apply_update(record: &mut MeterRecord, req: &UpdateRequest, now: OffsetDateTime) -> Result<UpdateOutcome, AppError> {
    let status_change = req.validate()?;

    if let Some((param_name, _)) = status_change {
        if record.parameter(param_name).is_none() {
            return Err(AppError::not_found(format!("Parameter {param_name} not found")));
        }
    }

    let mut updated = UpdatedFields::default();
    let mut changed = false;

    if let Some((param_name, new_status)) = status_change {
        if let Some(param) = record.parameter_mut(param_name) {
            if param.status != new_status {
                param.status = new_status;
                param.updated_at = Some(now);
                updated.param_name = Some(param.param_name.clone());
                updated.new_status = Some(new_status);
                updated.updated_at = Some(now);
                changed = true;
            }
        }
    }

    if let Some(comment) = &req.comment {
        let trimmed = comment.trim();
        if record.comment != trimmed {
            record.comment = trimmed.to_string();
            updated.comment = Some(record.comment.clone());
            changed = true;
        }
    }

    if !changed {
        return Ok(UpdateOutcome::NothingToUpdate);
    }

    record.updated_at = now;
    Ok(UpdateOutcome::Updated(updated))
}

/// Load, apply and persist an update. No-ops do not touch the store.
pub async fn update_meter(store: &dyn MeterStore, unique_key: &str, req: &UpdateRequest) -> Result<UpdateOutcome, AppError> {
    let unique_key = unique_key.trim();
    if unique_key.is_empty() {
        return Err(AppError::validation("Unique key not provided"));
    }
    req.validate()?;

    let mut record = store
        .record(unique_key)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Meter {unique_key} not found")))?;

    let outcome = apply_update(&mut record, req, OffsetDateTime::now_utc())?;
    match &outcome {
        UpdateOutcome::Updated(fields) => {
            if !store.save_record(&record).await? {
                return Err(AppError::not_found(format!("Meter {unique_key} not found")));
            }
            metrics::counter!("meter_status_updates_total").increment(1);
            tracing::info!(
                unique_key,
                param_name = fields.param_name.as_deref(),
                new_status = fields.new_status.map(|s| s.as_str()),
                comment_changed = fields.comment.is_some(),
                "meter record updated"
            );
        }
        UpdateOutcome::NothingToUpdate => {
            metrics::counter!("meter_updates_noop_total").increment(1);
            tracing::debug!(unique_key, "update left record unchanged");
        }
    }

    Ok(outcome)
}
