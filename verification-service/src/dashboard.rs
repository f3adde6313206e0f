//! State container behind the verification dashboard.
//!
//! Holds everything the view needs between user actions: the selected meter,
//! its loaded parameters, search/filter/page, and in-flight flags. Fetches
//! are issued as [`FetchTicket`]s; a response is applied only while its
//! ticket is still the current one, so switching meters mid-fetch can never
//! show the previous meter's parameters.

use std::collections::HashSet;

use meter_client::domain::{MeterDetail, ParameterStatus};
use time::OffsetDateTime;

use crate::{
    reconcile::{self, ParameterPage, ParameterQuery},
    telemetry::TelemetryState,
};

/// Identifies one parameter fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub unique_key: String,
    pub status_filter: Option<ParameterStatus>,
    generation: u64,
}

/// Status change applied locally and waiting for the store to confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingStatusChange {
    pub unique_key: String,
    pub param_name: String,
    pub new_status: ParameterStatus,
}

#[derive(Debug, Clone, Default)]
pub struct Dashboard {
    selected: Option<String>,
    generation: u64,
    loading: bool,
    detail: Option<MeterDetail>,
    query: ParameterQuery,
    page: usize,
    updating: HashSet<String>,
    comment_draft: Option<String>,
    /// Local stamp from the latest optimistic change, shown until the next
    /// full fetch.
    local_last_updated: Option<OffsetDateTime>,
}

/// Everything the dashboard renders for the selected meter.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub meter_name: String,
    pub location: String,
    pub unique_key: String,
    pub comment: String,
    pub loading: bool,
    pub page: ParameterPage,
    pub last_updated: String,
    pub last_fetched: String,
    /// "Showing X of Y parameters", only while a search or filter is active.
    pub showing: Option<String>,
    pub empty_message: Option<&'static str>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self {
            page: 1,
            ..Self::default()
        }
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn detail(&self) -> Option<&MeterDetail> {
        self.detail.as_ref()
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn query(&self) -> &ParameterQuery {
        &self.query
    }

    pub fn is_updating(&self, param_name: &str) -> bool {
        self.updating.contains(param_name)
    }

    fn issue_ticket(&mut self) -> Option<FetchTicket> {
        let unique_key = self.selected.clone()?;
        self.generation += 1;
        self.loading = true;
        Some(FetchTicket {
            unique_key,
            status_filter: self.query.status,
            generation: self.generation,
        })
    }

    /// Switch meters. The previous meter's parameters are dropped right away.
    pub fn select_meter(&mut self, unique_key: impl Into<String>) -> FetchTicket {
        let unique_key = unique_key.into();
        self.selected = Some(unique_key.clone());
        self.detail = None;
        self.page = 1;
        self.updating.clear();
        self.comment_draft = None;
        self.local_last_updated = None;
        self.generation += 1;
        self.loading = true;
        FetchTicket {
            unique_key,
            status_filter: self.query.status,
            generation: self.generation,
        }
    }

    /// Re-fetch the selected meter, if any.
    pub fn refresh(&mut self) -> Option<FetchTicket> {
        self.issue_ticket()
    }

    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation && self.selected.as_deref() == Some(ticket.unique_key.as_str())
    }

    /// Apply a completed fetch. Returns `false` when the response is stale
    /// and was ignored. A failed fetch keeps whatever was loaded before.
    pub fn apply_fetch<E: std::fmt::Display>(&mut self, ticket: &FetchTicket, result: Result<MeterDetail, E>) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(unique_key = %ticket.unique_key, "ignoring stale parameter fetch");
            return false;
        }
        self.loading = false;

        match result {
            Ok(detail) => {
                self.detail = Some(detail);
                self.local_last_updated = None;
                true
            }
            Err(e) => {
                tracing::warn!(unique_key = %ticket.unique_key, error = %e, "parameter fetch failed");
                false
            }
        }
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.query.search = search.into();
        self.page = 1;
    }

    /// Changing the status filter resets paging and re-fetches.
    pub fn set_status_filter(&mut self, status: Option<ParameterStatus>) -> Option<FetchTicket> {
        self.query.status = status;
        self.page = 1;
        self.issue_ticket()
    }

    pub fn page_count(&self) -> usize {
        let params = self.detail.as_ref().map(|d| d.parameters.as_slice()).unwrap_or_default();
        reconcile::page_count(reconcile::filter_parameters(params, &self.query).len())
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = reconcile::clamp_page(page, self.page_count());
    }

    /// Optimistically apply a status change. Returns `None` if the parameter
    /// is unknown, already updating, or already has that status.
    pub fn begin_status_change(
        &mut self,
        param_name: &str,
        new_status: ParameterStatus,
        now: OffsetDateTime,
    ) -> Option<PendingStatusChange> {
        if self.updating.contains(param_name) {
            return None;
        }
        let unique_key = self.selected.clone()?;
        let param = self
            .detail
            .as_mut()?
            .parameters
            .iter_mut()
            .find(|p| p.param_name == param_name)?;
        if param.status == new_status {
            return None;
        }

        param.status = new_status;
        param.updated_at = Some(now);
        self.local_last_updated = Some(now);
        self.updating.insert(param_name.to_string());

        Some(PendingStatusChange {
            unique_key,
            param_name: param_name.to_string(),
            new_status,
        })
    }

    /// Confirmation from the update handler. Failures are logged; the local
    /// change is kept and the store wins on the next full fetch.
    pub fn finish_status_change<E: std::fmt::Display>(&mut self, pending: &PendingStatusChange, result: Result<(), E>) {
        self.updating.remove(&pending.param_name);
        if let Err(e) = result {
            tracing::warn!(
                unique_key = %pending.unique_key,
                param_name = %pending.param_name,
                error = %e,
                "status update failed"
            );
        }
    }

    pub fn begin_comment_edit(&mut self) {
        let current = self.detail.as_ref().map(|d| d.comment.clone()).unwrap_or_default();
        self.comment_draft = Some(current);
    }

    pub fn edit_comment(&mut self, text: impl Into<String>) {
        self.comment_draft = Some(text.into());
    }

    pub fn is_editing_comment(&self) -> bool {
        self.comment_draft.is_some()
    }

    /// Comment to send to the update handler, if an edit is in progress.
    pub fn comment_draft(&self) -> Option<&str> {
        self.comment_draft.as_deref()
    }

    /// The handler accepted the comment: show it and leave edit mode.
    pub fn comment_saved(&mut self) {
        if let Some(draft) = self.comment_draft.take() {
            if let Some(detail) = self.detail.as_mut() {
                detail.comment = draft.trim().to_string();
            }
        }
    }

    pub fn view(&self, telemetry: &TelemetryState) -> Option<DashboardView> {
        let unique_key = self.selected.as_deref()?;
        let (meter_name, location, comment, params) = match &self.detail {
            Some(d) => (d.meter_name.clone(), d.location.clone(), d.comment.clone(), d.parameters.as_slice()),
            None => (String::new(), String::new(), String::new(), &[][..]),
        };

        let page = reconcile::build_page(unique_key, params, &self.query, self.page, telemetry.snapshot());
        let last_updated = reconcile::display_timestamp(self.local_last_updated.max(page.last_updated));
        let filtering = !self.query.search.is_empty() || self.query.status.is_some();
        let showing = filtering.then(|| format!("Showing {} of {} parameters", page.filtered, page.total));
        let empty_message = (!self.loading && page.filtered == 0).then_some("No parameters found.");

        Some(DashboardView {
            meter_name,
            location,
            unique_key: unique_key.to_string(),
            comment,
            loading: self.loading,
            last_updated,
            last_fetched: reconcile::display_timestamp(telemetry.last_fetched_at),
            showing,
            empty_message,
            page,
        })
    }
}
