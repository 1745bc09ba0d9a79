use super::Portal;
use crate::error::PortalError;
use crate::models::{CalendarForm, CalendarLine};
use crate::session::SessionLease;

impl Portal {
    /// Persist a reconciled calendar and return what the portal now shows.
    ///
    /// The persist response is a redirect or an acknowledgement page that
    /// does not reflect the saved state, so it is only checked for transport
    /// and auth failures. The calendar is then rendered again.
    pub async fn submit(
        &self,
        lease: &SessionLease<'_>,
        line: &CalendarLine,
        form: &CalendarForm,
    ) -> Result<CalendarForm, PortalError> {
        let payload = form.to_payload();
        tracing::info!(
            line_id = %line.line_id,
            url = %form.persist_url,
            fields = payload.len(),
            total_units = %form.constants.total_units,
            "Persisting calendar"
        );
        let ack = lease.client().post_form(&form.persist_url, &payload).await?;
        tracing::debug!(line_id = %line.line_id, url = %ack.url, "Persist acknowledged");

        self.fetch_calendar(lease, line).await
    }
}
