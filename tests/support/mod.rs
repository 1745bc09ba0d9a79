#![allow(dead_code)]

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use ebilling::config::ResolvedConfig;
use ebilling::engine::SubmissionService;
use ebilling::models::{ConsumerKey, SubmissionJob, SubmissionRequest};
use ebilling::session::{PortalSession, SessionData};
use rust_decimal::{Decimal, RoundingStrategy};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PROVIDER: &str = "PP0212";
pub const INVOICE: &str = "1234567";
pub const UCI: &str = "2719815";
pub const LINE_ID: &str = "88";

pub const SELECT_PROVIDER_PATH: &str = "/portal/selectprovider";
pub const INVOICE_SEARCH_PATH: &str = "/invoices/invoicesearch";
pub const INVOICE_VIEW_PATH: &str = "/invoices/invoiceview";
pub const INVOICE_LINES_PATH: &str = "/invoices/invoicelines";
pub const RENDER_PATH: &str = "/invoices/unitcalendar";
pub const PERSIST_PATH: &str = "/invoices/unitcalendar/update";

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).expect("decimal literal")
}

/// A unit calendar as the portal renders it.
#[derive(Debug, Clone)]
pub struct Calendar {
    pub month: u32,
    pub year: i32,
    pub days_in_month: u8,
    pub unit_rate: Option<Decimal>,
    pub entered: Vec<(u8, Decimal)>,
    pub disabled: Vec<u8>,
    pub line_id: String,
}

impl Calendar {
    pub fn new(month: u32, year: i32, days_in_month: u8) -> Self {
        Self {
            month,
            year,
            days_in_month,
            unit_rate: Some(dec("143.13")),
            entered: Vec::new(),
            disabled: Vec::new(),
            line_id: LINE_ID.to_string(),
        }
    }

    pub fn august_2025() -> Self {
        Self::new(8, 2025, 31)
    }

    pub fn with_entry(mut self, day: u8, units: &str) -> Self {
        self.entered.retain(|(d, _)| *d != day);
        self.entered.push((day, dec(units)));
        self
    }

    pub fn with_disabled(mut self, day: u8) -> Self {
        self.disabled.push(day);
        self
    }

    /// Render the calendar as belonging to another line.
    pub fn for_line(mut self, line_id: &str) -> Self {
        self.line_id = line_id.to_string();
        self
    }

    pub fn without_rate(mut self) -> Self {
        self.unit_rate = None;
        self
    }

    /// Field name the portal gives `day`, as row and column of a month
    /// starting on the first column.
    pub fn field_name(day: u8) -> String {
        format!("dayUnits_r{}c{}", (day - 1) / 7 + 1, (day - 1) % 7 + 1)
    }

    fn value(&self, day: u8) -> Option<Decimal> {
        self.entered.iter().find(|(d, _)| *d == day).map(|(_, v)| *v)
    }

    pub fn html(&self) -> String {
        let rate = self.unit_rate.unwrap_or_default();
        let counted = |day: &u8| !self.disabled.contains(day);
        let total: Decimal = self
            .entered
            .iter()
            .filter(|(d, _)| counted(d))
            .map(|(_, v)| *v)
            .sum();
        let gross = (total * rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

        let mut rows = String::new();
        for row in 1..=5u8 {
            rows.push_str("<tr>");
            let mut week_total = Decimal::ZERO;
            for col in 1..=7u8 {
                let day = (row - 1) * 7 + col;
                if day > self.days_in_month {
                    rows.push_str("<td class=\"blank\">&nbsp;</td>");
                    continue;
                }
                let value = self.value(day);
                if counted(&day) {
                    week_total += value.unwrap_or_default();
                }
                let (class, attr) = if self.disabled.contains(&day) {
                    (" class=\"disabled\"", " disabled")
                } else {
                    ("", "")
                };
                rows.push_str(&format!(
                    "<td{class}><span class=\"dom\">{day}</span><input type=\"text\" size=\"4\" name=\"{}\" value=\"{}\"{attr}></td>",
                    Self::field_name(day),
                    value.map(|v| format!("{v:.2}")).unwrap_or_default(),
                ));
            }
            rows.push_str(&format!(
                "<td>Wk<input type=\"hidden\" name=\"weekUnits_r{row}\" value=\"{week_total:.2}\"></td></tr>\n"
            ));
        }

        let rate_decl = match self.unit_rate {
            Some(rate) => format!("var unitRate = {rate};"),
            None => String::new(),
        };

        format!(
            r#"<!DOCTYPE html>
<html><head><title>Unit Calendar</title>
<script type="text/javascript">
  {rate_decl}
  var totalUnits = {total:.2};
  var grossAmount = {gross:.2};
  var netAmount = {gross:.2};
  var calendarMonth = {month};
  var calendarYear = {year};
  function recalc() {{ totalUnits = 0; }}
</script></head>
<body>
<form name="searchForm" action="/invoices/invoicesearch"><input name="q" value=""></form>
<form name="unitCalendarForm" method="post" action="/invoices/unitcalendar/preview">
  <input type="hidden" name="__RequestToken" value="tok-123">
  <input type="hidden" name="invoiceId" value="{INVOICE}">
  <input type="hidden" name="lineId" value="{line_id}">
  <table class="calendar">
    <tr><th>Sun</th><th>Mon</th><th>Tue</th><th>Wed</th><th>Thu</th><th>Fri</th><th>Sat</th><th></th></tr>
    {rows}
  </table>
  <input type="hidden" name="totalUnits" value="{total:.2}">
  <input type="hidden" name="grossAmount" value="{gross:.2}">
  <input type="hidden" name="netAmount" value="{gross:.2}">
  <label><input type="checkbox" name="finalize" value="Y"> Finalize</label>
  <input type="radio" name="entryMode" value="units" checked>
  <input type="radio" name="entryMode" value="hours">
  <input type="submit" name="action" value="Update">
</form>
</body></html>"#,
            month = self.month,
            year = self.year,
            line_id = self.line_id,
        )
    }
}

pub fn invoice_list_html(invoice_id: &str, service_month: &str) -> String {
    format!(
        r#"<html><body>
<table class="results">
  <tr><th>Invoice Date</th><th>Invoice #</th><th>Service Code</th><th>Service M/Y</th><th>Status</th><th></th></tr>
  <tr><td>09/01/2025</td><td>{invoice_id}</td><td>055</td><td>{service_month}</td><td>Open</td>
      <td><a href="{INVOICE_VIEW_PATH}?invoiceId={invoice_id}&amp;mode=edit">EDIT</a></td></tr>
</table>
</body></html>"#
    )
}

pub fn consumer_lines_html(uci: &str, line_id: &str) -> String {
    format!(
        r#"<html><body>
<table id="lines">
  <tr><th></th><th>Line #</th><th>Consumer</th><th>UCI #</th><th>SVC Code</th><th>SVC Subcode</th><th>Auth #</th><th>Unit Type</th><th></th></tr>
  <tr><td><input type="checkbox"></td><td>1</td><td>DOE, JANE</td><td>{uci}</td><td>055</td><td></td><td>44521</td><td>Day</td>
      <td><a href="{RENDER_PATH}?lineId={line_id}">Calendar</a></td></tr>
  <tr><td><input type="checkbox"></td><td>2</td><td>ROE, RICHARD</td><td>3000001</td><td>055</td><td></td><td>44522</td><td>Day</td>
      <td><a href="{RENDER_PATH}?lineId=99">Calendar</a></td></tr>
</table>
</body></html>"#
    )
}

fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into(), "text/html; charset=utf-8")
}

/// Provider selection, invoice search, invoice view and consumer lines for
/// one invoice with service month `service_month` (`MM/YYYY`).
pub async fn mount_locator(server: &MockServer, service_month: &str) {
    Mock::given(method("POST"))
        .and(path(SELECT_PROVIDER_PATH))
        .respond_with(html(format!(
            "<html><body>Current provider: {PROVIDER}</body></html>"
        )))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(INVOICE_SEARCH_PATH))
        .respond_with(html(invoice_list_html(INVOICE, service_month)))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(INVOICE_VIEW_PATH))
        .respond_with(html("<html><body>Invoice opened</body></html>"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(INVOICE_LINES_PATH))
        .respond_with(html(consumer_lines_html(UCI, LINE_ID)))
        .mount(server)
        .await;
}

/// Serve `calendar` from the render endpoint for the next `times` requests,
/// or for every request when `times` is `None`.
pub async fn mount_render(server: &MockServer, calendar: &Calendar, times: Option<u64>) {
    let mock = Mock::given(method("POST"))
        .and(path(RENDER_PATH))
        .respond_with(html(calendar.html()));
    let mock = match times {
        Some(n) => mock.up_to_n_times(n),
        None => mock,
    };
    mock.mount(server).await;
}

pub fn config_for(server: &MockServer, session_dir: &Path) -> Result<ResolvedConfig> {
    let mut config = ResolvedConfig::for_base_url(&server.uri(), session_dir)?;
    config.http.timeout = Duration::from_secs(5);
    config.retry.initial_backoff = Duration::from_millis(10);
    Ok(config)
}

pub fn session_for(config: &ResolvedConfig, name: &str) -> Result<PortalSession> {
    let data = SessionData::new().with_cookie("JSESSIONID", "abc123");
    PortalSession::new(name, config, &data)
}

pub fn service_for(config: &ResolvedConfig) -> Result<SubmissionService> {
    SubmissionService::from_config(config)
}

pub fn job(days: &[(u8, &str)]) -> SubmissionJob {
    job_for(UCI, days)
}

pub fn job_for(uci: &str, days: &[(u8, &str)]) -> SubmissionJob {
    let request = SubmissionRequest::new(days.iter().map(|(d, u)| (*d, dec(u))).collect())
        .expect("valid request");
    SubmissionJob {
        provider_code: PROVIDER.to_string(),
        invoice_id: INVOICE.to_string(),
        consumer: ConsumerKey::new(uci),
        request,
    }
}
