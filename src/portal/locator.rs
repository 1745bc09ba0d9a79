//! Finding a consumer's line on an invoice.
//!
//! The portal binds "current provider" and "current invoice" to the session,
//! so the order of requests here matters: select provider, search, open the
//! invoice for edit, then list its lines.

use reqwest::Url;

use super::table::{Row, Table};
use super::Portal;
use crate::error::{Lookup, PortalError};
use crate::models::{CalendarLine, ConsumerKey, ServicePeriod};
use crate::session::SessionLease;

const INVOICE: &[&str] = &["Invoice #", "Invoice No", "Invoice"];
const SVC_CODE: &[&str] = &["SVC Code", "Service Code"];
const SVC_MONTH: &[&str] = &["Service M/Y", "SVC M/Y", "Service Month", "SVC Month"];
const LINE: &[&str] = &["Line #", "Line"];
const CONSUMER: &[&str] = &["Consumer", "Consumer Name"];
const UCI: &[&str] = &["UCI #", "UCI"];
const SUBCODE: &[&str] = &["SVC Subcode", "Subcode"];
const AUTH: &[&str] = &["Auth #", "Auth Number", "Auth"];

impl Portal {
    /// Resolve `consumer`'s line on `invoice_id` under `provider_code`.
    ///
    /// Leaves the session bound to the invoice, which the calendar endpoints
    /// rely on.
    pub async fn locate(
        &self,
        lease: &SessionLease<'_>,
        provider_code: &str,
        invoice_id: &str,
        consumer: &ConsumerKey,
    ) -> Result<CalendarLine, PortalError> {
        let client = lease.client();
        if provider_code.trim().is_empty() {
            return Err(PortalError::InvalidRequest(
                "provider code must not be empty".to_string(),
            ));
        }

        let select_url = client.endpoint(&self.endpoints.select_provider)?;
        let page = client
            .post_form(&select_url, &[("spnId".to_string(), provider_code.to_string())])
            .await?;
        if !contains_code(&page.body, provider_code) {
            return Err(PortalError::not_found(
                Lookup::Provider,
                format!("{provider_code} is not available to this session"),
            ));
        }
        tracing::debug!(provider_code, "Selected provider");

        let search_url = client.endpoint(&self.endpoints.invoice_search)?;
        let page = client
            .get(
                &search_url,
                &[("spnId", provider_code), ("invoiceId", invoice_id)],
            )
            .await?;
        let invoice = find_invoice(&page.body, &page.url, invoice_id)?;

        let view_url = match &invoice.edit_link {
            Some(link) => page.url.join(link).map_err(|e| {
                PortalError::unexpected_page(&page.url, format!("bad edit link {link:?}: {e}"))
            })?,
            None => {
                let mut url = client.endpoint(&self.endpoints.invoice_view)?;
                url.query_pairs_mut().append_pair("invoiceId", invoice_id);
                url
            }
        };
        client.get(&view_url, &[]).await?;
        tracing::debug!(invoice_id, %view_url, "Opened invoice for edit");

        let lines_url = client.endpoint(&self.endpoints.invoice_lines)?;
        let page = client
            .get(&lines_url, &[("invoiceId", invoice_id)])
            .await?;
        let found = find_consumer(&page.body, &page.url, invoice_id, consumer)?;

        let line = CalendarLine {
            provider_code: provider_code.to_string(),
            invoice_id: invoice_id.to_string(),
            line_id: found.line_id,
            svc_code: found.svc_code.unwrap_or(invoice.svc_code),
            period: invoice.period,
            consumer: consumer.clone(),
            consumer_name: found.consumer_name,
        };
        tracing::info!(
            invoice_id,
            line_id = %line.line_id,
            svc_code = %line.svc_code,
            period = %line.period,
            consumer = %consumer,
            "Located line"
        );
        Ok(line)
    }
}

#[derive(Debug)]
struct InvoiceRow {
    svc_code: String,
    period: ServicePeriod,
    edit_link: Option<String>,
}

fn find_invoice(html: &str, url: &Url, invoice_id: &str) -> Result<InvoiceRow, PortalError> {
    let table = Table::find(html, &[INVOICE, SVC_CODE, SVC_MONTH])
        .ok_or_else(|| PortalError::unexpected_page(url, "no invoice list on page"))?;
    let (Some(invoice_col), Some(svc_col), Some(month_col)) = (
        table.column(INVOICE),
        table.column(SVC_CODE),
        table.column(SVC_MONTH),
    ) else {
        return Err(PortalError::unexpected_page(url, "invoice list is missing columns"));
    };

    let row = table
        .rows
        .iter()
        .find(|row| row.cell(invoice_col) == Some(invoice_id))
        .ok_or_else(|| PortalError::not_found(Lookup::Invoice, invoice_id.to_string()))?;

    let raw_month = row.cell(month_col).unwrap_or_default();
    let period: ServicePeriod = raw_month.parse().map_err(|e| {
        PortalError::unexpected_page(
            url,
            format!("invoice {invoice_id} has unreadable service month {raw_month:?}: {e}"),
        )
    })?;

    let edit_link = row
        .all_links()
        .find(|href| href.to_ascii_lowercase().contains("invoiceview"))
        .or_else(|| row.last_links().first().map(String::as_str))
        .map(str::to_string);

    Ok(InvoiceRow {
        svc_code: row.cell(svc_col).unwrap_or_default().to_string(),
        period,
        edit_link,
    })
}

#[derive(Debug)]
struct ConsumerRow {
    line_id: String,
    consumer_name: String,
    svc_code: Option<String>,
}

fn find_consumer(
    html: &str,
    url: &Url,
    invoice_id: &str,
    consumer: &ConsumerKey,
) -> Result<ConsumerRow, PortalError> {
    let table = Table::find(html, &[UCI])
        .ok_or_else(|| PortalError::unexpected_page(url, "no consumer lines on page"))?;
    let uci_col = table
        .column(UCI)
        .ok_or_else(|| PortalError::unexpected_page(url, "consumer list has no UCI column"))?;
    let subcode_col = table.column(SUBCODE);
    let auth_col = table.column(AUTH);
    let line_col = table.column(LINE);
    let consumer_col = table.column(CONSUMER);
    let svc_col = table.column(SVC_CODE);

    let matches_filter = |row: &Row, wanted: &Option<String>, col: Option<usize>| match wanted {
        None => true,
        Some(wanted) => col
            .and_then(|c| row.cell(c))
            .is_some_and(|v| v.eq_ignore_ascii_case(wanted)),
    };

    let matching: Vec<&Row> = table
        .rows
        .iter()
        .filter(|row| row.cell(uci_col) == Some(consumer.uci.as_str()))
        .filter(|row| matches_filter(row, &consumer.subcode, subcode_col))
        .filter(|row| matches_filter(row, &consumer.auth_number, auth_col))
        .collect();

    let row = match matching.as_slice() {
        [] => {
            return Err(PortalError::not_found(
                Lookup::Consumer,
                format!("{consumer} on invoice {invoice_id}"),
            ))
        }
        [row] => *row,
        rows => {
            return Err(PortalError::not_found(
                Lookup::Consumer,
                format!(
                    "{consumer} matches {} lines on invoice {invoice_id}; add a subcode or auth number",
                    rows.len()
                ),
            ))
        }
    };

    let line_id = row
        .all_links()
        .find_map(line_id_from_link)
        .or_else(|| {
            line_col
                .and_then(|c| row.cell(c))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
        .ok_or_else(|| {
            PortalError::unexpected_page(url, format!("no line id for {consumer}"))
        })?;

    Ok(ConsumerRow {
        line_id,
        consumer_name: consumer_col
            .and_then(|c| row.cell(c))
            .unwrap_or_default()
            .to_string(),
        svc_code: svc_col
            .and_then(|c| row.cell(c))
            .filter(|v| !v.is_empty())
            .map(str::to_string),
    })
}

/// Whether `code` appears in `text` on its own, not as part of a longer code.
fn contains_code(text: &str, code: &str) -> bool {
    text.match_indices(code).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + code.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// `lineId` query parameter of a (possibly relative) link.
fn line_id_from_link(href: &str) -> Option<String> {
    let base = Url::parse("http://portal.invalid/").ok()?;
    let url = base.join(href).ok()?;
    url.query_pairs()
        .find(|(k, _)| k.eq_ignore_ascii_case("lineid"))
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://portal.test/invoices/invoicesearch").unwrap()
    }

    const INVOICES: &str = r#"
        <table>
          <tr><th>Invoice Date</th><th>Invoice #</th><th>Service Code</th><th>Service M/Y</th><th></th></tr>
          <tr><td>08/01/2025</td><td>7654321</td><td>055</td><td>07/2025</td><td><a href="invoiceview?invoiceId=7654321">EDIT</a></td></tr>
          <tr><td>09/01/2025</td><td>1234567</td><td>055</td><td>08/2025</td><td><a href="/invoices/invoiceview?invoiceId=1234567&amp;mode=edit">EDIT</a></td></tr>
        </table>"#;

    const LINES: &str = r#"
        <table>
          <tr><th></th><th>Line #</th><th>Consumer</th><th>UCI #</th><th>SVC Code</th><th>SVC Subcode</th><th>Auth #</th></tr>
          <tr><td></td><td>1</td><td>DOE, JANE</td><td>2719815</td><td>055</td><td>A</td><td>11111</td><td><a href="unitcalendar?lineId=88">Calendar</a></td></tr>
          <tr><td></td><td>2</td><td>DOE, JANE</td><td>2719815</td><td>055</td><td>B</td><td>22222</td><td><a href="unitcalendar?lineId=89">Calendar</a></td></tr>
          <tr><td></td><td>3</td><td>ROE, RICHARD</td><td>3000001</td><td>055</td><td></td><td>33333</td><td></td></tr>
        </table>"#;

    #[test]
    fn finds_invoice_row_and_edit_link() {
        let row = find_invoice(INVOICES, &url(), "1234567").unwrap();
        assert_eq!(row.svc_code, "055");
        assert_eq!(row.period, ServicePeriod::new(8, 2025).unwrap());
        assert_eq!(
            row.edit_link.as_deref(),
            Some("/invoices/invoiceview?invoiceId=1234567&mode=edit")
        );
    }

    #[test]
    fn missing_invoice_is_not_found() {
        assert!(matches!(
            find_invoice(INVOICES, &url(), "999"),
            Err(PortalError::NotFound {
                what: Lookup::Invoice,
                ..
            })
        ));
    }

    #[test]
    fn consumer_is_matched_by_identifiers() {
        let key = ConsumerKey::new("2719815").with_subcode("b");
        let row = find_consumer(LINES, &url(), "1234567", &key).unwrap();
        assert_eq!(row.line_id, "89");
        assert_eq!(row.consumer_name, "DOE, JANE");

        let key = ConsumerKey::new("2719815").with_auth_number("11111");
        assert_eq!(find_consumer(LINES, &url(), "1234567", &key).unwrap().line_id, "88");
    }

    #[test]
    fn line_column_is_the_fallback() {
        let key = ConsumerKey::new("3000001");
        assert_eq!(find_consumer(LINES, &url(), "1234567", &key).unwrap().line_id, "3");
    }

    #[test]
    fn ambiguous_or_absent_consumer_is_not_found() {
        let ambiguous = find_consumer(LINES, &url(), "1234567", &ConsumerKey::new("2719815"));
        match ambiguous {
            Err(PortalError::NotFound { what, detail }) => {
                assert_eq!(what, Lookup::Consumer);
                assert!(detail.contains("matches 2 lines"));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }

        assert!(matches!(
            find_consumer(LINES, &url(), "1234567", &ConsumerKey::new("404")),
            Err(PortalError::NotFound { .. })
        ));
    }

    #[test]
    fn provider_code_must_stand_alone() {
        let page = "<td>Current provider: PP0212</td><option value=\"PP0212\">";
        assert!(contains_code(page, "PP0212"));
        assert!(!contains_code(page, "PP02"));
        assert!(!contains_code(page, "P0212"));
        assert!(!contains_code("Current provider: PP02120", "PP0212"));
    }

    #[test]
    fn extracts_line_id_from_links() {
        assert_eq!(line_id_from_link("unitcalendar?lineId=88").as_deref(), Some("88"));
        assert_eq!(line_id_from_link("/x?LINEID=5&a=b").as_deref(), Some("5"));
        assert_eq!(line_id_from_link("/x?lineId="), None);
        assert_eq!(line_id_from_link("/x"), None);
    }
}
