//! Rendering and parsing the unit calendar of one line.
//!
//! The render endpoint answers a malformed or stale request with a default
//! calendar and a 200, so the only way to know the right calendar came back
//! is to read the month and line it shows.

use std::collections::HashSet;

use reqwest::Url;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};

use super::schema::CalendarSchema;
use super::script::ScriptNumber;
use super::table::cell_text;
use super::Portal;
use crate::error::{PortalError, RenderedContext};
use crate::models::{BillingSummary, CalendarForm, CalendarLine, DayCell, HiddenField, ServicePeriod};
use crate::session::SessionLease;

impl Portal {
    /// Render and parse the calendar for `line`.
    ///
    /// A calendar for the wrong month or line is re-requested once with every
    /// state parameter spelled out; a second wrong calendar is
    /// [`PortalError::WrongContext`].
    pub async fn fetch_calendar(
        &self,
        lease: &SessionLease<'_>,
        line: &CalendarLine,
    ) -> Result<CalendarForm, PortalError> {
        let client = lease.client();
        let render_url = client.endpoint(&self.endpoints.calendar_render)?;
        let persist_url = client.endpoint(&self.endpoints.calendar_persist)?;

        let params = vec![("lineId".to_string(), line.line_id.clone())];
        match self
            .render_once(lease, line, &render_url, &persist_url, &params)
            .await
        {
            Err(PortalError::WrongContext { rendered, .. }) => {
                tracing::warn!(
                    line_id = %line.line_id,
                    expected = %line.period,
                    %rendered,
                    "Calendar rendered for the wrong context; retrying with explicit state"
                );
                let explicit = vec![
                    ("invoiceId".to_string(), line.invoice_id.clone()),
                    ("lineId".to_string(), line.line_id.clone()),
                    ("svcMonth".to_string(), format!("{:02}", line.period.month())),
                    ("svcYear".to_string(), line.period.year().to_string()),
                ];
                self.render_once(lease, line, &render_url, &persist_url, &explicit)
                    .await
            }
            other => other,
        }
    }

    async fn render_once(
        &self,
        lease: &SessionLease<'_>,
        line: &CalendarLine,
        render_url: &Url,
        persist_url: &Url,
        params: &[(String, String)],
    ) -> Result<CalendarForm, PortalError> {
        let page = lease.client().post_form(render_url, params).await?;
        let form = parse_calendar(
            &page.body,
            &self.schema,
            line,
            render_url.clone(),
            persist_url.clone(),
        )
        .map_err(|e| match e {
            PortalError::UnexpectedPage { detail, .. } => {
                PortalError::unexpected_page(&page.url, detail)
            }
            other => other,
        })?;

        tracing::debug!(
            line_id = %line.line_id,
            days = form.days.len(),
            hidden = form.hidden.len(),
            entered = form.entered_days().len(),
            "Parsed calendar"
        );
        Ok(form)
    }
}

/// Parse a rendered calendar page for `line` into a [`CalendarForm`].
///
/// The month and line the page shows are checked before anything else, so a
/// stale or default calendar is [`PortalError::WrongContext`] even when it
/// lacks the billing constants. Every named control of the calendar form is
/// kept. Inputs whose name follows the day convention and whose table cell is
/// labelled with a day number become [`DayCell`]s; everything else is a
/// [`HiddenField`].
pub fn parse_calendar(
    html: &str,
    schema: &CalendarSchema,
    line: &CalendarLine,
    render_url: Url,
    persist_url: Url,
) -> Result<CalendarForm, PortalError> {
    let line_id = line.line_id.as_str();
    let document = Html::parse_document(html);
    let form_sel = selector("form");
    let control_sel = selector("input[name], select[name], textarea[name]");
    let script_sel = selector("script");

    let form = document
        .select(&form_sel)
        .find(|form| {
            form.select(&control_sel).any(|c| {
                c.value().name() == "input"
                    && c.value()
                        .attr("name")
                        .is_some_and(|n| schema.day_field(n).is_some())
            })
        })
        .ok_or_else(|| PortalError::unexpected_page(&render_url, "no calendar form on page"))?;

    let script: String = document
        .select(&script_sel)
        .flat_map(|s| s.text())
        .collect::<Vec<_>>()
        .join("\n");

    let constant = |number: &ScriptNumber| -> Result<Decimal, PortalError> {
        number.find(&script).ok_or_else(|| PortalError::MissingConstant {
            line_id: line_id.to_string(),
            name: number.name().to_string(),
        })
    };

    let month = constant(&schema.month)?;
    let year = constant(&schema.year)?;
    let period = month
        .to_u32()
        .zip(year.to_i32())
        .and_then(|(m, y)| ServicePeriod::new(m, y))
        .ok_or_else(|| {
            PortalError::unexpected_page(
                &render_url,
                format!("calendar declares invalid month {month}/{year}"),
            )
        })?;
    if period != line.period {
        return Err(PortalError::WrongContext {
            line_id: line_id.to_string(),
            rendered: RenderedContext::Period {
                expected: line.period,
                observed: period,
            },
        });
    }

    let rendered_line = form
        .select(&control_sel)
        .find(|c| c.value().attr("name") == Some(schema.line_id_field.as_str()))
        .map(|c| control_value(&c));
    if let Some(observed) = rendered_line.filter(|v| v.trim() != line_id) {
        return Err(PortalError::WrongContext {
            line_id: line_id.to_string(),
            rendered: RenderedContext::Line { observed },
        });
    }

    let constants = BillingSummary {
        total_units: constant(&schema.total_units)?,
        unit_rate: constant(&schema.unit_rate)?,
        gross_amount: constant(&schema.gross_amount)?,
        net_amount: constant(&schema.net_amount)?,
    };

    let mut hidden = Vec::new();
    let mut days: Vec<DayCell> = Vec::new();
    let mut seen_days = HashSet::new();

    for (position, control) in form.select(&control_sel).enumerate() {
        let element = control.value();
        let Some(name) = element.attr("name") else {
            continue;
        };

        if element.name() == "input" {
            if let Some(cell) = day_cell(&control, name, position, schema)
                .filter(|c| period.contains_day(c.day))
            {
                if seen_days.insert(cell.day) {
                    days.push(cell);
                    continue;
                }
                tracing::warn!(
                    line_id,
                    field = name,
                    day = cell.day,
                    "Second input claims an already-seen day; keeping it as a plain field"
                );
            }
        }

        if !schema.is_known_field(name) {
            tracing::warn!(line_id, field = name, "Newly observed calendar field");
        }
        hidden.push(HiddenField {
            name: name.to_string(),
            value: control_value(&control),
            position,
            included: is_submitted(&control),
        });
    }

    Ok(CalendarForm {
        line_id: line_id.to_string(),
        render_url,
        persist_url,
        period,
        hidden,
        days,
        constants,
    })
}

fn selector(css: &str) -> Selector {
    // Only called with literal selectors that are known to parse.
    Selector::parse(css).expect("valid selector")
}

fn day_cell(
    input: &ElementRef,
    name: &str,
    position: usize,
    schema: &CalendarSchema,
) -> Option<DayCell> {
    let week_row = schema.day_field(name)?;
    let td = input
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "td")?;

    let day: u8 = cell_text(&td).split_whitespace().next()?.parse().ok()?;
    if !(1..=31).contains(&day) {
        return None;
    }

    let element = input.value();
    let cell_disabled = element.attr("disabled").is_some()
        || element.attr("readonly").is_some()
        || td.value().classes().any(|c| c.eq_ignore_ascii_case("disabled"));

    Some(DayCell {
        day,
        field_name: name.to_string(),
        raw_value: element.attr("value").unwrap_or_default().to_string(),
        enabled: !cell_disabled,
        week_row,
        position,
    })
}

/// Whether a browser would send `control`: checkboxes and radio buttons only
/// when checked.
fn is_submitted(control: &ElementRef) -> bool {
    let element = control.value();
    !is_checkable(element) || element.attr("checked").is_some()
}

fn is_checkable(element: &scraper::node::Element) -> bool {
    element.name() == "input"
        && element
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("checkbox") || t.eq_ignore_ascii_case("radio"))
}

fn control_value(control: &ElementRef) -> String {
    let element = control.value();
    match element.name() {
        "select" => {
            let option_sel = selector("option");
            let options: Vec<ElementRef> = control.select(&option_sel).collect();
            options
                .iter()
                .find(|o| o.value().attr("selected").is_some())
                .or(options.first())
                .map(|o| {
                    o.value()
                        .attr("value")
                        .map(str::to_string)
                        .unwrap_or_else(|| cell_text(o))
                })
                .unwrap_or_default()
        }
        "textarea" => control.text().collect(),
        _ => match element.attr("value") {
            Some(value) => value.to_string(),
            None if is_checkable(element) => "on".to_string(),
            None => String::new(),
        },
    }
}
