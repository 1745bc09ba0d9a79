use std::collections::BTreeMap;

use rust_decimal::Decimal;

use super::schema::CalendarSchema;
use crate::error::{PortalError, Unavailable};
use crate::models::{
    format_decimal, round_cents, BillingSummary, CalendarForm, SubmissionRequest,
};

/// Merge `request` into `form` and recompute the figures the calendar's
/// script would have filled in before a browser posted it.
///
/// No I/O. Either every requested day is writable and the whole request is
/// applied, or the first unwritable day is returned as
/// [`PortalError::DayUnavailable`] and nothing is applied.
///
/// Derived fields:
/// - total units: sum of every enabled, non-empty day
/// - gross: total units × unit rate, rounded to cents
/// - net: gross (the calendar applies no deductions)
/// - per-row running sums, for rows the form has a sum field for
///
/// Only derived fields already present on the form are written. Every other
/// field is carried through untouched.
pub fn reconcile(
    form: &CalendarForm,
    request: &SubmissionRequest,
    schema: &CalendarSchema,
) -> Result<CalendarForm, PortalError> {
    let mut out = form.clone();

    for (&day, &units) in request.days() {
        let unavailable = |reason| PortalError::DayUnavailable {
            line_id: form.line_id.clone(),
            day,
            reason,
        };
        let cell = out
            .day_mut(day)
            .ok_or_else(|| unavailable(Unavailable::Absent))?;
        if !cell.enabled {
            return Err(unavailable(Unavailable::Disabled));
        }
        cell.raw_value = format_decimal(units);
    }

    let mut total_units = Decimal::ZERO;
    let mut row_totals: BTreeMap<u32, Decimal> = BTreeMap::new();
    for cell in out.days.iter().filter(|c| c.enabled) {
        let Some(value) = cell.value() else {
            continue;
        };
        total_units += value;
        if let Some(row) = cell.week_row {
            *row_totals.entry(row).or_default() += value;
        }
    }

    let unit_rate = form.constants.unit_rate;
    let gross_amount = round_cents(total_units * unit_rate);
    let summary = BillingSummary {
        total_units,
        unit_rate,
        gross_amount,
        net_amount: gross_amount,
    };

    out.set_hidden(&schema.total_units_field, &format_decimal(summary.total_units));
    out.set_hidden(&schema.gross_amount_field, &format_decimal(summary.gross_amount));
    out.set_hidden(&schema.net_amount_field, &format_decimal(summary.net_amount));

    for field in out.hidden.iter_mut() {
        if let Some(row) = schema.week_total_row(&field.name) {
            let sum = row_totals.get(&row).copied().unwrap_or_default();
            field.value = format_decimal(sum);
        }
    }

    out.constants = summary;
    Ok(out)
}
