use std::collections::BTreeMap;

use reqwest::Url;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::ServicePeriod;

/// Round a money amount to cents the way the portal's script does.
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Render a unit quantity or amount as the portal writes it (`3.00`).
pub fn format_decimal(value: Decimal) -> String {
    format!("{:.2}", round_cents(value))
}

/// Parse a numeric form value such as `3.00`, `$1,204.50` or ``.
///
/// Empty values yield `None`; so does anything that is not a number.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Billing figures for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BillingSummary {
    pub total_units: Decimal,
    pub unit_rate: Decimal,
    pub gross_amount: Decimal,
    pub net_amount: Decimal,
}

/// A non-day form control, kept verbatim unless it is a derived field the
/// reconciler recomputes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenField {
    pub name: String,
    pub value: String,
    /// Position of the control in the rendered form.
    pub position: usize,
    /// False for an unticked checkbox or unselected radio button, which keep
    /// their place in the form but are not sent.
    pub included: bool,
}

/// One calendar day's unit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayCell {
    pub day: u8,
    pub field_name: String,
    /// Raw value as rendered; written back unchanged unless the day is
    /// requested.
    pub raw_value: String,
    pub enabled: bool,
    /// Calendar row the cell sits in, when the field name encodes one.
    pub week_row: Option<u32>,
    pub position: usize,
}

impl DayCell {
    pub fn value(&self) -> Option<Decimal> {
        parse_decimal(&self.raw_value)
    }

    /// Nonzero value already present in the cell.
    pub fn entered_value(&self) -> Option<Decimal> {
        self.value().filter(|v| !v.is_zero())
    }
}

/// The extracted (or reconciled) state of one line's unit calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarForm {
    pub line_id: String,
    pub render_url: Url,
    pub persist_url: Url,
    /// Month the portal actually rendered.
    pub period: ServicePeriod,
    pub hidden: Vec<HiddenField>,
    pub days: Vec<DayCell>,
    /// Figures declared in the page's script, or recomputed locally after
    /// reconciliation.
    pub constants: BillingSummary,
}

impl CalendarForm {
    pub fn day(&self, day: u8) -> Option<&DayCell> {
        self.days.iter().find(|c| c.day == day)
    }

    pub fn day_mut(&mut self, day: u8) -> Option<&mut DayCell> {
        self.days.iter_mut().find(|c| c.day == day)
    }

    pub fn hidden_value(&self, name: &str) -> Option<&str> {
        self.hidden
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// Overwrite every occurrence of a hidden field. Returns false if the
    /// form has no such field; nothing is added in that case.
    pub fn set_hidden(&mut self, name: &str, value: &str) -> bool {
        let mut found = false;
        for field in self.hidden.iter_mut().filter(|f| f.name == name) {
            field.value = value.to_string();
            found = true;
        }
        found
    }

    /// Days carrying a nonzero value, enabled or not.
    pub fn entered_days(&self) -> BTreeMap<u8, Decimal> {
        self.days
            .iter()
            .filter_map(|c| c.entered_value().map(|v| (c.day, v)))
            .collect()
    }

    /// All field names in document order, sent or not.
    pub fn field_names(&self) -> Vec<&str> {
        self.controls().map(|(name, _, _)| name).collect()
    }

    /// Name/value pairs to send to the persist endpoint, in document order.
    ///
    /// Disabled day cells are included: the persist request carries every
    /// field the render showed. Unchecked checkboxes and radio buttons are
    /// left out, as a browser would.
    pub fn to_payload(&self) -> Vec<(String, String)> {
        self.controls()
            .filter(|(_, _, included)| *included)
            .map(|(n, v, _)| (n.to_string(), v.to_string()))
            .collect()
    }

    pub fn summary(&self) -> BillingSummary {
        self.constants
    }

    fn controls(&self) -> impl Iterator<Item = (&str, &str, bool)> {
        let mut slots: Vec<(usize, &str, &str, bool)> = self
            .hidden
            .iter()
            .map(|f| (f.position, f.name.as_str(), f.value.as_str(), f.included))
            .chain(
                self.days
                    .iter()
                    .map(|c| (c.position, c.field_name.as_str(), c.raw_value.as_str(), true)),
            )
            .collect();
        slots.sort_by_key(|(position, ..)| *position);
        slots
            .into_iter()
            .map(|(_, name, value, included)| (name, value, included))
    }
}
