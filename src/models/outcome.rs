use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{round_cents, BillingSummary, CalendarLine, InvoiceTotals};

/// A requested day whose confirmed value is not what was asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayMismatch {
    pub day: u8,
    pub expected: Decimal,
    pub observed: Option<Decimal>,
}

impl fmt::Display for DayMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.observed {
            Some(observed) => write!(
                f,
                "day {}: expected {}, portal shows {}",
                self.day, self.expected, observed
            ),
            None => write!(
                f,
                "day {}: expected {}, portal shows nothing",
                self.day, self.expected
            ),
        }
    }
}

/// Caller's totals next to the portal's confirmed figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceComparison {
    pub invoice_units: Decimal,
    pub invoice_amount: Decimal,
    pub portal_units: Decimal,
    pub portal_amount: Decimal,
}

impl InvoiceComparison {
    pub fn new(invoice: InvoiceTotals, portal: &BillingSummary) -> Self {
        Self {
            invoice_units: invoice.units,
            invoice_amount: invoice.amount,
            portal_units: portal.total_units,
            portal_amount: portal.net_amount,
        }
    }

    /// True when units match exactly and amounts agree to the cent.
    pub fn agrees(&self) -> bool {
        self.invoice_units == self.portal_units
            && round_cents(self.invoice_amount) == round_cents(self.portal_amount)
    }
}

/// Result of one submission attempt. Built once by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub line: CalendarLine,
    pub success: bool,
    /// Requested days that carry the requested value only after this call.
    pub newly_entered: BTreeSet<u8>,
    /// Requested days that already carried the requested value.
    pub already_entered: BTreeMap<u8, Decimal>,
    /// Requested days whose different prior value was replaced, with the
    /// prior value.
    pub replaced: BTreeMap<u8, Decimal>,
    pub mismatches: Vec<DayMismatch>,
    /// Confirmed figures re-read from the portal after submission.
    pub summary: BillingSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_comparison: Option<InvoiceComparison>,
}

impl SubmissionOutcome {
    pub fn days_entered(&self) -> usize {
        self.newly_entered.len()
    }

    /// Some requested days were new and others were already present.
    pub fn is_partial(&self) -> bool {
        !self.newly_entered.is_empty() && !self.already_entered.is_empty()
    }
}
