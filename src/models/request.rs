use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ConsumerKey;
use crate::error::PortalError;

/// Units the caller wants entered, keyed by day of month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRequest")]
pub struct SubmissionRequest {
    days: BTreeMap<u8, Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    invoice_totals: Option<InvoiceTotals>,
}

/// The caller's own totals for the line (e.g. from its billing export), used
/// only for comparison with what the portal confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub units: Decimal,
    pub amount: Decimal,
}

#[derive(Deserialize)]
struct RawRequest {
    days: BTreeMap<u8, Decimal>,
    #[serde(default)]
    invoice_totals: Option<InvoiceTotals>,
}

impl TryFrom<RawRequest> for SubmissionRequest {
    type Error = PortalError;

    fn try_from(raw: RawRequest) -> Result<Self, Self::Error> {
        let mut request = Self::new(raw.days)?;
        request.invoice_totals = raw.invoice_totals;
        Ok(request)
    }
}

impl SubmissionRequest {
    pub fn new(days: BTreeMap<u8, Decimal>) -> Result<Self, PortalError> {
        if days.is_empty() {
            return Err(PortalError::InvalidRequest(
                "at least one day must be requested".to_string(),
            ));
        }
        for (&day, &units) in &days {
            if !(1..=31).contains(&day) {
                return Err(PortalError::InvalidRequest(format!(
                    "day {day} is not a day of month"
                )));
            }
            if units <= Decimal::ZERO {
                return Err(PortalError::InvalidRequest(format!(
                    "day {day}: units must be positive, got {units}"
                )));
            }
            if units.normalize().scale() > 2 {
                return Err(PortalError::InvalidRequest(format!(
                    "day {day}: the portal records units to two decimal places, got {units}"
                )));
            }
        }
        Ok(Self {
            days,
            invoice_totals: None,
        })
    }

    /// The same quantity on every listed day.
    pub fn uniform(days: impl IntoIterator<Item = u8>, units: Decimal) -> Result<Self, PortalError> {
        Self::new(days.into_iter().map(|d| (d, units)).collect())
    }

    pub fn with_invoice_totals(mut self, totals: InvoiceTotals) -> Self {
        self.invoice_totals = Some(totals);
        self
    }

    pub fn days(&self) -> &BTreeMap<u8, Decimal> {
        &self.days
    }

    pub fn invoice_totals(&self) -> Option<InvoiceTotals> {
        self.invoice_totals
    }
}

/// Everything needed to run one submission sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionJob {
    pub provider_code: String,
    pub invoice_id: String,
    pub consumer: ConsumerKey,
    pub request: SubmissionRequest,
}
