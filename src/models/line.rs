use std::fmt;

use serde::{Deserialize, Serialize};

use super::ServicePeriod;

/// External identity of a consumer on an invoice.
///
/// Rows are matched on these identifiers, never on display order. `subcode`
/// and `auth_number` only need to be set when one consumer has more than one
/// line on the same invoice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerKey {
    pub uci: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_number: Option<String>,
}

impl ConsumerKey {
    pub fn new(uci: impl Into<String>) -> Self {
        Self {
            uci: uci.into(),
            subcode: None,
            auth_number: None,
        }
    }

    pub fn with_subcode(mut self, subcode: impl Into<String>) -> Self {
        self.subcode = Some(subcode.into());
        self
    }

    pub fn with_auth_number(mut self, auth_number: impl Into<String>) -> Self {
        self.auth_number = Some(auth_number.into());
        self
    }
}

impl fmt::Display for ConsumerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UCI {}", self.uci)?;
        if let Some(subcode) = &self.subcode {
            write!(f, " subcode {subcode}")?;
        }
        if let Some(auth) = &self.auth_number {
            write!(f, " auth {auth}")?;
        }
        Ok(())
    }
}

/// One consumer's billable line within one invoice, as resolved by the
/// locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarLine {
    pub provider_code: String,
    pub invoice_id: String,
    pub line_id: String,
    pub svc_code: String,
    pub period: ServicePeriod,
    pub consumer: ConsumerKey,
    pub consumer_name: String,
}
