mod form;
mod line;
mod outcome;
mod period;
mod request;

pub use form::{
    format_decimal, parse_decimal, round_cents, BillingSummary, CalendarForm, DayCell,
    HiddenField,
};
pub use line::{CalendarLine, ConsumerKey};
pub use outcome::{DayMismatch, InvoiceComparison, SubmissionOutcome};
pub use period::{PeriodError, ServicePeriod};
pub use request::{InvoiceTotals, SubmissionJob, SubmissionRequest};
