use std::collections::{BTreeMap, BTreeSet};

use crate::models::{
    CalendarForm, CalendarLine, DayMismatch, InvoiceComparison, SubmissionOutcome,
    SubmissionRequest,
};

/// Compare the calendar before and after a submission against what was
/// requested.
///
/// Only requested days are looked at. A day already carrying the requested
/// value before the call is "already entered"; a day carrying it only
/// afterwards is "newly entered"; anything else is a mismatch. The summary is
/// the portal's, taken from `post`.
pub fn classify(
    line: &CalendarLine,
    pre: &CalendarForm,
    post: &CalendarForm,
    request: &SubmissionRequest,
) -> SubmissionOutcome {
    let mut newly_entered = BTreeSet::new();
    let mut already_entered = BTreeMap::new();
    let mut replaced = BTreeMap::new();
    let mut mismatches = Vec::new();

    for (&day, &units) in request.days() {
        let before = pre.day(day).and_then(|c| c.entered_value());
        let after = post.day(day).and_then(|c| c.value());

        if before == Some(units) {
            already_entered.insert(day, units);
            continue;
        }

        if after == Some(units) {
            newly_entered.insert(day);
            if let Some(previous) = before {
                replaced.insert(day, previous);
            }
            continue;
        }

        mismatches.push(DayMismatch {
            day,
            expected: units,
            observed: after,
        });
    }

    let summary = post.summary();
    let invoice_comparison = request
        .invoice_totals()
        .map(|totals| InvoiceComparison::new(totals, &summary));

    SubmissionOutcome {
        line: line.clone(),
        success: mismatches.is_empty(),
        newly_entered,
        already_entered,
        replaced,
        mismatches,
        summary,
        invoice_comparison,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BillingSummary, ConsumerKey, DayCell, InvoiceTotals, ServicePeriod,
    };
    use reqwest::Url;
    use rust_decimal::Decimal;

    fn line() -> CalendarLine {
        CalendarLine {
            provider_code: "PP0212".to_string(),
            invoice_id: "1234567".to_string(),
            line_id: "88".to_string(),
            svc_code: "055".to_string(),
            period: ServicePeriod::new(8, 2025).unwrap(),
            consumer: ConsumerKey::new("2719815"),
            consumer_name: "DOE, JANE".to_string(),
        }
    }

    fn form(values: &[(u8, &str)], total: Decimal, gross: Decimal) -> CalendarForm {
        let base = Url::parse("https://portal.test").unwrap();
        let days = (1..=31u8)
            .map(|day| DayCell {
                day,
                field_name: format!("dayUnits_r1c{day}"),
                raw_value: values
                    .iter()
                    .find(|(d, _)| *d == day)
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_default(),
                enabled: true,
                week_row: None,
                position: day as usize,
            })
            .collect();
        CalendarForm {
            line_id: "88".to_string(),
            render_url: base.join("/invoices/unitcalendar").unwrap(),
            persist_url: base.join("/invoices/unitcalendar/update").unwrap(),
            period: ServicePeriod::new(8, 2025).unwrap(),
            hidden: Vec::new(),
            days,
            constants: BillingSummary {
                total_units: total,
                unit_rate: Decimal::new(14313, 2),
                gross_amount: gross,
                net_amount: gross,
            },
        }
    }

    fn three() -> Decimal {
        Decimal::new(300, 2)
    }

    #[test]
    fn new_day_next_to_unrelated_entry() {
        let pre = form(&[(8, "3.00")], three(), Decimal::new(42939, 2));
        let post = form(
            &[(8, "3.00"), (11, "1.00")],
            Decimal::new(400, 2),
            Decimal::new(57252, 2),
        );
        let request = SubmissionRequest::uniform([11], Decimal::ONE).unwrap();

        let outcome = classify(&line(), &pre, &post, &request);
        assert!(outcome.success);
        assert_eq!(outcome.newly_entered, BTreeSet::from([11]));
        assert!(outcome.already_entered.is_empty());
        assert!(!outcome.is_partial());
        assert_eq!(outcome.summary.total_units, Decimal::new(400, 2));
        assert_eq!(outcome.summary.gross_amount, Decimal::new(57252, 2));
    }

    #[test]
    fn matching_existing_entry_is_already_entered() {
        let pre = form(&[(8, "3.00")], three(), Decimal::new(42939, 2));
        let post = pre.clone();
        let request = SubmissionRequest::uniform([8], three()).unwrap();

        let outcome = classify(&line(), &pre, &post, &request);
        assert!(outcome.success);
        assert!(outcome.newly_entered.is_empty());
        assert_eq!(outcome.already_entered, BTreeMap::from([(8, three())]));
        assert_eq!(outcome.days_entered(), 0);
    }

    #[test]
    fn unchanged_different_value_is_a_mismatch() {
        let pre = form(&[(8, "2.00")], Decimal::new(200, 2), Decimal::new(28626, 2));
        let post = pre.clone();
        let request = SubmissionRequest::uniform([8], three()).unwrap();

        let outcome = classify(&line(), &pre, &post, &request);
        assert!(!outcome.success);
        assert_eq!(
            outcome.mismatches,
            vec![DayMismatch {
                day: 8,
                expected: three(),
                observed: Some(Decimal::new(200, 2)),
            }]
        );
        assert!(outcome.already_entered.is_empty());
        assert!(outcome.newly_entered.is_empty());
    }

    #[test]
    fn overwritten_value_is_recorded_as_replaced() {
        let pre = form(&[(8, "2.00")], Decimal::new(200, 2), Decimal::new(28626, 2));
        let post = form(&[(8, "3.00")], three(), Decimal::new(42939, 2));
        let request = SubmissionRequest::uniform([8], three()).unwrap();

        let outcome = classify(&line(), &pre, &post, &request);
        assert!(outcome.success);
        assert_eq!(outcome.newly_entered, BTreeSet::from([8]));
        assert_eq!(outcome.replaced, BTreeMap::from([(8, Decimal::new(200, 2))]));
    }

    #[test]
    fn partial_success_and_missing_write() {
        let pre = form(&[(8, "3.00")], three(), Decimal::new(42939, 2));
        let post = form(
            &[(8, "3.00"), (9, "3.00")],
            Decimal::new(600, 2),
            Decimal::new(85878, 2),
        );

        let request = SubmissionRequest::uniform([8, 9], three()).unwrap();
        let outcome = classify(&line(), &pre, &post, &request);
        assert!(outcome.success);
        assert!(outcome.is_partial());

        let request = SubmissionRequest::uniform([8, 9, 10], three()).unwrap();
        let outcome = classify(&line(), &pre, &post, &request);
        assert!(!outcome.success);
        assert_eq!(outcome.mismatches.len(), 1);
        assert_eq!(outcome.mismatches[0].day, 10);
        assert_eq!(outcome.mismatches[0].observed, None);
    }

    #[test]
    fn compares_caller_totals_with_portal() {
        let pre = form(&[(8, "3.00")], three(), Decimal::new(42939, 2));
        let request = SubmissionRequest::uniform([8], three())
            .unwrap()
            .with_invoice_totals(InvoiceTotals {
                units: three(),
                amount: Decimal::new(42939, 2),
            });

        let outcome = classify(&line(), &pre, &pre, &request);
        let comparison = outcome.invoice_comparison.unwrap();
        assert!(comparison.agrees());

        let request = SubmissionRequest::uniform([8], three())
            .unwrap()
            .with_invoice_totals(InvoiceTotals {
                units: Decimal::new(400, 2),
                amount: Decimal::new(57252, 2),
            });
        let outcome = classify(&line(), &pre, &pre, &request);
        assert!(!outcome.invoice_comparison.unwrap().agrees());
    }
}
