use std::collections::HashSet;

use anyhow::{Context, Result};
use regex::Regex;

use super::script::ScriptNumber;
use crate::config::CalendarConfig;

/// Compiled description of the unit calendar page.
#[derive(Debug, Clone)]
pub struct CalendarSchema {
    day_field: Regex,
    week_total: Regex,
    pub total_units_field: String,
    pub gross_amount_field: String,
    pub net_amount_field: String,
    pub line_id_field: String,
    pub(crate) unit_rate: ScriptNumber,
    pub(crate) total_units: ScriptNumber,
    pub(crate) gross_amount: ScriptNumber,
    pub(crate) net_amount: ScriptNumber,
    pub(crate) month: ScriptNumber,
    pub(crate) year: ScriptNumber,
    known_fields: HashSet<String>,
}

fn script_number(name: &str) -> Result<ScriptNumber> {
    ScriptNumber::new(name).with_context(|| format!("Invalid script variable name {name:?}"))
}

impl CalendarSchema {
    pub fn from_config(config: &CalendarConfig) -> Result<Self> {
        let day_field = Regex::new(&config.day_field_pattern)
            .with_context(|| format!("Invalid day_field_pattern {:?}", config.day_field_pattern))?;
        let week_total = Regex::new(&config.week_total_pattern).with_context(|| {
            format!("Invalid week_total_pattern {:?}", config.week_total_pattern)
        })?;

        Ok(Self {
            day_field,
            week_total,
            total_units_field: config.total_units_field.clone(),
            gross_amount_field: config.gross_amount_field.clone(),
            net_amount_field: config.net_amount_field.clone(),
            line_id_field: config.line_id_field.clone(),
            unit_rate: script_number(&config.unit_rate_var)?,
            total_units: script_number(&config.total_units_var)?,
            gross_amount: script_number(&config.gross_amount_var)?,
            net_amount: script_number(&config.net_amount_var)?,
            month: script_number(&config.month_var)?,
            year: script_number(&config.year_var)?,
            known_fields: config.known_fields.iter().cloned().collect(),
        })
    }

    /// `Some(row)` if `name` follows the day-field convention; `row` is the
    /// calendar row when the pattern captures one.
    pub fn day_field(&self, name: &str) -> Option<Option<u32>> {
        self.day_field
            .captures(name)
            .map(|caps| caps.get(1).and_then(|m| m.as_str().parse().ok()))
    }

    /// Calendar row summed by a running-sum field, if `name` is one.
    pub fn week_total_row(&self, name: &str) -> Option<u32> {
        self.week_total
            .captures(name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// False only when a known-field list is configured and `name` is not
    /// on it.
    pub fn is_known_field(&self, name: &str) -> bool {
        self.known_fields.is_empty() || self.known_fields.contains(name)
    }
}

impl Default for CalendarSchema {
    fn default() -> Self {
        // The default patterns are valid regexes.
        Self::from_config(&CalendarConfig::default()).expect("default calendar schema")
    }
}
