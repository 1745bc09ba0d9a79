//! Numeric declarations embedded in page scripts.
//!
//! The calendar page declares its unit rate and running totals as script
//! variables rather than form values. Only `name = <number>;` assignments are
//! recognized; nothing is evaluated.

use regex::Regex;
use rust_decimal::Decimal;

const LITERAL: &str = r#"\s*=\s*(["']?)\s*(-?[0-9][0-9,]*(?:\.[0-9]+)?)\s*["']?\s*;"#;

/// Compiled matcher for one numeric script variable.
///
/// A `var`/`let`/`const` declaration wins over a bare assignment anywhere in
/// the script, so `function reset() { totalUnits = 0; }` ahead of
/// `var totalUnits = 3.00;` still reads 3.00. Bare assignments are used only
/// when the variable is never declared. Accepts optional quotes around the
/// literal and thousands separators: `totalUnits='1,204.00';`.
#[derive(Debug, Clone)]
pub(crate) struct ScriptNumber {
    name: String,
    declared: Regex,
    assigned: Regex,
}

impl ScriptNumber {
    pub(crate) fn new(name: &str) -> Result<Self, regex::Error> {
        let name_re = regex::escape(name);
        let declared = Regex::new(&format!(
            r"(?:^|[^\w$.])(?:var|let|const)\s+{name_re}{LITERAL}"
        ))?;
        let assigned = Regex::new(&format!(r"(?:^|[^\w$.]){name_re}{LITERAL}"))?;
        Ok(Self {
            name: name.to_string(),
            declared,
            assigned,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn find(&self, script: &str) -> Option<Decimal> {
        first_number(&self.declared, script).or_else(|| first_number(&self.assigned, script))
    }
}

fn first_number(re: &Regex, script: &str) -> Option<Decimal> {
    re.captures_iter(script).find_map(|caps| {
        let literal = caps.get(2)?.as_str().replace(',', "");
        literal.parse().ok()
    })
}
