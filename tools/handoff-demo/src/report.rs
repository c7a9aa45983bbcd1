///
/// # Demo Reports
///
/// Every demo returns a `Report`: its name, whether the property it
/// demonstrates held, and an ordered list of observations. Reports render
/// either as plain text, one `key: value` line per observation, or as a
/// JSON array.
///

use std::fmt::Write;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::errors::DemoError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub demo: String,
    pub passed: bool,
    pub facts: IndexMap<String, Value>,
}

impl Report {
    pub fn new(demo: impl Into<String>) -> Self {
        Self {
            demo: demo.into(),
            passed: true,
            facts: IndexMap::new(),
        }
    }

    /// Records an observation. A repeated key overwrites in place.
    pub fn fact(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.facts.insert(key.into(), value.into());
        self
    }

    /// Marks the report failed unless `holds`.
    pub fn check(mut self, holds: bool) -> Self {
        self.passed &= holds;
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.facts.get(key)
    }
}

pub fn render_text(reports: &[Report]) -> String {
    let mut out = String::new();
    for (index, report) in reports.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "== {} ==", report.demo);
        let width = report.facts.keys().map(String::len).max().unwrap_or(0);
        for (key, value) in &report.facts {
            let _ = writeln!(out, "{:<width$}  {}", key, display_value(value), width = width);
        }
        let _ = writeln!(out, "result: {}", if report.passed { "ok" } else { "FAILED" });
    }
    out
}

pub fn render_json(reports: &[Report]) -> Result<String, DemoError> {
    Ok(serde_json::to_string_pretty(reports)?)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
