//! Join dates and elapsed membership time.
//!
//! Elapsed time is counted in calendar months: only the year and month
//! components matter, the day of the month is ignored.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

/// Shown when a member has no (usable) join date.
pub const NOT_AVAILABLE: &str = "Não disponível";

/// A member's join date, as accepted from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinDate(NaiveDate);

impl JoinDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Parses `DD/MM/YYYY` or ISO-8601 (date, RFC 3339 timestamp, or naive
    /// timestamp). Blank or unparseable input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if raw.contains('/') {
            return NaiveDate::parse_from_str(raw, "%d/%m/%Y").ok().map(Self);
        }

        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|dt| dt.date())
            })
            .map(Self)
    }

    /// ISO form (`YYYY-MM-DD`) used when writing the date back out.
    pub fn to_iso(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// Whole calendar months from this date until `today` (never negative).
    pub fn months_until(&self, today: NaiveDate) -> u32 {
        months_between(self.0, today)
    }
}

/// `(yearsDiff * 12 + monthsDiff)`, clamped at zero for future dates.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> u32 {
    let years = i64::from(to.year()) - i64::from(from.year());
    let months = i64::from(to.month()) - i64::from(from.month());
    let total = years * 12 + months;
    u32::try_from(total.max(0)).unwrap_or(u32::MAX)
}

/// Renders a month count as "X anos e Y meses", "X anos" or "Y meses".
pub fn format_membership(total_months: u32) -> String {
    let years = total_months / 12;
    let months = total_months % 12;

    let years_text = || format!("{} {}", years, if years == 1 { "ano" } else { "anos" });
    let months_text = || format!("{} {}", months, if months == 1 { "mês" } else { "meses" });

    if years > 0 && months > 0 {
        format!("{} e {}", years_text(), months_text())
    } else if years > 0 {
        years_text()
    } else {
        months_text()
    }
}
