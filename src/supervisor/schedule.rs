//! Cron triggers for one-shot jobs, evaluated in local time.

use std::str::FromStr;

use chrono::{DateTime, TimeZone};
use cron::Schedule;

/// Fixed hours of day at which the price job fires
///
/// Six-field cron syntax: `sec min hour day-of-month month day-of-week`.
#[derive(Debug, Clone)]
pub struct PriceSchedule {
    expression: String,
    schedule: Schedule,
}

impl PriceSchedule {
    pub fn parse(expression: &str) -> anyhow::Result<Self> {
        let schedule = Schedule::from_str(expression)
            .map_err(|e| anyhow::anyhow!("invalid schedule '{expression}': {e}"))?;

        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire strictly after `instant`
    pub fn next_after<Z: TimeZone>(&self, instant: &DateTime<Z>) -> Option<DateTime<Z>> {
        self.schedule.after(instant).next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Timelike, Utc};
    use pretty_assertions::assert_eq;

    fn at(text: &str) -> DateTime<Utc> {
        text.parse().unwrap()
    }

    #[test]
    fn test_fires_at_evening_hours() {
        let schedule = PriceSchedule::parse("0 0 21,22,23 * * *").unwrap();

        let first = schedule.next_after(&at("2026-10-16T08:30:00Z")).unwrap();
        let second = schedule.next_after(&first).unwrap();
        let third = schedule.next_after(&second).unwrap();
        let fourth = schedule.next_after(&third).unwrap();

        assert_eq!(first, at("2026-10-16T21:00:00Z"));
        assert_eq!(second.hour(), 22);
        assert_eq!(third.hour(), 23);
        assert_eq!(fourth, at("2026-10-17T21:00:00Z"));
    }

    #[test]
    fn test_fire_instant_is_exclusive() {
        let schedule = PriceSchedule::parse("0 0 21,22,23 * * *").unwrap();

        let next = schedule.next_after(&at("2026-10-16T21:00:00Z")).unwrap();

        assert_eq!(next, at("2026-10-16T22:00:00Z"));
    }

    #[test]
    fn test_invalid_expression() {
        assert!(PriceSchedule::parse("every evening").is_err());
    }
}
