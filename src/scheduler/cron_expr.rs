//! Five-field cron expressions
//!
//! Expressions use the classic crontab layout: minute, hour, day-of-month,
//! month, day-of-week. Day-of-week accepts 0-7 (0 and 7 are Sunday) or the
//! three-letter names. Parsing and iteration are delegated to the `cron`
//! crate, which expects a leading seconds field and numbers weekdays from
//! Sunday = 1, so the expression is normalized before it is handed over.
//!
//! When both day fields are restricted a day matches if either one does, as
//! in Vixie cron. The `cron` crate intersects them, so such expressions are
//! split into a day-of-month schedule and a day-of-week schedule whose fire
//! times are merged.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Local};

use crate::error::{RefreshError, Result};

const FIELD_COUNT: usize = 5;
const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// A validated five-field cron expression
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expr: String,
    /// One schedule, or two whose union is the expression
    schedules: Vec<cron::Schedule>,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self> {
        let schedules = normalize(expr)?
            .iter()
            .map(|normalized| {
                cron::Schedule::from_str(normalized)
                    .map_err(|e| RefreshError::InvalidCron(format!("{}: {}", expr.trim(), e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            expr: expr.trim().to_string(),
            schedules,
        })
    }

    /// The expression as written by the user
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// First fire time strictly after `after`
    pub fn next_after(&self, after: &DateTime<Local>) -> Option<DateTime<Local>> {
        self.schedules.iter().filter_map(|s| s.after(after).next()).min()
    }

    /// The next `count` fire times after `after`
    pub fn upcoming(&self, after: &DateTime<Local>, count: usize) -> Vec<DateTime<Local>> {
        let mut iters: Vec<_> = self.schedules.iter().map(|s| s.after(after).peekable()).collect();
        let mut times = Vec::with_capacity(count);

        while times.len() < count {
            let Some(at) = iters.iter_mut().filter_map(|it| it.peek().copied()).min() else {
                break;
            };
            // Both halves may fire at the same instant; emit it once
            for it in iters.iter_mut() {
                if it.peek() == Some(&at) {
                    it.next();
                }
            }
            times.push(at);
        }
        times
    }
}

/// Check that `expr` is a usable five-field cron expression
pub fn validate_cron_expr(expr: &str) -> Result<()> {
    CronSchedule::parse(expr).map(|_| ())
}

/// Rewrite a five-field expression into the six-field form(s) the `cron` crate parses
fn normalize(expr: &str) -> Result<Vec<String>> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != FIELD_COUNT {
        return Err(RefreshError::InvalidCron(format!(
            "{}: expected {} fields (minute hour day-of-month month day-of-week), got {}",
            expr.trim(),
            FIELD_COUNT,
            fields.len()
        )));
    }

    let day_of_week = normalize_day_of_week(fields[4])
        .map_err(|reason| RefreshError::InvalidCron(format!("{}: {}", expr.trim(), reason)))?;

    let (minute, hour, day_of_month, month) = (fields[0], fields[1], fields[2], fields[3]);
    if is_unrestricted(day_of_month) || is_unrestricted(&day_of_week) {
        return Ok(vec![format!("0 {} {} {} {} {}", minute, hour, day_of_month, month, day_of_week)]);
    }

    Ok(vec![
        format!("0 {} {} {} {} *", minute, hour, day_of_month, month),
        format!("0 {} {} * {} {}", minute, hour, month, day_of_week),
    ])
}

/// A day field that matches every day (`*`, `?`, or a list containing one)
fn is_unrestricted(field: &str) -> bool {
    field
        .split(',')
        .any(|part| matches!(part, "*" | "?" | "*/1" | "?/1"))
}

/// Expand a day-of-week field into an explicit list of day names
fn normalize_day_of_week(field: &str) -> std::result::Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut days = BTreeSet::new();
    for part in field.split(',') {
        let (base, step) = match part.split_once('/') {
            Some((base, step)) => {
                let step: usize = step.parse().map_err(|_| format!("invalid step '{}'", step))?;
                if step == 0 {
                    return Err("step must be at least 1".to_string());
                }
                (base, step)
            }
            None => (part, 1),
        };

        let (start, end) = match base {
            "*" | "?" => (0, 6),
            _ => match base.split_once('-') {
                Some((lo, hi)) => (parse_day(lo)?, parse_day(hi)?),
                // A bare start with a step runs to the end of the week
                None if step > 1 => (parse_day(base)?, 7),
                None => {
                    let day = parse_day(base)?;
                    (day, day)
                }
            },
        };

        if start > end {
            return Err(format!("day-of-week range '{}' runs backwards", base));
        }

        for day in (start..=end).step_by(step) {
            days.insert(day % 7);
        }
    }

    if days.is_empty() {
        return Err("empty day-of-week field".to_string());
    }

    Ok(days.into_iter().map(|d| DAY_NAMES[d]).collect::<Vec<_>>().join(","))
}

/// Parse one weekday as 0-7 or a three-letter name
fn parse_day(token: &str) -> std::result::Result<usize, String> {
    if let Ok(n) = token.parse::<usize>() {
        return if n <= 7 {
            Ok(n)
        } else {
            Err(format!("day-of-week {} out of range 0-7", n))
        };
    }

    let upper = token.to_ascii_uppercase();
    DAY_NAMES
        .iter()
        .position(|name| *name == upper)
        .ok_or_else(|| format!("unknown day-of-week '{}'", token))
}
