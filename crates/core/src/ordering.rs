//! Ordering helpers used by the transition engine.
//!
//! Two concerns live here, both as pure functions so they can be tested in
//! isolation and injected where a comparator is needed:
//!
//! - a "natural" ordering for state display names, used when listing
//!   candidate next states for a workflow;
//! - null-aware comparators for optional interval dates, where a missing
//!   start date sorts earliest and a missing end date sorts latest.

use chrono::NaiveDate;
use std::cmp::Ordering;

/// Compare two display names in natural order.
///
/// Comparison is case-insensitive and runs of ASCII digits are compared by
/// numeric value, so `"Stage 2"` sorts before `"Stage 10"`. Names that are
/// equal under those rules fall back to a plain byte comparison so the
/// ordering is total and stable.
pub fn natural_order(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(lc), Some(rc)) => {
                if lc.is_ascii_digit() && rc.is_ascii_digit() {
                    let ln = take_digit_run(&mut left);
                    let rn = take_digit_run(&mut right);
                    match compare_digit_runs(&ln, &rn) {
                        Ordering::Equal => {}
                        unequal => return unequal,
                    }
                } else {
                    let lf = lc.to_lowercase();
                    let rf = rc.to_lowercase();
                    match lf.cmp(rf) {
                        Ordering::Equal => {
                            left.next();
                            right.next();
                        }
                        unequal => return unequal,
                    }
                }
            }
        }
    }
}

fn take_digit_run(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(*c);
        chars.next();
    }
    run
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Compare optional start dates; a missing start sorts earliest.
pub fn cmp_start_dates(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.cmp(&b),
    }
}

/// Compare optional end dates; a missing end (a still-open interval) sorts
/// latest.
pub fn cmp_end_dates(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => a.cmp(&b),
    }
}
