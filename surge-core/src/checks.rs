use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::aggregator::RequestOutcome;
use crate::thresholds::{CompareOp, split_comparison};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum CheckSubject {
    /// Response status code; absent for failed transports.
    Status,
    /// Request latency in milliseconds.
    Duration,
}

/// Named per-response predicate, e.g. `is status 200` => `status == 200`.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub name: String,
    pub expression: String,
    subject: CheckSubject,
    op: CompareOp,
    value: f64,
}

impl Check {
    pub fn parse(name: &str, expression: &str) -> Result<Self, String> {
        if name.trim().is_empty() {
            return Err("check name must not be empty".to_string());
        }

        let (left, op, right) = split_comparison(expression)?;
        let subject = CheckSubject::from_str(&left.to_ascii_lowercase())
            .map_err(|_| format!("unknown check subject `{left}` (expected status or duration)"))?;

        let value: f64 = match subject {
            CheckSubject::Status => right
                .parse::<u16>()
                .map(f64::from)
                .map_err(|_| format!("invalid status code `{right}`"))?,
            CheckSubject::Duration => right
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| format!("invalid duration in ms `{right}`"))?,
        };

        Ok(Self {
            name: name.to_string(),
            expression: expression.to_string(),
            subject,
            op,
            value,
        })
    }

    pub fn subject(&self) -> CheckSubject {
        self.subject
    }

    #[must_use]
    pub fn evaluate(&self, outcome: &RequestOutcome) -> bool {
        match self.subject {
            CheckSubject::Status => outcome
                .status
                .is_some_and(|s| self.op.apply(f64::from(s), self.value)),
            CheckSubject::Duration => self
                .op
                .apply(outcome.latency.as_secs_f64() * 1000.0, self.value),
        }
    }
}

/// Status codes counted as successful responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedStatuses {
    ranges: Vec<RangeInclusive<u16>>,
}

impl Default for ExpectedStatuses {
    fn default() -> Self {
        Self {
            ranges: vec![200..=299],
        }
    }
}

impl ExpectedStatuses {
    #[must_use]
    pub fn contains(&self, status: u16) -> bool {
        self.ranges.iter().any(|r| r.contains(&status))
    }
}

impl FromStr for ExpectedStatuses {
    type Err = String;

    /// Parses `"200-299,304"`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parse_code = |s: &str| -> Result<u16, String> {
            let code: u16 = s
                .trim()
                .parse()
                .map_err(|_| format!("invalid status code `{}`", s.trim()))?;
            if !(100..=999).contains(&code) {
                return Err(format!("status code out of range: {code}"));
            }
            Ok(code)
        };

        let mut ranges = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let range = match part.split_once('-') {
                Some((lo, hi)) => {
                    let (lo, hi) = (parse_code(lo)?, parse_code(hi)?);
                    if lo > hi {
                        return Err(format!("empty range `{part}`"));
                    }
                    lo..=hi
                }
                None => {
                    let code = parse_code(part)?;
                    code..=code
                }
            };
            ranges.push(range);
        }

        if ranges.is_empty() {
            return Err("no status codes given".to_string());
        }
        Ok(Self { ranges })
    }
}
