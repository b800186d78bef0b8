use std::fmt;

use surge_metrics::MetricKind;

use crate::error::ConfigError;

/// Raw threshold expressions for one metric key, as configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdSet {
    pub metric: String,
    pub expressions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum CompareOp {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Lte,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Gte,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
}

impl CompareOp {
    #[must_use]
    pub fn apply(self, observed: f64, expected: f64) -> bool {
        match self {
            Self::Lt => observed < expected,
            Self::Lte => observed <= expected,
            Self::Gt => observed > expected,
            Self::Gte => observed >= expected,
            Self::Eq => observed == expected,
            Self::Ne => observed != expected,
        }
    }
}

/// Splits `lhs <op> rhs` after stripping all whitespace.
pub(crate) fn split_comparison(raw: &str) -> Result<(String, CompareOp, String), String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty expression".to_string());
    }

    // Two-character operators first so `<=` is not read as `<`.
    let ops = [
        ("<=", CompareOp::Lte),
        (">=", CompareOp::Gte),
        ("==", CompareOp::Eq),
        ("!=", CompareOp::Ne),
        ("<", CompareOp::Lt),
        (">", CompareOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("missing operator in `{raw}`"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("incomplete expression `{raw}`"));
    }

    Ok((left.to_string(), op, right.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    Value,
    P(u32),
}

impl ThresholdAgg {
    /// Whether the aggregation exists for a metric of `kind`.
    #[must_use]
    pub fn applies_to(self, kind: MetricKind) -> bool {
        match self {
            Self::Count => matches!(kind, MetricKind::Counter | MetricKind::Trend),
            Self::Rate => matches!(kind, MetricKind::Counter | MetricKind::Rate),
            Self::Value => kind == MetricKind::Gauge,
            Self::Avg | Self::Min | Self::Max | Self::Med | Self::P(_) => kind == MetricKind::Trend,
        }
    }
}

impl fmt::Display for ThresholdAgg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Med => f.write_str("med"),
            Self::Count => f.write_str("count"),
            Self::Rate => f.write_str("rate"),
            Self::Value => f.write_str("value"),
            Self::P(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: CompareOp,
    pub value: f64,
}

pub fn parse_threshold_expr(raw: &str) -> Result<ThresholdExpr, String> {
    let (left, op, right) = split_comparison(raw)?;

    let agg = if left.eq_ignore_ascii_case("avg") {
        ThresholdAgg::Avg
    } else if left.eq_ignore_ascii_case("min") {
        ThresholdAgg::Min
    } else if left.eq_ignore_ascii_case("max") {
        ThresholdAgg::Max
    } else if left.eq_ignore_ascii_case("med") {
        ThresholdAgg::Med
    } else if left.eq_ignore_ascii_case("count") {
        ThresholdAgg::Count
    } else if left.eq_ignore_ascii_case("rate") {
        ThresholdAgg::Rate
    } else if left.eq_ignore_ascii_case("value") {
        ThresholdAgg::Value
    } else if let Some(inner) = left.strip_prefix("p(").and_then(|v| v.strip_suffix(')')) {
        let p: u32 = inner
            .parse()
            .map_err(|_| format!("invalid percentile `{inner}`"))?;
        if !(1..=100).contains(&p) {
            return Err(format!("percentile out of range (1..=100): {p}"));
        }
        ThresholdAgg::P(p)
    } else {
        return Err(format!("unknown aggregation `{left}`"));
    };

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid numeric value `{right}`"))?;
    if !value.is_finite() {
        return Err(format!("invalid numeric value `{right}`"));
    }

    Ok(ThresholdExpr { agg, op, value })
}

/// Metric name plus an optional exact tag selector: `name{k:v,...}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricSelector {
    pub name: String,
    /// Sorted by key.
    pub tags: Vec<(String, String)>,
}

impl MetricSelector {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let Some(open) = raw.find('{') else {
            if raw.is_empty() {
                return Err("empty metric name".to_string());
            }
            return Ok(Self {
                name: raw.to_string(),
                tags: Vec::new(),
            });
        };

        let name = raw[..open].trim();
        let inner = raw[open + 1..]
            .strip_suffix('}')
            .ok_or_else(|| format!("unterminated tag selector in `{raw}`"))?;
        if name.is_empty() {
            return Err(format!("empty metric name in `{raw}`"));
        }

        let mut tags = Vec::new();
        for part in inner.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (k, v) = part
                .split_once(':')
                .ok_or_else(|| format!("invalid tag `{part}` (expected key:value)"))?;
            let (k, v) = (k.trim(), v.trim());
            if k.is_empty() {
                return Err(format!("empty tag key in `{raw}`"));
            }
            tags.push((k.to_string(), v.to_string()));
        }
        tags.sort();
        tags.dedup_by(|a, b| a.0 == b.0);

        Ok(Self {
            name: name.to_string(),
            tags,
        })
    }

    /// Canonical `name{k:v,...}` with tags sorted by key.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        canonical_key(&self.name, self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

pub(crate) fn canonical_key<'a>(
    name: &str,
    tags: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut tags: Vec<(&str, &str)> = tags.into_iter().collect();
    if tags.is_empty() {
        return name.to_string();
    }
    tags.sort_unstable();
    let inner = tags
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("{name}{{{inner}}}")
}

/// A validated threshold expression bound to a metric series.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    /// Metric key as configured.
    pub metric: String,
    pub selector: MetricSelector,
    pub kind: MetricKind,
    /// Expression as configured.
    pub expression: String,
    pub expr: ThresholdExpr,
}

/// Parses every expression and checks it against the kind of its metric.
pub fn compile_thresholds(
    sets: &[ThresholdSet],
    kind_of: impl Fn(&str) -> Option<MetricKind>,
) -> Result<Vec<Threshold>, ConfigError> {
    let mut out = Vec::new();

    for set in sets {
        let selector =
            MetricSelector::parse(&set.metric).map_err(|reason| ConfigError::InvalidThreshold {
                metric: set.metric.clone(),
                expression: String::new(),
                reason,
            })?;
        let kind =
            kind_of(&selector.name).ok_or_else(|| ConfigError::UnknownMetric(set.metric.clone()))?;

        for expression in &set.expressions {
            let invalid = |reason: String| ConfigError::InvalidThreshold {
                metric: set.metric.clone(),
                expression: expression.clone(),
                reason,
            };

            let expr = parse_threshold_expr(expression).map_err(invalid)?;
            if !expr.agg.applies_to(kind) {
                return Err(invalid(format!(
                    "`{}` is not defined for {kind} metrics",
                    expr.agg
                )));
            }

            out.push(Threshold {
                metric: set.metric.clone(),
                selector: selector.clone(),
                kind,
                expression: expression.clone(),
                expr,
            });
        }
    }

    Ok(out)
}
