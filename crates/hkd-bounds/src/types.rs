use std::collections::BTreeMap;

use serde::Serialize;

/// Anomaly categories.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AnomalyKind {
    StakeOutOfRange,
    StakeNotFinite,
    StoplossLoosened,
    StoplossNotFinite,
    StoplossOutOfRange,
    ExitReasonTruncated,
    ExitReasonEmpty,
    ExitValueRejected,
}

impl AnomalyKind {
    pub fn code(&self) -> &'static str {
        match self {
            AnomalyKind::StakeOutOfRange => "STAKE_CLAMPED",
            AnomalyKind::StakeNotFinite => "STAKE_NOT_FINITE",
            AnomalyKind::StoplossLoosened => "STOPLOSS_LOOSENED",
            AnomalyKind::StoplossNotFinite => "STOPLOSS_NOT_FINITE",
            AnomalyKind::StoplossOutOfRange => "STOPLOSS_OUT_OF_RANGE",
            AnomalyKind::ExitReasonTruncated => "EXIT_REASON_TRUNCATED",
            AnomalyKind::ExitReasonEmpty => "EXIT_REASON_EMPTY",
            AnomalyKind::ExitValueRejected => "EXIT_VALUE_REJECTED",
        }
    }
}

/// A corrected hook return: code + evidence (deterministic).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub code: String,
    pub evidence: BTreeMap<String, String>,
}

impl Anomaly {
    pub fn new(kind: AnomalyKind) -> Self {
        Self {
            kind,
            code: kind.code().to_string(),
            evidence: BTreeMap::new(),
        }
    }

    pub fn with_evidence(mut self, k: impl Into<String>, v: impl ToString) -> Self {
        self.evidence.insert(k.into(), v.to_string());
        self
    }
}

impl std::fmt::Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code)?;
        for (k, v) in &self.evidence {
            write!(f, " {k}={v}")?;
        }
        Ok(())
    }
}

/// A value that is safe to act on, plus the correction applied (if any).
#[derive(Clone, Debug, PartialEq)]
pub struct Bounded<T> {
    pub value: T,
    pub anomaly: Option<Anomaly>,
}

impl<T> Bounded<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            anomaly: None,
        }
    }

    pub fn corrected(value: T, anomaly: Anomaly) -> Self {
        Self {
            value,
            anomaly: Some(anomaly),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.anomaly.is_none()
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}
