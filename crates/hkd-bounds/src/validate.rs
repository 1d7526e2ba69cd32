use hkd_hooks::{ExitDecision, StakeProposal, MAX_EXIT_REASON_CHARS};
use serde_json::Value;

use crate::{Anomaly, AnomalyKind, Bounded};

// ---------------------------------------------------------------------------
// Stake
// ---------------------------------------------------------------------------

/// Clamp a hook-returned stake into `[min, max]`.
///
/// Out-of-range values are silently corrected, never a trade failure.
/// A non-finite value has no meaningful clamp and lands on `min`; callers that
/// hold the full proposal should prefer [`bound_stake`].
pub fn clamp_stake(value: f64, min: f64, max: f64) -> Bounded<f64> {
    debug_assert!(min <= max, "stake bounds inverted");

    if !value.is_finite() {
        return Bounded::corrected(
            min,
            Anomaly::new(AnomalyKind::StakeNotFinite).with_evidence("returned", value),
        );
    }
    if value < min || value > max {
        let clamped = value.clamp(min, max);
        return Bounded::corrected(
            clamped,
            Anomaly::new(AnomalyKind::StakeOutOfRange)
                .with_evidence("returned", value)
                .with_evidence("min", min)
                .with_evidence("max", max)
                .with_evidence("applied", clamped),
        );
    }
    Bounded::clean(value)
}

/// Bound a hook-returned stake against the proposal it answered.
///
/// Same as [`clamp_stake`] except that a non-finite return falls back to the
/// hook default, `proposal.proposed`.
pub fn bound_stake(value: f64, proposal: &StakeProposal) -> Bounded<f64> {
    if !value.is_finite() {
        return Bounded::corrected(
            proposal.proposed,
            Anomaly::new(AnomalyKind::StakeNotFinite)
                .with_evidence("returned", value)
                .with_evidence("applied", proposal.proposed),
        );
    }
    clamp_stake(value, proposal.min, proposal.max)
}

// ---------------------------------------------------------------------------
// Stoploss
// ---------------------------------------------------------------------------

/// A stoploss ratio the driver can act on: finite and in `[-1, 0)`.
pub fn is_valid_stoploss(ratio: f64) -> bool {
    ratio.is_finite() && (-1.0..0.0).contains(&ratio)
}

/// Pick the tighter of a hook stoploss and the hard base stoploss.
///
/// Ratios are negative; "tighter" is the smaller loss magnitude, which is the
/// numerically larger ratio. Zero, positive and sub -100% returns are not
/// stoplosses and fall back to `base`. The result is never looser than `base`.
///
/// `base_ratio` must itself satisfy [`is_valid_stoploss`].
pub fn reconcile_stoploss(hook_ratio: f64, base_ratio: f64) -> Bounded<f64> {
    if !hook_ratio.is_finite() {
        return Bounded::corrected(
            base_ratio,
            Anomaly::new(AnomalyKind::StoplossNotFinite).with_evidence("returned", hook_ratio),
        );
    }
    if !is_valid_stoploss(hook_ratio) {
        return Bounded::corrected(
            base_ratio,
            Anomaly::new(AnomalyKind::StoplossOutOfRange)
                .with_evidence("returned", hook_ratio)
                .with_evidence("base", base_ratio),
        );
    }
    if hook_ratio < base_ratio {
        return Bounded::corrected(
            base_ratio,
            Anomaly::new(AnomalyKind::StoplossLoosened)
                .with_evidence("returned", hook_ratio)
                .with_evidence("base", base_ratio),
        );
    }
    Bounded::clean(hook_ratio)
}

/// Stoploss applied to an open trade only ever moves tighter between ticks.
pub fn ratchet_stoploss(previous: f64, candidate: f64) -> f64 {
    if candidate > previous {
        candidate
    } else {
        previous
    }
}

// ---------------------------------------------------------------------------
// Exit decisions
// ---------------------------------------------------------------------------

/// Normalize a typed exit decision.
///
/// - reasons longer than [`MAX_EXIT_REASON_CHARS`] are truncated (chars, not bytes)
/// - blank reasons mean "no exit"
pub fn normalize_exit_decision(decision: ExitDecision) -> Bounded<ExitDecision> {
    match decision {
        ExitDecision::ExitWithReason(reason) => {
            if reason.trim().is_empty() {
                return Bounded::corrected(
                    ExitDecision::NoExit,
                    Anomaly::new(AnomalyKind::ExitReasonEmpty),
                );
            }
            let len = reason.chars().count();
            if len > MAX_EXIT_REASON_CHARS {
                let truncated: String = reason.chars().take(MAX_EXIT_REASON_CHARS).collect();
                return Bounded::corrected(
                    ExitDecision::ExitWithReason(truncated),
                    Anomaly::new(AnomalyKind::ExitReasonTruncated)
                        .with_evidence("chars", len)
                        .with_evidence("max_chars", MAX_EXIT_REASON_CHARS),
                );
            }
            Bounded::clean(ExitDecision::ExitWithReason(reason))
        }
        other => Bounded::clean(other),
    }
}

/// Normalize a dynamically typed exit answer (scripted or foreign strategies).
///
/// `null`/`false` → no exit, `true` → generic exit, string → reason.
/// Any other JSON type is a contract violation and is rejected to no exit.
pub fn normalize_exit_value(value: &Value) -> Bounded<ExitDecision> {
    match value {
        Value::Null | Value::Bool(false) => Bounded::clean(ExitDecision::NoExit),
        Value::Bool(true) => Bounded::clean(ExitDecision::ExitGeneric),
        Value::String(s) => normalize_exit_decision(ExitDecision::ExitWithReason(s.clone())),
        other => Bounded::corrected(
            ExitDecision::NoExit,
            Anomaly::new(AnomalyKind::ExitValueRejected)
                .with_evidence("json_type", json_type_name(other)),
        ),
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stake_inside_bounds_is_untouched() {
        let b = clamp_stake(120.0, 50.0, 500.0);
        assert_eq!(b.value, 120.0);
        assert!(b.is_clean());
    }

    #[test]
    fn stake_above_max_clamps_to_max() {
        let b = clamp_stake(700.0, 50.0, 500.0);
        assert_eq!(b.value, 500.0);
        assert_eq!(b.anomaly.unwrap().code, "STAKE_CLAMPED");
    }

    #[test]
    fn stake_below_min_clamps_to_min() {
        assert_eq!(clamp_stake(-5.0, 50.0, 500.0).value, 50.0);
    }

    #[test]
    fn nan_stake_falls_back_to_proposed() {
        let p = StakeProposal::new(100.0, 50.0, 500.0).unwrap();
        let b = bound_stake(f64::NAN, &p);
        assert_eq!(b.value, 100.0);
        assert_eq!(b.anomaly.unwrap().kind, AnomalyKind::StakeNotFinite);
        assert_eq!(clamp_stake(f64::INFINITY, 50.0, 500.0).value, 50.0);
    }

    #[test]
    fn tighter_hook_stoploss_wins() {
        let b = reconcile_stoploss(-0.03, -0.10);
        assert_eq!(b.value, -0.03);
        assert!(b.is_clean());
    }

    #[test]
    fn looser_hook_stoploss_is_floored_at_base() {
        let b = reconcile_stoploss(-0.20, -0.10);
        assert_eq!(b.value, -0.10);
        assert_eq!(b.anomaly.unwrap().kind, AnomalyKind::StoplossLoosened);
    }

    #[test]
    fn nan_hook_stoploss_uses_base() {
        assert_eq!(reconcile_stoploss(f64::NAN, -0.10).value, -0.10);
    }

    #[test]
    fn non_negative_hook_stoploss_is_out_of_range() {
        for ret in [0.0, 0.05, 1.5] {
            let b = reconcile_stoploss(ret, -0.10);
            assert_eq!(b.value, -0.10);
            assert_eq!(b.anomaly.unwrap().code, "STOPLOSS_OUT_OF_RANGE");
        }
    }

    #[test]
    fn full_loss_stoploss_is_accepted_but_beyond_is_not() {
        assert_eq!(reconcile_stoploss(-1.0, -1.0).value, -1.0);
        let b = reconcile_stoploss(-1.5, -0.10);
        assert_eq!(b.anomaly.unwrap().kind, AnomalyKind::StoplossOutOfRange);
    }

    #[test]
    fn ratchet_never_loosens() {
        assert_eq!(ratchet_stoploss(-0.03, -0.10), -0.03);
        assert_eq!(ratchet_stoploss(-0.10, -0.02), -0.02);
    }

    #[test]
    fn long_reason_truncated_to_64_chars() {
        let reason = "x".repeat(100);
        let b = normalize_exit_decision(ExitDecision::ExitWithReason(reason));
        match &b.value {
            ExitDecision::ExitWithReason(r) => assert_eq!(r.chars().count(), 64),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(b.anomaly.unwrap().kind, AnomalyKind::ExitReasonTruncated);
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let reason = "é".repeat(70);
        let b = normalize_exit_decision(ExitDecision::ExitWithReason(reason));
        assert_eq!(b.value, ExitDecision::ExitWithReason("é".repeat(64)));
    }

    #[test]
    fn blank_reason_means_no_exit() {
        let b = normalize_exit_decision(ExitDecision::ExitWithReason("   ".into()));
        assert_eq!(b.value, ExitDecision::NoExit);
        assert!(!b.is_clean());
    }

    #[test]
    fn json_values_map_to_decisions() {
        assert_eq!(normalize_exit_value(&json!(null)).value, ExitDecision::NoExit);
        assert_eq!(normalize_exit_value(&json!(false)).value, ExitDecision::NoExit);
        assert_eq!(normalize_exit_value(&json!(true)).value, ExitDecision::ExitGeneric);
        assert_eq!(
            normalize_exit_value(&json!("rsi_overbought")).value,
            ExitDecision::ExitWithReason("rsi_overbought".into())
        );
    }

    #[test]
    fn foreign_json_types_are_rejected_not_fatal() {
        for v in [json!(1), json!(0.5), json!(["a"]), json!({"exit": true})] {
            let b = normalize_exit_value(&v);
            assert_eq!(b.value, ExitDecision::NoExit);
            assert_eq!(b.anomaly.unwrap().kind, AnomalyKind::ExitValueRejected);
        }
    }

    #[test]
    fn anomaly_display_lists_evidence() {
        let a = Anomaly::new(AnomalyKind::StakeOutOfRange)
            .with_evidence("max", 500)
            .with_evidence("returned", 700);
        assert_eq!(a.to_string(), "STAKE_CLAMPED max=500 returned=700");
    }
}
