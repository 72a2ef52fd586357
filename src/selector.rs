//! Priority Selector
//!
//! Picks which results of a cycle get the expensive explanation step.
//! Directional signals always outrank neutral ones: the action weight is
//! scaled so that no score/confidence combination in `[0, 1]` can close the
//! gap between tiers.

use crate::types::{Action, ScoredResult};

const ACTION_TIER_SCALE: f64 = 1000.0;
const SCORE_WEIGHT: f64 = 0.7;
const CONFIDENCE_WEIGHT: f64 = 0.3;

/// Tier of an action; `None` for results that must never be selected
pub fn action_weight(action: Action) -> Option<f64> {
    match action {
        Action::Buy => Some(3.0),
        Action::Sell => Some(2.0),
        Action::Hold => Some(1.0),
        Action::Error => None,
    }
}

/// Composite sort key of a result, `None` for `ERROR` results
///
/// Score and confidence are clamped into `[0, 1]` and non-finite values
/// count as `0`, so the action tier always decides first.
pub fn priority(result: &ScoredResult) -> Option<f64> {
    let weight = action_weight(result.action())?;
    let score = result.score()?;
    Some(
        weight * ACTION_TIER_SCALE
            + unit_interval(score.composite_score) * SCORE_WEIGHT
            + unit_interval(score.confidence) * CONFIDENCE_WEIGHT,
    )
}

fn unit_interval(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Highest-priority `k` results, best first.
///
/// `ERROR` results are excluded. Equal keys keep their input order.
pub fn select_top_k(results: &[ScoredResult], k: usize) -> Vec<ScoredResult> {
    let mut ranked: Vec<(f64, &ScoredResult)> = results
        .iter()
        .filter_map(|r| priority(r).map(|p| (p, r)))
        .collect();

    // Stable sort, so ties fall back to input order
    ranked.sort_by(|(a, _), (b, _)| b.total_cmp(a));

    ranked
        .into_iter()
        .take(k)
        .map(|(_, r)| r.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Score, SignalAction, WorkItem};

    fn result(entity: &str, action: SignalAction, score: f64, confidence: f64) -> ScoredResult {
        ScoredResult::scored(
            WorkItem::new("momentum", entity),
            Score::new(action, score, confidence),
        )
    }

    #[test]
    fn composite_key_matches_weights() {
        let r = result("BTC", SignalAction::Sell, 0.5, 0.9);
        let key = priority(&r).unwrap_or_else(|| panic!("SELL result should rank"));
        assert!((key - (2000.0 + 0.35 + 0.27)).abs() < 1e-9);

        let failed = ScoredResult::failed(WorkItem::new("momentum", "ETH"), "boom");
        assert_eq!(priority(&failed), None);
    }

    #[test]
    fn non_finite_scores_stay_in_their_tier() {
        let results = vec![
            result("BTC", SignalAction::Buy, 0.9, 0.9),
            result("NAN", SignalAction::Hold, f64::NAN, 0.5),
            result("INF", SignalAction::Hold, f64::INFINITY, f64::INFINITY),
            result("SELL", SignalAction::Sell, 0.1, f64::NEG_INFINITY),
        ];

        let picked: Vec<_> = select_top_k(&results, 4)
            .into_iter()
            .map(|r| r.item.entity_id)
            .collect();
        assert_eq!(picked, ["BTC", "SELL", "NAN", "INF"]);

        for r in &results {
            let key = priority(r).unwrap_or_else(|| panic!("Scored result should rank"));
            assert!(key.is_finite());
        }
        let hold_nan = priority(&results[1]).unwrap_or_else(|| panic!("HOLD result should rank"));
        assert!((hold_nan - (1000.0 + 0.15)).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_scores_cannot_jump_tiers() {
        let results = vec![
            result("SELL", SignalAction::Sell, 0.0, 0.0),
            result("HOLD", SignalAction::Hold, 5000.0, 5000.0),
        ];
        let top = select_top_k(&results, 1);
        assert_eq!(top[0].action(), Action::Sell);
    }

    #[test]
    fn ties_keep_input_order() {
        let results = vec![
            result("A", SignalAction::Hold, 0.5, 0.5),
            result("B", SignalAction::Hold, 0.5, 0.5),
            result("C", SignalAction::Hold, 0.5, 0.5),
        ];
        let picked: Vec<_> = select_top_k(&results, 3)
            .into_iter()
            .map(|r| r.item.entity_id)
            .collect();
        assert_eq!(picked, ["A", "B", "C"]);
    }

    #[test]
    fn k_larger_than_input() {
        let results = vec![result("A", SignalAction::Buy, 0.1, 0.1)];
        assert_eq!(select_top_k(&results, 10).len(), 1);
        assert!(select_top_k(&results, 0).is_empty());
    }
}
