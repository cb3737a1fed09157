use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ModelError;
use crate::kelly::CandidateBet;

#[derive(Debug, Clone, Serialize)]
pub struct AllocatedBet {
    #[serde(flatten)]
    pub bet: CandidateBet,
    pub stake: f64,
    pub expected_value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocationResult {
    pub bankroll: f64,
    pub bets: Vec<AllocatedBet>,
    pub selected_weight: f64,
    pub exhausted: bool,
    pub total_stake: f64,
    pub total_expected: f64,
}

// Slack for rounding in the running share.
const SHARE_EPS: f64 = 1e-9;

/// Indices of `weights` picked in draw order. The running share and the drop
/// rule work on weights divided by the sum of every usable weight, so a run
/// ends once that share reaches 1 or the pool is empty. Non-positive and
/// non-finite weights never enter the pool.
pub fn draw_without_replacement<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Vec<usize> {
    let mut pool: Vec<usize> = (0..weights.len())
        .filter(|&i| weights[i].is_finite() && weights[i] > 0.0)
        .collect();
    let full: f64 = pool.iter().map(|&i| weights[i]).sum();
    let mut picked = Vec::new();
    let mut selected = 0.0;

    while selected < 1.0 - SHARE_EPS && !pool.is_empty() {
        let total: f64 = pool.iter().map(|&i| weights[i]).sum();
        let r: f64 = rng.gen_range(0.0..1.0);

        // Rounding can leave the last upper bound a hair under 1.0; the last
        // candidate then takes the draw.
        let mut slot = pool.len() - 1;
        let mut cum = 0.0;
        for (pos, &i) in pool.iter().enumerate() {
            cum += weights[i];
            if r < cum / total {
                slot = pos;
                break;
            }
        }

        let idx = pool.remove(slot);
        selected += weights[idx] / full;
        picked.push(idx);

        let room = 1.0 - selected + SHARE_EPS;
        let before = pool.len();
        pool.retain(|&i| weights[i] / full <= room);
        debug!(
            pick = idx,
            draw = r,
            selected,
            dropped = before - pool.len(),
            remaining = pool.len(),
            "allocation round"
        );
    }
    picked
}

pub fn allocate<R: Rng + ?Sized>(
    candidates: &[CandidateBet],
    bankroll: f64,
    rng: &mut R,
) -> Result<AllocationResult, ModelError> {
    if !bankroll.is_finite() || bankroll <= 0.0 {
        return Err(ModelError::InvalidBankroll(bankroll));
    }

    let weights: Vec<f64> = candidates.iter().map(|c| c.kelly).collect();
    let picked = draw_without_replacement(&weights, rng);
    let full: f64 = weights
        .iter()
        .filter(|w| w.is_finite() && **w > 0.0)
        .sum();
    let picked_sum: f64 = picked.iter().map(|&i| weights[i]).sum();
    let selected_weight = if full > 0.0 { picked_sum / full } else { 0.0 };

    let bets: Vec<AllocatedBet> = picked
        .iter()
        .map(|&i| {
            let bet = candidates[i].clone();
            let stake = bet.kelly / picked_sum * bankroll;
            AllocatedBet {
                expected_value: stake * bet.odd,
                stake,
                bet,
            }
        })
        .collect();

    let total_stake = bets.iter().map(|b| b.stake).sum();
    let total_expected = bets.iter().map(|b| b.expected_value).sum();
    let exhausted = selected_weight < 1.0 - SHARE_EPS;
    info!(
        candidates = candidates.len(),
        selected = bets.len(),
        selected_weight,
        exhausted,
        "bankroll allocated"
    );

    Ok(AllocationResult {
        bankroll,
        bets,
        selected_weight,
        exhausted,
        total_stake,
        total_expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::rngs::mock::StepRng;
    use std::collections::HashSet;

    #[test]
    fn zero_draw_walks_the_pool_in_order() {
        // StepRng(0, 0) always draws 0.0, i.e. the first interval.
        let mut rng = StepRng::new(0, 0);
        let picked = draw_without_replacement(&[0.3, 0.3, 0.5], &mut rng);
        assert_eq!(picked, vec![0, 1, 2]);
    }

    #[test]
    fn zero_width_candidates_are_never_drawn() {
        let mut rng = StepRng::new(0, 0);
        let picked = draw_without_replacement(&[0.0, -1.0, f64::NAN, 0.4], &mut rng);
        assert_eq!(picked, vec![3]);
    }

    #[test]
    fn share_reaches_one_for_heavy_and_light_pools() {
        for weights in [vec![1.2, 0.9, 0.8], vec![0.05, 0.02], vec![0.3, 0.3, 0.5]] {
            for seed in 0..50 {
                let mut rng = StdRng::seed_from_u64(seed);
                let picked = draw_without_replacement(&weights, &mut rng);
                let full: f64 = weights.iter().sum();
                let share: f64 = picked.iter().map(|&i| weights[i] / full).sum();
                assert!((share - 1.0).abs() < 1e-9, "weights={weights:?} seed={seed}");
            }
        }
    }

    #[test]
    fn empty_pool_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(draw_without_replacement(&[], &mut rng).is_empty());
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let weights = [0.12, 0.05, 0.31, 0.08, 0.22, 0.17, 0.09];
        let a = draw_without_replacement(&weights, &mut StdRng::seed_from_u64(42));
        let b = draw_without_replacement(&weights, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
        let unique: HashSet<_> = a.iter().collect();
        assert_eq!(unique.len(), a.len());
    }

    #[test]
    fn draws_follow_weights() {
        let weights = [0.05, 0.6];
        let mut heavy_first = 0;
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..2000 {
            let picked = draw_without_replacement(&weights, &mut rng);
            if picked.first() == Some(&1) {
                heavy_first += 1;
            }
        }
        // Expected share is 0.6 / 0.65 ≈ 0.92.
        assert!(heavy_first > 1700, "heavy_first={heavy_first}");
    }
}
