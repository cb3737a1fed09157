use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::goal_model::FixtureProbabilities;
use crate::markets::{BetCatalog, OddsQuote, OutcomeKind};

pub fn raw_kelly(probability: f64, odd: f64) -> f64 {
    (probability * (odd + 1.0) - 1.0) / odd
}

pub fn kelly_weight(probability: f64, odd: f64, factor: f64) -> f64 {
    if !odd.is_finite() || odd <= 0.0 {
        return 0.0;
    }
    let raw = raw_kelly(probability, odd);
    if raw > 0.0 { raw * factor } else { 0.0 }
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateBet {
    pub fixture_id: u64,
    pub date: NaiveDateTime,
    pub country: String,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub bookmaker_id: u32,
    pub bookmaker: String,
    pub bet_id: u32,
    pub bet: String,
    pub key: String,
    pub odd: f64,
    pub outcome: OutcomeKind,
    pub probability: f64,
    pub threshold: f64,
    pub raw_kelly: f64,
    pub kelly: f64,
}

pub fn candidate_bets(
    probs: &[FixtureProbabilities],
    quotes: &[OddsQuote],
    catalog: &BetCatalog,
    cfg: &ModelConfig,
) -> Vec<CandidateBet> {
    let by_fixture: HashMap<u64, &FixtureProbabilities> =
        probs.iter().map(|p| (p.fixture_id, p)).collect();

    let joined = quotes
        .iter()
        .filter(|q| by_fixture.contains_key(&q.fixture_id))
        .count();
    info!(quotes = quotes.len(), joined, "recovered bets");

    let mut out: Vec<CandidateBet> = quotes
        .iter()
        .filter_map(|q| {
            let p = by_fixture.get(&q.fixture_id)?;
            evaluate_quote(p, q, catalog, cfg)
        })
        .collect();
    sort_candidates(&mut out);

    info!(candidates = out.len(), "filtered bets with high probabilities");
    out
}

pub fn sort_candidates(rows: &mut [CandidateBet]) {
    rows.sort_by(|a, b| {
        b.kelly
            .total_cmp(&a.kelly)
            .then(a.fixture_id.cmp(&b.fixture_id))
            .then(a.bookmaker_id.cmp(&b.bookmaker_id))
            .then(a.bet_id.cmp(&b.bet_id))
            .then_with(|| a.key.cmp(&b.key))
    });
}

fn evaluate_quote(
    probs: &FixtureProbabilities,
    quote: &OddsQuote,
    catalog: &BetCatalog,
    cfg: &ModelConfig,
) -> Option<CandidateBet> {
    let param = catalog.lookup(quote.bet_id, &quote.key)?;

    if !quote.value.is_finite() || quote.value <= 0.0 {
        warn!(
            fixture_id = quote.fixture_id,
            bookmaker_id = quote.bookmaker_id,
            bet_id = quote.bet_id,
            key = %quote.key,
            value = quote.value,
            "unusable odd value, skipping quote"
        );
        return None;
    }

    let probability = param.prob_name.probability(probs);
    if probability < param.threshold {
        return None;
    }

    let raw = raw_kelly(probability, quote.value);
    let kelly = kelly_weight(probability, quote.value, cfg.kelly_factor);
    if kelly <= 0.0 && !cfg.include_non_positive {
        debug!(
            fixture_id = quote.fixture_id,
            key = %quote.key,
            raw_kelly = raw,
            "no edge, skipping quote"
        );
        return None;
    }

    Some(CandidateBet {
        fixture_id: probs.fixture_id,
        date: probs.date,
        country: probs.country.clone(),
        league: probs.league.clone(),
        home_team: probs.home_team.clone(),
        away_team: probs.away_team.clone(),
        bookmaker_id: quote.bookmaker_id,
        bookmaker: quote.bookmaker.clone(),
        bet_id: quote.bet_id,
        bet: quote.bet.clone(),
        key: quote.key.clone(),
        odd: quote.value,
        outcome: param.prob_name,
        probability,
        threshold: param.threshold,
        raw_kelly: raw,
        kelly,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutcomeWeight {
    pub outcome: OutcomeKind,
    pub probability: f64,
    pub weight: f64,
}

/// Every model probability re-expressed as its Kelly weight at even odds.
/// Diagnostic only: it says how far each outcome sits above a coin flip.
pub fn even_money_weights(probs: &FixtureProbabilities, factor: f64) -> Vec<OutcomeWeight> {
    OutcomeKind::all()
        .into_iter()
        .map(|outcome| {
            let probability = outcome.probability(probs);
            OutcomeWeight {
                outcome,
                probability,
                weight: kelly_weight(probability, 1.0, factor),
            }
        })
        .collect()
}
