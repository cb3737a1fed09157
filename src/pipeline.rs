use anyhow::Result;
use rand::Rng;
use rusqlite::Connection;
use serde::Serialize;

use crate::allocator::{AllocationResult, allocate};
use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::fixtures::Fixture;
use crate::goal_model::{FixtureProbabilities, model_fixtures};
use crate::kelly::{CandidateBet, OutcomeWeight, candidate_bets, even_money_weights};
use crate::markets::{BetCatalog, OddsQuote};
use crate::store::{self, FixtureQuery, OddsQuery};

#[derive(Debug, Clone, Serialize)]
pub struct ProbsRow {
    #[serde(flatten)]
    pub probs: FixtureProbabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub even_money: Option<Vec<OutcomeWeight>>,
}

pub fn probability_rows(
    probs: Vec<FixtureProbabilities>,
    cfg: &ModelConfig,
    with_even_money: bool,
) -> Vec<ProbsRow> {
    probs
        .into_iter()
        .map(|p| {
            let even_money = with_even_money.then(|| even_money_weights(&p, cfg.kelly_factor));
            ProbsRow {
                probs: p,
                even_money,
            }
        })
        .collect()
}

pub fn probabilities(
    conn: &Connection,
    query: &FixtureQuery,
    cfg: &ModelConfig,
) -> Result<Vec<FixtureProbabilities>> {
    let fixtures = store::query_fixtures(conn, query)?;
    Ok(model_fixtures(&fixtures, cfg)?)
}

pub fn evaluate(
    fixtures: &[Fixture],
    quotes: &[OddsQuote],
    catalog: &BetCatalog,
    cfg: &ModelConfig,
) -> Result<Vec<CandidateBet>, ModelError> {
    let probs = model_fixtures(fixtures, cfg)?;
    Ok(candidate_bets(&probs, quotes, catalog, cfg))
}

pub fn kelly_candidates(
    conn: &Connection,
    query: &OddsQuery,
    cfg: &ModelConfig,
) -> Result<Vec<CandidateBet>> {
    let catalog = store::load_bet_catalog(conn)?;
    let fixtures = store::query_fixtures(conn, &query.fixtures)?;
    let quotes = store::query_odds(conn, query)?;
    Ok(evaluate(&fixtures, &quotes, &catalog, cfg)?)
}

pub fn recommend<R: Rng + ?Sized>(
    conn: &Connection,
    query: &OddsQuery,
    cfg: &ModelConfig,
    bankroll: f64,
    rng: &mut R,
) -> Result<AllocationResult> {
    let candidates = kelly_candidates(conn, query, cfg)?;
    Ok(allocate(&candidates, bankroll, rng)?)
}
