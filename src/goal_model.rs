use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::fixtures::{Fixture, FixtureForm};

pub const MAX_GOALS: usize = 8;

/// Poisson goal-count distribution truncated at [`MAX_GOALS`] plus a "9+" bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GoalDistribution {
    pub rate: f64,
    pub pmf: [f64; MAX_GOALS + 1],
    pub tail: f64,
    pub cumulative: [f64; MAX_GOALS + 1],
}

impl GoalDistribution {
    pub fn poisson(rate: f64) -> Result<Self, ModelError> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(ModelError::InvalidRate(rate));
        }
        // λ^k e^-λ / k!, built incrementally.
        let mut pmf = [0.0; MAX_GOALS + 1];
        pmf[0] = (-rate).exp();
        for k in 1..=MAX_GOALS {
            pmf[k] = pmf[k - 1] * rate / k as f64;
        }

        let mut cumulative = [0.0; MAX_GOALS + 1];
        let mut acc = 0.0;
        for (k, p) in pmf.iter().enumerate() {
            acc += p;
            cumulative[k] = acc;
        }
        let tail = (1.0 - acc).max(0.0);

        Ok(Self {
            rate,
            pmf,
            tail,
            cumulative,
        })
    }

    pub fn over(&self, line: usize) -> f64 {
        1.0 - self.cumulative[line.min(MAX_GOALS)]
    }

    pub fn under(&self, line: usize) -> f64 {
        self.cumulative[line.min(MAX_GOALS)]
    }

    pub fn bucket(&self, k: usize) -> f64 {
        if k <= MAX_GOALS { self.pmf[k] } else { self.tail }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub win: f64,
    pub draw: f64,
    pub lose: f64,
}

impl MatchOutcome {
    /// Convolve two independent side distributions. The tail buckets act as a
    /// single "9+" score, so tail against tail is a draw and the three
    /// outcomes partition the whole grid.
    pub fn from_distributions(home: &GoalDistribution, away: &GoalDistribution) -> Self {
        let mut win = home.tail * away.cumulative[MAX_GOALS];
        let mut lose = away.tail * home.cumulative[MAX_GOALS];
        let mut draw = home.tail * away.tail;
        for k in 1..=MAX_GOALS {
            win += home.pmf[k] * away.cumulative[k - 1];
            lose += away.pmf[k] * home.cumulative[k - 1];
        }
        for k in 0..=MAX_GOALS {
            draw += home.pmf[k] * away.pmf[k];
        }
        Self { win, draw, lose }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExpectedGoals {
    pub home_attack: f64,
    pub home_defense: f64,
    pub away_attack: f64,
    pub away_defense: f64,
    pub home_factor: f64,
    pub away_factor: f64,
    pub home_rate: f64,
    pub away_rate: f64,
}

impl ExpectedGoals {
    pub fn from_form(form: &FixtureForm, overall: bool) -> Self {
        let home_attack = ratio(form.home_favor_goals_avg, form.home_league_goals_avg);
        let home_defense = ratio(form.home_against_goals_avg, form.home_league_goals_avg);
        let away_attack = ratio(form.away_favor_goals_avg, form.away_league_goals_avg);
        let away_defense = ratio(form.away_against_goals_avg, form.away_league_goals_avg);

        let (home_factor, away_factor) = if overall {
            let mean = match (
                nonzero(form.home_league_goals_avg),
                nonzero(form.away_league_goals_avg),
            ) {
                (Some(h), Some(a)) => (h + a) / 2.0,
                _ => 0.0,
            };
            (mean, mean)
        } else {
            (
                form.home_league_goals_avg.unwrap_or(0.0),
                form.away_league_goals_avg.unwrap_or(0.0),
            )
        };

        Self {
            home_attack,
            home_defense,
            away_attack,
            away_defense,
            home_factor,
            away_factor,
            home_rate: home_attack * away_defense * home_factor,
            away_rate: away_attack * home_defense * away_factor,
        }
    }
}

fn nonzero(v: Option<f64>) -> Option<f64> {
    v.filter(|x| *x != 0.0)
}

fn ratio(num: Option<f64>, den: Option<f64>) -> f64 {
    match (num, nonzero(den)) {
        (Some(n), Some(d)) => n / d,
        _ => 0.0,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FixtureProbabilities {
    pub fixture_id: u64,
    pub date: NaiveDateTime,
    pub country: String,
    pub league: String,
    pub season: String,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: Option<u8>,
    pub away_goals: Option<u8>,
    pub form: FixtureForm,
    pub expected: ExpectedGoals,
    pub home: GoalDistribution,
    pub away: GoalDistribution,
    pub outcome: MatchOutcome,
    pub over_05: f64,
}

pub fn model_fixture(
    fixture: &Fixture,
    cfg: &ModelConfig,
) -> Result<Option<FixtureProbabilities>, ModelError> {
    let Some(form) = fixture.form else {
        debug!(fixture_id = fixture.id, "no form cached, skipping");
        return Ok(None);
    };
    if !form.is_eligible(cfg.min_team_matches, cfg.min_league_matches) {
        debug!(
            fixture_id = fixture.id,
            home_n = form.home_n,
            away_n = form.away_n,
            league_n = form.league_n,
            "below sample gate, skipping"
        );
        return Ok(None);
    }

    let expected = ExpectedGoals::from_form(&form, cfg.overall);
    let home = GoalDistribution::poisson(expected.home_rate)?;
    let away = GoalDistribution::poisson(expected.away_rate)?;
    let outcome = MatchOutcome::from_distributions(&home, &away);

    Ok(Some(FixtureProbabilities {
        fixture_id: fixture.id,
        date: fixture.date,
        country: fixture.country.clone(),
        league: fixture.league_name.clone(),
        season: fixture.season.clone(),
        home_team: fixture.home_team.clone(),
        away_team: fixture.away_team.clone(),
        home_goals: fixture.home_goals,
        away_goals: fixture.away_goals,
        form,
        expected,
        over_05: 1.0 - home.pmf[0] * away.pmf[0],
        home,
        away,
        outcome,
    }))
}

pub fn model_fixtures(
    fixtures: &[Fixture],
    cfg: &ModelConfig,
) -> Result<Vec<FixtureProbabilities>, ModelError> {
    let rows = fixtures
        .par_iter()
        .map(|f| model_fixture(f, cfg))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().flatten().collect())
}
