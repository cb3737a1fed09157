use std::collections::HashMap;

use chrono::NaiveDateTime;
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::fixtures::{Fixture, FixtureForm, Side};

type SeasonKey = (u32, String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FormKey {
    Team {
        team_id: u32,
        side: Side,
        league_id: u32,
        season: String,
        date: NaiveDateTime,
    },
    League {
        league_id: u32,
        season: String,
        date: NaiveDateTime,
    },
}

impl FormKey {
    fn season_key(&self) -> (u32, &str, NaiveDateTime) {
        match self {
            FormKey::Team {
                league_id,
                season,
                date,
                ..
            }
            | FormKey::League {
                league_id,
                season,
                date,
            } => (*league_id, season.as_str(), *date),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct FormStats {
    favor: Option<f64>,
    against: Option<f64>,
    n: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TeamFormSnapshot {
    pub side: Side,
    pub favor_avg: Option<f64>,
    pub against_avg: Option<f64>,
    pub league_favor_avg: Option<f64>,
    pub league_against_avg: Option<f64>,
    pub team_n: u32,
    pub opponent_n: u32,
    pub league_n: u32,
}

pub struct FormAggregator {
    window: usize,
    history: RwLock<HashMap<SeasonKey, Vec<Fixture>>>,
    memo: RwLock<HashMap<FormKey, FormStats>>,
}

impl FormAggregator {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            history: RwLock::new(HashMap::new()),
            memo: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_history(window: usize, fixtures: impl IntoIterator<Item = Fixture>) -> Self {
        let agg = Self::new(window);
        {
            let mut history = agg.history.write();
            for f in fixtures {
                history
                    .entry((f.league_id, f.season.clone()))
                    .or_default()
                    .push(f);
            }
        }
        agg
    }

    pub fn upsert(&self, fixture: Fixture) {
        let mut history = self.history.write();
        let mut previous = Vec::new();
        for (key, rows) in history.iter_mut() {
            if let Some(pos) = rows.iter().position(|f| f.id == fixture.id) {
                previous.push((key.clone(), rows.remove(pos).date));
            }
        }
        for (key, date) in &previous {
            self.evict(key, *date);
        }

        let key = (fixture.league_id, fixture.season.clone());
        self.evict(&key, fixture.date);
        history.entry(key).or_default().push(fixture);
    }

    /// Record a (possibly partial) score. Returns the ids of fixtures in the
    /// same league season whose cached form is now stale, or `None` if the
    /// fixture is unknown.
    pub fn apply_result(
        &self,
        fixture_id: u64,
        home_goals: Option<u8>,
        away_goals: Option<u8>,
        status: &str,
    ) -> Option<Vec<u64>> {
        let mut history = self.history.write();
        let (key, date) = history.iter_mut().find_map(|(key, rows)| {
            let f = rows.iter_mut().find(|f| f.id == fixture_id)?;
            f.home_goals = home_goals;
            f.away_goals = away_goals;
            f.status = status.to_string();
            Some((key.clone(), f.date))
        })?;
        self.evict(&key, date);

        let stale = history
            .get(&key)
            .map(|rows| {
                rows.iter()
                    .filter(|f| f.date >= date)
                    .map(|f| f.id)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        debug!(fixture_id, stale = stale.len(), "form invalidated");
        Some(stale)
    }

    // Callers hold the history write lock, so no reader can re-insert a value
    // computed from the old history after this runs.
    fn evict(&self, key: &SeasonKey, from: NaiveDateTime) {
        self.memo.write().retain(|k, _| {
            let (league_id, season, date) = k.season_key();
            !(league_id == key.0 && season == key.1 && date >= from)
        });
    }

    pub fn snapshot(&self, fixture: &Fixture, side: Side) -> TeamFormSnapshot {
        let history = self.history.read();
        let rows = history
            .get(&(fixture.league_id, fixture.season.clone()))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        self.snapshot_in(rows, fixture, side)
    }

    pub fn fixture_form(&self, fixture: &Fixture) -> FixtureForm {
        let history = self.history.read();
        let rows = history
            .get(&(fixture.league_id, fixture.season.clone()))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let home = self.snapshot_in(rows, fixture, Side::Home);
        let away = self.snapshot_in(rows, fixture, Side::Away);
        FixtureForm {
            home_favor_goals_avg: home.favor_avg,
            home_against_goals_avg: home.against_avg,
            away_favor_goals_avg: away.favor_avg,
            away_against_goals_avg: away.against_avg,
            home_league_goals_avg: home.league_favor_avg,
            away_league_goals_avg: away.league_favor_avg,
            home_n: home.team_n,
            away_n: away.team_n,
            league_n: home.league_n,
        }
    }

    pub fn attach_forms(&self, fixtures: &mut [Fixture]) {
        fixtures.par_iter_mut().for_each(|f| {
            let form = self.fixture_form(f);
            f.form = Some(form);
        });
    }

    pub fn season_fixtures(&self, league_id: u32, season: &str) -> Vec<Fixture> {
        self.history
            .read()
            .get(&(league_id, season.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn memo_len(&self) -> usize {
        self.memo.read().len()
    }

    fn snapshot_in(&self, rows: &[Fixture], fixture: &Fixture, side: Side) -> TeamFormSnapshot {
        let team = self.memoized(rows, self.team_key(fixture, side));
        let opponent = self.memoized(rows, self.team_key(fixture, side.opponent()));
        let league = self.memoized(
            rows,
            FormKey::League {
                league_id: fixture.league_id,
                season: fixture.season.clone(),
                date: fixture.date,
            },
        );
        let (league_favor_avg, league_against_avg) = match side {
            Side::Home => (league.favor, league.against),
            Side::Away => (league.against, league.favor),
        };
        TeamFormSnapshot {
            side,
            favor_avg: team.favor,
            against_avg: team.against,
            league_favor_avg,
            league_against_avg,
            team_n: team.n,
            opponent_n: opponent.n,
            league_n: league.n,
        }
    }

    fn team_key(&self, fixture: &Fixture, side: Side) -> FormKey {
        FormKey::Team {
            team_id: fixture.team_id(side),
            side,
            league_id: fixture.league_id,
            season: fixture.season.clone(),
            date: fixture.date,
        }
    }

    fn memoized(&self, rows: &[Fixture], key: FormKey) -> FormStats {
        if let Some(hit) = self.memo.read().get(&key) {
            return *hit;
        }
        let stats = match &key {
            FormKey::Team {
                team_id,
                side,
                date,
                ..
            } => team_stats(rows, *team_id, *side, *date, self.window),
            FormKey::League { date, .. } => league_stats(rows, *date),
        };
        self.memo.write().insert(key, stats);
        stats
    }
}

fn team_stats(
    rows: &[Fixture],
    team_id: u32,
    side: Side,
    date: NaiveDateTime,
    window: usize,
) -> FormStats {
    let mut sample: Vec<&Fixture> = rows
        .iter()
        .filter(|f| f.is_completed() && f.date <= date && f.team_id(side) == team_id)
        .collect();
    sample.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
    sample.truncate(window);

    FormStats {
        favor: mean(sample.iter().filter_map(|f| f.goals(side))),
        against: mean(sample.iter().filter_map(|f| f.goals(side.opponent()))),
        n: sample.len() as u32,
    }
}

fn league_stats(rows: &[Fixture], date: NaiveDateTime) -> FormStats {
    let sample: Vec<&Fixture> = rows
        .iter()
        .filter(|f| f.is_completed() && f.date <= date)
        .collect();
    FormStats {
        favor: mean(sample.iter().filter_map(|f| f.home_goals)),
        against: mean(sample.iter().filter_map(|f| f.away_goals)),
        n: sample.len() as u32,
    }
}

fn mean(goals: impl Iterator<Item = u8>) -> Option<f64> {
    let (sum, n) = goals.fold((0.0_f64, 0usize), |(s, n), g| (s + g as f64, n + 1));
    if n == 0 { None } else { Some(sum / n as f64) }
}
