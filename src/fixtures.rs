use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const INPLAY_STATUS: &[&str] = &[
    "TBD", "NS", "1H", "2H", "HT", "ET", "BT", "P", "SUSP", "INT", "LIVE",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn opponent(self) -> Self {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub id: u64,
    pub date: NaiveDateTime,
    pub league_id: u32,
    #[serde(default)]
    pub league_name: String,
    #[serde(default)]
    pub country: String,
    pub season: String,
    pub home_team_id: u32,
    pub away_team_id: u32,
    #[serde(default)]
    pub home_team: String,
    #[serde(default)]
    pub away_team: String,
    pub home_goals: Option<u8>,
    pub away_goals: Option<u8>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub form: Option<FixtureForm>,
}

fn default_status() -> String {
    "NS".to_string()
}

impl Fixture {
    pub fn is_completed(&self) -> bool {
        self.home_goals.is_some() && self.away_goals.is_some()
    }

    pub fn team_id(&self, side: Side) -> u32 {
        match side {
            Side::Home => self.home_team_id,
            Side::Away => self.away_team_id,
        }
    }

    pub fn goals(&self, side: Side) -> Option<u8> {
        match side {
            Side::Home => self.home_goals,
            Side::Away => self.away_goals,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureForm {
    pub home_favor_goals_avg: Option<f64>,
    pub home_against_goals_avg: Option<f64>,
    pub away_favor_goals_avg: Option<f64>,
    pub away_against_goals_avg: Option<f64>,
    pub home_league_goals_avg: Option<f64>,
    pub away_league_goals_avg: Option<f64>,
    pub home_n: u32,
    pub away_n: u32,
    pub league_n: u32,
}

impl FixtureForm {
    pub fn is_eligible(&self, min_team: u32, min_league: u32) -> bool {
        self.home_n >= min_team && self.away_n >= min_team && self.league_n >= min_league
    }
}
