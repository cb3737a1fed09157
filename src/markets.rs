use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::fixtures::Side;
use crate::goal_model::{FixtureProbabilities, MAX_GOALS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OutcomeKind {
    HomeWin,
    Draw,
    AwayWin,
    Goals { side: Side, goals: u8 },
    GoalsTail { side: Side },
    AtMost { side: Side, goals: u8 },
    Over { side: Side, line: u8 },
    MatchOverHalf,
}

impl OutcomeKind {
    pub fn probability(&self, p: &FixtureProbabilities) -> f64 {
        let dist = |side: Side| match side {
            Side::Home => &p.home,
            Side::Away => &p.away,
        };
        match *self {
            OutcomeKind::HomeWin => p.outcome.win,
            OutcomeKind::Draw => p.outcome.draw,
            OutcomeKind::AwayWin => p.outcome.lose,
            OutcomeKind::Goals { side, goals } => dist(side).pmf[goals as usize],
            OutcomeKind::GoalsTail { side } => dist(side).tail,
            OutcomeKind::AtMost { side, goals } => dist(side).under(goals as usize),
            OutcomeKind::Over { side, line } => dist(side).over(line as usize),
            OutcomeKind::MatchOverHalf => p.over_05,
        }
    }

    pub fn all() -> Vec<OutcomeKind> {
        let mut out = vec![OutcomeKind::HomeWin, OutcomeKind::Draw, OutcomeKind::AwayWin];
        for side in [Side::Home, Side::Away] {
            for goals in 0..=MAX_GOALS as u8 {
                out.push(OutcomeKind::Goals { side, goals });
            }
            out.push(OutcomeKind::GoalsTail { side });
            for goals in 0..=MAX_GOALS as u8 {
                out.push(OutcomeKind::AtMost { side, goals });
            }
            for line in 1..=MAX_GOALS as u8 {
                out.push(OutcomeKind::Over { side, line });
            }
        }
        out.push(OutcomeKind::MatchOverHalf);
        out
    }
}

fn side_prefix(side: Side) -> char {
    match side {
        Side::Home => 'l',
        Side::Away => 'v',
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            OutcomeKind::HomeWin => write!(f, "win"),
            OutcomeKind::Draw => write!(f, "draw"),
            OutcomeKind::AwayWin => write!(f, "lose"),
            OutcomeKind::Goals { side, goals } => write!(f, "{}{goals}", side_prefix(side)),
            OutcomeKind::GoalsTail { side } => write!(f, "{}_over", side_prefix(side)),
            OutcomeKind::AtMost { side, goals } => write!(f, "a{}{goals}", side_prefix(side)),
            OutcomeKind::Over { side, line } => write!(f, "{}_{line}5", side_prefix(side)),
            OutcomeKind::MatchOverHalf => write!(f, "o_05"),
        }
    }
}

impl FromStr for OutcomeKind {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let name = raw.trim();
        let unknown = || ModelError::UnknownOutcome(raw.to_string());
        let side_of = |c: char| match c {
            'l' => Some(Side::Home),
            'v' => Some(Side::Away),
            _ => None,
        };
        let digit = |s: &str| {
            s.parse::<u8>()
                .ok()
                .filter(|n| (*n as usize) <= MAX_GOALS && s.len() == 1)
        };

        match name {
            "win" => return Ok(OutcomeKind::HomeWin),
            "draw" => return Ok(OutcomeKind::Draw),
            "lose" => return Ok(OutcomeKind::AwayWin),
            "o_05" => return Ok(OutcomeKind::MatchOverHalf),
            "l_over" => return Ok(OutcomeKind::GoalsTail { side: Side::Home }),
            "v_over" => return Ok(OutcomeKind::GoalsTail { side: Side::Away }),
            _ => {}
        }

        let mut chars = name.chars();
        let first = chars.next().ok_or_else(unknown)?;
        let rest = chars.as_str();

        if first == 'a' {
            let mut chars = rest.chars();
            let side = chars.next().and_then(side_of).ok_or_else(unknown)?;
            let goals = digit(chars.as_str()).ok_or_else(unknown)?;
            return Ok(OutcomeKind::AtMost { side, goals });
        }

        let side = side_of(first).ok_or_else(unknown)?;
        if let Some(line) = rest.strip_prefix('_') {
            let line = line
                .strip_suffix('5')
                .and_then(digit)
                .filter(|n| *n >= 1)
                .ok_or_else(unknown)?;
            return Ok(OutcomeKind::Over { side, line });
        }
        let goals = digit(rest).ok_or_else(unknown)?;
        Ok(OutcomeKind::Goals { side, goals })
    }
}

impl TryFrom<String> for OutcomeKind {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OutcomeKind> for String {
    fn from(value: OutcomeKind) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsQuote {
    pub bookmaker_id: u32,
    #[serde(default)]
    pub bookmaker: String,
    pub bet_id: u32,
    #[serde(default)]
    pub bet: String,
    pub fixture_id: u64,
    pub key: String,
    pub value: f64,
    #[serde(default)]
    pub fixture_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetParameter {
    pub bet_id: u32,
    pub key: String,
    pub prob_name: OutcomeKind,
    #[serde(default)]
    pub threshold: f64,
}

/// Bet parameters indexed by (bet id, outcome key). Built once per run so an
/// unknown probability field fails at load time, not per evaluation.
#[derive(Debug, Clone, Default)]
pub struct BetCatalog {
    params: HashMap<(u32, String), BetParameter>,
}

impl BetCatalog {
    pub fn new(params: impl IntoIterator<Item = BetParameter>) -> Self {
        Self {
            params: params
                .into_iter()
                .map(|p| ((p.bet_id, p.key.clone()), p))
                .collect(),
        }
    }

    pub fn from_raw<'a>(
        rows: impl IntoIterator<Item = (u32, &'a str, &'a str, f64)>,
    ) -> Result<Self, ModelError> {
        let mut params = Vec::new();
        for (bet_id, key, prob_name, threshold) in rows {
            params.push(BetParameter {
                bet_id,
                key: key.to_string(),
                prob_name: prob_name.parse()?,
                threshold,
            });
        }
        Ok(Self::new(params))
    }

    pub fn lookup(&self, bet_id: u32, key: &str) -> Option<&BetParameter> {
        self.params.get(&(bet_id, key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
