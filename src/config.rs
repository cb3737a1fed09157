use serde::{Deserialize, Serialize};

pub const DEFAULT_FORM_WINDOW: usize = 10;
pub const DEFAULT_KELLY_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub form_window: usize,
    pub kelly_factor: f64,
    pub overall: bool,
    pub min_team_matches: u32,
    pub min_league_matches: u32,
    pub include_non_positive: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            form_window: DEFAULT_FORM_WINDOW,
            kelly_factor: DEFAULT_KELLY_FACTOR,
            overall: false,
            min_team_matches: 3,
            min_league_matches: 5,
            include_non_positive: false,
        }
    }
}

impl ModelConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            form_window: env_parse("AVERAGES_OVER_LAST_N_MATCHES")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(d.form_window),
            kelly_factor: env_parse("KELLY_FACTOR")
                .filter(|f: &f64| f.is_finite() && *f > 0.0)
                .unwrap_or(d.kelly_factor),
            overall: env_flag("MODEL_OVERALL").unwrap_or(d.overall),
            min_team_matches: env_parse("MIN_TEAM_MATCHES").unwrap_or(d.min_team_matches),
            min_league_matches: env_parse("MIN_LEAGUE_MATCHES").unwrap_or(d.min_league_matches),
            include_non_positive: d.include_non_positive,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<T>().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    parse_flag(&raw)
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_gate() {
        let cfg = ModelConfig::default();
        assert_eq!(cfg.form_window, 10);
        assert_eq!(cfg.min_team_matches, 3);
        assert_eq!(cfg.min_league_matches, 5);
        assert!((cfg.kelly_factor - 0.5).abs() < 1e-12);
        assert!(!cfg.overall);
        assert!(!cfg.include_non_positive);
    }

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
