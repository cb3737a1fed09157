use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use betsports::ModelConfig;
use betsports::fixtures::Fixture;
use betsports::markets::{BetParameter, OddsQuote};
use betsports::store::{self, League};

#[derive(Debug, Default, Deserialize)]
struct Dump {
    #[serde(default)]
    leagues: Vec<League>,
    #[serde(default)]
    fixtures: Vec<Fixture>,
    #[serde(default)]
    odds: Vec<OddsQuote>,
    #[serde(default)]
    bet_parameters: Vec<BetParameter>,
}

fn main() -> Result<()> {
    betsports::load_dotenv();
    betsports::init_tracing();

    let input = parse_path_arg("input")
        .or_else(first_positional)
        .ok_or_else(|| anyhow!("usage: ingest_json <dump.json> [--db PATH]"))?;
    let db_path = parse_path_arg("db").unwrap_or_else(store::default_db_path);
    let cfg = ModelConfig::from_env();

    let file = File::open(&input).with_context(|| format!("open {}", input.display()))?;
    let dump: Dump = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parse {}", input.display()))?;

    let conn = store::open_db(&db_path)?;
    let tx = conn
        .unchecked_transaction()
        .context("begin ingest transaction")?;
    for league in &dump.leagues {
        store::upsert_league(&tx, league)?;
    }
    let mut seasons = BTreeSet::new();
    for fixture in &dump.fixtures {
        store::upsert_fixture(&tx, fixture)?;
        seasons.insert((fixture.league_id, fixture.season.clone()));
    }
    for quote in &dump.odds {
        store::upsert_odds(&tx, quote)?;
    }
    for param in &dump.bet_parameters {
        store::upsert_bet_parameter(&tx, param)?;
    }
    tx.commit().context("commit ingest transaction")?;

    let mut refreshed = 0usize;
    for (league_id, season) in &seasons {
        refreshed += store::refresh_form(&conn, *league_id, season, cfg.form_window)?;
    }

    println!("JSON ingest complete");
    println!("DB: {}", db_path.display());
    println!("Leagues upserted: {}", dump.leagues.len());
    println!("Fixtures upserted: {}", dump.fixtures.len());
    println!("Odds upserted: {}", dump.odds.len());
    println!("Bet parameters upserted: {}", dump.bet_parameters.len());
    println!(
        "Form refreshed: {refreshed} fixtures across {} seasons",
        seasons.len()
    );
    for (league_id, season) in &seasons {
        println!("  league {league_id} season {season}");
    }
    Ok(())
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    let prefix = format!("--{name}=");
    let bare = format!("--{name}");
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&prefix) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if *arg == bare {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}

fn first_positional() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut skip_next = false;
    for arg in &args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--db" || arg == "--input" {
            skip_next = true;
            continue;
        }
        if !arg.starts_with("--") {
            return Some(PathBuf::from(arg));
        }
    }
    None
}
