use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::info;

use betsports::config::{ModelConfig, parse_flag};
use betsports::pipeline;
use betsports::store::{self, DateFilter, FixtureQuery, LeagueFilter, OddsQuery};

const USAGE: &str = "usage: betsports <probs|kelly|recommend|refresh|result> [--db PATH] \
[--league ID] [--day YYYY-MM-DD | --from YYYY-MM-DD [--to YYYY-MM-DD] | --all] \
[--bookmaker ID] [--bet NAME] [--overall] [--window N] [--factor F] [--include-zero] \
[--even-money] [--bankroll AMOUNT] [--seed N] \
[--fixture ID --home N --away N --status CODE]";

struct Args {
    raw: Vec<String>,
}

impl Args {
    fn from_env() -> Self {
        Self {
            raw: std::env::args().skip(1).collect(),
        }
    }

    fn command(&self) -> Option<&str> {
        self.raw
            .first()
            .map(String::as_str)
            .filter(|s| !s.starts_with("--"))
    }

    fn value(&self, name: &str) -> Option<String> {
        let prefix = format!("--{name}=");
        let bare = format!("--{name}");
        for (idx, arg) in self.raw.iter().enumerate() {
            if let Some(v) = arg.strip_prefix(&prefix) {
                let v = v.trim();
                if !v.is_empty() {
                    return Some(v.to_string());
                }
            }
            if *arg == bare
                && let Some(next) = self.raw.get(idx + 1)
                && !next.starts_with("--")
                && !next.trim().is_empty()
            {
                return Some(next.trim().to_string());
            }
        }
        None
    }

    fn parsed<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>> {
        match self.value(name) {
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|_| anyhow!("invalid value for --{name}: {raw}")),
            None => Ok(None),
        }
    }

    fn flag(&self, name: &str) -> bool {
        let bare = format!("--{name}");
        if self.raw.iter().any(|a| *a == bare) {
            return true;
        }
        self.value(name)
            .and_then(|v| parse_flag(&v))
            .unwrap_or(false)
    }

    fn date(&self, name: &str) -> Result<Option<NaiveDate>> {
        self.value(name)
            .map(|raw| {
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .with_context(|| format!("invalid --{name} date {raw}"))
            })
            .transpose()
    }
}

fn main() -> Result<()> {
    betsports::load_dotenv();
    betsports::init_tracing();

    let args = Args::from_env();
    let Some(command) = args.command() else {
        eprintln!("{USAGE}");
        return Err(anyhow!("missing command"));
    };

    let db_path = args
        .value("db")
        .map(PathBuf::from)
        .unwrap_or_else(store::default_db_path);
    let conn = store::open_db(&db_path)?;
    let cfg = model_config(&args)?;
    info!(db = %db_path.display(), command, ?cfg, "starting");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match command {
        "probs" => {
            let probs = pipeline::probabilities(&conn, &fixture_query(&args)?, &cfg)?;
            let rows = pipeline::probability_rows(probs, &cfg, args.flag("even-money"));
            write_lines(&mut out, &rows)?;
        }
        "kelly" => {
            let bets = pipeline::kelly_candidates(&conn, &odds_query(&args)?, &cfg)?;
            write_lines(&mut out, &bets)?;
        }
        "recommend" => {
            let bankroll = args
                .parsed::<f64>("bankroll")?
                .context("recommend needs --bankroll")?;
            let mut rng = match args.parsed::<u64>("seed")? {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let alloc =
                pipeline::recommend(&conn, &odds_query(&args)?, &cfg, bankroll, &mut rng)?;
            write_lines(&mut out, &alloc.bets)?;
            write_line(
                &mut out,
                &serde_json::json!({
                    "bankroll": alloc.bankroll,
                    "bets": alloc.bets.len(),
                    "selected_weight": alloc.selected_weight,
                    "exhausted": alloc.exhausted,
                    "total_stake": alloc.total_stake,
                    "total_expected": alloc.total_expected,
                }),
            )?;
        }
        "refresh" => {
            let league = args.parsed::<u32>("league")?;
            for (league_id, season) in store::seasons(&conn, league)? {
                let fixtures = store::refresh_form(&conn, league_id, &season, cfg.form_window)?;
                write_line(
                    &mut out,
                    &serde_json::json!({
                        "league_id": league_id,
                        "season": season,
                        "fixtures": fixtures,
                    }),
                )?;
            }
        }
        "result" => {
            let fixture_id = args
                .parsed::<u64>("fixture")?
                .context("result needs --fixture")?;
            let status = args.value("status").unwrap_or_else(|| "FT".to_string());
            let stale = store::record_result(
                &conn,
                fixture_id,
                args.parsed::<u8>("home")?,
                args.parsed::<u8>("away")?,
                &status,
                cfg.form_window,
            )?;
            write_line(
                &mut out,
                &serde_json::json!({ "fixture_id": fixture_id, "recomputed": stale }),
            )?;
        }
        other => {
            eprintln!("{USAGE}");
            return Err(anyhow!("unknown command {other}"));
        }
    }
    out.flush().context("flush stdout")?;
    Ok(())
}

fn model_config(args: &Args) -> Result<ModelConfig> {
    let mut cfg = ModelConfig::from_env();
    if args.flag("overall") {
        cfg.overall = true;
    }
    if let Some(window) = args.parsed::<usize>("window")? {
        cfg.form_window = window.max(1);
    }
    if let Some(factor) = args.parsed::<f64>("factor")? {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(anyhow!("--factor must be positive, got {factor}"));
        }
        cfg.kelly_factor = factor;
    }
    cfg.include_non_positive = args.flag("include-zero");
    Ok(cfg)
}

fn fixture_query(args: &Args) -> Result<FixtureQuery> {
    let dates = if args.flag("all") {
        DateFilter::All
    } else if let Some(day) = args.date("day")? {
        DateFilter::Day(day)
    } else if let Some(from) = args.date("from")? {
        DateFilter::Range(from, args.date("to")?.unwrap_or(from))
    } else {
        DateFilter::upcoming()
    };
    let league = match args.parsed::<u32>("league")? {
        Some(id) => LeagueFilter::Id(id),
        None => LeagueFilter::Synced,
    };
    Ok(FixtureQuery { dates, league })
}

fn odds_query(args: &Args) -> Result<OddsQuery> {
    Ok(OddsQuery {
        fixtures: fixture_query(args)?,
        bookmaker_id: args.parsed::<u32>("bookmaker")?,
        bet_name: args.value("bet"),
    })
}

fn write_line<T: Serialize>(out: &mut impl Write, row: &T) -> Result<()> {
    let line = serde_json::to_string(row).context("serialize output row")?;
    writeln!(out, "{line}").context("write output row")?;
    Ok(())
}

fn write_lines<T: Serialize>(out: &mut impl Write, rows: &[T]) -> Result<()> {
    for row in rows {
        write_line(out, row)?;
    }
    Ok(())
}
