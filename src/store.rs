use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::fixtures::{Fixture, FixtureForm, INPLAY_STATUS};
use crate::form::FormAggregator;
use crate::markets::{BetCatalog, BetParameter, OddsQuote};

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const UPCOMING_DAYS: i64 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct League {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub sync_on: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    Day(NaiveDate),
    Range(NaiveDate, NaiveDate),
    Next { from: NaiveDateTime, days: i64 },
    All,
}

impl DateFilter {
    pub fn upcoming() -> Self {
        DateFilter::Next {
            from: Local::now().naive_local(),
            days: UPCOMING_DAYS,
        }
    }

    fn bounds(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let start = |d: NaiveDate| d.and_time(NaiveTime::MIN);
        match *self {
            DateFilter::Day(d) => Some((start(d), start(d) + Duration::days(1))),
            DateFilter::Range(a, b) => Some((start(a), start(b) + Duration::days(1))),
            DateFilter::Next { from, days } => Some((from, from + Duration::days(days))),
            DateFilter::All => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeagueFilter {
    Id(u32),
    Synced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureQuery {
    pub dates: DateFilter,
    pub league: LeagueFilter,
}

impl Default for FixtureQuery {
    fn default() -> Self {
        Self {
            dates: DateFilter::upcoming(),
            league: LeagueFilter::Synced,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OddsQuery {
    pub fixtures: FixtureQuery,
    pub bookmaker_id: Option<u32>,
    pub bet_name: Option<String>,
}

pub fn default_db_path() -> PathBuf {
    std::env::var("BETSPORTS_DB")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("betsports.sqlite"))
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS leagues (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            country TEXT NOT NULL,
            sync_on INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS fixtures (
            id INTEGER PRIMARY KEY,
            date TEXT NOT NULL,
            league_id INTEGER NOT NULL,
            season TEXT NOT NULL,
            home_team_id INTEGER NULL,
            away_team_id INTEGER NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            home_goals INTEGER NULL,
            away_goals INTEGER NULL,
            status TEXT NOT NULL,
            home_favor_goals_avg REAL NULL,
            home_against_goals_avg REAL NULL,
            away_favor_goals_avg REAL NULL,
            away_against_goals_avg REAL NULL,
            home_league_goals_avg REAL NULL,
            away_league_goals_avg REAL NULL,
            home_n INTEGER NULL,
            away_n INTEGER NULL,
            league_n INTEGER NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_fixtures_season ON fixtures(league_id, season);
        CREATE INDEX IF NOT EXISTS idx_fixtures_date ON fixtures(date);

        CREATE TABLE IF NOT EXISTS odds (
            bookmaker_id INTEGER NOT NULL,
            bookmaker TEXT NOT NULL,
            bet_id INTEGER NOT NULL,
            bet TEXT NOT NULL,
            fixture_id INTEGER NOT NULL,
            key TEXT NOT NULL,
            value REAL NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (bookmaker_id, bet_id, fixture_id, key)
        );
        CREATE INDEX IF NOT EXISTS idx_odds_fixture ON odds(fixture_id);

        CREATE TABLE IF NOT EXISTS bet_parameters (
            bet_id INTEGER NOT NULL,
            key TEXT NOT NULL,
            prob_name TEXT NOT NULL,
            threshold REAL NOT NULL,
            PRIMARY KEY (bet_id, key)
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn upsert_league(conn: &Connection, league: &League) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO leagues (id, name, country, sync_on) VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            country = excluded.country,
            sync_on = excluded.sync_on
        "#,
        params![
            league.id as i64,
            league.name,
            league.country,
            bool_to_i64(league.sync_on)
        ],
    )
    .context("upsert league")?;
    Ok(())
}

/// Insert or update a fixture. A fixture without form keeps any form already
/// cached for it.
pub fn upsert_fixture(conn: &Connection, f: &Fixture) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO fixtures (
            id, date, league_id, season,
            home_team_id, away_team_id, home_team, away_team,
            home_goals, away_goals, status, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(id) DO UPDATE SET
            date = excluded.date,
            league_id = excluded.league_id,
            season = excluded.season,
            home_team_id = excluded.home_team_id,
            away_team_id = excluded.away_team_id,
            home_team = excluded.home_team,
            away_team = excluded.away_team,
            home_goals = excluded.home_goals,
            away_goals = excluded.away_goals,
            status = excluded.status,
            updated_at = excluded.updated_at
        "#,
        params![
            f.id as i64,
            f.date.format(DATE_FORMAT).to_string(),
            f.league_id as i64,
            f.season,
            f.home_team_id as i64,
            f.away_team_id as i64,
            f.home_team,
            f.away_team,
            f.home_goals,
            f.away_goals,
            f.status,
            Utc::now().to_rfc3339(),
        ],
    )
    .with_context(|| format!("upsert fixture {}", f.id))?;
    if let Some(form) = &f.form {
        write_form(conn, f.id, form)?;
    }
    Ok(())
}

pub fn write_form(conn: &Connection, fixture_id: u64, form: &FixtureForm) -> Result<()> {
    conn.execute(
        r#"
        UPDATE fixtures SET
            home_favor_goals_avg = ?1,
            home_against_goals_avg = ?2,
            away_favor_goals_avg = ?3,
            away_against_goals_avg = ?4,
            home_league_goals_avg = ?5,
            away_league_goals_avg = ?6,
            home_n = ?7,
            away_n = ?8,
            league_n = ?9,
            updated_at = ?10
        WHERE id = ?11
        "#,
        params![
            form.home_favor_goals_avg,
            form.home_against_goals_avg,
            form.away_favor_goals_avg,
            form.away_against_goals_avg,
            form.home_league_goals_avg,
            form.away_league_goals_avg,
            form.home_n,
            form.away_n,
            form.league_n,
            Utc::now().to_rfc3339(),
            fixture_id as i64,
        ],
    )
    .with_context(|| format!("write form for fixture {fixture_id}"))?;
    Ok(())
}

pub fn upsert_odds(conn: &Connection, q: &OddsQuote) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO odds (bookmaker_id, bookmaker, bet_id, bet, fixture_id, key, value, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(bookmaker_id, bet_id, fixture_id, key) DO UPDATE SET
            bookmaker = excluded.bookmaker,
            bet = excluded.bet,
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
        params![
            q.bookmaker_id as i64,
            q.bookmaker,
            q.bet_id as i64,
            q.bet,
            q.fixture_id as i64,
            q.key,
            q.value,
            Utc::now().to_rfc3339(),
        ],
    )
    .context("upsert odds")?;
    Ok(())
}

pub fn upsert_bet_parameter(conn: &Connection, p: &BetParameter) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO bet_parameters (bet_id, key, prob_name, threshold) VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(bet_id, key) DO UPDATE SET
            prob_name = excluded.prob_name,
            threshold = excluded.threshold
        "#,
        params![p.bet_id as i64, p.key, p.prob_name.to_string(), p.threshold],
    )
    .context("upsert bet parameter")?;
    Ok(())
}

const FIXTURE_SELECT: &str = r#"
    SELECT
        f.id, f.date, f.league_id, COALESCE(l.name, ''), COALESCE(l.country, ''), f.season,
        f.home_team_id, f.away_team_id, f.home_team, f.away_team,
        f.home_goals, f.away_goals, f.status,
        f.home_favor_goals_avg, f.home_against_goals_avg,
        f.away_favor_goals_avg, f.away_against_goals_avg,
        f.home_league_goals_avg, f.away_league_goals_avg,
        f.home_n, f.away_n, f.league_n
    FROM fixtures f
    LEFT JOIN leagues l ON l.id = f.league_id
"#;

fn parse_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn fixture_from_row(row: &Row<'_>) -> rusqlite::Result<Fixture> {
    let home_n: Option<u32> = row.get(19)?;
    let away_n: Option<u32> = row.get(20)?;
    let league_n: Option<u32> = row.get(21)?;
    let form = match (home_n, away_n, league_n) {
        (Some(home_n), Some(away_n), Some(league_n)) => Some(FixtureForm {
            home_favor_goals_avg: row.get(13)?,
            home_against_goals_avg: row.get(14)?,
            away_favor_goals_avg: row.get(15)?,
            away_against_goals_avg: row.get(16)?,
            home_league_goals_avg: row.get(17)?,
            away_league_goals_avg: row.get(18)?,
            home_n,
            away_n,
            league_n,
        }),
        _ => None,
    };
    Ok(Fixture {
        id: row.get::<_, u64>(0)?,
        date: parse_date(row, 1)?,
        league_id: row.get::<_, u32>(2)?,
        league_name: row.get(3)?,
        country: row.get(4)?,
        season: row.get(5)?,
        home_team_id: row.get::<_, Option<u32>>(6)?.unwrap_or_default(),
        away_team_id: row.get::<_, Option<u32>>(7)?.unwrap_or_default(),
        home_team: row.get(8)?,
        away_team: row.get(9)?,
        home_goals: row.get(10)?,
        away_goals: row.get(11)?,
        status: row.get(12)?,
        form,
    })
}

fn fixture_filter(q: &FixtureQuery, clauses: &mut Vec<String>, values: &mut Vec<Value>) {
    if let Some((from, to)) = q.dates.bounds() {
        clauses.push("f.date >= ? AND f.date < ?".to_string());
        values.push(Value::Text(from.format(DATE_FORMAT).to_string()));
        values.push(Value::Text(to.format(DATE_FORMAT).to_string()));
    }
    if q.dates != DateFilter::All {
        let marks = vec!["?"; INPLAY_STATUS.len()].join(", ");
        clauses.push(format!("f.status IN ({marks})"));
        values.extend(INPLAY_STATUS.iter().map(|s| Value::Text(s.to_string())));
    }
    match q.league {
        LeagueFilter::Id(id) => {
            clauses.push("f.league_id = ?".to_string());
            values.push(Value::Integer(id as i64));
        }
        LeagueFilter::Synced => clauses.push("l.sync_on = 1".to_string()),
    }
    clauses.push("f.home_team_id IS NOT NULL AND f.away_team_id IS NOT NULL".to_string());
}

fn where_sql(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    }
}

pub fn query_fixtures(conn: &Connection, q: &FixtureQuery) -> Result<Vec<Fixture>> {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    fixture_filter(q, &mut clauses, &mut values);
    let sql = format!(
        "{FIXTURE_SELECT} {} ORDER BY f.date ASC, f.id ASC",
        where_sql(&clauses)
    );

    let mut stmt = conn.prepare(&sql).context("prepare fixtures query")?;
    let rows = stmt
        .query_map(params_from_iter(values), fixture_from_row)
        .context("query fixtures")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode fixture row")?);
    }
    debug!(rows = out.len(), "fixtures loaded");
    Ok(out)
}

pub fn query_odds(conn: &Connection, q: &OddsQuery) -> Result<Vec<OddsQuote>> {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    fixture_filter(&q.fixtures, &mut clauses, &mut values);
    if let Some(id) = q.bookmaker_id {
        clauses.push("o.bookmaker_id = ?".to_string());
        values.push(Value::Integer(id as i64));
    }
    if let Some(bet) = &q.bet_name {
        clauses.push("o.bet = ?".to_string());
        values.push(Value::Text(bet.clone()));
    }
    let sql = format!(
        r#"
        SELECT o.bookmaker_id, o.bookmaker, o.bet_id, o.bet, o.fixture_id, o.key, o.value, f.date
        FROM odds o
        JOIN fixtures f ON f.id = o.fixture_id
        JOIN bet_parameters p ON p.bet_id = o.bet_id AND p.key = o.key
        LEFT JOIN leagues l ON l.id = f.league_id
        {}
        ORDER BY f.date ASC, o.fixture_id ASC, o.bookmaker_id ASC, o.bet_id ASC, o.key ASC
        "#,
        where_sql(&clauses)
    );

    let mut stmt = conn.prepare(&sql).context("prepare odds query")?;
    let rows = stmt
        .query_map(params_from_iter(values), |row| {
            Ok(OddsQuote {
                bookmaker_id: row.get::<_, u32>(0)?,
                bookmaker: row.get(1)?,
                bet_id: row.get::<_, u32>(2)?,
                bet: row.get(3)?,
                fixture_id: row.get::<_, u64>(4)?,
                key: row.get(5)?,
                value: row.get(6)?,
                fixture_date: Some(parse_date(row, 7)?),
            })
        })
        .context("query odds")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode odds row")?);
    }
    debug!(rows = out.len(), "odds loaded");
    Ok(out)
}

pub fn load_bet_catalog(conn: &Connection) -> Result<BetCatalog> {
    let mut stmt = conn
        .prepare("SELECT bet_id, key, prob_name, threshold FROM bet_parameters ORDER BY bet_id, key")
        .context("prepare bet parameters query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })
        .context("query bet parameters")?;
    let mut raw = Vec::new();
    for row in rows {
        raw.push(row.context("decode bet parameter row")?);
    }
    let catalog = BetCatalog::from_raw(
        raw.iter()
            .map(|(bet_id, key, name, threshold)| (*bet_id, key.as_str(), name.as_str(), *threshold)),
    )
    .context("load bet catalog")?;
    debug!(params = catalog.len(), "bet catalog loaded");
    Ok(catalog)
}

pub fn load_season(conn: &Connection, league_id: u32, season: &str) -> Result<Vec<Fixture>> {
    let sql = format!(
        "{FIXTURE_SELECT} WHERE f.league_id = ?1 AND f.season = ?2
         AND f.home_team_id IS NOT NULL AND f.away_team_id IS NOT NULL
         ORDER BY f.date ASC, f.id ASC"
    );
    let mut stmt = conn.prepare(&sql).context("prepare season query")?;
    let rows = stmt
        .query_map(params![league_id as i64, season], fixture_from_row)
        .context("query season")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode fixture row")?);
    }
    Ok(out)
}

pub fn seasons(conn: &Connection, league_id: Option<u32>) -> Result<Vec<(u32, String)>> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT league_id, season FROM fixtures
             WHERE ?1 IS NULL OR league_id = ?1
             ORDER BY league_id, season",
        )
        .context("prepare seasons query")?;
    let rows = stmt
        .query_map(params![league_id.map(|id| id as i64)], |row| {
            Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?))
        })
        .context("query seasons")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode season row")?);
    }
    Ok(out)
}

pub fn refresh_form(conn: &Connection, league_id: u32, season: &str, window: usize) -> Result<usize> {
    let fixtures = load_season(conn, league_id, season)?;
    let agg = FormAggregator::with_history(window, fixtures);
    let mut rows = agg.season_fixtures(league_id, season);
    agg.attach_forms(&mut rows);

    let tx = conn
        .unchecked_transaction()
        .context("begin form refresh transaction")?;
    for f in &rows {
        if let Some(form) = &f.form {
            write_form(&tx, f.id, form)?;
        }
    }
    tx.commit().context("commit form refresh")?;
    info!(league_id, season, fixtures = rows.len(), "form refreshed");
    Ok(rows.len())
}

/// Store a (possibly partial) score and recompute the cached form of every
/// fixture in the same league season dated at or after it. Returns the ids
/// that were recomputed.
pub fn record_result(
    conn: &Connection,
    fixture_id: u64,
    home_goals: Option<u8>,
    away_goals: Option<u8>,
    status: &str,
    window: usize,
) -> Result<Vec<u64>> {
    let (league_id, season) = conn
        .query_row(
            "SELECT league_id, season FROM fixtures WHERE id = ?1",
            params![fixture_id as i64],
            |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()
        .context("look up fixture")?
        .ok_or_else(|| anyhow!("unknown fixture {fixture_id}"))?;

    let agg = FormAggregator::with_history(window, load_season(conn, league_id, &season)?);
    // A fixture without both teams has no form history to update.
    let stale = agg
        .apply_result(fixture_id, home_goals, away_goals, status)
        .unwrap_or_default();
    let mut rows: Vec<Fixture> = agg
        .season_fixtures(league_id, &season)
        .into_iter()
        .filter(|f| stale.contains(&f.id))
        .collect();
    agg.attach_forms(&mut rows);

    let tx = conn
        .unchecked_transaction()
        .context("begin result transaction")?;
    tx.execute(
        "UPDATE fixtures SET home_goals = ?1, away_goals = ?2, status = ?3, updated_at = ?4 WHERE id = ?5",
        params![
            home_goals,
            away_goals,
            status,
            Utc::now().to_rfc3339(),
            fixture_id as i64
        ],
    )
    .context("update fixture result")?;
    for f in &rows {
        if let Some(form) = &f.form {
            write_form(&tx, f.id, form)?;
        }
    }
    tx.commit().context("commit result")?;
    info!(fixture_id, recomputed = rows.len(), "result recorded");
    Ok(rows.iter().map(|f| f.id).collect())
}

fn bool_to_i64(value: bool) -> i64 {
    if value { 1 } else { 0 }
}
