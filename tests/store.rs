use chrono::{NaiveDate, NaiveDateTime};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rusqlite::{Connection, params};

use betsports::ModelConfig;
use betsports::fixtures::Fixture;
use betsports::markets::{BetParameter, OddsQuote, OutcomeKind};
use betsports::pipeline;
use betsports::store::{
    self, DateFilter, FixtureQuery, League, LeagueFilter, OddsQuery, load_bet_catalog,
    query_fixtures, query_odds, record_result, refresh_form,
};

fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|d| d.and_hms_opt(h, 0, 0))
        .unwrap()
}

fn match_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 14).unwrap()
}

fn fixture(
    id: u64,
    date: NaiveDateTime,
    league_id: u32,
    home: u32,
    away: u32,
    goals: Option<(u8, u8)>,
) -> Fixture {
    Fixture {
        id,
        date,
        league_id,
        league_name: String::new(),
        country: String::new(),
        season: "2024".to_string(),
        home_team_id: home,
        away_team_id: away,
        home_team: format!("Team {home}"),
        away_team: format!("Team {away}"),
        home_goals: goals.map(|g| g.0),
        away_goals: goals.map(|g| g.1),
        status: if goals.is_some() { "FT" } else { "NS" }.to_string(),
        form: None,
    }
}

fn quote(bookmaker_id: u32, fixture_id: u64, key: &str, value: f64) -> OddsQuote {
    OddsQuote {
        bookmaker_id,
        bookmaker: format!("Book {bookmaker_id}"),
        bet_id: 1,
        bet: "Match Winner".to_string(),
        fixture_id,
        key: key.to_string(),
        value,
        fixture_date: None,
    }
}

/// Team 1 has four home wins 2-1 over team 3; team 2 four away draws 1-1 at
/// team 4. Fixture 100 (1 v 2) is scheduled on the match day.
fn seeded() -> Connection {
    let conn = store::open_in_memory().unwrap();
    store::upsert_league(
        &conn,
        &League {
            id: 39,
            name: "Premier League".to_string(),
            country: "England".to_string(),
            sync_on: true,
        },
    )
    .unwrap();
    store::upsert_league(
        &conn,
        &League {
            id: 140,
            name: "La Liga".to_string(),
            country: "Spain".to_string(),
            sync_on: false,
        },
    )
    .unwrap();

    for k in 0..4u32 {
        let day = 3 + 7 * k;
        store::upsert_fixture(&conn, &fixture(10 + k as u64, at(2024, 8, day, 15), 39, 1, 3, Some((2, 1))))
            .unwrap();
        store::upsert_fixture(&conn, &fixture(20 + k as u64, at(2024, 8, day, 17), 39, 4, 2, Some((1, 1))))
            .unwrap();
    }
    store::upsert_fixture(&conn, &fixture(100, at(2024, 9, 14, 15), 39, 1, 2, None)).unwrap();
    store::upsert_fixture(&conn, &fixture(200, at(2024, 9, 14, 18), 140, 7, 8, None)).unwrap();
    conn.execute(
        "INSERT INTO fixtures (id, date, league_id, season, home_team_id, away_team_id,
             home_team, away_team, status, updated_at)
         VALUES (300, '2024-09-14 20:00:00', 39, '2024', NULL, 4, 'TBD', 'Team 4', 'NS', '')",
        [],
    )
    .unwrap();

    for (bookmaker, key, value) in [
        (8, "Home", 2.0),
        (8, "Draw", 3.6),
        (8, "Away", 4.5),
        (6, "Home", 1.9),
    ] {
        store::upsert_odds(&conn, &quote(bookmaker, 100, key, value)).unwrap();
    }
    for (key, prob_name) in [("Home", OutcomeKind::HomeWin), ("Draw", OutcomeKind::Draw)] {
        store::upsert_bet_parameter(
            &conn,
            &BetParameter {
                bet_id: 1,
                key: key.to_string(),
                prob_name,
                threshold: 0.0,
            },
        )
        .unwrap();
    }
    refresh_form(&conn, 39, "2024", 10).unwrap();
    refresh_form(&conn, 140, "2024", 10).unwrap();
    conn
}

fn match_day_query() -> FixtureQuery {
    FixtureQuery {
        dates: DateFilter::Day(match_day()),
        league: LeagueFilter::Synced,
    }
}

#[test]
fn match_day_query_returns_synced_fixture_with_form() {
    let conn = seeded();
    let rows = query_fixtures(&conn, &match_day_query()).unwrap();
    let ids: Vec<u64> = rows.iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![100]);

    let f = &rows[0];
    assert_eq!(f.league_name, "Premier League");
    assert_eq!(f.country, "England");
    let form = f.form.expect("form cached by refresh");
    assert_eq!((form.home_n, form.away_n, form.league_n), (4, 4, 8));
    assert_eq!(form.home_favor_goals_avg, Some(2.0));
    assert_eq!(form.home_against_goals_avg, Some(1.0));
    assert_eq!(form.away_favor_goals_avg, Some(1.0));
    assert_eq!(form.home_league_goals_avg, Some(1.5));
    assert_eq!(form.away_league_goals_avg, Some(1.0));
}

#[test]
fn status_and_league_filters() {
    let conn = seeded();

    let august = FixtureQuery {
        dates: DateFilter::Range(
            NaiveDate::from_ymd_opt(2024, 8, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 8, 31).unwrap(),
        ),
        league: LeagueFilter::Id(39),
    };
    assert!(query_fixtures(&conn, &august).unwrap().is_empty());

    let all = FixtureQuery {
        dates: DateFilter::All,
        league: LeagueFilter::Id(39),
    };
    assert_eq!(query_fixtures(&conn, &all).unwrap().len(), 9);

    let spain = FixtureQuery {
        dates: DateFilter::Day(match_day()),
        league: LeagueFilter::Id(140),
    };
    let ids: Vec<u64> = query_fixtures(&conn, &spain)
        .unwrap()
        .iter()
        .map(|f| f.id)
        .collect();
    assert_eq!(ids, vec![200]);
}

#[test]
fn upcoming_window_is_relative_to_its_start() {
    let conn = seeded();
    let q = FixtureQuery {
        dates: DateFilter::Next {
            from: at(2024, 9, 10, 0),
            days: 8,
        },
        league: LeagueFilter::Synced,
    };
    assert_eq!(query_fixtures(&conn, &q).unwrap().len(), 1);
    let late = FixtureQuery {
        dates: DateFilter::Next {
            from: at(2024, 9, 15, 0),
            days: 8,
        },
        league: LeagueFilter::Synced,
    };
    assert!(query_fixtures(&conn, &late).unwrap().is_empty());
}

#[test]
fn refetched_fixture_keeps_cached_form() {
    let conn = seeded();
    store::upsert_fixture(&conn, &fixture(100, at(2024, 9, 14, 16), 39, 1, 2, None)).unwrap();
    let rows = query_fixtures(&conn, &match_day_query()).unwrap();
    assert_eq!(rows[0].date, at(2024, 9, 14, 16));
    assert!(rows[0].form.is_some());
}

#[test]
fn odds_query_filters_by_bookmaker_bet_and_catalog() {
    let conn = seeded();
    let q = OddsQuery {
        fixtures: match_day_query(),
        bookmaker_id: Some(8),
        bet_name: Some("Match Winner".to_string()),
    };
    let keys: Vec<String> = query_odds(&conn, &q)
        .unwrap()
        .into_iter()
        .map(|o| o.key)
        .collect();
    // "Away" has no bet parameter.
    assert_eq!(keys, vec!["Draw".to_string(), "Home".to_string()]);

    let any_book = OddsQuery {
        fixtures: match_day_query(),
        ..OddsQuery::default()
    };
    let rows = query_odds(&conn, &any_book).unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|o| o.fixture_date == Some(at(2024, 9, 14, 15))));

    let other_bet = OddsQuery {
        fixtures: match_day_query(),
        bookmaker_id: None,
        bet_name: Some("Goals Over/Under".to_string()),
    };
    assert!(query_odds(&conn, &other_bet).unwrap().is_empty());
}

#[test]
fn odds_upsert_replaces_the_price() {
    let conn = seeded();
    store::upsert_odds(&conn, &quote(8, 100, "Home", 2.25)).unwrap();
    let q = OddsQuery {
        fixtures: match_day_query(),
        bookmaker_id: Some(8),
        bet_name: None,
    };
    let home = query_odds(&conn, &q)
        .unwrap()
        .into_iter()
        .find(|o| o.key == "Home")
        .unwrap();
    assert_eq!(home.value, 2.25);
}

#[test]
fn unknown_probability_field_fails_catalog_load() {
    let conn = seeded();
    assert_eq!(load_bet_catalog(&conn).unwrap().len(), 2);
    conn.execute(
        "INSERT INTO bet_parameters (bet_id, key, prob_name, threshold) VALUES (?1, ?2, ?3, ?4)",
        params![5, "Over 9.5", "l_95", 0.5],
    )
    .unwrap();
    let err = load_bet_catalog(&conn).unwrap_err();
    assert!(format!("{err:#}").contains("l_95"));
}

#[test]
fn recorded_result_recomputes_later_form() {
    let conn = seeded();
    let stale = record_result(&conn, 13, Some(5), Some(1), "FT", 10).unwrap();
    assert!(stale.contains(&13));
    assert!(stale.contains(&100));
    assert!(!stale.contains(&10));

    let f = query_fixtures(&conn, &match_day_query()).unwrap().remove(0);
    let form = f.form.unwrap();
    assert_eq!(form.home_favor_goals_avg, Some(2.75));
    assert_eq!(form.home_league_goals_avg, Some(1.875));

    assert!(record_result(&conn, 9999, Some(1), Some(0), "FT", 10).is_err());
}

#[test]
fn narrower_window_changes_counts() {
    let conn = seeded();
    refresh_form(&conn, 39, "2024", 2).unwrap();
    let form = query_fixtures(&conn, &match_day_query()).unwrap()[0]
        .form
        .unwrap();
    assert_eq!((form.home_n, form.away_n, form.league_n), (2, 2, 8));
}

#[test]
fn end_to_end_recommendation() {
    let conn = seeded();
    let cfg = ModelConfig::default();
    let q = OddsQuery {
        fixtures: match_day_query(),
        ..OddsQuery::default()
    };

    let probs = pipeline::probabilities(&conn, &q.fixtures, &cfg).unwrap();
    assert_eq!(probs.len(), 1);
    assert!((probs[0].expected.home_rate - 2.0).abs() < 1e-12);

    let bets = pipeline::kelly_candidates(&conn, &q, &cfg).unwrap();
    assert!(!bets.is_empty());
    assert!(bets.iter().all(|b| b.kelly > 0.0));
    assert!(bets.windows(2).all(|w| w[0].kelly >= w[1].kelly));

    let mut rng = StdRng::seed_from_u64(4);
    let alloc = pipeline::recommend(&conn, &q, &cfg, 250.0, &mut rng).unwrap();
    assert!(!alloc.bets.is_empty());
    assert!((alloc.total_stake - 250.0).abs() < 1e-9);
    assert!(alloc.total_expected > alloc.total_stake);

    assert!(pipeline::recommend(&conn, &q, &cfg, -1.0, &mut rng).is_err());
}

#[test]
fn rows_without_teams_stay_out_of_form_history() {
    let conn = seeded();
    let season = store::load_season(&conn, 39, "2024").unwrap();
    assert_eq!(season.len(), 9);
    assert!(season.iter().all(|f| f.id != 300));

    // Two unrelated null-team results must not become one shared history.
    conn.execute(
        "INSERT INTO fixtures (id, date, league_id, season, home_team_id, away_team_id,
             home_team, away_team, home_goals, away_goals, status, updated_at)
         VALUES (301, '2024-09-01 20:00:00', 39, '2024', NULL, 1, 'TBD', 'Team 1', 6, 0, 'FT', '')",
        [],
    )
    .unwrap();
    let stale = record_result(&conn, 300, Some(7), Some(0), "FT", 10).unwrap();
    assert!(stale.is_empty());
    refresh_form(&conn, 39, "2024", 10).unwrap();

    let form = query_fixtures(&conn, &match_day_query()).unwrap()[0]
        .form
        .unwrap();
    assert_eq!(form.league_n, 8);
    assert_eq!(form.home_league_goals_avg, Some(1.5));

    let (home_goals, status): (Option<u8>, String) = conn
        .query_row(
            "SELECT home_goals, status FROM fixtures WHERE id = 300",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!((home_goals, status.as_str()), (Some(7), "FT"));
}
