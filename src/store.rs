use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{Connection, OptionalExtension, params};

use crate::competition::{CompetitionParams, FinishedScore};
use crate::error::EngineError;
use crate::match_events::{EventTally, MatchEvent, tally};
use crate::performance::MatchStats;
use crate::rating::{ClubRatings, WINDOW_CAPACITY};
use crate::replay::{MatchPrediction, MatchUpdate, SeasonInput, SeasonMatch};
use crate::scheduler::Projection;
use crate::standings::{
    DeductionLedger, MarketValue, PointsDeduction, TableSnapshot, form_from_string, form_to_string,
};
use crate::{ClubId, CompetitionId, MatchId, Season};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS competitions (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            avg_base REAL NULL,
            home_advantage REAL NULL,
            transfer_intercept REAL NULL,
            transfer_off_slope REAL NULL,
            transfer_def_slope REAL NULL
        );

        CREATE TABLE IF NOT EXISTS clubs (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS clubs_competitions (
            competition_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            club_id INTEGER NOT NULL,
            PRIMARY KEY (competition_id, season, club_id)
        );

        CREATE TABLE IF NOT EXISTS market_values (
            club_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            off_value REAL NOT NULL,
            def_value REAL NOT NULL,
            PRIMARY KEY (club_id, season)
        );

        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY,
            competition_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            matchweek INTEGER NOT NULL,
            time TEXT NOT NULL,
            completed INTEGER NOT NULL,
            home_id INTEGER NOT NULL,
            away_id INTEGER NOT NULL,
            score_home INTEGER NULL,
            score_away INTEGER NULL,
            ag_home REAL NULL,
            ag_away REAL NULL,
            xg_home REAL NULL,
            xg_away REAL NULL,
            home_off REAL NULL,
            home_def REAL NULL,
            home_efi REAL NULL,
            away_off REAL NULL,
            away_def REAL NULL,
            away_efi REAL NULL,
            prob_home REAL NULL,
            prob_draw REAL NULL,
            prob_away REAL NULL,
            mp_off_home REAL NULL,
            mp_def_home REAL NULL,
            mp_off_away REAL NULL,
            mp_def_away REAL NULL,
            display_matchweek INTEGER NULL
        );
        CREATE INDEX IF NOT EXISTS idx_matches_season ON matches(competition_id, season);
        CREATE INDEX IF NOT EXISTS idx_matches_time ON matches(time);

        CREATE TABLE IF NOT EXISTS deductions (
            competition_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            club_id INTEGER NOT NULL,
            effective TEXT NOT NULL,
            change INTEGER NOT NULL,
            PRIMARY KEY (competition_id, season, club_id, effective)
        );

        CREATE TABLE IF NOT EXISTS history (
            competition_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            club_id INTEGER NOT NULL,
            match_id INTEGER NULL,
            off REAL NOT NULL,
            def REAL NOT NULL,
            efi REAL NOT NULL,
            form TEXT NOT NULL,
            mp INTEGER NOT NULL,
            w INTEGER NOT NULL,
            d INTEGER NOT NULL,
            l INTEGER NOT NULL,
            gf INTEGER NOT NULL,
            ga INTEGER NOT NULL,
            gd INTEGER NOT NULL,
            pts INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_history_club ON history(competition_id, season, club_id);

        CREATE TABLE IF NOT EXISTS projections (
            competition_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            club_id INTEGER NOT NULL,
            matchweek INTEGER NOT NULL,
            update_date TEXT NOT NULL,
            positions TEXT NOT NULL,
            avg_gd REAL NOT NULL,
            avg_pts REAL NOT NULL,
            PRIMARY KEY (competition_id, season, club_id, matchweek)
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn upsert_competition(conn: &Connection, c: &CompetitionParams) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO competitions (
            id, name, avg_base, home_advantage,
            transfer_intercept, transfer_off_slope, transfer_def_slope
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            avg_base = excluded.avg_base,
            home_advantage = excluded.home_advantage,
            transfer_intercept = excluded.transfer_intercept,
            transfer_off_slope = excluded.transfer_off_slope,
            transfer_def_slope = excluded.transfer_def_slope
        "#,
        params![
            c.id as i64,
            c.name,
            c.avg_base,
            c.home_advantage,
            c.transfer_intercept,
            c.transfer_off_slope,
            c.transfer_def_slope
        ],
    )
    .context("upsert competition")?;
    Ok(())
}

pub fn load_competition(conn: &Connection, id: CompetitionId) -> Result<CompetitionParams> {
    let found = conn
        .query_row(
            r#"
            SELECT id, name, avg_base, home_advantage,
                   transfer_intercept, transfer_off_slope, transfer_def_slope
            FROM competitions
            WHERE id = ?1
            "#,
            params![id as i64],
            |row| {
                Ok(CompetitionParams {
                    id: row.get::<_, u32>(0)?,
                    name: row.get(1)?,
                    avg_base: row.get(2)?,
                    home_advantage: row.get(3)?,
                    transfer_intercept: row.get(4)?,
                    transfer_off_slope: row.get(5)?,
                    transfer_def_slope: row.get(6)?,
                })
            },
        )
        .optional()
        .context("query competition")?;
    found.ok_or_else(|| EngineError::UnknownCompetition(id).into())
}

pub fn upsert_club(conn: &Connection, id: ClubId, name: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO clubs (id, name) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        params![id as i64, name],
    )
    .context("upsert club")?;
    Ok(())
}

pub fn add_season_club(
    conn: &Connection,
    competition_id: CompetitionId,
    season: Season,
    club_id: ClubId,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO clubs_competitions (competition_id, season, club_id)
         VALUES (?1, ?2, ?3)",
        params![competition_id as i64, season, club_id as i64],
    )
    .context("insert season club")?;
    Ok(())
}

pub fn load_season_clubs(
    conn: &Connection,
    competition_id: CompetitionId,
    season: Season,
) -> Result<Vec<ClubId>> {
    let mut stmt = conn
        .prepare(
            "SELECT club_id FROM clubs_competitions
             WHERE competition_id = ?1 AND season = ?2
             ORDER BY club_id",
        )
        .context("prepare season clubs query")?;
    let rows = stmt
        .query_map(params![competition_id as i64, season], |row| {
            row.get::<_, u32>(0)
        })
        .context("query season clubs")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode season club row")?);
    }
    Ok(out)
}

pub fn upsert_market_value(conn: &Connection, season: Season, v: &MarketValue) -> Result<()> {
    conn.execute(
        "INSERT INTO market_values (club_id, season, off_value, def_value)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(club_id, season) DO UPDATE SET
             off_value = excluded.off_value,
             def_value = excluded.def_value",
        params![v.club_id as i64, season, v.off_value, v.def_value],
    )
    .context("upsert market value")?;
    Ok(())
}

pub fn load_market_values(conn: &Connection, season: Season) -> Result<Vec<MarketValue>> {
    let mut stmt = conn
        .prepare(
            "SELECT club_id, off_value, def_value FROM market_values
             WHERE season = ?1
             ORDER BY club_id",
        )
        .context("prepare market values query")?;
    let rows = stmt
        .query_map(params![season], |row| {
            Ok(MarketValue {
                club_id: row.get::<_, u32>(0)?,
                off_value: row.get(1)?,
                def_value: row.get(2)?,
            })
        })
        .context("query market values")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode market value row")?);
    }
    Ok(out)
}

pub fn upsert_match(
    conn: &Connection,
    competition_id: CompetitionId,
    season: Season,
    m: &SeasonMatch,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO matches (
            id, competition_id, season, matchweek, time, completed,
            home_id, away_id, score_home, score_away,
            ag_home, ag_away, xg_home, xg_away
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT(id) DO UPDATE SET
            matchweek = excluded.matchweek,
            time = excluded.time,
            completed = excluded.completed,
            score_home = excluded.score_home,
            score_away = excluded.score_away,
            ag_home = excluded.ag_home,
            ag_away = excluded.ag_away,
            xg_home = excluded.xg_home,
            xg_away = excluded.xg_away
        "#,
        params![
            m.id as i64,
            competition_id as i64,
            season,
            m.matchweek as i64,
            m.time.format(TIME_FORMAT).to_string(),
            i64::from(m.completed),
            m.home as i64,
            m.away as i64,
            m.score_home,
            m.score_away,
            m.stats.adjusted_goals_home,
            m.stats.adjusted_goals_away,
            m.stats.xg_home,
            m.stats.xg_away
        ],
    )
    .context("upsert match")?;
    Ok(())
}

/// All matches of a season in kick-off order.
pub fn load_matches(
    conn: &Connection,
    competition_id: CompetitionId,
    season: Season,
) -> Result<Vec<SeasonMatch>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, matchweek, time, completed, home_id, away_id,
                   score_home, score_away, ag_home, ag_away, xg_home, xg_away
            FROM matches
            WHERE competition_id = ?1 AND season = ?2
            ORDER BY time ASC, id ASC
            "#,
        )
        .context("prepare load matches query")?;
    let rows = stmt
        .query_map(params![competition_id as i64, season], |row| {
            Ok((
                row.get::<_, u64>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)? != 0,
                row.get::<_, u32>(4)?,
                row.get::<_, u32>(5)?,
                row.get::<_, Option<u32>>(6)?,
                row.get::<_, Option<u32>>(7)?,
                MatchStats {
                    adjusted_goals_home: row.get(8)?,
                    adjusted_goals_away: row.get(9)?,
                    xg_home: row.get(10)?,
                    xg_away: row.get(11)?,
                },
            ))
        })
        .context("query load matches")?;

    let mut out = Vec::new();
    for row in rows {
        let (id, matchweek, time, completed, home, away, score_home, score_away, stats) =
            row.context("decode match row")?;
        out.push(SeasonMatch {
            id,
            matchweek,
            time: parse_time(&time)?,
            home,
            away,
            completed,
            score_home,
            score_away,
            stats,
        });
    }
    Ok(out)
}

pub fn load_finished_scores(
    conn: &Connection,
    competition_id: CompetitionId,
) -> Result<Vec<FinishedScore>> {
    let mut stmt = conn
        .prepare(
            "SELECT score_home, score_away FROM matches
             WHERE competition_id = ?1
               AND completed = 1
               AND score_home IS NOT NULL
               AND score_away IS NOT NULL",
        )
        .context("prepare finished scores query")?;
    let rows = stmt
        .query_map(params![competition_id as i64], |row| {
            Ok(FinishedScore {
                home_goals: row.get(0)?,
                away_goals: row.get(1)?,
            })
        })
        .context("query finished scores")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode finished score row")?);
    }
    Ok(out)
}

pub fn insert_deduction(conn: &Connection, d: &PointsDeduction) -> Result<()> {
    conn.execute(
        "INSERT INTO deductions (competition_id, season, club_id, effective, change)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(competition_id, season, club_id, effective) DO UPDATE SET
             change = excluded.change",
        params![
            d.competition_id as i64,
            d.season,
            d.club_id as i64,
            d.effective.format(DATE_FORMAT).to_string(),
            d.change
        ],
    )
    .context("insert deduction")?;
    Ok(())
}

pub fn load_deductions(
    conn: &Connection,
    competition_id: CompetitionId,
    season: Season,
) -> Result<Vec<PointsDeduction>> {
    let mut stmt = conn
        .prepare(
            "SELECT club_id, effective, change FROM deductions
             WHERE competition_id = ?1 AND season = ?2
             ORDER BY effective, club_id",
        )
        .context("prepare deductions query")?;
    let rows = stmt
        .query_map(params![competition_id as i64, season], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i32>(2)?,
            ))
        })
        .context("query deductions")?;
    let mut out = Vec::new();
    for row in rows {
        let (club_id, effective, change) = row.context("decode deduction row")?;
        out.push(PointsDeduction {
            competition_id,
            season,
            club_id,
            effective: parse_date(&effective)?,
            change,
        });
    }
    Ok(out)
}

/// Everything a season replay reads from the database.
pub fn load_season_input(
    conn: &Connection,
    competition_id: CompetitionId,
    season: Season,
    postponed: BTreeSet<u32>,
) -> Result<SeasonInput> {
    Ok(SeasonInput {
        season,
        clubs: load_season_clubs(conn, competition_id, season)?,
        market_values: load_market_values(conn, season)?,
        matches: load_matches(conn, competition_id, season)?,
        deductions: DeductionLedger::new(load_deductions(conn, competition_id, season)?),
        postponed,
    })
}

/// Up to 25 most recent performances per club this season, newest first,
/// with the preseason seed as the oldest entry.
pub fn load_recent_performances(
    conn: &Connection,
    competition_id: CompetitionId,
    season: Season,
) -> Result<BTreeMap<ClubId, ClubRatings>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT NULL AS time, club_id, off AS mp_off, def AS mp_def
            FROM history
            WHERE competition_id = ?1 AND season = ?2 AND match_id IS NULL
            UNION ALL
            SELECT time, home_id, mp_off_home, mp_def_home
            FROM matches
            WHERE competition_id = ?1 AND season = ?2 AND completed = 1
              AND mp_off_home IS NOT NULL AND mp_def_home IS NOT NULL
            UNION ALL
            SELECT time, away_id, mp_off_away, mp_def_away
            FROM matches
            WHERE competition_id = ?1 AND season = ?2 AND completed = 1
              AND mp_off_away IS NOT NULL AND mp_def_away IS NOT NULL
            ORDER BY 1 DESC
            "#,
        )
        .context("prepare recent performances query")?;
    let rows = stmt
        .query_map(params![competition_id as i64, season], |row| {
            Ok((
                row.get::<_, u32>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })
        .context("query recent performances")?;

    let mut windows: BTreeMap<ClubId, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for row in rows {
        let (club_id, off, def) = row.context("decode performance row")?;
        let (offs, defs) = windows.entry(club_id).or_default();
        if offs.len() < WINDOW_CAPACITY {
            offs.push(off);
            defs.push(def);
        }
    }

    windows
        .into_iter()
        .map(|(club_id, (offs, defs))| {
            let ratings = ClubRatings::from_recent(&offs, &defs)
                .with_context(|| format!("rating window for club {club_id}"))?;
            Ok((club_id, ratings))
        })
        .collect()
}

/// Each club's last stored off/def ratings for a season.
pub fn load_closing_ratings(
    conn: &Connection,
    competition_id: CompetitionId,
    season: Season,
) -> Result<HashMap<ClubId, (f64, f64)>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT h.club_id, h.off, h.def
            FROM history h
            LEFT JOIN matches m ON h.match_id = m.id
            WHERE h.competition_id = ?1 AND h.season = ?2
            ORDER BY h.club_id ASC, m.time ASC
            "#,
        )
        .context("prepare closing ratings query")?;
    let rows = stmt
        .query_map(params![competition_id as i64, season], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })
        .context("query closing ratings")?;
    let mut out = HashMap::new();
    for row in rows {
        let (club_id, off, def) = row.context("decode closing rating row")?;
        out.insert(club_id, (off, def));
    }
    Ok(out)
}

pub fn upsert_history(conn: &mut Connection, rows: &[TableSnapshot]) -> Result<usize> {
    let tx = conn.transaction().context("begin history transaction")?;
    for r in rows {
        tx.execute(
            "DELETE FROM history
             WHERE competition_id = ?1 AND season = ?2 AND club_id = ?3 AND match_id IS ?4",
            params![
                r.competition_id as i64,
                r.season,
                r.club_id as i64,
                r.match_id.map(|id| id as i64)
            ],
        )
        .context("clear history row")?;
        tx.execute(
            r#"
            INSERT INTO history (
                competition_id, season, club_id, match_id, off, def, efi, form,
                mp, w, d, l, gf, ga, gd, pts
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                r.competition_id as i64,
                r.season,
                r.club_id as i64,
                r.match_id.map(|id| id as i64),
                r.off,
                r.def,
                r.efi,
                form_to_string(&r.form),
                r.mp,
                r.w,
                r.d,
                r.l,
                r.gf,
                r.ga,
                r.gd,
                r.pts
            ],
        )
        .context("insert history row")?;
    }
    tx.commit().context("commit history")?;
    Ok(rows.len())
}

pub fn load_history(
    conn: &Connection,
    competition_id: CompetitionId,
    season: Season,
) -> Result<Vec<TableSnapshot>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT h.club_id, h.match_id, h.off, h.def, h.efi, h.form,
                   h.mp, h.w, h.d, h.l, h.gf, h.ga, h.gd, h.pts
            FROM history h
            LEFT JOIN matches m ON h.match_id = m.id
            WHERE h.competition_id = ?1 AND h.season = ?2
            ORDER BY m.time ASC, h.match_id ASC, h.club_id ASC
            "#,
        )
        .context("prepare history query")?;
    let rows = stmt
        .query_map(params![competition_id as i64, season], |row| {
            Ok(TableSnapshot {
                competition_id,
                season,
                club_id: row.get::<_, u32>(0)?,
                match_id: row.get::<_, Option<u64>>(1)?,
                off: row.get(2)?,
                def: row.get(3)?,
                efi: row.get(4)?,
                form: form_from_string(&row.get::<_, String>(5)?),
                mp: row.get(6)?,
                w: row.get(7)?,
                d: row.get(8)?,
                l: row.get(9)?,
                gf: row.get(10)?,
                ga: row.get(11)?,
                gd: row.get(12)?,
                pts: row.get(13)?,
            })
        })
        .context("query history")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode history row")?);
    }
    Ok(out)
}

pub fn upsert_projections(conn: &mut Connection, rows: &[Projection]) -> Result<usize> {
    let tx = conn.transaction().context("begin projections transaction")?;
    for p in rows {
        let positions = serde_json::to_string(&p.positions).context("encode positions")?;
        tx.execute(
            r#"
            INSERT INTO projections (
                competition_id, season, club_id, matchweek, update_date,
                positions, avg_gd, avg_pts
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(competition_id, season, club_id, matchweek) DO UPDATE SET
                update_date = excluded.update_date,
                positions = excluded.positions,
                avg_gd = excluded.avg_gd,
                avg_pts = excluded.avg_pts
            "#,
            params![
                p.competition_id as i64,
                p.season,
                p.club_id as i64,
                p.matchweek as i64,
                p.update_date.format(DATE_FORMAT).to_string(),
                positions,
                p.avg_gd,
                p.avg_pts
            ],
        )
        .context("upsert projection")?;
    }
    tx.commit().context("commit projections")?;
    Ok(rows.len())
}

pub fn load_projections(
    conn: &Connection,
    competition_id: CompetitionId,
    season: Season,
) -> Result<Vec<Projection>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT club_id, matchweek, update_date, positions, avg_gd, avg_pts
            FROM projections
            WHERE competition_id = ?1 AND season = ?2
            ORDER BY matchweek, club_id
            "#,
        )
        .context("prepare projections query")?;
    let rows = stmt
        .query_map(params![competition_id as i64, season], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
            ))
        })
        .context("query projections")?;
    let mut out = Vec::new();
    for row in rows {
        let (club_id, matchweek, date, positions, avg_gd, avg_pts) =
            row.context("decode projection row")?;
        out.push(Projection {
            competition_id,
            season,
            club_id,
            matchweek,
            update_date: parse_date(&date)?,
            positions: serde_json::from_str(&positions).context("decode positions")?,
            avg_gd,
            avg_pts,
        });
    }
    Ok(out)
}

pub fn update_match_predictions(conn: &mut Connection, rows: &[MatchPrediction]) -> Result<usize> {
    let tx = conn.transaction().context("begin predictions transaction")?;
    let mut updated = 0;
    for p in rows {
        updated += tx
            .execute(
                r#"
                UPDATE matches SET
                    home_off = ?2, home_def = ?3, home_efi = ?4,
                    away_off = ?5, away_def = ?6, away_efi = ?7,
                    prob_home = ?8, prob_draw = ?9, prob_away = ?10
                WHERE id = ?1
                "#,
                params![
                    p.match_id as i64,
                    p.home_off,
                    p.home_def,
                    p.home_efi,
                    p.away_off,
                    p.away_def,
                    p.away_efi,
                    p.probs.home,
                    p.probs.draw,
                    p.probs.away
                ],
            )
            .context("update match prediction")?;
    }
    tx.commit().context("commit predictions")?;
    Ok(updated)
}

pub fn update_match_performances(conn: &mut Connection, rows: &[MatchUpdate]) -> Result<usize> {
    let tx = conn.transaction().context("begin performances transaction")?;
    let mut updated = 0;
    for u in rows {
        let p = &u.performances;
        updated += tx
            .execute(
                r#"
                UPDATE matches SET
                    mp_off_home = ?2, mp_def_home = ?3,
                    mp_off_away = ?4, mp_def_away = ?5
                WHERE id = ?1
                "#,
                params![u.match_id as i64, p.off_home, p.def_home, p.off_away, p.def_away],
            )
            .context("update match performances")?;
    }
    tx.commit().context("commit performances")?;
    Ok(updated)
}

/// Marks a match completed with the score and adjusted goals tallied from its
/// goal and sending-off events.
pub fn record_match_events(
    conn: &Connection,
    match_id: MatchId,
    events: &[MatchEvent],
    xg_home: f64,
    xg_away: f64,
) -> Result<EventTally> {
    let counted = tally(events);
    let stats = MatchStats::from_events(&counted, xg_home, xg_away);
    let updated = conn
        .execute(
            r#"
            UPDATE matches SET
                completed = 1,
                score_home = ?2, score_away = ?3,
                ag_home = ?4, ag_away = ?5,
                xg_home = ?6, xg_away = ?7
            WHERE id = ?1
            "#,
            params![
                match_id as i64,
                counted.goals_home,
                counted.goals_away,
                stats.adjusted_goals_home,
                stats.adjusted_goals_away,
                stats.xg_home,
                stats.xg_away
            ],
        )
        .context("record match events")?;
    if updated == 0 {
        bail!("match {match_id} not found");
    }
    Ok(counted)
}

pub fn update_display_matchweeks(
    conn: &mut Connection,
    rows: &[(MatchId, u32)],
) -> Result<usize> {
    let tx = conn.transaction().context("begin matchweek transaction")?;
    let mut updated = 0;
    for (match_id, matchweek) in rows {
        updated += tx
            .execute(
                "UPDATE matches SET display_matchweek = ?2 WHERE id = ?1",
                params![*match_id as i64, *matchweek as i64],
            )
            .context("update display matchweek")?;
    }
    tx.commit().context("commit display matchweeks")?;
    Ok(updated)
}

fn parse_time(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIME_FORMAT)
        .or_else(|_| {
            NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
                .map(|d| d.and_time(NaiveTime::default()))
        })
        .map_err(|err| anyhow!("invalid match time {raw:?}: {err}"))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|err| anyhow!("invalid date {raw:?}: {err}"))
}
