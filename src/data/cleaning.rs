//! Cleaning rules for the crash, party, and victim tables.
use super::table::{Cell, Table};
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Placeholders that mean "not recorded" once trimmed.
const MISSING_MARKERS: &[&str] = &["-", "--", ""];
/// Age codes that mean "unknown" rather than an actual age.
const AGE_SENTINELS: &[i64] = &[0, 998];
const INDICATOR_COLUMNS: &[&str] = &[
    "ALCOHOL_INVOLVED",
    "PEDESTRIAN_ACCIDENT",
    "MOTORCYCLE_ACCIDENT",
    "TRUCK_ACCIDENT",
];
/// Join keys survive column pruning even when constant.
const KEY_COLUMNS: &[&str] = &["CASE_ID", "PARTY_NUMBER"];
const RAW_COORDINATE_COLUMNS: &[&str] = &["POINT_X", "POINT_Y", "LATITUDE", "LONGITUDE"];
const CRASH_MISSING_LIMIT: f64 = 0.95;
const PARTY_MISSING_LIMIT: f64 = 0.90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrashOptions {
    pub drop_missing_location: bool,
}

impl Default for CrashOptions {
    fn default() -> Self {
        Self {
            drop_missing_location: true,
        }
    }
}

/// Trim every cell and turn dash placeholders into missing values.
pub fn standardize(table: &mut Table) {
    table.map_cells(|cell| {
        let trimmed = cell?.trim();
        if MISSING_MARKERS.contains(&trimmed) {
            None
        } else {
            Some(trimmed.to_string())
        }
    });
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|num| num.is_finite())
}

/// Integral value of a numeric cell (`"34"` and `"34.0"` both give 34).
pub(crate) fn parse_integer(value: &str) -> Option<i64> {
    let num = parse_number(value)?;
    if num.fract() == 0.0 {
        Some(num as i64)
    } else {
        None
    }
}

fn clean_age(cell: Option<&str>) -> Cell {
    let age = parse_integer(cell?)?;
    if AGE_SENTINELS.contains(&age) {
        None
    } else {
        Some(age.to_string())
    }
}

fn unknown_sex_to_missing(cell: Option<&str>) -> Cell {
    match cell {
        Some("X") | None => None,
        Some(value) => Some(value.to_string()),
    }
}

fn bool_cell(value: bool) -> Cell {
    Some(value.to_string())
}

/// Combine a `%Y-%m-%d` date and an HHMM time. Times outside 0..=2359 or
/// with minutes past 59 give no timestamp.
pub fn collision_datetime(date: Option<&str>, time: Option<&str>) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(date?.trim(), "%Y-%m-%d").ok()?;
    let hhmm = parse_integer(time?)?;
    if !(0..=2359).contains(&hhmm) {
        return None;
    }
    let time = NaiveTime::from_hms_opt((hhmm / 100) as u32, (hhmm % 100) as u32, 0)?;
    Some(date.and_time(time))
}

fn columns_where(table: &Table, predicate: impl Fn(&str) -> Result<bool>) -> Result<Vec<String>> {
    let mut matched = Vec::new();
    for column in table.columns() {
        if predicate(column)? {
            matched.push(column.clone());
        }
    }
    Ok(matched)
}

fn constant_columns(table: &Table) -> Result<Vec<String>> {
    columns_where(table, |col| {
        Ok(!KEY_COLUMNS.contains(&col) && table.is_constant(col)?)
    })
}

fn mostly_missing_columns(table: &Table, limit: f64) -> Result<Vec<String>> {
    columns_where(table, |col| {
        Ok(!KEY_COLUMNS.contains(&col) && table.missing_fraction(col)? > limit)
    })
}

fn coalesce(table: &Table, primary: &str, fallback: &str) -> Result<Vec<Cell>> {
    let primary = if table.has_column(primary) {
        table.values(primary)?
    } else {
        vec![None; table.len()]
    };
    let fallback = table.values(fallback)?;
    Ok(primary
        .into_iter()
        .zip(fallback)
        .map(|(first, second)| first.or(second).map(str::to_string))
        .collect())
}

/// Clean crash-level records.
pub fn clean_crashes(mut crashes: Table, options: CrashOptions) -> Result<Table> {
    standardize(&mut crashes);
    let duplicates = crashes.dedup_by("CASE_ID")?;
    if duplicates > 0 {
        tracing::debug!(duplicates, "dropped duplicate crash rows");
    }

    let longitude = coalesce(&crashes, "LONGITUDE", "POINT_X").context("crash longitude")?;
    let latitude = coalesce(&crashes, "LATITUDE", "POINT_Y").context("crash latitude")?;
    let located = longitude
        .iter()
        .zip(&latitude)
        .map(|(lon, lat)| lon.is_some() && lat.is_some())
        .collect::<Vec<_>>();
    crashes.set_column("longitude", longitude)?;
    crashes.set_column("latitude", latitude)?;

    let dates = crashes.values("COLLISION_DATE")?;
    let times = crashes.values("COLLISION_TIME")?;
    let stamps = dates
        .into_iter()
        .zip(times)
        .map(|(date, time)| collision_datetime(date, time))
        .collect::<Vec<_>>();
    crashes.set_column(
        "collision_datetime",
        stamps
            .iter()
            .map(|stamp| stamp.map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string()))
            .collect(),
    )?;
    crashes.set_column(
        "collision_hour",
        stamps
            .iter()
            .map(|stamp| stamp.map(|ts| ts.hour().to_string()))
            .collect(),
    )?;

    for column in INDICATOR_COLUMNS {
        if crashes.has_column(column) {
            crashes.map_column(column, |cell| bool_cell(cell == Some("Y")))?;
        }
    }

    let mut drop = constant_columns(&crashes)?;
    drop.extend(mostly_missing_columns(&crashes, CRASH_MISSING_LIMIT)?);
    drop.extend(RAW_COORDINATE_COLUMNS.iter().map(|col| col.to_string()));
    crashes.drop_columns(&drop);

    if options.drop_missing_location {
        let before = crashes.len();
        crashes.retain_rows(|idx| located[idx]);
        tracing::debug!(dropped = before - crashes.len(), "dropped crashes without location");
    }
    Ok(crashes)
}

/// Clean party-level records.
pub fn clean_parties(mut parties: Table) -> Result<Table> {
    standardize(&mut parties);
    parties.map_column("PARTY_AGE", clean_age)?;
    parties.map_column("PARTY_SEX", unknown_sex_to_missing)?;
    parties.map_column("AT_FAULT", |cell| match cell {
        Some("Y") => bool_cell(true),
        Some("N") => bool_cell(false),
        _ => None,
    })?;
    let mut drop = mostly_missing_columns(&parties, PARTY_MISSING_LIMIT)?;
    drop.push("ACCIDENT_YEAR".to_string());
    parties.drop_columns(&drop);
    Ok(parties)
}

/// Clean victim-level records.
pub fn clean_victims(mut victims: Table) -> Result<Table> {
    standardize(&mut victims);
    victims.map_column("VICTIM_AGE", clean_age)?;
    victims.map_column("VICTIM_SEX", unknown_sex_to_missing)?;
    let mut drop = constant_columns(&victims)?;
    drop.push("ACCIDENT_YEAR".to_string());
    victims.drop_columns(&drop);
    Ok(victims)
}

/// One row per victim with party and crash attributes joined in.
///
/// Overlapping columns get `_victim`/`_party` suffixes on the party join.
/// On the crash join, victim-side names stay bare and crash columns take
/// `_crash`, where pandas `merge` would have used `_x`/`_y`.
pub fn build_victim_level(crashes: &Table, parties: &Table, victims: &Table) -> Result<Table> {
    let with_parties = victims
        .left_join(parties, &["CASE_ID", "PARTY_NUMBER"], ("_victim", "_party"))
        .context("join victims to parties")?;
    with_parties
        .left_join(crashes, &["CASE_ID"], ("", "_crash"))
        .context("join victims to crashes")
}
