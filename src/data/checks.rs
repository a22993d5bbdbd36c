//! Sanity checks applied to cleaned crash tables.
use super::cleaning::parse_integer;
use super::table::Table;
use anyhow::Result;
use std::ops::RangeInclusive;

/// Accident years the source extract covers.
pub const YEAR_RANGE: RangeInclusive<i64> = 2014..=2024;

/// Crash attributes the severity models read.
pub const FEATURE_COLUMNS: &[&str] = &[
    "ACCIDENT_YEAR",
    "COLLISION_TIME",
    "REPORTING_DISTRICT",
    "PRIMARY_RD",
    "SECONDARY_RD",
    "INTERSECTION",
    "WEATHER_1",
    "PRIMARY_COLL_FACTOR",
    "HIT_AND_RUN",
    "TYPE_OF_COLLISION",
    "MVIW",
    "ROAD_SURFACE",
    "ROAD_COND_1",
    "LIGHTING",
    "PEDESTRIAN_ACCIDENT",
    "MOTORCYCLE_ACCIDENT",
    "TRUCK_ACCIDENT",
    "ALCOHOL_INVOLVED",
    "STWD_VEHTYPE_AT_FAULT",
    "CHP_VEHTYPE_AT_FAULT",
];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct YearCheck {
    pub checked: usize,
    pub missing: usize,
    /// Row index and raw value of every year outside `YEAR_RANGE`.
    pub out_of_range: Vec<(usize, String)>,
}

impl YearCheck {
    pub fn passed(&self) -> bool {
        self.out_of_range.is_empty()
    }
}

pub fn check_years(table: &Table, column: &str) -> Result<YearCheck> {
    let mut check = YearCheck::default();
    for (idx, value) in table.values(column)?.into_iter().enumerate() {
        let Some(value) = value else {
            check.missing += 1;
            continue;
        };
        check.checked += 1;
        let in_range = parse_integer(value).is_some_and(|year| YEAR_RANGE.contains(&year));
        if !in_range {
            check.out_of_range.push((idx, value.to_string()));
        }
    }
    Ok(check)
}

/// Killed-or-seriously-injured target: severity 1 or 2 is 1, anything else 0.
pub fn ksi_target(crashes: &Table) -> Result<Vec<u8>> {
    Ok(crashes
        .values("COLLISION_SEVERITY")?
        .into_iter()
        .map(|value| match value.and_then(parse_integer) {
            Some(1 | 2) => 1,
            _ => 0,
        })
        .collect())
}

pub fn ksi_share(target: &[u8]) -> Option<f64> {
    if target.is_empty() {
        return None;
    }
    let positives = target.iter().filter(|&&value| value == 1).count();
    Some(positives as f64 / target.len() as f64)
}

/// Feature columns that are absent or entirely missing.
pub fn feature_gaps(crashes: &Table) -> Result<Vec<String>> {
    let mut gaps = Vec::new();
    for column in FEATURE_COLUMNS {
        if !crashes.has_column(column) || crashes.values(column)?.iter().all(Option::is_none) {
            gaps.push(column.to_string());
        }
    }
    Ok(gaps)
}
