//! Data preparation step: raw TIMS extracts to analysis-ready CSV tables.
use crate::data::{
    build_victim_level, check_years, clean_crashes, clean_parties, clean_victims, decode_switrs,
    feature_gaps, ksi_share, ksi_target, CrashOptions, Table, YEAR_RANGE,
};
use crate::project::ProjectPaths;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;

const CRASHES_FILE: &str = "Crashes.csv";
const PARTIES_FILE: &str = "Parties.csv";
const VICTIMS_FILE: &str = "Victims.csv";

#[derive(Debug, Clone, Default)]
pub struct PrepareOptions {
    /// Raw data directory; relative paths resolve against the project root.
    pub data_dir: Option<PathBuf>,
    /// Output directory; relative paths resolve against the project root.
    pub out: Option<PathBuf>,
    pub decode: bool,
    pub keep_missing_location: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareSummary {
    pub out_dir: PathBuf,
    pub crashes: usize,
    pub parties: usize,
    pub victims: usize,
    pub victim_level: usize,
}

fn resolve(root: &Path, configured: Option<&PathBuf>, default: PathBuf) -> PathBuf {
    match configured {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => root.join(path),
        None => default,
    }
}

/// `tims prepare`: clean the raw tables and write them, plus the
/// victim-level join, as CSV.
pub fn run_prepare(paths: &ProjectPaths, options: &PrepareOptions) -> Result<PrepareSummary> {
    let start = Instant::now();
    let data_dir = resolve(paths.root(), options.data_dir.as_ref(), paths.data_dir());
    let out_dir = resolve(paths.root(), options.out.as_ref(), paths.clean_data_dir());

    let read = |name: &str| {
        let path = data_dir.join(name);
        Table::read_csv(&path).with_context(|| format!("load raw table {name}"))
    };
    let crash_options = CrashOptions {
        drop_missing_location: !options.keep_missing_location,
    };
    let mut crashes = clean_crashes(read(CRASHES_FILE)?, crash_options).context("clean crashes")?;
    let parties = clean_parties(read(PARTIES_FILE)?).context("clean parties")?;
    let victims = clean_victims(read(VICTIMS_FILE)?).context("clean victims")?;
    if crashes.is_empty() {
        tracing::warn!("no crashes left after cleaning");
    }

    if crashes.has_column("ACCIDENT_YEAR") {
        let years = check_years(&crashes, "ACCIDENT_YEAR")?;
        if !years.passed() {
            tracing::warn!(
                count = years.out_of_range.len(),
                first = %years.out_of_range[0].1,
                range = ?YEAR_RANGE,
                "accident years outside the expected range"
            );
        }
    }
    let gaps = feature_gaps(&crashes)?;
    if !gaps.is_empty() {
        tracing::warn!(columns = %gaps.join(", "), "model feature columns absent or empty");
    }
    if crashes.has_column("COLLISION_SEVERITY") {
        if let Some(share) = ksi_share(&ksi_target(&crashes)?) {
            tracing::info!(ksi_share = share, "severity target");
        }
    }

    if options.decode {
        let added = decode_switrs(&mut crashes)?;
        tracing::info!(columns = added.len(), "decoded SWITRS codes");
    }
    let victim_level = build_victim_level(&crashes, &parties, &victims)?;

    let outputs = [
        ("crashes.csv", &crashes),
        ("parties.csv", &parties),
        ("victims.csv", &victims),
        ("victim_level.csv", &victim_level),
    ];
    for (name, table) in outputs {
        table.write_csv(&out_dir.join(name))?;
    }
    let summary = PrepareSummary {
        out_dir,
        crashes: crashes.len(),
        parties: parties.len(),
        victims: victims.len(),
        victim_level: victim_level.len(),
    };
    tracing::info!(
        elapsed_ms = start.elapsed().as_millis(),
        crashes = summary.crashes,
        parties = summary.parties,
        victims = summary.victims,
        victim_level = summary.victim_level,
        out = %summary.out_dir.display(),
        "prepare complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::test_support::{test_config, TestProject};

    const CRASHES: &str = "\
CASE_ID,ACCIDENT_YEAR,COLLISION_DATE,COLLISION_TIME,POINT_X,POINT_Y,LATITUDE,LONGITUDE,CITY,WEATHER_1,COLLISION_SEVERITY
1,2019,2019-03-04,1430,-122.41,37.77,,,SF,A,1
2,2020,2020-07-01,0905,-122.43,37.75,,,SF,B,3
3,2021,2021-01-09,1200,,,,,SF,A,2
";
    const PARTIES: &str = "\
CASE_ID,PARTY_NUMBER,PARTY_TYPE,PARTY_AGE,PARTY_SEX,AT_FAULT,ACCIDENT_YEAR
1,1,1,998,M,Y,2019
1,2,3,41,F,N,2019
2,1,1,27,X,Y,2020
";
    const VICTIMS: &str = "\
CASE_ID,PARTY_NUMBER,VICTIM_ROLE,VICTIM_AGE,VICTIM_SEX,COUNTY,ACCIDENT_YEAR
1,2,3,41,F,SAN FRANCISCO,2019
2,1,1,0,M,SAN FRANCISCO,2020
3,1,2,60,F,SAN FRANCISCO,2021
";

    fn project() -> TestProject {
        let project = TestProject::new(test_config());
        project.write("data/Crashes.csv", CRASHES);
        project.write("data/Parties.csv", PARTIES);
        project.write("data/Victims.csv", VICTIMS);
        project
    }

    fn paths(project: &TestProject) -> ProjectPaths {
        ProjectPaths::new(project.root(), test_config())
    }

    #[test]
    fn writes_clean_tables_to_build_dir() {
        let project = project();
        let summary = run_prepare(&paths(&project), &PrepareOptions::default()).expect("prepare");
        assert_eq!(summary.out_dir, project.root().join("_build/clean"));
        assert_eq!(summary.crashes, 2);
        assert_eq!(summary.parties, 3);
        assert_eq!(summary.victims, 3);
        assert_eq!(summary.victim_level, 3);

        let level = project.read("_build/clean/victim_level.csv");
        let header = level.lines().next().expect("header");
        assert!(header.starts_with("CASE_ID,PARTY_NUMBER,VICTIM_ROLE,VICTIM_AGE,VICTIM_SEX"));
        assert!(header.contains("PARTY_AGE"));
        assert!(header.contains("collision_datetime"));
        assert!(!header.contains("COUNTY"));
        assert!(project.exists("_build/clean/crashes.csv"));
        assert!(!project.exists("_build/clean/crashes.csv.tmp"));
    }

    #[test]
    fn decode_and_location_options() {
        let project = project();
        let options = PrepareOptions {
            out: Some(PathBuf::from("out")),
            decode: true,
            keep_missing_location: true,
            ..PrepareOptions::default()
        };
        let summary = run_prepare(&paths(&project), &options).expect("prepare");
        assert_eq!(summary.crashes, 3);
        let crashes = Table::read_csv(&project.root().join("out/crashes.csv")).expect("crashes");
        assert_eq!(crashes.get(0, "WEATHER_1_DESC"), Some("Clear"));
        assert_eq!(crashes.get(2, "COLLISION_SEVERITY_DESC"), Some("Injury (Severe)"));
    }

    #[test]
    fn crashes_without_locations_leave_an_empty_table() {
        let project = project();
        project.write(
            "data/Crashes.csv",
            "CASE_ID,ACCIDENT_YEAR,COLLISION_DATE,COLLISION_TIME,POINT_X,POINT_Y,COLLISION_SEVERITY\n\
             1,2019,2019-03-04,1430,,,1\n",
        );
        let summary = run_prepare(&paths(&project), &PrepareOptions::default()).expect("prepare");
        assert_eq!(summary.crashes, 0);
        assert_eq!(summary.victim_level, 3);
        assert!(project.exists("_build/clean/crashes.csv"));
    }

    #[test]
    fn missing_raw_table_names_the_file() {
        let project = project();
        std::fs::remove_file(project.root().join("data/Parties.csv")).expect("remove");
        let err = run_prepare(&paths(&project), &PrepareOptions::default()).expect_err("missing");
        assert!(format!("{err:#}").contains("Parties.csv"));
    }
}
