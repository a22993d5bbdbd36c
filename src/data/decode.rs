//! SWITRS codebooks and the `<COL>_DESC` decoder.
use super::cleaning::parse_integer;
use super::table::Table;
use anyhow::Result;

type Codebook = &'static [(&'static str, &'static str)];

const WEATHER: Codebook = &[
    ("A", "Clear"),
    ("B", "Cloudy"),
    ("C", "Raining"),
    ("D", "Snowing"),
    ("E", "Fog"),
    ("F", "Other"),
    ("G", "Wind"),
    ("-", "Not Stated"),
];

const SEVERITY: Codebook = &[
    ("1", "Fatal"),
    ("2", "Injury (Severe)"),
    ("3", "Injury (Other Visible)"),
    ("4", "Injury (Complaint of Pain)"),
    ("0", "Property Damage Only"),
];

const COLLISION_TYPE: Codebook = &[
    ("A", "Head-On"),
    ("B", "Sideswipe"),
    ("C", "Rear End"),
    ("D", "Broadside"),
    ("E", "Hit Object"),
    ("F", "Overturned"),
    ("G", "Vehicle/Pedestrian"),
    ("H", "Other"),
    ("-", "Not Stated"),
];

const ROAD_SURFACE: Codebook = &[
    ("A", "Dry"),
    ("B", "Wet"),
    ("C", "Snowy"),
    ("D", "Icy"),
    ("E", "Slippery (Mud/Oil)"),
    ("F", "Loose Material"),
    ("G", "Rough"),
    ("H", "Damaged"),
    ("I", "Construction"),
    ("J", "Other"),
    ("-", "Not Stated"),
];

const LIGHTING: Codebook = &[
    ("A", "Daylight"),
    ("B", "Dusk - Dawn"),
    ("C", "Dark - Street Lights"),
    ("D", "Dark - No Street Lights"),
    ("E", "Dark - Street Lights Not Functioning"),
    ("-", "Not Stated"),
];

const PCF_CATEGORY: Codebook = &[
    ("A", "VC Section Violation"),
    ("B", "Other Improper Driving"),
    ("C", "Other Than Driver"),
    ("D", "Unknown"),
    ("E", "Fell Asleep"),
    ("-", "Not Stated"),
];

const MOVEMENT: Codebook = &[
    ("A", "Stopped"),
    ("B", "Proceeding Straight"),
    ("C", "Ran Red Light"),
    ("D", "Ran Stop Sign"),
    ("E", "U-Turn"),
    ("F", "Left Turn"),
    ("G", "Right Turn"),
    ("H", "Slowing/Stopping"),
    ("J", "Changing Lanes"),
    ("K", "Parking Maneuver"),
    ("L", "Entering Traffic"),
    ("M", "Other Unsafe Turning"),
    ("N", "Xing into Opposing Lane"),
    ("O", "Parked"),
    ("P", "Merging"),
    ("Q", "Traveling Wrong Way"),
    ("R", "Other"),
    ("-", "Not Stated"),
];

const DAY_OF_WEEK: Codebook = &[
    ("1", "Monday"),
    ("2", "Tuesday"),
    ("3", "Wednesday"),
    ("4", "Thursday"),
    ("5", "Friday"),
    ("6", "Saturday"),
    ("7", "Sunday"),
];

/// Columns with a codebook, in the order their descriptions are added.
pub const DECODED_COLUMNS: &[(&str, Codebook)] = &[
    ("WEATHER_1", WEATHER),
    ("WEATHER_2", WEATHER),
    ("COLLISION_SEVERITY", SEVERITY),
    ("TYPE_OF_COLLISION", COLLISION_TYPE),
    ("ROAD_SURFACE", ROAD_SURFACE),
    ("LIGHTING", LIGHTING),
    ("PCF_VIOL_CATEGORY", PCF_CATEGORY),
    ("DAY_OF_WEEK", DAY_OF_WEEK),
    ("MVIW", MOVEMENT),
];

/// Numeric codes are matched by value so `"1.0"` decodes like `"1"`.
fn numeric_codebook(column: &str) -> bool {
    matches!(column, "COLLISION_SEVERITY" | "DAY_OF_WEEK")
}

/// Description for one code; unknown codes keep their original value.
pub fn describe(column: &str, value: &str) -> Option<String> {
    let (_, codebook) = DECODED_COLUMNS.iter().find(|(name, _)| *name == column)?;
    let trimmed = value.trim();
    let key = if numeric_codebook(column) {
        parse_integer(trimmed).map(|code| code.to_string())
    } else {
        None
    };
    let key = key.as_deref().unwrap_or(trimmed);
    let description = codebook
        .iter()
        .find(|(code, _)| *code == key)
        .map(|(_, description)| description.to_string());
    Some(description.unwrap_or_else(|| trimmed.to_string()))
}

/// Add a `<COL>_DESC` column for every codebook column present. Returns the
/// names of the added columns.
pub fn decode_switrs(table: &mut Table) -> Result<Vec<String>> {
    let mut added = Vec::new();
    for (column, _) in DECODED_COLUMNS {
        if !table.has_column(column) {
            continue;
        }
        let described = table
            .values(column)?
            .into_iter()
            .map(|value| value.and_then(|value| describe(column, value)))
            .collect::<Vec<_>>();
        let name = format!("{column}_DESC");
        table.set_column(&name, described)?;
        tracing::debug!(column = %name, "decoded column");
        added.push(name);
    }
    Ok(added)
}
