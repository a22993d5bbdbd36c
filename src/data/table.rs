//! A small string-typed table with pandas-like column operations.
//!
//! Cells are `Option<String>`; `None` is a missing value and is written back
//! out as an empty field.
use anyhow::{anyhow, Context, Result};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

pub type Cell = Option<String>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from literal rows; empty strings become missing.
    #[cfg(test)]
    pub fn from_rows(columns: &[&str], rows: &[&[&str]]) -> Result<Self> {
        let mut table = Self::new(columns.iter().map(|col| col.to_string()).collect());
        for row in rows {
            table.push_row(row.iter().map(|cell| non_empty(cell)).collect())?;
        }
        Ok(table)
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("read {}", path.display()))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(false).from_reader(reader);
        let columns = rdr
            .headers()
            .context("read CSV header")?
            .iter()
            .map(|name| name.trim().to_string())
            .collect::<Vec<_>>();
        let mut seen = BTreeSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(anyhow!("duplicate column {column}"));
            }
        }
        let mut table = Self::new(columns);
        for (idx, record) in rdr.records().enumerate() {
            let record = record.with_context(|| format!("parse CSV row {}", idx + 1))?;
            table.push_row(record.iter().map(non_empty).collect())?;
        }
        Ok(table)
    }

    /// Write atomically: a sibling temp file renamed over the destination.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let tmp = path.with_extension("csv.tmp");
        let file = fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        self.to_writer(file)
            .with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    fn require(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| anyhow!("missing column {name}"))
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(anyhow!(
                "row has {} cells but the table has {} columns",
                row.len(),
                self.columns.len()
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Values of a column, in row order.
    pub fn values(&self, name: &str) -> Result<Vec<Option<&str>>> {
        let idx = self.require(name)?;
        Ok(self.rows.iter().map(|row| row[idx].as_deref()).collect())
    }

    #[cfg(test)]
    pub fn get(&self, row: usize, name: &str) -> Option<&str> {
        let idx = self.column_index(name)?;
        self.rows.get(row).and_then(|cells| cells[idx].as_deref())
    }

    /// Rewrite every cell in the table.
    pub fn map_cells(&mut self, f: impl Fn(Option<&str>) -> Cell) {
        for row in &mut self.rows {
            for cell in row.iter_mut() {
                *cell = f(cell.as_deref());
            }
        }
    }

    /// Rewrite one column in place; absent columns are an error.
    pub fn map_column(&mut self, name: &str, f: impl Fn(Option<&str>) -> Cell) -> Result<()> {
        let idx = self.require(name)?;
        for row in &mut self.rows {
            row[idx] = f(row[idx].as_deref());
        }
        Ok(())
    }

    /// Append a column, replacing any existing column of the same name.
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(anyhow!(
                "column {name} has {} values for {} rows",
                values.len(),
                self.rows.len()
            ));
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// Drop the named columns that exist; unknown names are ignored.
    pub fn drop_columns<S: AsRef<str>>(&mut self, names: &[S]) {
        let drop = names
            .iter()
            .filter_map(|name| self.column_index(name.as_ref()))
            .collect::<BTreeSet<_>>();
        if drop.is_empty() {
            return;
        }
        let keep = |idx: &usize| !drop.contains(idx);
        self.columns = self
            .columns
            .iter()
            .enumerate()
            .filter(|(idx, _)| keep(idx))
            .map(|(_, col)| col.clone())
            .collect();
        for row in &mut self.rows {
            *row = row
                .iter()
                .enumerate()
                .filter(|(idx, _)| keep(idx))
                .map(|(_, cell)| cell.clone())
                .collect();
        }
    }

    pub fn retain_rows(&mut self, mut keep: impl FnMut(usize) -> bool) {
        let mut idx = 0;
        self.rows.retain(|_| {
            let retained = keep(idx);
            idx += 1;
            retained
        });
    }

    /// Keep the first row for each value of `name`.
    pub fn dedup_by(&mut self, name: &str) -> Result<usize> {
        let idx = self.require(name)?;
        let before = self.rows.len();
        let mut seen = BTreeSet::new();
        self.rows.retain(|row| seen.insert(row[idx].clone()));
        Ok(before - self.rows.len())
    }

    /// Share of missing cells in a column; 0 for an empty table.
    pub fn missing_fraction(&self, name: &str) -> Result<f64> {
        let idx = self.require(name)?;
        if self.rows.is_empty() {
            return Ok(0.0);
        }
        let missing = self.rows.iter().filter(|row| row[idx].is_none()).count();
        Ok(missing as f64 / self.rows.len() as f64)
    }

    /// True when the column holds exactly one distinct value, missing included.
    pub fn is_constant(&self, name: &str) -> Result<bool> {
        let idx = self.require(name)?;
        let distinct = self
            .rows
            .iter()
            .map(|row| row[idx].as_deref())
            .collect::<BTreeSet<_>>();
        Ok(distinct.len() == 1)
    }

    /// Left join on `on`. Overlapping non-key columns get `suffixes.0` on
    /// the left side and `suffixes.1` on the right. Missing keys never match.
    pub fn left_join(&self, right: &Table, on: &[&str], suffixes: (&str, &str)) -> Result<Table> {
        let left_keys = on
            .iter()
            .map(|name| self.require(name))
            .collect::<Result<Vec<_>>>()?;
        let right_keys = on
            .iter()
            .map(|name| right.require(name))
            .collect::<Result<Vec<_>>>()?;

        let left_set = self.columns.iter().collect::<BTreeSet<_>>();
        let right_set = right.columns.iter().collect::<BTreeSet<_>>();
        let is_key = |name: &str| on.contains(&name);
        let mut columns = Vec::with_capacity(self.columns.len() + right.columns.len());
        for col in &self.columns {
            if !is_key(col.as_str()) && right_set.contains(col) {
                columns.push(format!("{col}{}", suffixes.0));
            } else {
                columns.push(col.clone());
            }
        }
        let right_cols = (0..right.columns.len())
            .filter(|idx| !right_keys.contains(idx))
            .collect::<Vec<_>>();
        for &idx in &right_cols {
            let col = &right.columns[idx];
            if left_set.contains(col) {
                columns.push(format!("{col}{}", suffixes.1));
            } else {
                columns.push(col.clone());
            }
        }
        let mut seen = BTreeSet::new();
        for col in &columns {
            if !seen.insert(col.as_str()) {
                return Err(anyhow!("join produces duplicate column {col}"));
            }
        }

        let mut index: HashMap<Vec<&str>, Vec<usize>> = HashMap::new();
        for (row_idx, row) in right.rows.iter().enumerate() {
            let key = right_keys
                .iter()
                .map(|&idx| row[idx].as_deref())
                .collect::<Option<Vec<_>>>();
            if let Some(key) = key {
                index.entry(key).or_default().push(row_idx);
            }
        }

        let mut joined = Table::new(columns);
        for row in &self.rows {
            let key = left_keys
                .iter()
                .map(|&idx| row[idx].as_deref())
                .collect::<Option<Vec<_>>>();
            let matches = key.and_then(|key| index.get(&key));
            match matches {
                Some(matches) => {
                    for &right_idx in matches {
                        let mut out = row.clone();
                        out.extend(right_cols.iter().map(|&idx| right.rows[right_idx][idx].clone()));
                        joined.rows.push(out);
                    }
                }
                None => {
                    let mut out = row.clone();
                    out.extend(std::iter::repeat_n(None, right_cols.len()));
                    joined.rows.push(out);
                }
            }
        }
        Ok(joined)
    }
}

fn non_empty(cell: &str) -> Cell {
    if cell.is_empty() {
        None
    } else {
        Some(cell.to_string())
    }
}
