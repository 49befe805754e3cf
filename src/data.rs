//! Snapshot and transaction loading with Polars, plus the typed records the pipeline works on

use anyhow::Context;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use log::{debug, warn};
use polars::prelude::*;
use std::fmt;
use std::path::Path;

use crate::config::{entity_columns, transaction_columns, DATE_FORMATS};
use crate::error::InputError;

/// Average calendar year length used for company age
const DAYS_PER_YEAR: f64 = 365.25;

/// One company observation (one row of the snapshot table)
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    /// Trimmed, upper-cased identifier used as the join key everywhere
    pub id: String,
    pub reference_date: Option<NaiveDate>,
    pub opening_date: Option<NaiveDate>,
    /// Annual revenue
    pub revenue: f64,
    /// Account balance at the reference date
    pub balance: f64,
    /// Free-text industry classification code
    pub industry_code: String,
    /// Elapsed years between opening and reference date, `None` if either date is missing
    pub age_years: Option<f64>,
}

impl EntityRecord {
    /// Build a record, normalizing the identifier and deriving the age.
    pub fn new(
        id: &str,
        reference_date: Option<NaiveDate>,
        opening_date: Option<NaiveDate>,
        revenue: f64,
        balance: f64,
        industry_code: &str,
    ) -> Self {
        Self {
            id: normalize_id(id),
            reference_date,
            opening_date,
            revenue,
            balance,
            industry_code: industry_code.trim().to_string(),
            age_years: age_in_years(reference_date, opening_date),
        }
    }
}

/// One payer → payee transfer
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub payer: String,
    pub payee: String,
    /// Magnitude of the transferred amount
    pub amount: f64,
    pub date: Option<NaiveDate>,
}

impl Transaction {
    pub fn new(payer: &str, payee: &str, amount: f64, date: Option<NaiveDate>) -> Self {
        Self {
            payer: normalize_id(payer),
            payee: normalize_id(payee),
            amount: amount.abs(),
            date,
        }
    }

    /// Calendar month the transaction falls in, if it is dated
    pub fn month(&self) -> Option<MonthBucket> {
        self.date.map(MonthBucket::of)
    }

    /// Both payer and payee identifiers are present
    pub fn has_parties(&self) -> bool {
        !self.payer.is_empty() && !self.payee.is_empty()
    }
}

/// Calendar year-month used to bucket receipts into a time series
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
}

impl MonthBucket {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for MonthBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Trim surrounding whitespace and upper-case an identifier
pub fn normalize_id(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Parse a date in any of the accepted layouts, `None` when nothing matches
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DATE_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(raw, format)
            .map(|dt| dt.date())
            .or_else(|_| NaiveDate::parse_from_str(raw, format))
            .ok()
    })
}

/// Parse a numeric cell. A decimal comma is accepted when no decimal point is present.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let parsed = raw.parse::<f64>().ok().or_else(|| {
        if raw.contains(',') && !raw.contains('.') {
            raw.replace(',', ".").parse::<f64>().ok()
        } else {
            None
        }
    });

    parsed.filter(|value| value.is_finite())
}

/// Company age as elapsed days / 365.25
///
/// # Returns
/// * `None` if either date is missing
pub fn age_in_years(reference: Option<NaiveDate>, opening: Option<NaiveDate>) -> Option<f64> {
    let (reference, opening) = (reference?, opening?);
    Some((reference - opening).num_days() as f64 / DAYS_PER_YEAR)
}

/// Load the company snapshot table
///
/// # Arguments
/// * `file_path` - Path to the delimited snapshot file
/// * `separator` - Field delimiter of the file
///
/// # Returns
/// * One `EntityRecord` per input row, in file order
pub fn load_entities(file_path: &Path, separator: u8) -> crate::Result<Vec<EntityRecord>> {
    let df = read_table(file_path, separator)?;

    if df.height() == 0 {
        return Err(InputError::EmptyTable {
            path: file_path.to_path_buf(),
        }
        .into());
    }

    let ids = string_column(&df, entity_columns::ID, file_path)?;
    let reference_dates = date_column(&df, entity_columns::REFERENCE_DATE, file_path)?;
    let opening_dates = date_column(&df, entity_columns::OPENING_DATE, file_path)?;
    let revenue = number_column(&df, entity_columns::REVENUE, file_path)?;
    let balance = number_column(&df, entity_columns::BALANCE, file_path)?;
    let industry = string_column(&df, entity_columns::INDUSTRY_CODE, file_path)?;

    let records: Vec<EntityRecord> = (0..df.height())
        .map(|i| {
            EntityRecord::new(
                ids[i].as_deref().unwrap_or_default(),
                reference_dates[i],
                opening_dates[i],
                revenue[i],
                balance[i],
                industry[i].as_deref().unwrap_or_default(),
            )
        })
        .collect();

    let missing_id = records.iter().filter(|r| r.id.is_empty()).count();
    if missing_id > 0 {
        warn!(
            "{} snapshot rows have no identifier; they receive zero flow and network metrics",
            missing_id
        );
    }

    let missing_age = records.iter().filter(|r| r.age_years.is_none()).count();
    if missing_age > 0 {
        warn!(
            "{} of {} snapshot rows have no computable age; it is zero-filled for clustering",
            missing_age,
            records.len()
        );
    }
    debug!("Loaded {} snapshot rows from {}", records.len(), file_path.display());

    Ok(records)
}

/// Load the transaction log. An empty log is valid.
pub fn load_transactions(file_path: &Path, separator: u8) -> crate::Result<Vec<Transaction>> {
    let df = read_table(file_path, separator)?;

    let payers = string_column(&df, transaction_columns::PAYER, file_path)?;
    let payees = string_column(&df, transaction_columns::PAYEE, file_path)?;
    let amounts = number_column(&df, transaction_columns::AMOUNT, file_path)?;
    let dates = date_column(&df, transaction_columns::DATE, file_path)?;

    let transactions: Vec<Transaction> = (0..df.height())
        .map(|i| {
            Transaction::new(
                payers[i].as_deref().unwrap_or_default(),
                payees[i].as_deref().unwrap_or_default(),
                amounts[i],
                dates[i],
            )
        })
        .collect();

    let missing_party = transactions.iter().filter(|tx| !tx.has_parties()).count();
    if missing_party > 0 {
        warn!(
            "{}: {} transactions lack a payer or payee and are left out of aggregates",
            file_path.display(),
            missing_party
        );
    }

    debug!(
        "Loaded {} transactions from {}",
        transactions.len(),
        file_path.display()
    );

    Ok(transactions)
}

/// Read a delimited file with every column kept as text; coercion happens per column afterwards.
fn read_table(file_path: &Path, separator: u8) -> crate::Result<DataFrame> {
    if !file_path.is_file() {
        return Err(InputError::MissingFile {
            path: file_path.to_path_buf(),
        }
        .into());
    }

    let df = LazyCsvReader::new(file_path)
        .with_has_header(true)
        .with_separator(separator)
        .with_infer_schema_length(Some(0))
        .finish()
        .and_then(|lf| lf.collect())
        .with_context(|| format!("failed to read {}", file_path.display()))?;

    Ok(df)
}

fn string_column(df: &DataFrame, name: &str, path: &Path) -> crate::Result<Vec<Option<String>>> {
    let series = df.column(name).map_err(|_| InputError::MissingColumn {
        path: path.to_path_buf(),
        column: name.to_string(),
    })?;
    let series = series.cast(&DataType::String)?;

    let values = series
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_owned))
        .collect();

    Ok(values)
}

fn date_column(df: &DataFrame, name: &str, path: &Path) -> crate::Result<Vec<Option<NaiveDate>>> {
    let raw = string_column(df, name, path)?;
    let mut failures = 0usize;

    let dates = raw
        .iter()
        .map(|cell| {
            let cell = cell.as_deref()?;
            let parsed = parse_date(cell);
            if parsed.is_none() {
                failures += 1;
            }
            parsed
        })
        .collect();

    if failures > 0 {
        warn!(
            "{}: {} unparsable values in column {} were set to missing",
            path.display(),
            failures,
            name
        );
    }

    Ok(dates)
}

fn number_column(df: &DataFrame, name: &str, path: &Path) -> crate::Result<Vec<f64>> {
    let raw = string_column(df, name, path)?;
    let mut failures = 0usize;

    let numbers = raw
        .iter()
        .map(|cell| match cell.as_deref().and_then(parse_amount) {
            Some(value) => value,
            None => {
                failures += 1;
                0.0
            }
        })
        .collect();

    if failures > 0 {
        warn!(
            "{}: {} empty or unparsable values in column {} were set to 0",
            path.display(),
            failures,
            name
        );
    }

    Ok(numbers)
}
