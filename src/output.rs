//! Writing the merged entity table and the augmented transaction table

use log::debug;
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::config::{entity_columns, transaction_columns};
use crate::data::Transaction;
use crate::merge::EnrichedEntity;

/// Derived column names of the merged entity table
pub mod derived_columns {
    pub const AGE_YEARS: &str = "AGE_YEARS";
    pub const PAYMENT_SUM: &str = "PAYMENT_SUM";
    pub const PAYMENT_COUNT: &str = "PAYMENT_COUNT";
    pub const RECEIPT_SUM: &str = "RECEIPT_SUM";
    pub const RECEIPT_COUNT: &str = "RECEIPT_COUNT";
    pub const CLUSTER: &str = "CLUSTER";
    pub const LIFECYCLE: &str = "LIFECYCLE";
    pub const CENTRALITY: &str = "CENTRALITY";
    pub const DEPENDENCY: &str = "DEPENDENCY";
    pub const PROJECTION: &str = "PROJECTION";
    /// Year-month bucket added to the transaction table
    pub const MONTH: &str = "MONTH";
}

/// Build the merged entity table, columns in contract order
pub fn entity_frame(rows: &[EnrichedEntity]) -> crate::Result<DataFrame> {
    use derived_columns as d;

    let iso = |date: Option<chrono::NaiveDate>| {
        date.map(|value| value.format("%Y-%m-%d").to_string())
    };

    let ids: Vec<&str> = rows.iter().map(|r| r.record.id.as_str()).collect();
    let reference_dates: Vec<Option<String>> =
        rows.iter().map(|r| iso(r.record.reference_date)).collect();
    let opening_dates: Vec<Option<String>> =
        rows.iter().map(|r| iso(r.record.opening_date)).collect();
    let revenue: Vec<f64> = rows.iter().map(|r| r.record.revenue).collect();
    let balance: Vec<f64> = rows.iter().map(|r| r.record.balance).collect();
    let industry: Vec<&str> = rows.iter().map(|r| r.record.industry_code.as_str()).collect();
    let age: Vec<f64> = rows.iter().map(|r| r.age_years).collect();
    let payment_sum: Vec<f64> = rows.iter().map(|r| r.flows.payment_sum).collect();
    let payment_count: Vec<u64> = rows.iter().map(|r| r.flows.payment_count).collect();
    let receipt_sum: Vec<f64> = rows.iter().map(|r| r.flows.receipt_sum).collect();
    let receipt_count: Vec<u64> = rows.iter().map(|r| r.flows.receipt_count).collect();
    let cluster: Vec<u32> = rows.iter().map(|r| r.cluster as u32).collect();
    let stage: Vec<&str> = rows.iter().map(|r| r.stage.as_str()).collect();
    let centrality: Vec<f64> = rows.iter().map(|r| r.centrality).collect();
    let dependency: Vec<f64> = rows.iter().map(|r| r.dependency).collect();
    let projection: Vec<f64> = rows.iter().map(|r| r.projection).collect();

    let df = DataFrame::new(vec![
        Series::new(entity_columns::ID, ids),
        Series::new(entity_columns::REFERENCE_DATE, reference_dates),
        Series::new(entity_columns::OPENING_DATE, opening_dates),
        Series::new(entity_columns::REVENUE, revenue),
        Series::new(entity_columns::BALANCE, balance),
        Series::new(entity_columns::INDUSTRY_CODE, industry),
        Series::new(d::AGE_YEARS, age),
        Series::new(d::PAYMENT_SUM, payment_sum),
        Series::new(d::PAYMENT_COUNT, payment_count),
        Series::new(d::RECEIPT_SUM, receipt_sum),
        Series::new(d::RECEIPT_COUNT, receipt_count),
        Series::new(d::CLUSTER, cluster),
        Series::new(d::LIFECYCLE, stage),
        Series::new(d::CENTRALITY, centrality),
        Series::new(d::DEPENDENCY, dependency),
        Series::new(d::PROJECTION, projection),
    ])?;

    Ok(df)
}

/// Build the transaction table with parsed date and month bucket
pub fn transaction_frame(transactions: &[Transaction]) -> crate::Result<DataFrame> {
    let payers: Vec<&str> = transactions.iter().map(|t| t.payer.as_str()).collect();
    let payees: Vec<&str> = transactions.iter().map(|t| t.payee.as_str()).collect();
    let amounts: Vec<f64> = transactions.iter().map(|t| t.amount).collect();
    let dates: Vec<Option<String>> = transactions
        .iter()
        .map(|t| t.date.map(|d| d.format("%Y-%m-%d").to_string()))
        .collect();
    let months: Vec<Option<String>> = transactions
        .iter()
        .map(|t| t.month().map(|m| m.to_string()))
        .collect();

    let df = DataFrame::new(vec![
        Series::new(transaction_columns::PAYER, payers),
        Series::new(transaction_columns::PAYEE, payees),
        Series::new(transaction_columns::AMOUNT, amounts),
        Series::new(transaction_columns::DATE, dates),
        Series::new(derived_columns::MONTH, months),
    ])?;

    Ok(df)
}

/// Write both output tables, or neither
///
/// Each table goes to a sibling `.tmp` file first; the final names only
/// appear once both writes have succeeded.
pub fn write_outputs(
    entity_path: &Path,
    transaction_path: &Path,
    separator: u8,
    rows: &[EnrichedEntity],
    transactions: &[Transaction],
) -> crate::Result<()> {
    let mut entities_df = entity_frame(rows)?;
    let mut transactions_df = transaction_frame(transactions)?;

    let entity_tmp = staging_path(entity_path);
    let transaction_tmp = staging_path(transaction_path);

    let staged = write_csv(&mut entities_df, &entity_tmp, separator)
        .and_then(|_| write_csv(&mut transactions_df, &transaction_tmp, separator));

    if let Err(e) = staged {
        let _ = fs::remove_file(&entity_tmp);
        let _ = fs::remove_file(&transaction_tmp);
        return Err(e);
    }

    let discard_staged = || {
        let _ = fs::remove_file(&entity_tmp);
        let _ = fs::remove_file(&transaction_tmp);
    };

    if let Err(e) = fs::rename(&entity_tmp, entity_path) {
        discard_staged();
        return Err(anyhow::anyhow!("cannot move {} into place: {}", entity_path.display(), e));
    }
    if let Err(e) = fs::rename(&transaction_tmp, transaction_path) {
        // The entity table is already in place; take it back out
        let _ = fs::remove_file(entity_path);
        discard_staged();
        return Err(anyhow::anyhow!(
            "cannot move {} into place: {}",
            transaction_path.display(),
            e
        ));
    }

    debug!(
        "Wrote {} entity rows to {} and {} transactions to {}",
        rows.len(),
        entity_path.display(),
        transactions.len(),
        transaction_path.display()
    );

    Ok(())
}

/// Write a frame as delimited text with a header row
pub fn write_csv(df: &mut DataFrame, path: &Path, separator: u8) -> crate::Result<()> {
    let mut file = File::create(path)
        .map_err(|e| anyhow::anyhow!("cannot create {}: {}", path.display(), e))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(separator)
        .finish(df)?;
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
