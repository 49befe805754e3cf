//! Integration tests for SegmentForge

use segmentforge::{
    run_pipeline, ClusterParams, EnrichedEntity, InputError, LifecycleStage, PipelineConfig,
};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::{tempdir, NamedTempFile, TempDir};

/// Create a snapshot table with two snapshots for some companies
fn create_entity_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "ID;DT_REFE;DT_ABRT;VL_FATU;VL_SLDO;DS_CNAE").unwrap();

    // Small companies
    writeln!(file, "c01;2024-01-31;2022-01-01;50000;1000;Retail").unwrap();
    writeln!(file, "c01;2024-02-29;2022-01-01;50000;1200;Retail").unwrap();
    writeln!(file, "c02;2024-01-31;2021-06-15;60000;-300;Retail").unwrap();
    writeln!(file, " c03 ;2024-01-31;2022-03-01;55000;800;Retail").unwrap();

    // Growing
    writeln!(file, "C04;2024-01-31;2019-01-01;400000;15000;Logistics").unwrap();
    writeln!(file, "C05;2024-01-31;2018-05-20;450000;18000;Logistics").unwrap();
    writeln!(file, "C06;2024-01-31;2019-09-09;420000;16000;Logistics").unwrap();

    // Established
    writeln!(file, "C07;2024-01-31;2010-01-01;2000000;90000;Industry").unwrap();
    writeln!(file, "C08;2024-01-31;2009-03-03;2100000;95000;Industry").unwrap();
    writeln!(file, "C09;2024-01-31;broken;2050000;91000;Industry").unwrap();

    // Large
    writeln!(file, "C10;2024-01-31;2000-01-01;9000000;400000;Energy").unwrap();
    writeln!(file, "C10;2024-02-29;2000-01-01;9000000;420000;Energy").unwrap();
    writeln!(file, "C11;2024-01-31;1998-01-01;9500000;410000;Energy").unwrap();

    // Never transacts
    writeln!(file, "LONELY;2024-01-31;2015-01-01;70000;2000;Retail").unwrap();

    file
}

/// Create a transaction log between the companies above
fn create_transaction_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "ID_PGTO;ID_RCBE;VL;DT_REFE").unwrap();

    // c01 receives 100 then 150
    writeln!(file, "C04;c01;100;2024-01-10").unwrap();
    writeln!(file, "C05;C01;150;2024-02-10").unwrap();

    // C02 receives a single month of 80
    writeln!(file, "C07;C02;80;2024-01-15").unwrap();

    // C10 receives over three months, last two are 100 then 200
    writeln!(file, "C07;C10;500;2023-12-05").unwrap();
    writeln!(file, "C08;C10;100;2024-01-05").unwrap();
    writeln!(file, "C11;C10;200;2024-02-05").unwrap();

    // Undated and negative entries still count as flows
    writeln!(file, "C10;C11;-300;not a date").unwrap();
    writeln!(file, "C06;C09;40;2024-02-01").unwrap();

    file
}

struct Workspace {
    _dir: TempDir,
    _entities: NamedTempFile,
    _transactions: NamedTempFile,
    config: PipelineConfig,
}

fn workspace() -> Workspace {
    let dir = tempdir().unwrap();
    let entities = create_entity_csv();
    let transactions = create_transaction_csv();

    let config = PipelineConfig {
        entities_path: entities.path().to_path_buf(),
        transactions_path: transactions.path().to_path_buf(),
        entity_output: dir.path().join("entities_enriched.csv"),
        transaction_output: dir.path().join("transactions_enriched.csv"),
        ..PipelineConfig::default()
    };

    Workspace {
        _dir: dir,
        _entities: entities,
        _transactions: transactions,
        config,
    }
}

fn read_rows(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let text = fs::read_to_string(path).unwrap();
    let mut lines = text.lines();
    let header = lines
        .next()
        .unwrap()
        .split(',')
        .map(str::to_string)
        .collect();
    let rows = lines
        .map(|line| line.split(',').map(str::to_string).collect())
        .collect();
    (header, rows)
}

/// Stages present in the output must rank by mean revenue, Small lowest and Large highest
fn assert_stage_means_ordered(rows: &[EnrichedEntity]) {
    let means: Vec<f64> = LifecycleStage::ALL
        .iter()
        .filter_map(|stage| {
            let revenues: Vec<f64> = rows
                .iter()
                .filter(|r| r.stage == *stage)
                .map(|r| r.record.revenue)
                .collect();
            (!revenues.is_empty()).then(|| revenues.iter().sum::<f64>() / revenues.len() as f64)
        })
        .collect();

    assert!(means.len() >= 2);
    assert!(means.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(rows.iter().any(|r| r.stage == LifecycleStage::Small));
    assert!(rows.iter().any(|r| r.stage == LifecycleStage::Large));
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_end_to_end_pipeline() {
    let ws = workspace();
    let analysis = run_pipeline(&ws.config).unwrap();

    // Row count preserved, nothing dropped or duplicated
    assert_eq!(analysis.entities.len(), 14);
    assert_eq!(analysis.transactions.len(), 8);

    let (header, rows) = read_rows(&ws.config.entity_output);
    assert_eq!(rows.len(), 14);
    assert_eq!(header.len(), 16);
    assert_eq!(header[12], "LIFECYCLE");

    let (tx_header, tx_rows) = read_rows(&ws.config.transaction_output);
    assert_eq!(tx_header, vec!["ID_PGTO", "ID_RCBE", "VL", "DT_REFE", "MONTH"]);
    assert_eq!(tx_rows.len(), 8);
    assert_eq!(tx_rows[0][4], "2024-01");
    assert_eq!(tx_rows[6][4], "");
}

#[test]
fn test_projection_policies() {
    let ws = workspace();
    let analysis = run_pipeline(&ws.config).unwrap();
    let projection = |id: &str| {
        analysis
            .entities
            .iter()
            .find(|e| e.id() == id)
            .map(|e| e.projection)
            .unwrap()
    };

    assert!(close(projection("C01"), 225.0));
    assert!(close(projection("C02"), 80.0));
    assert!(close(projection("C10"), 170.0));
    assert_eq!(projection("C11"), 0.0); // only an undated receipt
}

#[test]
fn test_untransacted_company_gets_zero_defaults() {
    let ws = workspace();
    let analysis = run_pipeline(&ws.config).unwrap();
    let lonely = analysis
        .entities
        .iter()
        .find(|e| e.id() == "LONELY")
        .unwrap();

    assert_eq!(lonely.centrality, 0.0);
    assert_eq!(lonely.dependency, 0.0);
    assert_eq!(lonely.projection, 0.0);
    assert_eq!(lonely.flows.payment_sum, 0.0);
    assert_eq!(lonely.flows.payment_count, 0);
    assert_eq!(lonely.flows.receipt_sum, 0.0);
    assert_eq!(lonely.flows.receipt_count, 0);
}

#[test]
fn test_lifecycle_order_and_bounds() {
    let ws = workspace();
    let analysis = run_pipeline(&ws.config).unwrap();

    assert_stage_means_ordered(&analysis.entities);

    for entity in &analysis.entities {
        assert!((0.0..=1.0).contains(&entity.centrality));
        assert!((0.0..=1.0).contains(&entity.dependency));
        assert!(entity.projection >= 0.0);
    }

    // Network values are shared by every snapshot of a company
    let c10: Vec<_> = analysis.entities.iter().filter(|e| e.id() == "C10").collect();
    assert_eq!(c10.len(), 2);
    assert_eq!(c10[0].centrality, c10[1].centrality);
    assert_eq!(c10[0].dependency, c10[1].dependency);

    // Unparsable opening date is zero-filled
    let c09 = analysis.entities.iter().find(|e| e.id() == "C09").unwrap();
    assert_eq!(c09.age_years, 0.0);
}

#[test]
fn test_reruns_are_identical() {
    let ws = workspace();
    let first = run_pipeline(&ws.config).unwrap();
    let first_table = fs::read_to_string(&ws.config.entity_output).unwrap();

    let second = run_pipeline(&ws.config).unwrap();
    let second_table = fs::read_to_string(&ws.config.entity_output).unwrap();

    assert_eq!(first.entities, second.entities);
    assert_eq!(first_table, second_table);
}

#[test]
fn test_different_seed_keeps_ordinal_labels() {
    let ws = workspace();
    let mut config = ws.config.clone();
    config.clustering = ClusterParams {
        seed: 7,
        ..ClusterParams::default()
    };

    let analysis = run_pipeline(&config).unwrap();
    assert_stage_means_ordered(&analysis.entities);
}

#[test]
fn test_missing_input_aborts_without_output() {
    let ws = workspace();
    let mut config = ws.config.clone();
    config.transactions_path = ws.config.entity_output.with_file_name("nope.csv");

    let err = run_pipeline(&config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<InputError>(),
        Some(InputError::MissingFile { .. })
    ));
    assert!(!config.entity_output.exists());
    assert!(!config.transaction_output.exists());
}

#[test]
fn test_header_only_snapshot_table_is_rejected() {
    let ws = workspace();
    let mut empty = NamedTempFile::new().unwrap();
    writeln!(empty, "ID;DT_REFE;DT_ABRT;VL_FATU;VL_SLDO;DS_CNAE").unwrap();

    let mut config = ws.config.clone();
    config.entities_path = empty.path().to_path_buf();

    let err = run_pipeline(&config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<InputError>(),
        Some(InputError::EmptyTable { .. })
    ));
}
