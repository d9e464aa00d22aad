mod common;

use common::{heating_rows, n, source, t, ventilation_rows};
use roomplan_tools::ToolError;
use roomplan_tools::config::PipelineConfig;
use roomplan_tools::estimate::{
    DEFAULT_AREA_M2, FALLBACK_COOLING_W_PER_M2, FALLBACK_HEATING_W_PER_M2, ReferenceEntry,
};
use roomplan_tools::io::{excel_read, excel_write};
use roomplan_tools::model::{
    CellValue, ColumnRole, DetectionMethod, EstimateBasis, RoomKey, SourceTag, TypeOrigin,
};
use roomplan_tools::pipeline::{DEFAULT_PROJECT_NAME, MergeRequest, Pipeline, SourceFile};
use tempfile::tempdir;

fn pipeline() -> Pipeline {
    Pipeline::new(PipelineConfig::default(), None).expect("pipeline built")
}

fn fixture_request() -> MergeRequest {
    MergeRequest::new(
        source("heizung.xlsx", &heating_rows()),
        source("lueftung.xlsx", &ventilation_rows()),
    )
}

#[test]
fn single_room_example_yields_800_watts() {
    let mut config = PipelineConfig::default();
    config.estimation.reference = vec![ReferenceEntry {
        code: 2,
        heating_w_per_m2: 40.0,
        cooling_w_per_m2: 10.0,
    }];
    let pipeline = Pipeline::new(config, None).expect("pipeline built");

    let heating = source(
        "heating.xlsx",
        &[
            vec![t("Raum-Nr."), t("Fläche"), t("Nummer Raumtyp")],
            vec![t("101"), n(20.0), n(2.0)],
        ],
    );
    let ventilation = source(
        "ventilation.xlsx",
        &[vec![t("Raum-Nr."), t("Fläche")], vec![t("101"), n(21.0)]],
    );
    let analysis = pipeline
        .merge_and_estimate(&MergeRequest::new(heating, ventilation), None)
        .expect("analysis");

    let table = &analysis.merge.table;
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.value(0, "RoomNumber"), Some(&CellValue::Text("101".into())));
    assert_eq!(table.value(0, "Area"), Some(&CellValue::Float(20.0)));
    assert_eq!(table.value(0, "Area_heating"), Some(&CellValue::Float(20.0)));
    assert_eq!(table.value(0, "Area_ventilation"), Some(&CellValue::Float(21.0)));
    assert_eq!(table.value(0, "RoomTypeCode"), Some(&CellValue::Int(2)));
    assert_eq!(table.value(0, "Source"), Some(&CellValue::Text("both".into())));

    let estimate = &analysis.estimation.estimates[0];
    assert_eq!(estimate.heating_w_per_m2, 40.0);
    assert_eq!(estimate.cooling_w_per_m2, 10.0);
    assert_eq!(estimate.room_type, 2);
    assert_eq!(estimate.basis, EstimateBasis::Lookup);
    assert_eq!(estimate.heating_w(), 800.0);
    assert_eq!(analysis.estimation.report.heating_power_kw, 0.8);
}

#[test]
fn merges_exports_with_title_blocks() {
    let merged = pipeline().merge(&fixture_request()).expect("merged");

    assert_eq!(merged.heating_header.header_row_index, 3);
    assert_eq!(merged.ventilation_header.header_row_index, 1);
    assert_eq!(merged.heating_header.method, DetectionMethod::Heuristic);

    let keys: Vec<String> = merged.rooms.iter().map(|room| room.key.to_string()).collect();
    assert_eq!(keys, ["0.01", "0.02", "0.03", "1.10", "~heating:8"]);
    assert_eq!(
        merged.rooms[4].key,
        RoomKey::Unkeyed {
            source: SourceTag::Heating,
            row_index: 7
        }
    );

    let office = &merged.rooms[0];
    assert_eq!(office.area_m2(), Some(20.0));
    assert_eq!(office.room_name().as_deref(), Some("Büro"));
    assert_eq!(
        office.ventilation.get(&ColumnRole::RoomName),
        Some(&CellValue::Text("Einzelbüro".into()))
    );

    assert_eq!(merged.metrics.total_rooms, 4);
    assert_eq!(merged.metrics.total_area_m2, 93.5);
    assert_eq!(merged.metrics.source_room_types, 1);
}

#[test]
fn merged_table_keeps_every_source_value() {
    let merged = pipeline().merge(&fixture_request()).expect("merged");
    let table = &merged.table;

    assert_eq!(
        table.columns,
        [
            "RoomNumber",
            "RoomName",
            "RoomName_heating",
            "RoomName_ventilation",
            "Floor",
            "Area",
            "Area_heating",
            "Area_ventilation",
            "RoomTypeCode",
            "Heizlast [W]",
            "Volumenstrom [m³/h]",
            "Source",
        ]
    );

    assert_eq!(table.value(0, "Heizlast [W]"), Some(&CellValue::Float(900.0)));
    assert_eq!(table.value(0, "Volumenstrom [m³/h]"), Some(&CellValue::Float(120.0)));
    assert_eq!(table.value(0, "Floor"), Some(&CellValue::Text("EG".into())));
    assert_eq!(table.value(0, "Area_ventilation"), Some(&CellValue::Float(21.0)));
    assert_eq!(table.value(3, "Source"), Some(&CellValue::Text("ventilation".into())));
    assert_eq!(table.value(3, "Floor"), None);
    assert_eq!(table.value(4, "RoomNumber"), None);
    assert_eq!(
        table.value(4, "RoomName"),
        Some(&CellValue::Text("Abstellkammer".into()))
    );
}

#[test]
fn rooms_are_typed_from_source_or_name() {
    let merged = pipeline().merge(&fixture_request()).expect("merged");
    let codes: Vec<(u32, TypeOrigin)> = merged
        .assignments
        .iter()
        .map(|assignment| (assignment.room_type_code, assignment.origin))
        .collect();

    assert_eq!(
        codes,
        [
            (1, TypeOrigin::FromSource),
            (18, TypeOrigin::FromClassifier),
            (15, TypeOrigin::FromClassifier),
            (4, TypeOrigin::FromClassifier),
            (14, TypeOrigin::FromClassifier),
        ]
    );
    assert_eq!(merged.classification.from_source, 1);
    assert_eq!(merged.classification.from_classifier, 4);
    assert_eq!(merged.classification.unresolved, 0);
}

#[test]
fn estimate_uses_requested_price() {
    let pipeline = pipeline();
    let merged = pipeline.merge(&fixture_request()).expect("merged");

    let default_price = pipeline.estimate(&merged, None).expect("default price");
    let custom_price = pipeline.estimate(&merged, Some(0.5)).expect("custom price");

    assert_eq!(default_price.report.price_per_kwh, 0.30);
    assert_eq!(custom_price.report.price_per_kwh, 0.5);
    assert_eq!(
        custom_price.report.annual_savings,
        custom_price.report.savings_kwh * 0.5
    );
    assert_eq!(default_price.report.savings_kwh, custom_price.report.savings_kwh);
    assert_eq!(default_price.report.room_count, 5);
    assert!(
        default_price
            .estimates
            .iter()
            .all(|estimate| estimate.basis == EstimateBasis::Lookup)
    );
}

#[test]
fn header_only_exports_are_rejected() {
    let heating = source("heating.xlsx", &[vec![t("Raum-Nr."), t("Fläche")]]);
    let ventilation = source("ventilation.xlsx", &[vec![t("Raumnummer"), t("Flaeche")]]);

    let err = pipeline()
        .merge(&MergeRequest::new(heating, ventilation))
        .expect_err("nothing to merge");
    assert!(matches!(err, ToolError::EmptyMerge));
    assert!(err.is_validation());
}

#[test]
fn rejects_non_excel_uploads() {
    let heating = SourceFile::new("heating.csv", b"Raum-Nr.;Flaeche\n1;20\n".to_vec());
    let ventilation = source("ventilation.xlsx", &ventilation_rows());

    let err = pipeline()
        .merge(&MergeRequest::new(heating, ventilation))
        .expect_err("csv is not accepted");
    assert!(matches!(err, ToolError::UnsupportedFileType(_)));
}

#[test]
fn declared_header_row_applies_to_both_exports() {
    let heating = source(
        "heating.xlsx",
        &[
            vec![t("Heizung")],
            vec![t("Nr"), t("Größe")],
            vec![t("A1"), n(12.0)],
        ],
    );
    let ventilation = source(
        "ventilation.xlsx",
        &[
            vec![t("Lüftung")],
            vec![t("Raum-Nr."), t("Fläche")],
            vec![t("A1"), n(13.0)],
        ],
    );
    let mut request = MergeRequest::new(heating, ventilation);
    request.header_row = Some(1);

    let merged = pipeline().merge(&request).expect("merged");
    assert_eq!(merged.heating_header.method, DetectionMethod::Declared);
    assert_eq!(merged.ventilation_header.method, DetectionMethod::Declared);
    // Unrecognised heating labels carry no room number, so its row is unkeyed.
    assert_eq!(merged.rooms.len(), 2);
    assert_eq!(merged.rooms[0].room_number(), Some("A1"));
    assert!(!merged.rooms[1].key.is_keyed());
}

#[test]
fn analysis_workbook_has_three_sheets() {
    let analysis = pipeline()
        .merge_and_estimate(&fixture_request(), None)
        .expect("analysis");
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("analysis.xlsx");
    excel_write::write_analysis(&path, &analysis).expect("workbook written");

    let merged = excel_read::read_raw_sheet_from_path(&path, Some(excel_write::MERGED_SHEET))
        .expect("merged sheet");
    assert_eq!(merged.rows.len(), 6);
    assert_eq!(merged.rows[0][0], t("RoomNumber"));

    let estimates = excel_read::read_raw_sheet_from_path(&path, Some(excel_write::ESTIMATES_SHEET))
        .expect("estimates sheet");
    assert_eq!(estimates.rows.len(), 6);
    assert_eq!(estimates.rows[1][0], t("0.01"));
    assert_eq!(estimates.rows[1][12], t("lookup"));

    let room_types =
        excel_read::read_raw_sheet_from_path(&path, Some(excel_write::ROOM_TYPES_SHEET))
            .expect("room types sheet");
    assert_eq!(
        room_types.rows.len(),
        1 + analysis.estimation.report.breakdown.len()
    );
}

#[test]
fn clashing_source_labels_still_export() {
    let heating = source(
        "heating.xlsx",
        &[
            vec![t("Room Number"), t("Area"), t("Source")],
            vec![t("1.01"), t("n/a"), t("survey")],
        ],
    );
    let ventilation = source(
        "ventilation.xlsx",
        &[vec![t("Raumnummer"), t("Flaeche")], vec![t("1.01"), n(21.0)]],
    );
    let analysis = pipeline()
        .merge_and_estimate(&MergeRequest::new(heating, ventilation), None)
        .expect("analysis");

    let table = &analysis.merge.table;
    assert_eq!(
        table.columns,
        ["RoomNumber", "Area", "Area (2)", "Source (2)", "Source"]
    );
    assert_eq!(table.value(0, "Area"), Some(&CellValue::Float(21.0)));
    assert_eq!(table.value(0, "Area (2)"), Some(&CellValue::Text("n/a".into())));
    assert_eq!(table.value(0, "Source"), Some(&CellValue::Text("both".into())));
    assert_eq!(table.value(0, "Source (2)"), Some(&CellValue::Text("survey".into())));

    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("analysis.xlsx");
    excel_write::write_analysis(&path, &analysis).expect("workbook written");
    let merged = excel_read::read_raw_sheet_from_path(&path, Some(excel_write::MERGED_SHEET))
        .expect("merged sheet");
    assert_eq!(merged.rows[0][2], t("Area (2)"));
    assert_eq!(merged.rows[1][2], t("n/a"));
}

#[test]
fn untyped_rooms_without_area_fall_back() {
    let heating = source(
        "heating.xlsx",
        &[
            vec![t("Raum-Nr."), t("Raum-Bezeichnung"), t("Fläche")],
            vec![t("1.01"), t("Büro"), n(20.0)],
            vec![t("1.02")],
        ],
    );
    let ventilation = source(
        "ventilation.xlsx",
        &[vec![t("Raumnummer"), t("Flaeche")], vec![t("1.01"), n(20.0)]],
    );
    let analysis = pipeline()
        .merge_and_estimate(&MergeRequest::new(heating, ventilation), None)
        .expect("analysis");

    let assignment = &analysis.merge.assignments[1];
    assert_eq!(assignment.room_type_code, 0);
    assert_eq!(assignment.origin, TypeOrigin::Unresolved);
    assert_eq!(analysis.merge.classification.unresolved, 1);

    let estimate = &analysis.estimation.estimates[1];
    assert_eq!(estimate.basis, EstimateBasis::Fallback);
    assert!(estimate.area_assumed);
    assert_eq!(estimate.area_m2, DEFAULT_AREA_M2);
    assert_eq!(estimate.heating_w_per_m2, FALLBACK_HEATING_W_PER_M2);
    assert_eq!(estimate.cooling_w_per_m2, FALLBACK_COOLING_W_PER_M2);

    let report = &analysis.estimation.report;
    assert_eq!(report.room_count, 2);
    assert_eq!(report.fallback_rooms, 1);
    assert_eq!(report.assumed_area_rooms, 1);
}

#[test]
fn request_price_is_validated() {
    let pipeline = pipeline();
    let merged = pipeline.merge(&fixture_request()).expect("merged");
    for price in [-0.3, f64::NAN] {
        let err = pipeline.estimate(&merged, Some(price)).expect_err("bad price");
        assert!(matches!(err, ToolError::InvalidConfig(_)));
    }
    let err = pipeline
        .merge_and_estimate(&fixture_request(), Some(f64::INFINITY))
        .expect_err("bad price");
    assert!(matches!(err, ToolError::InvalidConfig(_)));
}

#[test]
fn stale_assignments_are_classified_again() {
    let pipeline = pipeline();
    let mut merged = pipeline.merge(&fixture_request()).expect("merged");
    let complete = pipeline.estimate(&merged, None).expect("estimated");

    merged.assignments.truncate(2);
    let recovered = pipeline.estimate(&merged, None).expect("estimated");
    assert_eq!(recovered.estimates.len(), merged.rooms.len());
    assert_eq!(recovered, complete);
}

#[test]
fn project_name_defaults_when_missing_or_blank() {
    let merged = pipeline().merge(&fixture_request()).expect("merged");
    assert_eq!(merged.project_name, DEFAULT_PROJECT_NAME);

    let mut request = fixture_request();
    request.project_name = Some("  ".into());
    let merged = pipeline().merge(&request).expect("merged");
    assert_eq!(merged.project_name, DEFAULT_PROJECT_NAME);

    request.project_name = Some("Verwaltungsgebäude Nord".into());
    let merged = pipeline().merge(&request).expect("merged");
    assert_eq!(merged.project_name, "Verwaltungsgebäude Nord");
}
