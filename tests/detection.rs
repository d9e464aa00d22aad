mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{n, sheet, t};
use roomplan_tools::ToolError;
use roomplan_tools::config::DetectionSettings;
use roomplan_tools::detect::{
    DetectOptions, InferenceError, InferredStructure, SheetExcerpt, StructureDetector,
    StructureInference,
};
use roomplan_tools::load::load;
use roomplan_tools::model::{CellValue, ColumnRole, DetectionMethod, RawSheet, SourceTag};
use roomplan_tools::reconcile::reconcile;

struct ScriptedInference {
    respond: fn(&SheetExcerpt) -> Result<InferredStructure, InferenceError>,
    calls: AtomicUsize,
}

impl ScriptedInference {
    fn new(respond: fn(&SheetExcerpt) -> Result<InferredStructure, InferenceError>) -> Arc<Self> {
        Arc::new(Self {
            respond,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StructureInference for ScriptedInference {
    fn detect_structure(&self, excerpt: &SheetExcerpt) -> Result<InferredStructure, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(excerpt)
    }
}

fn detector(inference: Option<Arc<ScriptedInference>>) -> StructureDetector {
    StructureDetector::new(
        DetectionSettings::default(),
        inference.map(|stub| stub as Arc<dyn StructureInference>),
    )
}

fn auto() -> DetectOptions {
    DetectOptions {
        declared_header_row: None,
        auto_detect: true,
    }
}

/// Header with two recognised labels among six, below the confidence bar.
fn sparse_header_sheet() -> RawSheet {
    sheet(
        "sparse.xlsx",
        vec![
            vec![
                t("Raumnummer"),
                t("Fläche"),
                t("Soll-Temp."),
                t("Heizlast"),
                t("Heizkörper"),
                t("Bemerkung"),
            ],
            vec![t("1.01"), n(18.0), n(20.0), n(950.0), t("HK 22"), t("-")],
        ],
    )
}

/// Two identical header rows, e.g. a repeated header above a subtable.
fn repeated_header_sheet() -> RawSheet {
    sheet(
        "repeated.xlsx",
        vec![
            vec![t("Raum-Nr."), t("Fläche")],
            vec![t("Raum-Nr."), t("Fläche")],
            vec![t("1.01"), n(18.0)],
        ],
    )
}

fn sparse_answer(_: &SheetExcerpt) -> Result<InferredStructure, InferenceError> {
    Ok(InferredStructure {
        header_row_index: 0,
        column_roles: BTreeMap::from([
            ("Raumnummer".to_string(), "RoomNumber".to_string()),
            ("Fläche".to_string(), "Area".to_string()),
            ("Bemerkung".to_string(), "RoomName".to_string()),
        ]),
    })
}

fn timeout(_: &SheetExcerpt) -> Result<InferredStructure, InferenceError> {
    Err(InferenceError::Timeout(30))
}

fn invented_label(_: &SheetExcerpt) -> Result<InferredStructure, InferenceError> {
    Ok(InferredStructure {
        header_row_index: 0,
        column_roles: BTreeMap::from([("Raum".to_string(), "RoomNumber".to_string())]),
    })
}

#[test]
fn heuristic_skips_title_rows() {
    let raw = sheet("heating.xlsx", common::heating_rows());
    let spec = detector(None).detect(&raw, auto()).expect("detected");

    assert_eq!(spec.header_row_index, 3);
    assert_eq!(spec.method, DetectionMethod::Heuristic);
    assert_eq!(spec.role_of("Raum-Nr."), Some(ColumnRole::RoomNumber));
    assert_eq!(spec.role_of("Fläche [m²]"), Some(ColumnRole::Area));
    assert_eq!(spec.role_of("Nummer Raumtyp"), Some(ColumnRole::RoomTypeCode));
    assert_eq!(spec.role_of("Heizlast [W]"), Some(ColumnRole::Other));
}

#[test]
fn declared_row_bypasses_detection() {
    let stub = ScriptedInference::new(sparse_answer);
    let raw = sparse_header_sheet();
    let options = DetectOptions {
        declared_header_row: Some(0),
        auto_detect: true,
    };

    let spec = detector(Some(stub.clone())).detect(&raw, options).expect("declared");
    assert_eq!(spec.method, DetectionMethod::Declared);
    assert_eq!(spec.header_row_index, 0);
    assert!(spec.has_role(ColumnRole::RoomNumber));
    assert_eq!(stub.calls(), 0);
}

#[test]
fn declared_row_past_the_end_fails() {
    let options = DetectOptions {
        declared_header_row: Some(12),
        auto_detect: false,
    };
    let err = detector(None)
        .detect(&sparse_header_sheet(), options)
        .expect_err("row out of range");
    assert!(matches!(err, ToolError::StructureDetection { .. }));
}

#[test]
fn low_confidence_escalates_to_inference() {
    let stub = ScriptedInference::new(sparse_answer);
    let spec = detector(Some(stub.clone()))
        .detect(&sparse_header_sheet(), auto())
        .expect("inferred");

    assert_eq!(stub.calls(), 1);
    assert_eq!(spec.method, DetectionMethod::Inferred);
    assert_eq!(spec.role_of("Raumnummer"), Some(ColumnRole::RoomNumber));
    assert_eq!(spec.role_of("Bemerkung"), Some(ColumnRole::RoomName));
    assert_eq!(spec.role_of("Heizlast"), Some(ColumnRole::Other));
}

#[test]
fn low_confidence_without_inference_fails() {
    let err = detector(None)
        .detect(&sparse_header_sheet(), auto())
        .expect_err("ambiguous header");
    match err {
        ToolError::StructureDetection { file, .. } => assert_eq!(file, "sparse.xlsx"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn inference_timeout_fails_closed() {
    let stub = ScriptedInference::new(timeout);
    let err = detector(Some(stub.clone()))
        .detect(&sparse_header_sheet(), auto())
        .expect_err("timeout must not fall back");
    assert!(matches!(err, ToolError::StructureDetection { .. }));
    assert!(err.is_validation());
    assert_eq!(stub.calls(), 1);
}

#[test]
fn inferred_labels_must_exist_in_the_sheet() {
    let stub = ScriptedInference::new(invented_label);
    let err = detector(Some(stub))
        .detect(&sparse_header_sheet(), auto())
        .expect_err("invented label");
    assert!(err.to_string().contains("Raum"));
}

#[test]
fn tied_rows_escalate_when_allowed() {
    fn second_row(_: &SheetExcerpt) -> Result<InferredStructure, InferenceError> {
        Ok(InferredStructure {
            header_row_index: 1,
            column_roles: BTreeMap::new(),
        })
    }
    let stub = ScriptedInference::new(second_row);
    let spec = detector(Some(stub.clone()))
        .detect(&repeated_header_sheet(), auto())
        .expect("inferred");
    assert_eq!(spec.header_row_index, 1);
    assert_eq!(spec.method, DetectionMethod::Inferred);
    assert_eq!(stub.calls(), 1);
}

#[test]
fn tied_rows_fall_back_to_the_earliest() {
    let stub = ScriptedInference::new(unexpected_call);
    let options = DetectOptions {
        declared_header_row: None,
        auto_detect: false,
    };
    let spec = detector(Some(stub.clone()))
        .detect(&repeated_header_sheet(), options)
        .expect("heuristic");
    assert_eq!(spec.header_row_index, 0);
    assert_eq!(spec.method, DetectionMethod::Heuristic);
    assert_eq!(stub.calls(), 0);
}

fn unexpected_call(_: &SheetExcerpt) -> Result<InferredStructure, InferenceError> {
    Err(InferenceError::Unavailable("not expected".into()))
}

#[test]
fn repeated_headers_are_not_loaded_as_rooms() {
    let raw = repeated_header_sheet();
    let options = DetectOptions {
        declared_header_row: Some(0),
        auto_detect: false,
    };
    let spec = detector(None).detect(&raw, options).expect("declared");
    let rows = load(&raw, &spec);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].row_index, 2);
}

#[test]
fn unparsable_area_is_kept_under_its_label() {
    let raw = sheet(
        "heating.xlsx",
        vec![
            vec![t("Raum-Nr."), t("Fläche")],
            vec![t("1"), t("20,5 m²")],
            vec![t("2"), t("k.A.")],
        ],
    );
    let spec = detector(None).detect(&raw, auto()).expect("detected");
    let rows = reconcile(load(&raw, &spec), SourceTag::Heating);

    assert_eq!(rows[0].get(ColumnRole::Area), Some(&CellValue::Float(20.5)));
    assert_eq!(rows[1].get(ColumnRole::Area), None);
    assert_eq!(rows[1].other.get("Fläche"), Some(&CellValue::Text("k.A.".into())));
}

#[test]
fn colliding_area_columns_keep_the_preferred_synonym() {
    let raw = sheet(
        "heating.xlsx",
        vec![
            vec![t("Raum-Nr."), t("NGF"), t("Fläche")],
            vec![t("1"), n(19.0), n(20.0)],
        ],
    );
    let spec = detector(None).detect(&raw, auto()).expect("detected");
    let rows = reconcile(load(&raw, &spec), SourceTag::Heating);

    assert_eq!(rows[0].source, SourceTag::Heating);
    assert_eq!(rows[0].get(ColumnRole::Area), Some(&CellValue::Float(20.0)));
    assert_eq!(rows[0].other.get("NGF"), Some(&CellValue::Float(19.0)));
}
