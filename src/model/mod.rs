use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

mod room;

pub use room::{
    EstimateBasis, MergedRoom, PowerEstimate, RoomKey, RoomTypeAssignment, SourcePresence,
    TypeOrigin,
};

/// A single typed cell value. Empty cells are represented as `None` wherever a
/// cell is optional rather than as a dedicated variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Integer literal.
    Int(i64),
    /// Floating point literal.
    Float(f64),
    /// Plain text.
    Text(String),
}

impl CellValue {
    /// Interprets the value as a number. Text is parsed leniently: German
    /// decimal commas, thousands separators, and trailing units are accepted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(value) => Some(*value as f64),
            CellValue::Float(value) if value.is_finite() => Some(*value),
            CellValue::Float(_) => None,
            CellValue::Text(text) => parse_number(text),
        }
    }

    /// Interprets the value as an integer when it is integral.
    pub fn as_i64(&self) -> Option<i64> {
        let number = self.as_f64()?;
        if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
            Some(number as i64)
        } else {
            None
        }
    }

    /// Returns the trimmed textual form, or `None` when it is blank.
    pub fn as_text(&self) -> Option<String> {
        let text = self.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Whether the value carries no information (blank text).
    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Text(text) if text.trim().is_empty())
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Int(value) => write!(f, "{value}"),
            CellValue::Float(value) => write!(f, "{value}"),
            CellValue::Text(value) => f.write_str(value),
        }
    }
}

/// Parses numbers the way building-services exports write them, e.g.
/// `"20,5"`, `"1.234,5 m²"` or `"18.0"`.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .trim_end_matches(|ch: char| ch.is_alphabetic() || "²³/%[]() ".contains(ch))
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '\'')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if dot < comma => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Semantic role of a column in the canonical schema shared by both sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ColumnRole {
    RoomNumber,
    RoomName,
    Floor,
    Area,
    RoomTypeCode,
    Other,
}

impl ColumnRole {
    /// Roles that take part in joining and classification.
    pub const CANONICAL: [ColumnRole; 5] = [
        ColumnRole::RoomNumber,
        ColumnRole::RoomName,
        ColumnRole::Floor,
        ColumnRole::Area,
        ColumnRole::RoomTypeCode,
    ];

    /// Column name used for the role in merged output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnRole::RoomNumber => "RoomNumber",
            ColumnRole::RoomName => "RoomName",
            ColumnRole::Floor => "Floor",
            ColumnRole::Area => "Area",
            ColumnRole::RoomTypeCode => "RoomTypeCode",
            ColumnRole::Other => "Other",
        }
    }

    /// Parses the role names used by the structure-inference collaborator.
    pub fn parse(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "roomnumber" => Some(ColumnRole::RoomNumber),
            "roomname" => Some(ColumnRole::RoomName),
            "floor" => Some(ColumnRole::Floor),
            "area" => Some(ColumnRole::Area),
            "roomtypecode" | "roomtype" => Some(ColumnRole::RoomTypeCode),
            "other" => Some(ColumnRole::Other),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies which of the two exports a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Heating,
    Ventilation,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Heating => "heating",
            SourceTag::Ventilation => "ventilation",
        }
    }

    /// Qualifies a column name with this source, e.g. `Area_heating`.
    pub fn qualify(&self, column: &str) -> String {
        format!("{column}_{}", self.as_str())
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An untyped worksheet as read from the workbook. Row indices are absolute
/// sheet rows, so leading blank rows are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSheet {
    /// File name or other identity of the originating export.
    pub source: String,
    pub sheet_name: String,
    pub rows: Vec<Vec<Option<CellValue>>>,
}

impl RawSheet {
    pub fn new(
        source: impl Into<String>,
        sheet_name: impl Into<String>,
        rows: Vec<Vec<Option<CellValue>>>,
    ) -> Self {
        Self {
            source: source.into(),
            sheet_name: sheet_name.into(),
            rows,
        }
    }

    /// Returns the cells of the given row, or an empty slice past the end.
    pub fn row(&self, index: usize) -> &[Option<CellValue>] {
        self.rows.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of non-blank cells in the given row.
    pub fn filled_cells(&self, index: usize) -> usize {
        self.row(index)
            .iter()
            .filter(|cell| cell.as_ref().is_some_and(|value| !value.is_blank()))
            .count()
    }
}

/// How a header specification was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// The caller declared the header row.
    Declared,
    /// The synonym heuristic picked the header row.
    Heuristic,
    /// The external structure-inference collaborator picked the header row.
    Inferred,
}

/// Binds one physical column of the header row to a canonical role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnBinding {
    /// Zero-based column index within the sheet.
    pub index: usize,
    /// Header label as it appears in the sheet (or a generated placeholder).
    pub label: String,
    pub role: ColumnRole,
    /// Position in the synonym priority order; lower wins on collisions.
    pub rank: usize,
}

/// The detected or declared header layout of a [`RawSheet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderSpec {
    pub header_row_index: usize,
    pub columns: Vec<ColumnBinding>,
    pub method: DetectionMethod,
    /// Share of header cells recognised as known synonyms.
    pub confidence: f64,
}

impl HeaderSpec {
    /// Looks up the role assigned to a raw column label.
    pub fn role_of(&self, label: &str) -> Option<ColumnRole> {
        self.columns
            .iter()
            .find(|binding| binding.label == label)
            .map(|binding| binding.role)
    }

    /// Whether any column maps to the given role.
    pub fn has_role(&self, role: ColumnRole) -> bool {
        self.columns.iter().any(|binding| binding.role == role)
    }
}

/// A loaded cell tagged with the binding of its column.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleCell {
    pub role: ColumnRole,
    pub label: String,
    pub rank: usize,
    pub value: CellValue,
}

/// A data row below the header, with every non-null cell tagged by role.
/// Duplicate roles are still present here; reconciliation resolves them.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub row_index: usize,
    pub cells: Vec<RoleCell>,
}

/// A row mapped onto the canonical schema and stamped with its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub source: SourceTag,
    pub row_index: usize,
    /// Canonical roles, at most one value each.
    pub values: BTreeMap<ColumnRole, CellValue>,
    /// Columns outside the canonical schema, keyed by their header label.
    pub other: BTreeMap<String, CellValue>,
}

impl CanonicalRow {
    pub fn get(&self, role: ColumnRole) -> Option<&CellValue> {
        self.values.get(&role)
    }

    /// The join key, when the row has a non-blank room number.
    pub fn room_number(&self) -> Option<String> {
        self.get(ColumnRole::RoomNumber).and_then(CellValue::as_text)
    }
}
