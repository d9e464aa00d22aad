use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{CellValue, ColumnRole, SourceTag};

/// Identity of a merged room.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomKey {
    /// Room number shared by the join.
    Number(String),
    /// Synthetic key for a row without a room number. Such rows never join.
    Unkeyed { source: SourceTag, row_index: usize },
}

impl RoomKey {
    pub fn is_keyed(&self) -> bool {
        matches!(self, RoomKey::Number(_))
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomKey::Number(number) => f.write_str(number),
            RoomKey::Unkeyed { source, row_index } => write!(f, "~{source}:{}", row_index + 1),
        }
    }
}

/// Number of source rows that contributed to a merged room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePresence {
    pub heating_rows: usize,
    pub ventilation_rows: usize,
}

impl SourcePresence {
    pub fn rows(&self, source: SourceTag) -> usize {
        match source {
            SourceTag::Heating => self.heating_rows,
            SourceTag::Ventilation => self.ventilation_rows,
        }
    }

    fn rows_mut(&mut self, source: SourceTag) -> &mut usize {
        match source {
            SourceTag::Heating => &mut self.heating_rows,
            SourceTag::Ventilation => &mut self.ventilation_rows,
        }
    }

    pub(crate) fn record(&mut self, source: SourceTag) -> usize {
        let rows = self.rows_mut(source);
        *rows += 1;
        *rows
    }
}

/// One room after the outer join of the heating and ventilation exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRoom {
    pub key: RoomKey,
    /// Resolved value per role: heating wins, then ventilation.
    pub primary: BTreeMap<ColumnRole, CellValue>,
    pub heating: BTreeMap<ColumnRole, CellValue>,
    pub ventilation: BTreeMap<ColumnRole, CellValue>,
    pub heating_other: BTreeMap<String, CellValue>,
    pub ventilation_other: BTreeMap<String, CellValue>,
    /// Conflicting values from duplicate rows of the same room, keyed
    /// `<column>_<source>_<n>`.
    pub extras: BTreeMap<String, CellValue>,
    pub presence: SourcePresence,
}

impl MergedRoom {
    pub fn new(key: RoomKey) -> Self {
        Self {
            key,
            primary: BTreeMap::new(),
            heating: BTreeMap::new(),
            ventilation: BTreeMap::new(),
            heating_other: BTreeMap::new(),
            ventilation_other: BTreeMap::new(),
            extras: BTreeMap::new(),
            presence: SourcePresence::default(),
        }
    }

    pub fn values(&self, source: SourceTag) -> &BTreeMap<ColumnRole, CellValue> {
        match source {
            SourceTag::Heating => &self.heating,
            SourceTag::Ventilation => &self.ventilation,
        }
    }

    pub fn other(&self, source: SourceTag) -> &BTreeMap<String, CellValue> {
        match source {
            SourceTag::Heating => &self.heating_other,
            SourceTag::Ventilation => &self.ventilation_other,
        }
    }

    pub(crate) fn values_mut(
        &mut self,
        source: SourceTag,
    ) -> (
        &mut BTreeMap<ColumnRole, CellValue>,
        &mut BTreeMap<String, CellValue>,
    ) {
        match source {
            SourceTag::Heating => (&mut self.heating, &mut self.heating_other),
            SourceTag::Ventilation => (&mut self.ventilation, &mut self.ventilation_other),
        }
    }

    pub fn get(&self, role: ColumnRole) -> Option<&CellValue> {
        self.primary.get(&role)
    }

    pub fn room_number(&self) -> Option<&str> {
        match &self.key {
            RoomKey::Number(number) => Some(number),
            RoomKey::Unkeyed { .. } => None,
        }
    }

    pub fn room_name(&self) -> Option<String> {
        self.get(ColumnRole::RoomName).and_then(CellValue::as_text)
    }

    /// Primary area in m², when present, finite, and not negative.
    pub fn area_m2(&self) -> Option<f64> {
        self.get(ColumnRole::Area)
            .and_then(CellValue::as_f64)
            .filter(|area| *area >= 0.0)
    }

    /// Whether both sources carry a value for the role.
    pub fn is_shared(&self, role: ColumnRole) -> bool {
        self.heating.contains_key(&role) && self.ventilation.contains_key(&role)
    }
}

/// Where a room-type code came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeOrigin {
    FromSource,
    FromClassifier,
    Unresolved,
}

/// The room type assigned to one merged room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomTypeAssignment {
    pub room: RoomKey,
    pub room_type_code: u32,
    pub label: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub origin: TypeOrigin,
}

/// Whether a density came from the reference table or the global default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateBasis {
    Lookup,
    Fallback,
}

/// Heating and cooling power density estimated for one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerEstimate {
    pub room: RoomKey,
    pub room_type: u32,
    pub room_type_label: String,
    pub heating_w_per_m2: f64,
    pub cooling_w_per_m2: f64,
    /// Area the densities are applied to.
    pub area_m2: f64,
    /// `true` when the room had no usable area and the nominal area was used.
    pub area_assumed: bool,
    pub basis: EstimateBasis,
}

impl PowerEstimate {
    pub fn heating_w(&self) -> f64 {
        self.heating_w_per_m2 * self.area_m2
    }

    pub fn cooling_w(&self) -> f64 {
        self.cooling_w_per_m2 * self.area_m2
    }
}
