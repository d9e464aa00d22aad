//! Per-room heating and cooling power density.
//!
//! Individual data gaps never abort the estimate: an unknown room type falls
//! back to [`ReferenceTable::fallback`] and a missing area to the nominal
//! area, and both are flagged on the resulting [`PowerEstimate`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{Result, ToolError};
use crate::model::{EstimateBasis, MergedRoom, PowerEstimate, RoomTypeAssignment, TypeOrigin};

/// Nominal room area in m² used when a room has no usable area.
pub const DEFAULT_AREA_M2: f64 = 15.0;
/// Heating density in W/m² used when the room type has no reference entry.
pub const FALLBACK_HEATING_W_PER_M2: f64 = 60.0;
/// Cooling density in W/m² used when the room type has no reference entry.
pub const FALLBACK_COOLING_W_PER_M2: f64 = 25.0;

/// Heating and cooling design densities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Density {
    pub heating_w_per_m2: f64,
    pub cooling_w_per_m2: f64,
}

impl Density {
    pub const fn new(heating_w_per_m2: f64, cooling_w_per_m2: f64) -> Self {
        Self {
            heating_w_per_m2,
            cooling_w_per_m2,
        }
    }

    fn is_valid(&self) -> bool {
        [self.heating_w_per_m2, self.cooling_w_per_m2]
            .iter()
            .all(|value| value.is_finite() && *value >= 0.0)
    }
}

/// Reference entry as written in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub code: u32,
    pub heating_w_per_m2: f64,
    pub cooling_w_per_m2: f64,
}

/// Densities keyed by room-type code, plus the global fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTable {
    entries: BTreeMap<u32, Density>,
    fallback: Density,
}

impl ReferenceTable {
    pub fn new(entries: BTreeMap<u32, Density>, fallback: Density) -> Self {
        Self { entries, fallback }
    }

    pub fn from_entries(entries: &[ReferenceEntry], fallback: Density) -> Self {
        let entries = entries
            .iter()
            .map(|entry| {
                (
                    entry.code,
                    Density::new(entry.heating_w_per_m2, entry.cooling_w_per_m2),
                )
            })
            .collect();
        Self::new(entries, fallback)
    }

    /// Replaces the global fallback density.
    pub fn with_fallback(mut self, fallback: Density) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn get(&self, code: u32) -> Option<Density> {
        self.entries.get(&code).copied()
    }

    pub fn fallback(&self) -> Density {
        self.fallback
    }

    /// Returns a description of the first negative or non-finite density.
    pub fn validate(&self) -> Option<String> {
        if !self.fallback.is_valid() {
            return Some("fallback density must be finite and not negative".into());
        }
        self.entries
            .iter()
            .find(|(_, density)| !density.is_valid())
            .map(|(code, _)| format!("density for room type {code} must be finite and not negative"))
    }
}

impl Default for ReferenceTable {
    /// Design densities for the default room-type taxonomy.
    fn default() -> Self {
        let entries = [
            (1, Density::new(45.0, 30.0)),
            (2, Density::new(45.0, 35.0)),
            (3, Density::new(45.0, 40.0)),
            (4, Density::new(55.0, 50.0)),
            (5, Density::new(50.0, 35.0)),
            (6, Density::new(50.0, 45.0)),
            (7, Density::new(55.0, 40.0)),
            (8, Density::new(60.0, 55.0)),
            (9, Density::new(55.0, 30.0)),
            (10, Density::new(50.0, 30.0)),
            (11, Density::new(55.0, 45.0)),
            (12, Density::new(55.0, 50.0)),
            (13, Density::new(40.0, 60.0)),
            (14, Density::new(20.0, 0.0)),
            (15, Density::new(50.0, 0.0)),
            (16, Density::new(45.0, 25.0)),
            (17, Density::new(25.0, 0.0)),
            (18, Density::new(35.0, 0.0)),
            (19, Density::new(10.0, 250.0)),
            (20, Density::new(40.0, 20.0)),
            (21, Density::new(60.0, 60.0)),
        ];
        Self::new(
            entries.into_iter().collect(),
            Density::new(FALLBACK_HEATING_W_PER_M2, FALLBACK_COOLING_W_PER_M2),
        )
    }
}

/// Turns typed rooms into power estimates.
#[derive(Debug, Clone)]
pub struct PowerEstimator {
    reference: ReferenceTable,
    default_area_m2: f64,
}

impl PowerEstimator {
    pub fn new(reference: ReferenceTable, default_area_m2: f64) -> Self {
        Self {
            reference,
            default_area_m2,
        }
    }

    /// Estimates one room.
    pub fn estimate(&self, room: &MergedRoom, assignment: &RoomTypeAssignment) -> PowerEstimate {
        let lookup = match assignment.origin {
            TypeOrigin::Unresolved => None,
            TypeOrigin::FromSource | TypeOrigin::FromClassifier => {
                self.reference.get(assignment.room_type_code)
            }
        };
        let (density, basis) = match lookup {
            Some(density) => (density, EstimateBasis::Lookup),
            None => (self.reference.fallback(), EstimateBasis::Fallback),
        };
        let (area_m2, area_assumed) = match room.area_m2() {
            Some(area) => (area, false),
            None => (self.default_area_m2, true),
        };

        PowerEstimate {
            room: room.key.clone(),
            room_type: assignment.room_type_code,
            room_type_label: assignment.label.clone(),
            heating_w_per_m2: density.heating_w_per_m2,
            cooling_w_per_m2: density.cooling_w_per_m2,
            area_m2,
            area_assumed,
            basis,
        }
    }

    /// Estimates every room. `assignments` must be index-aligned with `rooms`.
    #[instrument(level = "info", skip_all, fields(rooms = rooms.len()))]
    pub fn estimate_all(
        &self,
        rooms: &[MergedRoom],
        assignments: &[RoomTypeAssignment],
    ) -> Result<Vec<PowerEstimate>> {
        if rooms.len() != assignments.len() {
            return Err(ToolError::MisalignedAssignments {
                rooms: rooms.len(),
                assignments: assignments.len(),
            });
        }
        let estimates: Vec<PowerEstimate> = rooms
            .iter()
            .zip(assignments)
            .map(|(room, assignment)| self.estimate(room, assignment))
            .collect();
        let fallbacks = estimates
            .iter()
            .filter(|estimate| estimate.basis == EstimateBasis::Fallback)
            .count();
        let assumed_areas = estimates.iter().filter(|estimate| estimate.area_assumed).count();
        info!(fallbacks, assumed_areas, "estimated room power");
        Ok(estimates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CellValue, ColumnRole, RoomKey};

    fn room(area: Option<f64>) -> MergedRoom {
        let mut room = MergedRoom::new(RoomKey::Number("1.01".into()));
        if let Some(area) = area {
            room.primary.insert(ColumnRole::Area, CellValue::Float(area));
        }
        room
    }

    fn assignment(code: u32, origin: TypeOrigin) -> RoomTypeAssignment {
        RoomTypeAssignment {
            room: RoomKey::Number("1.01".into()),
            room_type_code: code,
            label: "Test".into(),
            confidence: 1.0,
            origin,
        }
    }

    fn estimator() -> PowerEstimator {
        PowerEstimator::new(ReferenceTable::default(), DEFAULT_AREA_M2)
    }

    #[test]
    fn missing_area_uses_nominal_area() {
        let estimate = estimator().estimate(&room(None), &assignment(1, TypeOrigin::FromSource));
        assert_eq!(estimate.area_m2, DEFAULT_AREA_M2);
        assert!(estimate.area_assumed);
        assert_eq!(estimate.basis, EstimateBasis::Lookup);
        assert_eq!(estimate.heating_w(), 45.0 * DEFAULT_AREA_M2);
    }

    #[test]
    fn unresolved_type_falls_back() {
        let estimate =
            estimator().estimate(&room(None), &assignment(0, TypeOrigin::Unresolved));
        assert_eq!(estimate.basis, EstimateBasis::Fallback);
        assert!(estimate.area_assumed);
        assert_eq!(estimate.heating_w_per_m2, FALLBACK_HEATING_W_PER_M2);
        assert_eq!(estimate.cooling_w_per_m2, FALLBACK_COOLING_W_PER_M2);
    }

    #[test]
    fn codes_missing_from_the_table_fall_back() {
        let table = ReferenceTable::from_entries(
            &[ReferenceEntry {
                code: 2,
                heating_w_per_m2: 40.0,
                cooling_w_per_m2: 10.0,
            }],
            Density::new(FALLBACK_HEATING_W_PER_M2, FALLBACK_COOLING_W_PER_M2),
        );
        let estimator = PowerEstimator::new(table, DEFAULT_AREA_M2);
        let estimate = estimator.estimate(&room(Some(12.0)), &assignment(7, TypeOrigin::FromSource));
        assert_eq!(estimate.basis, EstimateBasis::Fallback);
        assert!(!estimate.area_assumed);
        assert_eq!(estimate.area_m2, 12.0);
    }

    #[test]
    fn negative_densities_are_reported() {
        let table = ReferenceTable::default().with_fallback(Density::new(-1.0, 0.0));
        assert!(table.validate().is_some());
        assert!(ReferenceTable::default().validate().is_none());
    }

    #[test]
    fn misaligned_assignments_are_rejected() {
        let rooms = vec![room(Some(10.0)), room(Some(12.0))];
        let assignments = vec![assignment(1, TypeOrigin::FromSource)];
        let err = estimator()
            .estimate_all(&rooms, &assignments)
            .expect_err("one assignment short");
        assert!(matches!(
            err,
            ToolError::MisalignedAssignments { rooms: 2, assignments: 1 }
        ));
    }
}
