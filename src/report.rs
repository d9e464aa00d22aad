//! Portfolio-level figures derived from the per-room results.
//!
//! Everything here is recomputed from its inputs on each call; nothing is
//! cached. Every ratio guards its denominator and yields 0 instead of NaN.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::model::{
    CellValue, ColumnRole, EstimateBasis, MergedRoom, PowerEstimate, RoomTypeAssignment,
    TypeOrigin,
};

/// Annual full-load heating hours.
pub const DEFAULT_HEATING_HOURS: f64 = 2000.0;
/// Annual full-load cooling hours.
pub const DEFAULT_COOLING_HOURS: f64 = 800.0;
/// Inflation of the computed consumption representing the pre-optimisation
/// reference building.
pub const DEFAULT_BASELINE_FACTOR: f64 = 1.22;
/// Energy price per kWh.
pub const DEFAULT_PRICE_PER_KWH: f64 = 0.30;

/// How many type changes [`classification_summary`] lists.
const KEY_CHANGE_LIMIT: usize = 5;

/// Heating/cooling share of the portfolio for one room type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomTypeBreakdown {
    pub room_type: String,
    pub room_type_code: u32,
    pub room_count: usize,
    pub area_m2: f64,
    /// Area-weighted heating density.
    pub w_per_m2: f64,
    /// Area-weighted cooling density.
    pub cooling_w_per_m2: f64,
    pub share_percent: f64,
}

/// Aggregate of all power estimates of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReport {
    pub room_count: usize,
    pub total_area_m2: f64,
    pub heating_power_kw: f64,
    pub cooling_power_kw: f64,
    /// Installed heating power per m² of the whole portfolio.
    pub energy_intensity_w_per_m2: f64,
    pub annual_heating_kwh: f64,
    pub annual_cooling_kwh: f64,
    pub annual_consumption_kwh: f64,
    pub baseline_consumption_kwh: f64,
    pub savings_kwh: f64,
    pub reduction_percent: f64,
    pub price_per_kwh: f64,
    /// Savings priced at `price_per_kwh`.
    pub annual_savings: f64,
    /// Rooms estimated with the fallback density.
    pub fallback_rooms: usize,
    /// Rooms estimated with the nominal area.
    pub assumed_area_rooms: usize,
    pub breakdown: Vec<RoomTypeBreakdown>,
}

/// Rolls power estimates up into a [`PortfolioReport`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationReporter {
    pub heating_hours: f64,
    pub cooling_hours: f64,
}

impl Default for AggregationReporter {
    fn default() -> Self {
        Self {
            heating_hours: DEFAULT_HEATING_HOURS,
            cooling_hours: DEFAULT_COOLING_HOURS,
        }
    }
}

#[derive(Default)]
struct GroupTotals {
    code: u32,
    rooms: usize,
    area: f64,
    heating_weighted: f64,
    cooling_weighted: f64,
}

impl AggregationReporter {
    pub fn new(heating_hours: f64, cooling_hours: f64) -> Self {
        Self {
            heating_hours,
            cooling_hours,
        }
    }

    /// Aggregates the estimates. `baseline_factor` inflates the computed
    /// consumption to the reference consumption the savings are measured
    /// against.
    #[instrument(level = "info", skip(self, estimates), fields(rooms = estimates.len()))]
    pub fn aggregate(
        &self,
        estimates: &[PowerEstimate],
        price_per_kwh: f64,
        baseline_factor: f64,
    ) -> PortfolioReport {
        let mut total_area = 0.0;
        let mut heating_w = 0.0;
        let mut cooling_w = 0.0;
        let mut groups: BTreeMap<String, GroupTotals> = BTreeMap::new();

        for estimate in estimates {
            total_area += estimate.area_m2;
            heating_w += estimate.heating_w();
            cooling_w += estimate.cooling_w();

            let group = groups
                .entry(estimate.room_type_label.clone())
                .or_insert_with(|| GroupTotals {
                    code: estimate.room_type,
                    ..GroupTotals::default()
                });
            group.rooms += 1;
            group.area += estimate.area_m2;
            group.heating_weighted += estimate.heating_w();
            group.cooling_weighted += estimate.cooling_w();
        }

        let heating_power_kw = heating_w / 1000.0;
        let cooling_power_kw = cooling_w / 1000.0;
        let annual_heating_kwh = heating_power_kw * self.heating_hours;
        let annual_cooling_kwh = cooling_power_kw * self.cooling_hours;
        let annual_consumption_kwh = annual_heating_kwh + annual_cooling_kwh;
        let baseline_consumption_kwh = annual_consumption_kwh * baseline_factor;
        let savings_kwh = baseline_consumption_kwh - annual_consumption_kwh;

        let mut breakdown: Vec<RoomTypeBreakdown> = groups
            .into_iter()
            .map(|(label, group)| RoomTypeBreakdown {
                room_type: label,
                room_type_code: group.code,
                room_count: group.rooms,
                area_m2: group.area,
                w_per_m2: ratio(group.heating_weighted, group.area),
                cooling_w_per_m2: ratio(group.cooling_weighted, group.area),
                share_percent: ratio(group.area, total_area) * 100.0,
            })
            .collect();
        breakdown.sort_by(|lhs, rhs| {
            rhs.share_percent
                .total_cmp(&lhs.share_percent)
                .then_with(|| lhs.room_type.cmp(&rhs.room_type))
        });
        debug!(groups = breakdown.len(), "grouped estimates by room type");

        PortfolioReport {
            room_count: estimates.len(),
            total_area_m2: total_area,
            heating_power_kw,
            cooling_power_kw,
            energy_intensity_w_per_m2: ratio(heating_w, total_area),
            annual_heating_kwh,
            annual_cooling_kwh,
            annual_consumption_kwh,
            baseline_consumption_kwh,
            savings_kwh,
            reduction_percent: ratio(savings_kwh, baseline_consumption_kwh) * 100.0,
            price_per_kwh,
            annual_savings: savings_kwh * price_per_kwh,
            fallback_rooms: estimates
                .iter()
                .filter(|estimate| estimate.basis == EstimateBasis::Fallback)
                .count(),
            assumed_area_rooms: estimates.iter().filter(|estimate| estimate.area_assumed).count(),
            breakdown,
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        0.0
    } else {
        numerator / denominator
    }
}

/// Headline figures of the merged rooms, before any estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMetrics {
    /// Rooms identified by a room number.
    pub total_rooms: usize,
    pub total_area_m2: f64,
    /// Mean area of the numbered rooms that state an area.
    pub average_area_m2: f64,
    /// Distinct room-type values declared by the exports.
    pub source_room_types: usize,
}

pub fn room_metrics(rooms: &[MergedRoom]) -> RoomMetrics {
    let numbered: Vec<&MergedRoom> = rooms.iter().filter(|room| room.key.is_keyed()).collect();
    let areas: Vec<f64> = numbered.iter().filter_map(|room| room.area_m2()).collect();
    let total_area: f64 = areas.iter().sum();
    let source_room_types: BTreeSet<String> = numbered
        .iter()
        .filter_map(|room| room.get(ColumnRole::RoomTypeCode))
        .filter_map(CellValue::as_text)
        .collect();

    RoomMetrics {
        total_rooms: numbered.len(),
        total_area_m2: total_area,
        average_area_m2: ratio(total_area, areas.len() as f64),
        source_room_types: source_room_types.len(),
    }
}

/// A recurring reassignment from a declared type to a resolved one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeChange {
    pub from: String,
    pub to: String,
    pub count: usize,
}

/// How the room types of an analysis were obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationSummary {
    pub total_rooms: usize,
    pub from_source: usize,
    pub from_classifier: usize,
    pub unresolved: usize,
    /// Share of rooms with a resolved type, in percent.
    pub resolved_percent: f64,
    pub mean_confidence: f64,
    /// Distinct types declared in the exports.
    pub source_type_count: usize,
    /// Distinct resolved types, excluding the unspecified marker.
    pub resolved_type_count: usize,
    /// Most frequent reassignments, most frequent first.
    pub key_changes: Vec<TypeChange>,
}

/// Summarises `assignments`, which must be index-aligned with `rooms`.
pub fn classification_summary(
    rooms: &[MergedRoom],
    assignments: &[RoomTypeAssignment],
) -> ClassificationSummary {
    let count = |origin: TypeOrigin| {
        assignments
            .iter()
            .filter(|assignment| assignment.origin == origin)
            .count()
    };
    let from_source = count(TypeOrigin::FromSource);
    let from_classifier = count(TypeOrigin::FromClassifier);
    let unresolved = count(TypeOrigin::Unresolved);
    let total = assignments.len();

    let declared: Vec<Option<String>> = rooms
        .iter()
        .map(|room| room.get(ColumnRole::RoomTypeCode).and_then(CellValue::as_text))
        .collect();

    let mut changes: BTreeMap<(String, String), usize> = BTreeMap::new();
    for (declared, assignment) in declared.iter().zip(assignments) {
        if assignment.origin == TypeOrigin::FromSource {
            continue;
        }
        let from = declared.clone().unwrap_or_else(|| "none".to_string());
        *changes.entry((from, assignment.label.clone())).or_insert(0) += 1;
    }
    let mut key_changes: Vec<TypeChange> = changes
        .into_iter()
        .map(|((from, to), count)| TypeChange { from, to, count })
        .collect();
    key_changes.sort_by(|lhs, rhs| rhs.count.cmp(&lhs.count).then_with(|| lhs.cmp(rhs)));
    key_changes.truncate(KEY_CHANGE_LIMIT);

    ClassificationSummary {
        total_rooms: total,
        from_source,
        from_classifier,
        unresolved,
        resolved_percent: ratio((from_source + from_classifier) as f64, total as f64) * 100.0,
        mean_confidence: ratio(
            assignments.iter().map(|assignment| assignment.confidence).sum(),
            total as f64,
        ),
        source_type_count: declared.iter().flatten().collect::<BTreeSet<_>>().len(),
        resolved_type_count: assignments
            .iter()
            .filter(|assignment| assignment.origin != TypeOrigin::Unresolved)
            .map(|assignment| assignment.room_type_code)
            .collect::<BTreeSet<_>>()
            .len(),
        key_changes,
    }
}
