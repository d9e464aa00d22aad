//! Joins the heating and ventilation rows on room number.

mod table;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{Result, ToolError};
use crate::model::{CanonicalRow, CellValue, ColumnRole, MergedRoom, RoomKey, SourceTag};

pub use table::MergedTable;

/// Which rooms survive the join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    /// Every room from either source, plus every row without a room number.
    #[default]
    Outer,
    /// Rooms present in the heating export.
    Left,
    /// Rooms present in both exports.
    Inner,
}

/// Joins the two sources into one [`MergedRoom`] per distinct room number.
///
/// Rows without a room number never match anything, not even each other:
/// each becomes its own room under a synthetic key. Rooms keep the order in
/// which their number first appears (heating first), followed by the unkeyed
/// heating rows and then the unkeyed ventilation rows.
///
/// Fails with [`ToolError::EmptyMerge`] when no room with a number remains.
#[instrument(
    level = "info",
    skip_all,
    fields(heating = heating.len(), ventilation = ventilation.len(), ?how)
)]
pub fn merge(
    heating: Vec<CanonicalRow>,
    ventilation: Vec<CanonicalRow>,
    how: JoinKind,
) -> Result<Vec<MergedRoom>> {
    let mut keyed: Vec<MergedRoom> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unkeyed: Vec<MergedRoom> = Vec::new();
    let mut duplicates = 0;

    for row in heating.into_iter().chain(ventilation) {
        match row.room_number() {
            Some(number) => {
                let position = *positions.entry(number.clone()).or_insert_with(|| {
                    keyed.push(MergedRoom::new(RoomKey::Number(number)));
                    keyed.len() - 1
                });
                if absorb(&mut keyed[position], row) > 1 {
                    duplicates += 1;
                }
            }
            None => {
                let mut room = MergedRoom::new(RoomKey::Unkeyed {
                    source: row.source,
                    row_index: row.row_index,
                });
                absorb(&mut room, row);
                unkeyed.push(room);
            }
        }
    }

    if duplicates > 0 {
        warn!(duplicates, "room numbers repeated within one export were collapsed");
    }

    let mut rooms: Vec<MergedRoom> = keyed
        .into_iter()
        .chain(unkeyed)
        .filter(|room| survives(room, how))
        .collect();
    for room in &mut rooms {
        resolve_primary(room);
    }

    let numbered = rooms.iter().filter(|room| room.key.is_keyed()).count();
    if numbered == 0 {
        return Err(ToolError::EmptyMerge);
    }

    let shared = rooms
        .iter()
        .filter(|room| room.presence.heating_rows > 0 && room.presence.ventilation_rows > 0)
        .count();
    info!(
        rooms = rooms.len(),
        numbered,
        shared,
        unkeyed = rooms.len() - numbered,
        "merged exports"
    );
    Ok(rooms)
}

/// Adds one source row to a room and returns how many rows of that source the
/// room has absorbed so far. Values already present are kept; conflicting
/// values from repeated rows land in `extras`.
fn absorb(room: &mut MergedRoom, row: CanonicalRow) -> usize {
    let source = row.source;
    let occurrence = room.presence.record(source);
    let mut conflicts: Vec<(String, CellValue)> = Vec::new();

    let (values, other) = room.values_mut(source);
    for (role, value) in row.values {
        match values.get(&role) {
            None => {
                values.insert(role, value);
            }
            Some(existing) if *existing == value => {}
            Some(_) => conflicts.push((role.to_string(), value)),
        }
    }
    for (label, value) in row.other {
        match other.get(&label) {
            None => {
                other.insert(label, value);
            }
            Some(existing) if *existing == value => {}
            Some(_) => conflicts.push((label, value)),
        }
    }

    for (column, value) in conflicts {
        let key = format!("{}_{occurrence}", source.qualify(&column));
        room.extras.insert(key, value);
    }
    occurrence
}

fn survives(room: &MergedRoom, how: JoinKind) -> bool {
    let heating = room.presence.rows(SourceTag::Heating) > 0;
    let ventilation = room.presence.rows(SourceTag::Ventilation) > 0;
    match how {
        JoinKind::Outer => true,
        JoinKind::Left => heating,
        JoinKind::Inner => heating && ventilation && room.key.is_keyed(),
    }
}

/// Heating wins, then ventilation, then null.
fn resolve_primary(room: &mut MergedRoom) {
    room.primary.clear();
    for role in ColumnRole::CANONICAL {
        let value = room
            .heating
            .get(&role)
            .or_else(|| room.ventilation.get(&role))
            .cloned();
        if let Some(value) = value {
            room.primary.insert(role, value);
        }
    }
    if let RoomKey::Number(number) = &room.key {
        room.primary
            .insert(ColumnRole::RoomNumber, CellValue::Text(number.clone()));
    }
}
