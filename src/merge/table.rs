use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{CellValue, ColumnRole, MergedRoom, SourceTag};

/// Column naming the sources a room was found in.
pub const SOURCE_COLUMN: &str = "Source";

/// Flat, spreadsheet-shaped view of the merged rooms.
///
/// `RoomNumber` is never suffixed. A canonical role or a non-canonical label
/// carried by both sources appears as the primary column followed by its
/// `_heating` and `_ventilation` variants; otherwise a single column holds it.
///
/// Column names are unique ignoring case. A source label or conflict key that
/// clashes with a generated column, or with an earlier label, gets a ` (2)`,
/// ` (3)`, ... suffix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<CellValue>>>,
}

enum Column {
    RoomNumber,
    Primary(ColumnRole),
    Role(ColumnRole, SourceTag),
    Other(String),
    OtherFrom(String, SourceTag),
    Extra(String),
    Source,
}

impl MergedTable {
    pub fn from_rooms(rooms: &[MergedRoom]) -> Self {
        let layout = layout(rooms);
        let columns = column_names(&layout);
        let rows = rooms
            .iter()
            .map(|room| layout.iter().map(|column| cell(room, column)).collect())
            .collect();
        Self { columns, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Value of a named column in the given row.
    pub fn value(&self, row: usize, column: &str) -> Option<&CellValue> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)?.as_ref()
    }
}

fn layout(rooms: &[MergedRoom]) -> Vec<Column> {
    let mut columns = vec![Column::RoomNumber];

    for role in ColumnRole::CANONICAL
        .into_iter()
        .filter(|role| *role != ColumnRole::RoomNumber)
    {
        if rooms.iter().any(|room| room.is_shared(role)) {
            columns.push(Column::Primary(role));
            columns.push(Column::Role(role, SourceTag::Heating));
            columns.push(Column::Role(role, SourceTag::Ventilation));
        } else if rooms.iter().any(|room| room.primary.contains_key(&role)) {
            columns.push(Column::Primary(role));
        }
    }

    let labels = |source: SourceTag| -> BTreeSet<String> {
        rooms
            .iter()
            .flat_map(|room| room.other(source).keys().cloned())
            .collect()
    };
    let heating = labels(SourceTag::Heating);
    let ventilation = labels(SourceTag::Ventilation);
    for label in heating.union(&ventilation) {
        if heating.contains(label) && ventilation.contains(label) {
            columns.push(Column::OtherFrom(label.clone(), SourceTag::Heating));
            columns.push(Column::OtherFrom(label.clone(), SourceTag::Ventilation));
        } else {
            columns.push(Column::Other(label.clone()));
        }
    }

    let extras: BTreeSet<&String> = rooms.iter().flat_map(|room| room.extras.keys()).collect();
    columns.extend(extras.into_iter().map(|key| Column::Extra(key.clone())));
    columns.push(Column::Source);
    columns
}

/// Generated columns keep their names; labels taken from the exports give way.
fn column_names(layout: &[Column]) -> Vec<String> {
    let names: Vec<(String, bool)> = layout.iter().map(base_name).collect();
    let mut taken: HashSet<String> = names
        .iter()
        .filter(|(_, generated)| *generated)
        .map(|(name, _)| name.to_lowercase())
        .collect();
    names
        .into_iter()
        .map(|(name, generated)| if generated { name } else { claim(&mut taken, name) })
        .collect()
}

/// Name before disambiguation, and whether the crate generated it.
fn base_name(column: &Column) -> (String, bool) {
    match column {
        Column::RoomNumber => (ColumnRole::RoomNumber.to_string(), true),
        Column::Primary(role) => (role.to_string(), true),
        Column::Role(role, source) => (source.qualify(role.as_str()), true),
        Column::Source => (SOURCE_COLUMN.to_string(), true),
        Column::Other(label) | Column::Extra(label) => (label.clone(), false),
        Column::OtherFrom(label, source) => (source.qualify(label), false),
    }
}

fn claim(taken: &mut HashSet<String>, label: String) -> String {
    let mut name = label.clone();
    let mut counter = 2;
    while taken.contains(&name.to_lowercase()) {
        name = format!("{label} ({counter})");
        counter += 1;
    }
    taken.insert(name.to_lowercase());
    name
}

fn cell(room: &MergedRoom, column: &Column) -> Option<CellValue> {
    match column {
        Column::RoomNumber => room.room_number().map(|number| CellValue::Text(number.to_string())),
        Column::Primary(role) => room.primary.get(role).cloned(),
        Column::Role(role, source) => room.values(*source).get(role).cloned(),
        Column::Other(label) => room
            .heating_other
            .get(label)
            .or_else(|| room.ventilation_other.get(label))
            .cloned(),
        Column::OtherFrom(label, source) => room.other(*source).get(label).cloned(),
        Column::Extra(key) => room.extras.get(key).cloned(),
        Column::Source => {
            let label = match (room.presence.heating_rows > 0, room.presence.ventilation_rows > 0) {
                (true, true) => "both",
                (true, false) => "heating",
                (false, true) => "ventilation",
                (false, false) => return None,
            };
            Some(CellValue::Text(label.to_string()))
        }
    }
}
