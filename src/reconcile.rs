//! Maps loaded rows onto the canonical schema of one source.

use std::collections::BTreeMap;

use tracing::{instrument, warn};

use crate::model::{CanonicalRow, ColumnRole, RoleCell, SheetRow, SourceTag};

/// Stamps rows with their source and resolves duplicate roles.
///
/// When several columns of a sheet claim the same role, the column whose
/// label ranks first in the synonym order wins (ties go to the leftmost
/// column). The losing values stay on the row under their own labels.
#[instrument(level = "info", skip_all, fields(%source, rows = rows.len()))]
pub fn reconcile(rows: Vec<SheetRow>, source: SourceTag) -> Vec<CanonicalRow> {
    let mut collisions = 0;
    let reconciled = rows
        .into_iter()
        .map(|row| {
            let (canonical, displaced) = reconcile_row(row, source);
            collisions += displaced;
            canonical
        })
        .collect();

    if collisions > 0 {
        warn!(collisions, "several columns claimed the same role; kept the highest ranked");
    }
    reconciled
}

fn reconcile_row(row: SheetRow, source: SourceTag) -> (CanonicalRow, usize) {
    let mut winners: BTreeMap<ColumnRole, RoleCell> = BTreeMap::new();
    let mut leftovers: Vec<RoleCell> = Vec::new();

    for cell in row.cells {
        if cell.role == ColumnRole::Other {
            leftovers.push(cell);
            continue;
        }
        let outranks = winners
            .get(&cell.role)
            .map(|current| cell.rank < current.rank);
        match outranks {
            Some(false) => leftovers.push(cell),
            Some(true) => {
                if let Some(displaced) = winners.insert(cell.role, cell) {
                    leftovers.push(displaced);
                }
            }
            None => {
                winners.insert(cell.role, cell);
            }
        }
    }

    let displaced = leftovers
        .iter()
        .filter(|cell| cell.role != ColumnRole::Other)
        .count();

    let mut other: BTreeMap<String, _> = BTreeMap::new();
    for cell in leftovers {
        let key = unique_key(&other, &cell.label);
        other.insert(key, cell.value);
    }

    let canonical = CanonicalRow {
        source,
        row_index: row.row_index,
        values: winners
            .into_iter()
            .map(|(role, cell)| (role, cell.value))
            .collect(),
        other,
    };
    (canonical, displaced)
}

fn unique_key<V>(map: &BTreeMap<String, V>, label: &str) -> String {
    if !map.contains_key(label) {
        return label.to_string();
    }
    (2..)
        .map(|counter| format!("{label} ({counter})"))
        .find(|candidate| !map.contains_key(candidate))
        .unwrap_or_else(|| label.to_string())
}
