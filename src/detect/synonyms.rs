//! Header label synonyms used to recognise column roles in both exports.
//!
//! Labels are compared after [`normalize_label`], which folds umlauts, drops
//! punctuation and unit annotations, and removes the provenance suffixes a
//! previously merged export may carry (`Fläche_heating`).

use crate::model::ColumnRole;

/// Synonyms per role in priority order. The position of a synonym is its rank
/// when two columns of one sheet claim the same role.
const SYNONYMS: &[(ColumnRole, &[&str])] = &[
    (
        ColumnRole::RoomNumber,
        &[
            "raumnr",
            "raumnummer",
            "nrraum",
            "roomnumber",
            "roomno",
            "roomid",
            "raumid",
            "raumkennung",
            "raum",
        ],
    ),
    (
        ColumnRole::RoomName,
        &[
            "raumbezeichnung",
            "raumname",
            "bezeichnung",
            "raumnutzung",
            "nutzung",
            "roomname",
            "name",
            "beschreibung",
        ],
    ),
    (
        ColumnRole::Floor,
        &["geschoss", "etage", "ebene", "stockwerk", "geschossbezeichnung", "floor", "level", "storey"],
    ),
    (
        ColumnRole::Area,
        &[
            "flaeche",
            "raumflaeche",
            "nettoraumflaeche",
            "nettogrundflaeche",
            "nutzflaeche",
            "grundflaeche",
            "ngf",
            "nrf",
            "nf",
            "area",
            "floorarea",
        ],
    ),
    (
        ColumnRole::RoomTypeCode,
        &[
            "nummerraumtyp",
            "raumtypnummer",
            "raumtypnr",
            "raumtyp",
            "raumtypcode",
            "nutzungsprofil",
            "nutzungsprofilnr",
            "roomtypecode",
            "roomtype",
        ],
    ),
];

/// Labels that look like a known synonym but must stay outside the canonical
/// schema. Checked before any fuzzy matching.
const EXCLUDED: &[&str] = &[
    "bezeichnungraumtyp",
    "raumtypbezeichnung",
    "raumvolumen",
    "raumhoehe",
    "raumtemperatur",
];

/// Shortest synonym that may match as a prefix of a longer label.
const MIN_PREFIX_LEN: usize = 5;

/// Result of matching one header label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynonymMatch {
    pub role: ColumnRole,
    pub rank: usize,
    pub exact: bool,
}

/// Canonical form of a header label used for synonym lookup.
pub fn normalize_label(label: &str) -> String {
    let lowered = label.trim().to_lowercase();
    let without_suffix = lowered
        .strip_suffix("_heating")
        .or_else(|| lowered.strip_suffix("_ventilation"))
        .unwrap_or(&lowered);
    let without_unit = strip_unit(without_suffix);

    let mut normalized = String::with_capacity(without_unit.len());
    for ch in without_unit.chars() {
        match ch {
            'ä' => normalized.push_str("ae"),
            'ö' => normalized.push_str("oe"),
            'ü' => normalized.push_str("ue"),
            'ß' => normalized.push_str("ss"),
            ch if ch.is_alphanumeric() => normalized.push(ch),
            _ => {}
        }
    }
    normalized
}

/// Drops bracketed unit annotations like `[m²]` or `(m2)` and anything after them.
fn strip_unit(label: &str) -> &str {
    match label.find(['[', '(']) {
        Some(0) | None => label,
        Some(position) => &label[..position],
    }
}

/// Matches a raw header label against the synonym table.
pub fn match_label(label: &str) -> Option<SynonymMatch> {
    let normalized = normalize_label(label);
    if normalized.is_empty() || EXCLUDED.contains(&normalized.as_str()) {
        return None;
    }

    for (role, synonyms) in SYNONYMS {
        if let Some(rank) = synonyms.iter().position(|synonym| *synonym == normalized) {
            return Some(SynonymMatch {
                role: *role,
                rank,
                exact: true,
            });
        }
    }

    let mut best: Option<(usize, SynonymMatch)> = None;
    for (role, synonyms) in SYNONYMS {
        for (rank, synonym) in synonyms.iter().enumerate() {
            if synonym.len() < MIN_PREFIX_LEN || !normalized.starts_with(synonym) {
                continue;
            }
            let candidate = SynonymMatch {
                role: *role,
                rank: synonyms.len() + rank,
                exact: false,
            };
            if best.is_none_or(|(length, _)| synonym.len() > length) {
                best = Some((synonym.len(), candidate));
            }
        }
    }
    best.map(|(_, found)| found)
}

/// Role for a header label, `Other` when it matches no synonym.
pub fn role_for(label: &str) -> (ColumnRole, usize) {
    match match_label(label) {
        Some(found) => (found.role, found.rank),
        None => (ColumnRole::Other, usize::MAX),
    }
}
