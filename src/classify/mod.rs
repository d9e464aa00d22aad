//! Room-type assignment for merged rooms.
//!
//! A room keeps the type code its export declares when the taxonomy knows it.
//! Otherwise the room name is matched against category keywords. Rooms that
//! still have no type receive the unspecified code instead of failing.

pub mod taxonomy;

use tracing::{debug, info, instrument};

use crate::model::{CellValue, ColumnRole, MergedRoom, RoomTypeAssignment, TypeOrigin};

pub use taxonomy::{RoomType, RoomTypeTaxonomy, UNSPECIFIED_CODE};

/// Keywords this short only match at the start of a word.
const SHORT_KEYWORD_LEN: usize = 3;
const WORD_START_BONUS: f64 = 0.15;
const MAX_INFERRED_CONFIDENCE: f64 = 0.95;

/// Assigns room-type codes against a fixed taxonomy.
#[derive(Debug, Clone)]
pub struct RoomTypeClassifier {
    taxonomy: RoomTypeTaxonomy,
    min_confidence: f64,
}

impl RoomTypeClassifier {
    pub fn new(taxonomy: RoomTypeTaxonomy, min_confidence: f64) -> Self {
        Self {
            taxonomy,
            min_confidence,
        }
    }

    pub fn taxonomy(&self) -> &RoomTypeTaxonomy {
        &self.taxonomy
    }

    /// Assigns a type to every room, in order.
    #[instrument(level = "info", skip_all, fields(rooms = rooms.len()))]
    pub fn classify_all(&self, rooms: &[MergedRoom]) -> Vec<RoomTypeAssignment> {
        let assignments: Vec<RoomTypeAssignment> =
            rooms.iter().map(|room| self.classify(room)).collect();
        let unresolved = assignments
            .iter()
            .filter(|assignment| assignment.origin == TypeOrigin::Unresolved)
            .count();
        info!(unresolved, "classified rooms");
        assignments
    }

    /// Assigns a type to one room.
    pub fn classify(&self, room: &MergedRoom) -> RoomTypeAssignment {
        let declared = room.get(ColumnRole::RoomTypeCode);

        if let Some(code) = declared.and_then(declared_code) {
            if let Some(room_type) = self.taxonomy.get(code) {
                return RoomTypeAssignment {
                    room: room.key.clone(),
                    room_type_code: room_type.code,
                    label: room_type.label.clone(),
                    confidence: 1.0,
                    origin: TypeOrigin::FromSource,
                };
            }
            debug!(room = %room.key, code, "declared room type is not in the taxonomy");
        }

        let texts = room
            .room_name()
            .into_iter()
            .chain(declared.filter(|value| matches!(value, CellValue::Text(_))).and_then(CellValue::as_text));
        let inferred = texts
            .filter_map(|text| self.infer_from_text(&text))
            .max_by(|lhs, rhs| lhs.1.total_cmp(&rhs.1));

        match inferred {
            Some((code, confidence)) if confidence >= self.min_confidence => RoomTypeAssignment {
                room: room.key.clone(),
                room_type_code: code,
                label: self.taxonomy.label(code).to_string(),
                confidence,
                origin: TypeOrigin::FromClassifier,
            },
            _ => {
                let unspecified = self.taxonomy.unspecified();
                RoomTypeAssignment {
                    room: room.key.clone(),
                    room_type_code: unspecified.code,
                    label: unspecified.label.clone(),
                    confidence: inferred.map(|(_, confidence)| confidence).unwrap_or(0.0),
                    origin: TypeOrigin::Unresolved,
                }
            }
        }
    }

    /// Best matching category for a free-text room name with its confidence.
    /// Ties go to the lower code.
    pub fn infer_from_text(&self, text: &str) -> Option<(u32, f64)> {
        let folded = fold(text);
        let words: Vec<&str> = folded.split_whitespace().collect();
        let compact: String = words.concat();
        if compact.is_empty() {
            return None;
        }

        let mut best: Option<(u32, f64)> = None;
        for room_type in self.taxonomy.types() {
            for keyword in &room_type.keywords {
                let Some(confidence) = keyword_confidence(keyword, &compact, &words) else {
                    continue;
                };
                if best.is_none_or(|(_, current)| confidence > current) {
                    best = Some((room_type.code, confidence));
                }
            }
        }
        best
    }
}

fn declared_code(value: &CellValue) -> Option<u32> {
    value
        .as_i64()
        .and_then(|code| u32::try_from(code).ok())
        .filter(|code| *code != UNSPECIFIED_CODE)
}

fn keyword_confidence(keyword: &str, compact: &str, words: &[&str]) -> Option<f64> {
    if keyword.is_empty() {
        return None;
    }
    if compact == keyword {
        return Some(1.0);
    }

    let word_start = words.iter().any(|word| word.starts_with(keyword));
    if keyword.len() <= SHORT_KEYWORD_LEN && !word_start {
        return None;
    }
    if !compact.contains(keyword) {
        return None;
    }

    let mut confidence = 0.5 + 0.5 * keyword.len() as f64 / compact.len() as f64;
    if word_start {
        confidence += WORD_START_BONUS;
    }
    Some(confidence.min(MAX_INFERRED_CONFIDENCE))
}

/// Lower-cases, folds umlauts, and turns separators into spaces.
fn fold(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for ch in text.to_lowercase().chars() {
        match ch {
            'ä' => folded.push_str("ae"),
            'ö' => folded.push_str("oe"),
            'ü' => folded.push_str("ue"),
            'ß' => folded.push_str("ss"),
            ch if ch.is_alphanumeric() => folded.push(ch),
            _ => folded.push(' '),
        }
    }
    folded
}
