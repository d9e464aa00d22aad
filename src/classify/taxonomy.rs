use serde::{Deserialize, Serialize};

/// Code assigned to rooms whose type could not be resolved.
pub const UNSPECIFIED_CODE: u32 = 0;

/// One room-use category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomType {
    pub code: u32,
    pub label: String,
    /// Lower-case keywords with umlauts folded (`buero`, `kueche`).
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl RoomType {
    pub fn new(code: u32, label: &str, keywords: &[&str]) -> Self {
        Self {
            code,
            label: label.to_string(),
            keywords: keywords.iter().map(|keyword| keyword.to_string()).collect(),
        }
    }
}

/// The fixed set of room-use categories driving the density lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomTypeTaxonomy {
    types: Vec<RoomType>,
    unspecified: RoomType,
}

impl RoomTypeTaxonomy {
    /// Builds a taxonomy from explicit categories. Code 0 is reserved for the
    /// unspecified marker and ignored if present.
    pub fn new(types: Vec<RoomType>) -> Self {
        let mut types: Vec<RoomType> = types
            .into_iter()
            .filter(|room_type| room_type.code != UNSPECIFIED_CODE)
            .collect();
        types.sort_by_key(|room_type| room_type.code);
        types.dedup_by_key(|room_type| room_type.code);
        Self {
            types,
            unspecified: RoomType::new(UNSPECIFIED_CODE, "Nicht zugeordnet", &[]),
        }
    }

    pub fn types(&self) -> &[RoomType] {
        &self.types
    }

    pub fn unspecified(&self) -> &RoomType {
        &self.unspecified
    }

    pub fn get(&self, code: u32) -> Option<&RoomType> {
        self.types
            .binary_search_by_key(&code, |room_type| room_type.code)
            .ok()
            .map(|index| &self.types[index])
    }

    pub fn contains(&self, code: u32) -> bool {
        self.get(code).is_some()
    }

    /// Label for a code, the unspecified label for unknown codes.
    pub fn label(&self, code: u32) -> &str {
        self.get(code)
            .map(|room_type| room_type.label.as_str())
            .unwrap_or(&self.unspecified.label)
    }
}

impl Default for RoomTypeTaxonomy {
    /// Room-use categories of German non-residential building schedules.
    fn default() -> Self {
        Self::new(vec![
            RoomType::new(1, "Einzelbüro", &["einzelbuero", "chefzimmer", "buero", "sekretariat"]),
            RoomType::new(2, "Gruppenbüro", &["gruppenbuero", "teambuero", "mehrpersonenbuero"]),
            RoomType::new(3, "Großraumbüro", &["grossraumbuero", "openspace", "kombibuero"]),
            RoomType::new(
                4,
                "Besprechung, Sitzung, Seminar",
                &["besprechung", "sitzung", "seminar", "konferenz", "meeting", "schulung"],
            ),
            RoomType::new(5, "Schalterhalle", &["schalter", "empfang", "rezeption", "anmeldung"]),
            RoomType::new(6, "Einzelhandel", &["verkauf", "einzelhandel", "laden", "shop"]),
            RoomType::new(7, "Klassenzimmer", &["klassen", "unterricht", "gruppenraum"]),
            RoomType::new(8, "Hörsaal, Auditorium", &["hoersaal", "auditorium", "aula", "saal"]),
            RoomType::new(9, "Bettenzimmer", &["bettenzimmer", "patientenzimmer", "krankenzimmer"]),
            RoomType::new(10, "Hotelzimmer", &["hotelzimmer", "gaestezimmer", "apartment"]),
            RoomType::new(11, "Kantine", &["kantine", "mensa", "speisesaal", "speiseraum"]),
            RoomType::new(12, "Restaurant", &["restaurant", "cafeteria", "cafe", "bistro"]),
            RoomType::new(13, "Küche", &["kueche", "teekueche", "pantry", "spuele"]),
            RoomType::new(
                14,
                "Lager, Technik, Archiv",
                &["lager", "technik", "archiv", "abstell", "hausanschluss", "elt", "heizraum"],
            ),
            RoomType::new(15, "WC und Sanitärräume", &["wc", "toilette", "sanitaer", "dusche", "waschraum"]),
            RoomType::new(
                16,
                "Sonstige Aufenthaltsräume",
                &["aufenthalt", "pausenraum", "sozialraum", "ruheraum", "umkleide"],
            ),
            RoomType::new(17, "Nebenflächen", &["nebenraum", "putzraum", "reinigung", "muell", "garderobe"]),
            RoomType::new(
                18,
                "Verkehrsflächen",
                &["flur", "gang", "korridor", "treppe", "aufzug", "eingang", "foyer", "windfang", "diele"],
            ),
            RoomType::new(19, "Serverraum, Rechenzentrum", &["server", "rechenzentrum", "edv"]),
            RoomType::new(20, "Werkstatt", &["werkstatt", "montage"]),
            RoomType::new(21, "Labor", &["labor"]),
        ])
    }
}
