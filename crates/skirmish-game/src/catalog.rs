//! The character catalog: every unit template a shop can offer.
//!
//! Loaded once at startup and shared by all rooms behind an `Arc`. A bad
//! catalog is a startup failure, never a runtime one: after construction
//! every lookup either succeeds or names an id the catalog never had.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ActionError, CatalogError};

/// Identifies a unit template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub u32);

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shop rarity tier. Higher tiers appear more often at higher levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub const ALL: [Rarity; 5] = [
        Rarity::Common,
        Rarity::Uncommon,
        Rarity::Rare,
        Rarity::Epic,
        Rarity::Legendary,
    ];
}

/// Base stats for one purchasable character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitTemplate {
    pub id: CharacterId,
    pub name: String,
    pub icon: String,
    pub cost: u32,
    pub rarity: Rarity,
    pub attack: u32,
    pub defense: u32,
    pub hp: u32,
    pub speed: u32,
}

/// Immutable set of unit templates, keyed by id.
#[derive(Debug, Clone)]
pub struct CharacterCatalog {
    templates: BTreeMap<CharacterId, UnitTemplate>,
}

impl CharacterCatalog {
    /// Builds a catalog, rejecting empty input and duplicate ids.
    pub fn from_templates(
        templates: impl IntoIterator<Item = UnitTemplate>,
    ) -> Result<Self, CatalogError> {
        let mut map = BTreeMap::new();
        for template in templates {
            let id = template.id;
            if map.insert(id, template).is_some() {
                return Err(CatalogError::DuplicateId(id));
            }
        }
        if map.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { templates: map })
    }

    /// Loads a catalog from a JSON array of templates.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let templates: Vec<UnitTemplate> = serde_json::from_str(raw)?;
        let catalog = Self::from_templates(templates)?;
        tracing::info!(characters = catalog.len(), "character catalog loaded");
        Ok(catalog)
    }

    /// The roster compiled into the server, three characters per rarity.
    pub fn builtin() -> Self {
        #[rustfmt::skip]
        let rows: [(u32, &str, &str, u32, Rarity, u32, u32, u32, u32); 15] = [
            (1,  "Squire",       "shield",   1, Rarity::Common,     4, 3, 20, 3),
            (2,  "Slinger",      "sling",    1, Rarity::Common,     5, 1, 14, 5),
            (3,  "Acolyte",      "candle",   1, Rarity::Common,     3, 2, 18, 4),
            (4,  "Pikeman",      "spear",    2, Rarity::Uncommon,   6, 4, 26, 3),
            (5,  "Ranger",       "bow",      2, Rarity::Uncommon,   7, 2, 20, 6),
            (6,  "Hexer",        "skull",    2, Rarity::Uncommon,   6, 2, 22, 5),
            (7,  "Knight",       "helm",     3, Rarity::Rare,       8, 6, 34, 3),
            (8,  "Duelist",      "rapier",   3, Rarity::Rare,      10, 3, 28, 7),
            (9,  "Stormcaller",  "bolt",     3, Rarity::Rare,       9, 3, 26, 5),
            (10, "Warden",       "tower",    4, Rarity::Epic,      10, 9, 48, 2),
            (11, "Shadowblade",  "dagger",   4, Rarity::Epic,      14, 4, 34, 8),
            (12, "Pyromancer",   "flame",    4, Rarity::Epic,      13, 4, 36, 5),
            (13, "Dragonknight", "dragon",   5, Rarity::Legendary, 16, 10, 60, 4),
            (14, "Archmage",     "star",     5, Rarity::Legendary, 18, 5, 44, 6),
            (15, "Phoenix",      "feather",  5, Rarity::Legendary, 15, 6, 50, 7),
        ];
        let templates = rows.map(
            |(id, name, icon, cost, rarity, attack, defense, hp, speed)| UnitTemplate {
                id: CharacterId(id),
                name: name.to_owned(),
                icon: icon.to_owned(),
                cost,
                rarity,
                attack,
                defense,
                hp,
                speed,
            },
        );
        Self {
            templates: templates.into_iter().map(|t| (t.id, t)).collect(),
        }
    }

    /// Looks up a template. Unknown ids are an error, never a default.
    pub fn get(&self, id: CharacterId) -> Result<&UnitTemplate, ActionError> {
        self.templates
            .get(&id)
            .ok_or(ActionError::UnknownCharacter(id))
    }

    /// All templates of one rarity, in id order.
    pub fn by_rarity(&self, rarity: Rarity) -> impl Iterator<Item = &UnitTemplate> {
        self.templates.values().filter(move |t| t.rarity == rarity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnitTemplate> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
