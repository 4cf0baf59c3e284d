use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use leanstock_core::{LocationId, StockError, StockResult, ValueObject};

/// Which half of a split shelf a bin is.
///
/// Labels use the bin letter: `A` is the intake bin (new stock, used last),
/// `B` is the outgoing bin (old stock, used first).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinTag {
    New,
    Old,
}

impl BinTag {
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "A" | "a" => Some(BinTag::New),
            "B" | "b" => Some(BinTag::Old),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            BinTag::New => 'A',
            BinTag::Old => 'B',
        }
    }

    /// The other bin of the same shelf.
    pub fn counterpart(self) -> Self {
        match self {
            BinTag::New => BinTag::Old,
            BinTag::Old => BinTag::New,
        }
    }
}

/// Bin layout of a location, resolved once from its label.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "tag", rename_all = "lowercase")]
pub enum BinKind {
    /// One half of an A/B shelf.
    Split(BinTag),
    /// A single unlabeled bin; no rotation happens here.
    Solid,
}

/// `<Zone>-<Column>-<Level>`, shared by both bins of a split shelf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShelfCoordinate {
    pub zone: String,
    pub column: u16,
    pub level: u16,
}

impl core::fmt::Display for ShelfCoordinate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}-{}-{}", self.zone, self.column, self.level)
    }
}

/// A stock location with its bin kind already resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    id: LocationId,
    label: String,
    shelf: ShelfCoordinate,
    kind: BinKind,
}

impl ValueObject for Location {}

impl Location {
    /// Parse a structural label and bind it to its store id.
    ///
    /// Accepts `<Zone>-<Column>-<Level>-<A|B>` (split shelf) and
    /// `<Zone>-<Column>-<Level>` (solid bin). The zone is alphanumeric and
    /// case-insensitive; column and level are positive integers.
    pub fn parse(id: LocationId, label: &str) -> StockResult<Self> {
        let label = label.trim();
        let invalid = |why: &str| StockError::InvalidLocationLabel(format!("'{label}': {why}"));

        let segments: Vec<&str> = label.split('-').collect();
        let (zone, column, level, kind) = match segments.as_slice() {
            [zone, column, level] => (*zone, *column, *level, BinKind::Solid),
            [zone, column, level, bin] => {
                let tag = BinTag::from_letter(bin).ok_or_else(|| invalid("bin must be A or B"))?;
                (*zone, *column, *level, BinKind::Split(tag))
            }
            _ => return Err(invalid("expected 3 or 4 dash-separated segments")),
        };

        if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid("zone must be alphanumeric"));
        }
        let column = parse_index(column).ok_or_else(|| invalid("column must be a positive integer"))?;
        let level = parse_index(level).ok_or_else(|| invalid("level must be a positive integer"))?;

        let shelf = ShelfCoordinate {
            zone: zone.to_ascii_uppercase(),
            column,
            level,
        };

        Ok(Self {
            id,
            label: canonical_label(&shelf, kind),
            shelf,
            kind,
        })
    }

    pub fn id(&self) -> LocationId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn shelf(&self) -> &ShelfCoordinate {
        &self.shelf
    }

    pub fn kind(&self) -> BinKind {
        self.kind
    }

    pub fn tag(&self) -> Option<BinTag> {
        match self.kind {
            BinKind::Split(tag) => Some(tag),
            BinKind::Solid => None,
        }
    }

    pub fn is_new_bin(&self) -> bool {
        self.kind == BinKind::Split(BinTag::New)
    }

    /// Consumption rank: old and solid stock goes before new stock.
    pub fn fifo_rank(&self) -> u8 {
        match self.kind {
            BinKind::Split(BinTag::Old) | BinKind::Solid => 0,
            BinKind::Split(BinTag::New) => 1,
        }
    }
}

fn parse_index(raw: &str) -> Option<u16> {
    raw.parse::<u16>().ok().filter(|n| *n > 0)
}

fn canonical_label(shelf: &ShelfCoordinate, kind: BinKind) -> String {
    match kind {
        BinKind::Split(tag) => format!("{shelf}-{}", tag.letter()),
        BinKind::Solid => shelf.to_string(),
    }
}

/// Locations keyed by id, plus the A/B pairing of every split shelf.
///
/// Built once from the store's location list; rotation asks it for the Old
/// bin that pairs with a New bin.
#[derive(Debug, Clone, Default)]
pub struct LocationDirectory {
    by_id: HashMap<LocationId, Location>,
    by_slot: HashMap<(ShelfCoordinate, BinTag), LocationId>,
}

impl LocationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw `(id, label)` records.
    ///
    /// Labels that are not bins (warehouse, zone and column containers) are
    /// returned separately instead of failing the whole load. A 3-segment
    /// label whose shelf also has A/B bins is the container of those bins,
    /// not a solid bin, and is skipped too.
    pub fn from_records<I, S>(records: I) -> (Self, Vec<(LocationId, String)>)
    where
        I: IntoIterator<Item = (LocationId, S)>,
        S: AsRef<str>,
    {
        let mut parsed = Vec::new();
        let mut skipped = Vec::new();
        for (id, label) in records {
            match Location::parse(id, label.as_ref()) {
                Ok(location) => parsed.push((location, label.as_ref().to_string())),
                Err(_) => skipped.push((id, label.as_ref().to_string())),
            }
        }

        let split_shelves: HashSet<ShelfCoordinate> = parsed
            .iter()
            .filter(|(location, _)| location.tag().is_some())
            .map(|(location, _)| location.shelf().clone())
            .collect();

        let mut directory = Self::new();
        for (location, raw) in parsed {
            if location.kind() == BinKind::Solid && split_shelves.contains(location.shelf()) {
                skipped.push((location.id(), raw));
            } else {
                directory.insert(location);
            }
        }
        (directory, skipped)
    }

    pub fn insert(&mut self, location: Location) {
        if let Some(tag) = location.tag() {
            self.by_slot
                .insert((location.shelf().clone(), tag), location.id());
        }
        self.by_id.insert(location.id(), location);
    }

    pub fn get(&self, id: LocationId) -> Option<&Location> {
        self.by_id.get(&id)
    }

    /// The other bin of `location`'s split shelf. `None` for solid bins and
    /// for split bins whose partner is not registered.
    pub fn counterpart(&self, location: &Location) -> Option<&Location> {
        let tag = location.tag()?.counterpart();
        let id = self.by_slot.get(&(location.shelf().clone(), tag))?;
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
