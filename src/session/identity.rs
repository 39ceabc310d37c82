//! Identity allocation for new connections
//!
//! Every connection gets an opaque id, a cursor color picked from a fixed
//! palette by registry size at join time, and a generated display name.
//! Neither colors nor names are unique.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Builder;

// ============================================================================
// Cursor Color
// ============================================================================

/// Cursor color palette, in allocation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum CursorColor {
    Red,
    Orange,
    Amber,
    Lime,
    Emerald,
    Cyan,
    Blue,
    Violet,
    Fuchsia,
    Rose,
}

impl CursorColor {
    /// All palette entries, indexed by allocation slot
    pub const PALETTE: [CursorColor; 10] = [
        Self::Red,
        Self::Orange,
        Self::Amber,
        Self::Lime,
        Self::Emerald,
        Self::Cyan,
        Self::Blue,
        Self::Violet,
        Self::Fuchsia,
        Self::Rose,
    ];

    /// Color for a connection joining when `registry_size` others are present
    pub fn for_registry_size(registry_size: usize) -> Self {
        Self::PALETTE[registry_size % Self::PALETTE.len()]
    }

    /// CSS hex value sent to clients
    pub fn hex(&self) -> &'static str {
        match self {
            Self::Red => "#ef4444",
            Self::Orange => "#f97316",
            Self::Amber => "#f59e0b",
            Self::Lime => "#84cc16",
            Self::Emerald => "#10b981",
            Self::Cyan => "#06b6d4",
            Self::Blue => "#3b82f6",
            Self::Violet => "#8b5cf6",
            Self::Fuchsia => "#d946ef",
            Self::Rose => "#f43f5e",
        }
    }

    /// Position in [`Self::PALETTE`]
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl From<CursorColor> for String {
    fn from(color: CursorColor) -> Self {
        color.hex().to_string()
    }
}

impl TryFrom<String> for CursorColor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::PALETTE
            .iter()
            .copied()
            .find(|c| c.hex().eq_ignore_ascii_case(&value))
            .ok_or_else(|| format!("unknown cursor color: {value}"))
    }
}

impl std::fmt::Display for CursorColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.hex())
    }
}

// ============================================================================
// Connection Identity
// ============================================================================

/// Identity of one live connection; immutable after allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionIdentity {
    pub id: String,
    pub joined_at: DateTime<Utc>,
    pub color: CursorColor,
    pub name: String,
}

// ============================================================================
// Identity Allocator
// ============================================================================

/// Largest numeric suffix appended to generated names
pub const MAX_NAME_SUFFIX: u32 = 9999;

/// Hands out identities for new connections
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityAllocator;

impl IdentityAllocator {
    pub fn new() -> Self {
        Self
    }

    /// Allocate an identity using thread-local randomness
    pub fn allocate(&self, registry_size: usize) -> ConnectionIdentity {
        self.allocate_with_rng(registry_size, &mut rand::thread_rng())
    }

    /// Allocate an identity drawing names and ids from `rng`
    pub fn allocate_with_rng<R: Rng + ?Sized>(
        &self,
        registry_size: usize,
        rng: &mut R,
    ) -> ConnectionIdentity {
        let id = Builder::from_random_bytes(rng.gen()).into_uuid().to_string();

        ConnectionIdentity {
            id,
            joined_at: Utc::now(),
            color: CursorColor::for_registry_size(registry_size),
            name: generate_name(rng),
        }
    }
}

/// Pick a corpus entry and append `-<0..=9999>`
pub fn generate_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let base = NAME_CORPUS.choose(rng).copied().unwrap_or("Anonymous");
    let suffix = rng.gen_range(0..=MAX_NAME_SUFFIX);
    format!("{base}-{suffix}")
}

/// Display name corpus: fictional characters and astronomy terms
pub const NAME_CORPUS: &[&str] = &[
    "Skywalker", "Vader", "Solo", "Organa", "Kenobi", "Yoda", "Windu", "Tarkin", "Fett", "Rey",
    "Kirk", "Spock", "Picard", "Riker", "Data", "Worf", "LaForge", "Troi", "Sisko", "Janeway",
    "Atreides", "Harkonnen", "Chani", "Stilgar", "Leto", "Irulan", "Gurney", "Duncan", "Thufir",
    "Yueh", "Neo", "Trinity", "Morpheus", "Niobe", "Switch", "Apoc", "Oracle", "Seraph", "Keymaker",
    "Tank", "Deckard", "Rachael", "Roy", "Pris", "Zhora", "Gaff", "Tyrell", "Ripley", "Dallas",
    "Lambert", "Newt", "Hicks", "Hudson", "Connor", "Reese", "Marty", "Doc", "Biff", "Lorraine",
    "Einstein", "Flynn", "Clu", "Tron", "Quorra", "Zuse", "Gamora", "Drax", "Rocket", "Groot",
    "Nebula", "Mantis", "Yondu", "Stark", "Rogers", "Thor", "Banner", "Wanda", "Vision", "Fury",
    "Doctor", "River", "Martha", "Donna", "Rory", "Chief", "Cortana", "Arbiter", "Keyes", "Halsey",
    "Noble", "Shepard", "Garrus", "Liara", "Tali", "Wrex", "Mordin", "Thane", "Legion", "Miranda",
    "Johnny", "Judy", "Panam", "Kerry", "Takemura", "Cayde", "Zavala", "Ikora", "Eris", "Drifter",
    "Shaxx", "Kerrigan", "Raynor", "Zeratul", "Artanis", "Tychus", "Gordon", "Alyx", "Barney",
    "Kleiner", "Mossman", "Chell", "GLaDOS", "Wheatley", "Caroline", "Atlas", "PBody", "Samus",
    "Ridley", "Sylux", "Kanden", "Link", "Zelda", "Impa", "Midna", "Mipha", "Revali", "Daruk",
    "Urbosa", "Cloud", "Tifa", "Aerith", "Barret", "Yuffie", "Vincent", "Cid", "Misty", "Brock",
    "Cynthia", "Steven", "Wallace", "Rick", "Morty", "Summer", "Birdperson", "Squanchy", "Fry",
    "Leela", "Bender", "Zoidberg", "Hermes", "Zapp", "Kif", "Nibbler", "Zim", "GIR", "Dib", "Gaz",
    "Aang", "Katara", "Sokka", "Toph", "Zuko", "Iroh", "Azula", "Appa", "Momo", "Suki", "Korra",
    "Mako", "Bolin", "Asami", "Tenzin", "Jinora", "Saitama", "Genos", "Tornado", "Deku", "Bakugo",
    "Uraraka", "Todoroki", "Eren", "Mikasa", "Armin", "Levi", "Erwin", "Hange", "Tanjiro", "Nezuko",
    "Zenitsu", "Inosuke", "Yuji", "Megumi", "Nobara", "Gojo", "Nanami", "Denji", "Power", "Makima",
    "Loid", "Anya", "Orion", "Cassiopeia", "Andromeda", "Quasar", "Pulsar", "Vortex", "Nexus",
    "Zenith", "Eclipse", "Solstice", "Equinox", "Cosmos", "Stellar", "Lunar", "Astral", "Aether",
    "Chrono", "Quantum", "Plasma", "Flux", "Helix", "Omega", "Sigma", "Lambda", "Xenon", "Krypton",
    "Hydra", "Cerberus", "Phoenix", "Dragon",
];
