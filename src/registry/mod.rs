//! Static reference data: courts, reporters, judge initials.
//!
//! Loaded once at executor construction and injected into stages as a
//! read-only capability so tests can substitute smaller tables.

pub mod courts;
pub mod judges;
pub mod reporters;

pub use courts::{CourtEntry, CourtRegistry, CourtType};
pub use judges::JudgeInitialsMap;
pub use reporters::{ReporterEntry, ReporterRegistry};

/// Bundle of all registries handed to the pipeline.
pub struct Registries {
    pub courts: CourtRegistry,
    pub reporters: ReporterRegistry,
    pub judges: JudgeInitialsMap,
}

impl Registries {
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            courts: CourtRegistry::builtin(),
            reporters: ReporterRegistry::builtin(),
            judges: JudgeInitialsMap::builtin(),
        }
    }
}
