#![cfg_attr(not(test), no_std)]

pub mod api;
pub mod card;
pub mod config;
pub mod power;
pub mod report;
#[cfg(feature = "sdmmc")]
pub mod sdmmc;
pub mod session;
pub mod volume;
pub mod walker;

#[cfg(test)]
mod fake;

pub use api::{Node, Storage};
pub use card::CardType;
pub use config::{MountFailurePolicy, SessionConfig, SpiPins, SpiSpeed};
pub use power::SlotPower;
pub use session::{DegradedReason, DiagnosticSession, HaltReason, SessionOutcome};
pub use volume::{FatType, VolumeGeometry};
pub use walker::{DirectoryWalker, ListingKind, ListingLine, WalkSummary};
