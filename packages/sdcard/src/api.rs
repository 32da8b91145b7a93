use core::fmt;

use crate::{config::SpiSpeed, volume::VolumeGeometry};

/// An open file-system object handed out during enumeration.
///
/// Dropping a node releases its handle. Directories enumerate their children
/// through [`Node::next_child`]; files always report no children.
pub trait Node: Sized {
    type Error: fmt::Debug;

    fn name(&self) -> &str;

    fn is_directory(&self) -> bool;

    /// Byte size for files, zero for directories.
    fn size(&self) -> u32;

    /// Next child in device order, `Ok(None)` once the directory is exhausted.
    fn next_child(&mut self) -> Result<Option<Self>, Self::Error>;
}

/// The slice of an SD/FAT stack the diagnostic session drives.
///
/// Calls are made in order: `init_card`, `card_type_code`, `init_volume`,
/// `mount`, then any number of `open_dir`.
pub trait Storage {
    type Error: fmt::Debug;
    type Node<'a>: Node
    where
        Self: 'a;

    fn init_card(&mut self, speed: SpiSpeed) -> Result<(), Self::Error>;

    /// Raw card type code: 1 = SD1, 2 = SD2, 3 = SDHC, anything else unknown.
    fn card_type_code(&self) -> u8;

    fn init_volume(&mut self) -> Result<VolumeGeometry, Self::Error>;

    fn mount(&mut self) -> Result<(), Self::Error>;

    fn open_dir(&self, path: &str) -> Result<Self::Node<'_>, Self::Error>;
}
