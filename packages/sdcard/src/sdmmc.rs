//! `Storage` over the `embedded-sdmmc` SPI driver.
//!
//! The card is driven directly until the file system is mounted; mounting
//! moves it into a `VolumeManager`. Directory handles are raw library
//! handles wrapped in nodes that close them on drop.

use core::fmt::{self, Write};

use embedded_hal::{delay::DelayNs, spi::SpiDevice};
use embedded_sdmmc::{
    sdcard::CardType as SdmmcCardType, Block, BlockDevice, BlockIdx, DirEntry, RawDirectory,
    RawVolume, SdCard, SdCardError, TimeSource, Timestamp, VolumeIdx, VolumeManager,
};
use heapless::{Deque, String};

use crate::{
    api::{Node, Storage},
    card::{CARD_TYPE_SD1, CARD_TYPE_SD2, CARD_TYPE_SDHC},
    config::{SpiSpeed, ENTRY_NAME_MAX, WALK_DEPTH_MAX},
    volume::{decode_volume, VolumeError, VolumeGeometry, BLOCK_SIZE},
    walker::short_name,
};

const MAX_DIRS: usize = WALK_DEPTH_MAX + 1;
const MAX_FILES: usize = 1;
const MAX_VOLUMES: usize = 1;
const HANDLE_ID_OFFSET: u32 = 5_000;
/// Entries buffered per directory read pass.
const ENTRY_WINDOW: usize = 8;

pub type SdVolumeManager<D> = VolumeManager<D, FixedClock, MAX_DIRS, MAX_FILES, MAX_VOLUMES>;

/// Switches the SPI clock once the card has been identified.
pub trait BusClock {
    type ClockError: fmt::Debug;

    fn set_data_clock(&mut self, khz: u32) -> Result<(), Self::ClockError>;
}

/// The board has no RTC and the listing never writes, so every timestamp
/// is the FAT epoch.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedClock;

impl TimeSource for FixedClock {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp::from_fat(0, 0)
    }
}

#[derive(Debug)]
pub enum SdmmcStorageError<E: fmt::Debug> {
    Card(E),
    Clock,
    Volume(VolumeError<E>),
    Fs(embedded_sdmmc::Error<E>),
    NotInitialized,
    NotMounted,
}

impl<E: fmt::Debug> From<embedded_sdmmc::Error<E>> for SdmmcStorageError<E> {
    fn from(value: embedded_sdmmc::Error<E>) -> Self {
        Self::Fs(value)
    }
}

impl<E: fmt::Debug> From<VolumeError<E>> for SdmmcStorageError<E> {
    fn from(value: VolumeError<E>) -> Self {
        Self::Volume(value)
    }
}

pub struct SdmmcStorage<SPI, DELAY>
where
    SPI: SpiDevice<u8> + BusClock,
    DELAY: DelayNs,
{
    card: Option<SdCard<SPI, DELAY>>,
    card_type: u8,
    volume_mgr: Option<SdVolumeManager<SdCard<SPI, DELAY>>>,
    volume: Option<RawVolume>,
}

impl<SPI, DELAY> SdmmcStorage<SPI, DELAY>
where
    SPI: SpiDevice<u8> + BusClock,
    DELAY: DelayNs,
{
    /// `spi` must already run at the identification clock.
    pub fn new(spi: SPI, delay: DELAY) -> Self {
        Self {
            card: Some(SdCard::new(spi, delay)),
            card_type: 0,
            volume_mgr: None,
            volume: None,
        }
    }
}

impl<SPI, DELAY> Storage for SdmmcStorage<SPI, DELAY>
where
    SPI: SpiDevice<u8> + BusClock,
    DELAY: DelayNs,
{
    type Error = SdmmcStorageError<SdCardError>;
    type Node<'a>
        = SdmmcNode<'a, SdCard<SPI, DELAY>>
    where
        Self: 'a;

    fn init_card(&mut self, speed: SpiSpeed) -> Result<(), Self::Error> {
        let card = self.card.as_mut().ok_or(SdmmcStorageError::NotInitialized)?;
        let bytes = card.num_bytes().map_err(SdmmcStorageError::Card)?;
        self.card_type = match card.get_card_type() {
            Some(SdmmcCardType::SD1) => CARD_TYPE_SD1,
            Some(SdmmcCardType::SD2) => CARD_TYPE_SD2,
            Some(SdmmcCardType::SDHC) => CARD_TYPE_SDHC,
            None => 0,
        };
        log::debug!("sdmmc: card_ready bytes={} type={}", bytes, self.card_type);

        let khz = speed.data_clock_khz();
        card.spi(|spi| spi.set_data_clock(khz)).map_err(|err| {
            log::warn!("sdmmc: clock_failed khz={} err={:?}", khz, err);
            SdmmcStorageError::Clock
        })
    }

    fn card_type_code(&self) -> u8 {
        self.card_type
    }

    fn init_volume(&mut self) -> Result<VolumeGeometry, Self::Error> {
        let card = self.card.as_ref().ok_or(SdmmcStorageError::NotInitialized)?;
        let read_block = |index: u32, buf: &mut [u8; BLOCK_SIZE]| -> Result<(), SdCardError> {
            let mut blocks = [Block::new()];
            card.read(&mut blocks, BlockIdx(index))?;
            buf.copy_from_slice(&blocks[0].contents);
            Ok(())
        };
        Ok(decode_volume(read_block)?)
    }

    fn mount(&mut self) -> Result<(), Self::Error> {
        let card = self.card.take().ok_or(SdmmcStorageError::NotInitialized)?;
        let volume_mgr = self
            .volume_mgr
            .insert(VolumeManager::new_with_limits(card, FixedClock, HANDLE_ID_OFFSET));
        let volume = volume_mgr.open_raw_volume(VolumeIdx(0))?;
        self.volume = Some(volume);
        Ok(())
    }

    fn open_dir(&self, path: &str) -> Result<Self::Node<'_>, Self::Error> {
        let (Some(volume_mgr), Some(volume)) = (self.volume_mgr.as_ref(), self.volume) else {
            return Err(SdmmcStorageError::NotMounted);
        };
        open_path(volume_mgr, volume, path)
    }
}

/// Opens `path` on a mounted volume, one segment at a time from the root.
pub fn open_path<'a, D>(
    volume_mgr: &'a SdVolumeManager<D>,
    volume: RawVolume,
    path: &str,
) -> Result<SdmmcNode<'a, D>, SdmmcStorageError<D::Error>>
where
    D: BlockDevice,
    D::Error: fmt::Debug,
{
    let root = volume_mgr.open_root_dir(volume)?;
    let mut node = SdmmcNode::opened(volume_mgr, root, "/");
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let raw = volume_mgr.open_dir(node.raw()?, segment)?;
        // Replacing the parent closes it.
        node = SdmmcNode::opened(volume_mgr, raw, segment);
    }
    Ok(node)
}

impl<SPI, DELAY> Drop for SdmmcStorage<SPI, DELAY>
where
    SPI: SpiDevice<u8> + BusClock,
    DELAY: DelayNs,
{
    fn drop(&mut self) {
        if let (Some(volume_mgr), Some(volume)) = (self.volume_mgr.as_ref(), self.volume.take()) {
            if let Err(err) = volume_mgr.close_volume(volume) {
                log::warn!("sdmmc: close_volume_failed err={:?}", err);
            }
        }
    }
}

#[derive(Clone, Debug)]
struct EntryInfo {
    name: String<ENTRY_NAME_MAX>,
    directory: bool,
    size: u32,
}

impl EntryInfo {
    fn listable(entry: &DirEntry) -> bool {
        !entry.attributes.is_volume() && !matches!(entry.name.base_name(), b"." | b"..")
    }

    fn from_entry(entry: &DirEntry) -> Self {
        let mut name = String::new();
        // 8.3 names always fit; a failed write leaves the prefix.
        let _ = write!(name, "{}", entry.name);
        Self {
            name,
            directory: entry.attributes.is_directory(),
            size: entry.size,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum DirHandle {
    /// Files have no handle.
    Absent,
    /// Child directory not yet opened; holds the parent handle.
    Pending(RawDirectory),
    Open(RawDirectory),
}

pub struct SdmmcNode<'a, D>
where
    D: BlockDevice,
    D::Error: fmt::Debug,
{
    volume_mgr: &'a SdVolumeManager<D>,
    name: String<ENTRY_NAME_MAX>,
    directory: bool,
    size: u32,
    handle: DirHandle,
    window: Deque<EntryInfo, ENTRY_WINDOW>,
    consumed: usize,
    exhausted: bool,
}

impl<'a, D> SdmmcNode<'a, D>
where
    D: BlockDevice,
    D::Error: fmt::Debug,
{
    fn opened(volume_mgr: &'a SdVolumeManager<D>, raw: RawDirectory, name: &str) -> Self {
        Self {
            volume_mgr,
            name: short_name(name),
            directory: true,
            size: 0,
            handle: DirHandle::Open(raw),
            window: Deque::new(),
            consumed: 0,
            exhausted: false,
        }
    }

    fn child(volume_mgr: &'a SdVolumeManager<D>, parent: RawDirectory, info: EntryInfo) -> Self {
        Self {
            volume_mgr,
            handle: if info.directory {
                DirHandle::Pending(parent)
            } else {
                DirHandle::Absent
            },
            name: info.name,
            directory: info.directory,
            size: info.size,
            window: Deque::new(),
            consumed: 0,
            exhausted: false,
        }
    }

    /// Opens the directory on first use.
    fn raw(&mut self) -> Result<RawDirectory, SdmmcStorageError<D::Error>> {
        match self.handle {
            DirHandle::Open(raw) => Ok(raw),
            DirHandle::Pending(parent) => {
                let raw = self.volume_mgr.open_dir(parent, self.name.as_str())?;
                self.handle = DirHandle::Open(raw);
                Ok(raw)
            }
            DirHandle::Absent => Err(SdmmcStorageError::NotInitialized),
        }
    }

    /// Reads the directory from the start, keeping the next window of
    /// entries after the ones already handed out.
    fn refill(&mut self, raw: RawDirectory) -> Result<(), SdmmcStorageError<D::Error>> {
        let skip = self.consumed;
        let window = &mut self.window;
        let mut seen = 0usize;
        self.volume_mgr.iterate_dir(raw, |entry| {
            if !EntryInfo::listable(entry) {
                return;
            }
            if seen >= skip && !window.is_full() {
                let _ = window.push_back(EntryInfo::from_entry(entry));
            }
            seen += 1;
        })?;
        self.consumed += self.window.len();
        self.exhausted = self.consumed >= seen;
        Ok(())
    }
}

impl<D> Node for SdmmcNode<'_, D>
where
    D: BlockDevice,
    D::Error: fmt::Debug,
{
    type Error = SdmmcStorageError<D::Error>;

    fn name(&self) -> &str {
        &self.name
    }

    fn is_directory(&self) -> bool {
        self.directory
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn next_child(&mut self) -> Result<Option<Self>, Self::Error> {
        if !self.directory {
            return Ok(None);
        }
        let raw = self.raw()?;
        if self.window.is_empty() && !self.exhausted {
            self.refill(raw)?;
        }
        Ok(self
            .window
            .pop_front()
            .map(|info| SdmmcNode::child(self.volume_mgr, raw, info)))
    }
}

impl<D> Drop for SdmmcNode<'_, D>
where
    D: BlockDevice,
    D::Error: fmt::Debug,
{
    fn drop(&mut self) {
        if let DirHandle::Open(raw) = self.handle {
            if let Err(err) = self.volume_mgr.close_dir(raw) {
                log::warn!("sdmmc: close_dir_failed name={} err={:?}", self.name, err);
            }
        }
    }
}
