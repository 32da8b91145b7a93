pub const BLOCK_SIZE: usize = 512;

const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];
const PARTITION_TABLE_OFFSET: usize = 446;
const PARTITION_MIN_SECTORS: u32 = 100;
/// FAT16 (CHS, CHS small, LBA) and FAT32 (CHS, LBA) partition ids.
const FAT_PARTITION_TYPES: [u8; 5] = [0x04, 0x06, 0x0E, 0x0B, 0x0C];
const CLUSTER_SIZE_SHIFT_MAX: u32 = 7;
const DIR_ENTRY_SIZE: u32 = 32;
const FAT12_CLUSTER_LIMIT: u32 = 4_085;
const FAT16_CLUSTER_LIMIT: u32 = 65_525;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

impl FatType {
    pub const fn from_cluster_count(cluster_count: u32) -> Self {
        if cluster_count < FAT12_CLUSTER_LIMIT {
            FatType::Fat12
        } else if cluster_count < FAT16_CLUSTER_LIMIT {
            FatType::Fat16
        } else {
            FatType::Fat32
        }
    }

    pub const fn number(self) -> u8 {
        match self {
            FatType::Fat12 => 12,
            FatType::Fat16 => 16,
            FatType::Fat32 => 32,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VolumeGeometry {
    pub cluster_count: u32,
    pub blocks_per_cluster: u8,
    pub fat_type: FatType,
}

impl VolumeGeometry {
    pub fn total_blocks(&self) -> u64 {
        self.cluster_count as u64 * self.blocks_per_cluster as u64
    }

    /// Blocks are 512 bytes, so two blocks make a kilobyte.
    pub fn size_kb(&self) -> u64 {
        self.total_blocks() / 2
    }

    pub fn size_mb(&self) -> u64 {
        self.size_kb() / 1024
    }

    pub fn size_gb(&self) -> f32 {
        self.size_mb() as f32 / 1024.0
    }
}

#[derive(Debug)]
pub enum VolumeError<E> {
    Read(E),
    NoBootSector,
    NoPartition,
    UnsupportedPartition(u8),
    UnsupportedSectorSize(u16),
    UnsupportedSectorsPerCluster(u8),
    InvalidBootSector,
    UnsupportedFatType(FatType),
}

impl<E> VolumeError<E> {
    pub const fn label(&self) -> &'static str {
        match self {
            VolumeError::Read(_) => "read_failed",
            VolumeError::NoBootSector => "no_boot_sector",
            VolumeError::NoPartition => "no_partition",
            VolumeError::UnsupportedPartition(_) => "unsupported_partition",
            VolumeError::UnsupportedSectorSize(_) => "unsupported_sector_size",
            VolumeError::UnsupportedSectorsPerCluster(_) => "unsupported_sectors_per_cluster",
            VolumeError::InvalidBootSector => "invalid_boot_sector",
            VolumeError::UnsupportedFatType(_) => "unsupported_fat_type",
        }
    }
}

/// Recognizes the FAT16/FAT32 volume in the card's first MBR partition and
/// reports its geometry. `read_block` fills one 512-byte block by LBA.
///
/// Only volumes the file-system mount can open are accepted: cards
/// formatted without a partition table are rejected here, before any
/// geometry is printed.
pub fn decode_volume<E, F>(mut read_block: F) -> Result<VolumeGeometry, VolumeError<E>>
where
    F: FnMut(u32, &mut [u8; BLOCK_SIZE]) -> Result<(), E>,
{
    let mut sector0 = [0u8; BLOCK_SIZE];
    read_block(0, &mut sector0).map_err(VolumeError::Read)?;
    if sector0[510..512] != BOOT_SIGNATURE {
        return Err(VolumeError::NoBootSector);
    }

    let start = first_partition_lba::<E>(&sector0)?;
    let mut boot = [0u8; BLOCK_SIZE];
    read_block(start, &mut boot).map_err(VolumeError::Read)?;
    parse_boot_sector::<E>(&boot).inspect_err(|err| {
        log::debug!("volume: partition_rejected lba={} reason={}", start, err.label())
    })
}

fn first_partition_lba<E>(sector0: &[u8; BLOCK_SIZE]) -> Result<u32, VolumeError<E>> {
    let entry = &sector0[PARTITION_TABLE_OFFSET..PARTITION_TABLE_OFFSET + 16];
    let boot_flag = entry[0];
    let kind = entry[4];
    let start = u32::from_le_bytes([entry[8], entry[9], entry[10], entry[11]]);
    let sectors = u32::from_le_bytes([entry[12], entry[13], entry[14], entry[15]]);
    if (boot_flag & 0x7F) != 0 || kind == 0 || start == 0 || sectors < PARTITION_MIN_SECTORS {
        return Err(VolumeError::NoPartition);
    }
    if !FAT_PARTITION_TYPES.contains(&kind) {
        return Err(VolumeError::UnsupportedPartition(kind));
    }
    Ok(start)
}

fn parse_boot_sector<E>(boot: &[u8; BLOCK_SIZE]) -> Result<VolumeGeometry, VolumeError<E>> {
    if boot[510..512] != BOOT_SIGNATURE {
        return Err(VolumeError::NoBootSector);
    }

    let bytes_per_sector = u16::from_le_bytes([boot[11], boot[12]]);
    if bytes_per_sector as usize != BLOCK_SIZE {
        return Err(VolumeError::UnsupportedSectorSize(bytes_per_sector));
    }

    let sectors_per_cluster = boot[13];
    if sectors_per_cluster == 0
        || !sectors_per_cluster.is_power_of_two()
        || sectors_per_cluster.trailing_zeros() > CLUSTER_SIZE_SHIFT_MAX
    {
        return Err(VolumeError::UnsupportedSectorsPerCluster(sectors_per_cluster));
    }

    let reserved_sectors = u16::from_le_bytes([boot[14], boot[15]]) as u32;
    let fats = boot[16] as u32;
    if reserved_sectors == 0 || fats == 0 {
        return Err(VolumeError::InvalidBootSector);
    }

    let root_entries = u16::from_le_bytes([boot[17], boot[18]]) as u32;
    let root_dir_sectors = (root_entries * DIR_ENTRY_SIZE).div_ceil(BLOCK_SIZE as u32);

    let fat_size_16 = u16::from_le_bytes([boot[22], boot[23]]) as u32;
    let fat_size_32 = u32::from_le_bytes([boot[36], boot[37], boot[38], boot[39]]);
    let fat_size = if fat_size_16 != 0 {
        fat_size_16
    } else {
        fat_size_32
    };

    let total_16 = u16::from_le_bytes([boot[19], boot[20]]) as u32;
    let total_32 = u32::from_le_bytes([boot[32], boot[33], boot[34], boot[35]]);
    let total_sectors = if total_16 != 0 { total_16 } else { total_32 };

    let used_sectors = reserved_sectors
        .saturating_add(fat_size.saturating_mul(fats))
        .saturating_add(root_dir_sectors);
    if fat_size == 0 || total_sectors <= used_sectors {
        return Err(VolumeError::InvalidBootSector);
    }

    let cluster_count = (total_sectors - used_sectors) >> sectors_per_cluster.trailing_zeros();
    let fat_type = FatType::from_cluster_count(cluster_count);
    if fat_type == FatType::Fat12 {
        return Err(VolumeError::UnsupportedFatType(fat_type));
    }

    Ok(VolumeGeometry {
        cluster_count,
        blocks_per_cluster: sectors_per_cluster,
        fat_type,
    })
}
