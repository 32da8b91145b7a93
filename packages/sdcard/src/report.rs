use core::fmt::{self, Write};

use crate::{
    card::CardType,
    config::{SessionConfig, VERSION},
    volume::VolumeGeometry,
};

pub const LISTING_HEADER: &str = "Files found on the card (name and size in bytes):";
pub const CARD_FAIL_HEADER: &str = "initialization failed. Things to check:";
pub const VOLUME_FAIL_LINES: [&str; 2] = [
    "Could not find FAT16/FAT32 partition.",
    "Make sure you've formatted the card",
];
pub const MOUNT_FAIL_LINE: &str = "Initialization failed!";

const CARD_CHECKLIST: [&str; 3] = [
    "* is a card inserted?",
    "* is your wiring correct?",
    "* did you change the chipSelect pin to match your shield or module?",
];

pub fn write_banner<W: Write>(console: &mut W, config: &SessionConfig) -> fmt::Result {
    writeln!(console, "Starting SD Card CardInfo on {}", config.board_name)?;
    writeln!(console, "{}", VERSION)?;
    let pins = config.pins;
    writeln!(console, "Initializing SD card with SS = {}", pins.cs)?;
    writeln!(console, "SCK = {}", pins.sck)?;
    writeln!(console, "MOSI = {}", pins.mosi)?;
    writeln!(console, "MISO = {}", pins.miso)
}

pub fn write_card_failure<W: Write>(console: &mut W) -> fmt::Result {
    writeln!(console, "{}", CARD_FAIL_HEADER)?;
    for line in CARD_CHECKLIST {
        writeln!(console, "{}", line)?;
    }
    Ok(())
}

pub fn write_card_present<W: Write>(console: &mut W, card: CardType) -> fmt::Result {
    writeln!(console, "Wiring is correct and a card is present.")?;
    writeln!(console)?;
    writeln!(console, "Card type:         {}", card.label())
}

pub fn write_volume_failure<W: Write>(console: &mut W) -> fmt::Result {
    for line in VOLUME_FAIL_LINES {
        writeln!(console, "{}", line)?;
    }
    Ok(())
}

pub fn write_geometry<W: Write>(console: &mut W, geometry: &VolumeGeometry) -> fmt::Result {
    writeln!(console, "Clusters:          {}", geometry.cluster_count)?;
    writeln!(console, "Blocks x Cluster:  {}", geometry.blocks_per_cluster)?;
    writeln!(console, "Total Blocks:      {}", geometry.total_blocks())?;
    writeln!(console)?;
    writeln!(console, "Volume type is:    FAT{}", geometry.fat_type.number())?;
    writeln!(console, "Volume size (Kb):  {}", geometry.size_kb())?;
    writeln!(console, "Volume size (Mb):  {}", geometry.size_mb())?;
    writeln!(console, "Volume size (Gb):  {:.2}", geometry.size_gb())
}

pub fn write_mount_failure<W: Write>(console: &mut W) -> fmt::Result {
    writeln!(console, "{}", MOUNT_FAIL_LINE)
}

pub fn write_listing_header<W: Write>(console: &mut W) -> fmt::Result {
    writeln!(console, "Initialization done.")?;
    writeln!(console)?;
    writeln!(console, "{}", LISTING_HEADER)
}

#[cfg(test)]
mod tests {
    use std::string::String;

    use super::*;
    use crate::{config::SpiPins, volume::FatType};

    #[test]
    fn banner_reports_board_version_and_pins() {
        let config = SessionConfig::new(
            "Test Board",
            SpiPins {
                mosi: 23,
                miso: 19,
                sck: 18,
                cs: 5,
            },
        );
        let mut out = String::new();
        write_banner(&mut out, &config).unwrap();
        let expected = std::format!(
            "Starting SD Card CardInfo on Test Board\n{}\n\
             Initializing SD card with SS = 5\nSCK = 18\nMOSI = 23\nMISO = 19\n",
            VERSION
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn geometry_block_prints_sizes() {
        let geometry = VolumeGeometry {
            cluster_count: 242_304,
            blocks_per_cluster: 64,
            fat_type: FatType::Fat32,
        };
        let mut out = String::new();
        write_geometry(&mut out, &geometry).unwrap();
        assert_eq!(
            out,
            "Clusters:          242304\n\
             Blocks x Cluster:  64\n\
             Total Blocks:      15507456\n\
             \n\
             Volume type is:    FAT32\n\
             Volume size (Kb):  7753728\n\
             Volume size (Mb):  7572\n\
             Volume size (Gb):  7.39\n"
        );
    }

    #[test]
    fn card_failure_lists_three_checks() {
        let mut out = String::new();
        write_card_failure(&mut out).unwrap();
        let lines: std::vec::Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], CARD_FAIL_HEADER);
        assert!(lines[1..].iter().all(|l| l.starts_with("* ")));
    }
}
