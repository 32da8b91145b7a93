pub const CARD_TYPE_SD1: u8 = 1;
pub const CARD_TYPE_SD2: u8 = 2;
pub const CARD_TYPE_SDHC: u8 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CardType {
    Sd1,
    Sd2,
    Sdhc,
    Unknown,
}

impl CardType {
    pub const fn from_code(code: u8) -> Self {
        match code {
            CARD_TYPE_SD1 => CardType::Sd1,
            CARD_TYPE_SD2 => CardType::Sd2,
            CARD_TYPE_SDHC => CardType::Sdhc,
            _ => CardType::Unknown,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            CardType::Sd1 => "SD1",
            CardType::Sd2 => "SD2",
            CardType::Sdhc => "SDHC",
            CardType::Unknown => "Unknown",
        }
    }
}
