pub const VERSION: &str = concat!("sdcard v", env!("CARGO_PKG_VERSION"));

/// Clock used while the card is identified, before the data clock applies.
pub const SPI_INIT_CLOCK_KHZ: u32 = 400;
/// Open directory handles the walker keeps at most, root included.
pub const WALK_DEPTH_MAX: usize = 8;
/// 8.3 short names: eight name bytes, a dot, three extension bytes.
pub const ENTRY_NAME_MAX: usize = 12;
pub const STARTUP_DELAY_MS: u32 = 1_000;
pub const ROOT_PATH: &str = "/";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpiPins {
    pub mosi: u8,
    pub miso: u8,
    pub sck: u8,
    pub cs: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpiSpeed {
    Full,
    Half,
    Quarter,
}

impl SpiSpeed {
    pub const fn data_clock_khz(self) -> u32 {
        match self {
            SpiSpeed::Full => 20_000,
            SpiSpeed::Half => 10_000,
            SpiSpeed::Quarter => 5_000,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            SpiSpeed::Full => "full",
            SpiSpeed::Half => "half",
            SpiSpeed::Quarter => "quarter",
        }
    }
}

/// What a failed file-system mount does to the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MountFailurePolicy {
    /// Report and stop before the listing; the board idles.
    #[default]
    Degrade,
    /// Report and halt like card or volume failures.
    Halt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub board_name: &'static str,
    pub pins: SpiPins,
    pub speed: SpiSpeed,
    pub startup_delay_ms: u32,
    pub root_path: &'static str,
    pub mount_failure: MountFailurePolicy,
}

impl SessionConfig {
    pub const fn new(board_name: &'static str, pins: SpiPins) -> Self {
        Self {
            board_name,
            pins,
            speed: SpiSpeed::Half,
            startup_delay_ms: STARTUP_DELAY_MS,
            root_path: ROOT_PATH,
            mount_failure: MountFailurePolicy::Degrade,
        }
    }

    pub const fn with_speed(mut self, speed: SpiSpeed) -> Self {
        self.speed = speed;
        self
    }

    pub const fn with_startup_delay_ms(mut self, startup_delay_ms: u32) -> Self {
        self.startup_delay_ms = startup_delay_ms;
        self
    }

    pub const fn with_mount_failure(mut self, mount_failure: MountFailurePolicy) -> Self {
        self.mount_failure = mount_failure;
        self
    }
}
