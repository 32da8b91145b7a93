use core::fmt::{self, Write};

use embedded_hal::delay::DelayNs;

use crate::{
    api::Storage,
    card::CardType,
    config::{MountFailurePolicy, SessionConfig, WALK_DEPTH_MAX},
    report,
    volume::VolumeGeometry,
    walker::{self, DirectoryWalker, WalkSummary},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HaltReason {
    CardInit,
    Volume,
    Mount,
}

impl HaltReason {
    pub const fn label(self) -> &'static str {
        match self {
            HaltReason::CardInit => "card_init",
            HaltReason::Volume => "volume",
            HaltReason::Mount => "mount",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DegradedReason {
    Mount,
    RootUnavailable,
}

impl DegradedReason {
    pub const fn label(self) -> &'static str {
        match self {
            DegradedReason::Mount => "mount",
            DegradedReason::RootUnavailable => "root_unavailable",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    Listed(WalkSummary),
    Degraded(DegradedReason),
    Halted(HaltReason),
}

impl SessionOutcome {
    pub const fn label(&self) -> &'static str {
        match self {
            SessionOutcome::Listed(_) => "listed",
            SessionOutcome::Degraded(_) => "degraded",
            SessionOutcome::Halted(_) => "halted",
        }
    }

    pub const fn is_halted(&self) -> bool {
        matches!(self, SessionOutcome::Halted(_))
    }
}

/// One pass of the card report: card, volume, mount, then the listing.
pub struct DiagnosticSession<S: Storage, W: Write> {
    config: SessionConfig,
    storage: S,
    console: W,
    card_type: Option<CardType>,
    geometry: Option<VolumeGeometry>,
}

impl<S: Storage, W: Write> DiagnosticSession<S, W> {
    pub fn new(config: SessionConfig, storage: S, console: W) -> Self {
        Self {
            config,
            storage,
            console,
            card_type: None,
            geometry: None,
        }
    }

    pub fn card_type(&self) -> Option<CardType> {
        self.card_type
    }

    pub fn geometry(&self) -> Option<VolumeGeometry> {
        self.geometry
    }

    pub fn into_parts(self) -> (S, W) {
        (self.storage, self.console)
    }

    pub fn run(&mut self, delay: &mut impl DelayNs) -> SessionOutcome {
        delay.delay_ms(self.config.startup_delay_ms);
        let config = self.config;
        self.emit(|c| report::write_banner(c, &config));

        log::info!(
            "session: card_init speed={} clock_khz={}",
            config.speed.label(),
            config.speed.data_clock_khz()
        );
        if let Err(err) = self.storage.init_card(config.speed) {
            log::warn!("session: card_init_failed err={:?}", err);
            self.emit(report::write_card_failure);
            return SessionOutcome::Halted(HaltReason::CardInit);
        }

        let card = CardType::from_code(self.storage.card_type_code());
        self.card_type = Some(card);
        self.emit(|c| report::write_card_present(c, card));

        let geometry = match self.storage.init_volume() {
            Ok(geometry) => geometry,
            Err(err) => {
                log::warn!("session: volume_failed err={:?}", err);
                self.emit(report::write_volume_failure);
                return SessionOutcome::Halted(HaltReason::Volume);
            }
        };
        self.geometry = Some(geometry);
        self.emit(|c| report::write_geometry(c, &geometry));

        if let Err(err) = self.storage.mount() {
            log::warn!(
                "session: mount_failed policy={:?} err={:?}",
                config.mount_failure,
                err
            );
            self.emit(report::write_mount_failure);
            return match config.mount_failure {
                MountFailurePolicy::Degrade => SessionOutcome::Degraded(DegradedReason::Mount),
                MountFailurePolicy::Halt => SessionOutcome::Halted(HaltReason::Mount),
            };
        }
        self.emit(report::write_listing_header);

        let root = match self.storage.open_dir(config.root_path) {
            Ok(root) => root,
            Err(err) => {
                log::warn!(
                    "session: open_root_failed path={} err={:?}",
                    config.root_path,
                    err
                );
                return SessionOutcome::Degraded(DegradedReason::RootUnavailable);
            }
        };

        let mut walker = DirectoryWalker::<_, WALK_DEPTH_MAX>::new(root);
        if walker::write_listing(&mut self.console, &mut walker).is_err() {
            log::warn!("session: console_error stage=listing");
        }
        let summary = walker.summary();
        log::info!(
            "session: listed files={} dirs={} max_depth={} enum_errors={} skipped={}",
            summary.files,
            summary.directories,
            summary.max_depth,
            summary.enumeration_errors,
            summary.skipped_directories
        );
        SessionOutcome::Listed(summary)
    }

    fn emit(&mut self, write: impl FnOnce(&mut W) -> fmt::Result) {
        if write(&mut self.console).is_err() {
            log::warn!("session: console_error");
        }
    }
}
