//! In-memory storage for host tests. Every node handed out is counted in a
//! shared ledger so tests can check that handles are released exactly once.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
    string::{String, ToString},
    vec::Vec,
};

use crate::{
    api::{Node, Storage},
    config::SpiSpeed,
    volume::VolumeGeometry,
};

#[derive(Default)]
struct LedgerCounts {
    opened: Cell<u32>,
    released: Cell<u32>,
}

#[derive(Clone, Default)]
pub(crate) struct HandleLedger {
    counts: Rc<LedgerCounts>,
}

impl HandleLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn opened(&self) -> u32 {
        self.counts.opened.get()
    }

    pub(crate) fn released(&self) -> u32 {
        self.counts.released.get()
    }

    pub(crate) fn open_handles(&self) -> u32 {
        self.opened() - self.released()
    }

    fn open(&self) {
        self.counts.opened.set(self.opened() + 1);
    }

    fn release(&self) {
        assert!(self.released() < self.opened(), "handle released twice");
        self.counts.released.set(self.released() + 1);
    }
}

#[derive(Clone)]
enum FakeEntry {
    File { name: String, size: u32 },
    Dir(FakeDir),
}

/// Directory tree builder.
#[derive(Clone)]
pub(crate) struct FakeDir {
    ledger: HandleLedger,
    name: String,
    entries: Vec<FakeEntry>,
    fail_after: Option<usize>,
}

impl FakeDir {
    pub(crate) fn root(ledger: &HandleLedger) -> Self {
        Self {
            ledger: ledger.clone(),
            name: "/".to_string(),
            entries: Vec::new(),
            fail_after: None,
        }
    }

    pub(crate) fn file(mut self, name: &str, size: u32) -> Self {
        self.entries.push(FakeEntry::File {
            name: name.to_string(),
            size,
        });
        self
    }

    pub(crate) fn dir(mut self, name: &str, build: impl FnOnce(FakeDir) -> FakeDir) -> Self {
        let child = FakeDir {
            ledger: self.ledger.clone(),
            name: name.to_string(),
            entries: Vec::new(),
            fail_after: None,
        };
        self.entries.push(FakeEntry::Dir(build(child)));
        self
    }

    /// Enumeration fails once `count` children have been handed out.
    pub(crate) fn fail_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    pub(crate) fn open(self) -> FakeNode {
        self.ledger.open();
        FakeNode {
            ledger: self.ledger,
            name: self.name,
            directory: true,
            size: 0,
            children: self.entries.into(),
            fail_after: self.fail_after,
            handed_out: 0,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FakeError {
    Enumeration,
    NotFound,
    Refused(&'static str),
}

pub(crate) struct FakeNode {
    ledger: HandleLedger,
    name: String,
    directory: bool,
    size: u32,
    children: VecDeque<FakeEntry>,
    fail_after: Option<usize>,
    handed_out: usize,
}

impl Drop for FakeNode {
    fn drop(&mut self) {
        self.ledger.release();
    }
}

impl Node for FakeNode {
    type Error = FakeError;

    fn name(&self) -> &str {
        &self.name
    }

    fn is_directory(&self) -> bool {
        self.directory
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn next_child(&mut self) -> Result<Option<Self>, FakeError> {
        if self.fail_after == Some(self.handed_out) {
            return Err(FakeError::Enumeration);
        }
        let Some(entry) = self.children.pop_front() else {
            return Ok(None);
        };
        self.handed_out += 1;
        let node = match entry {
            FakeEntry::Dir(dir) => dir.open(),
            FakeEntry::File { name, size } => {
                self.ledger.open();
                FakeNode {
                    ledger: self.ledger.clone(),
                    name,
                    directory: false,
                    size,
                    children: VecDeque::new(),
                    fail_after: None,
                    handed_out: 0,
                }
            }
        };
        Ok(Some(node))
    }
}

/// Scripted storage stack: each stage succeeds unless told otherwise.
pub(crate) struct FakeStorage {
    pub(crate) card_ok: bool,
    pub(crate) type_code: u8,
    pub(crate) volume: Option<VolumeGeometry>,
    pub(crate) mount_ok: bool,
    pub(crate) tree: FakeDir,
    pub(crate) calls: RefCell<Vec<&'static str>>,
    pub(crate) speed: Option<SpiSpeed>,
}

impl FakeStorage {
    pub(crate) fn new(geometry: VolumeGeometry, tree: FakeDir) -> Self {
        Self {
            card_ok: true,
            type_code: 3,
            volume: Some(geometry),
            mount_ok: true,
            tree,
            calls: RefCell::new(Vec::new()),
            speed: None,
        }
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.borrow_mut().push(call);
    }
}

impl Storage for FakeStorage {
    type Error = FakeError;
    type Node<'a> = FakeNode;

    fn init_card(&mut self, speed: SpiSpeed) -> Result<(), FakeError> {
        self.record("init_card");
        self.speed = Some(speed);
        if self.card_ok {
            Ok(())
        } else {
            Err(FakeError::Refused("no card"))
        }
    }

    fn card_type_code(&self) -> u8 {
        self.record("card_type");
        self.type_code
    }

    fn init_volume(&mut self) -> Result<VolumeGeometry, FakeError> {
        self.record("init_volume");
        self.volume.ok_or(FakeError::Refused("no fat"))
    }

    fn mount(&mut self) -> Result<(), FakeError> {
        self.record("mount");
        if self.mount_ok {
            Ok(())
        } else {
            Err(FakeError::Refused("mount"))
        }
    }

    fn open_dir(&self, path: &str) -> Result<FakeNode, FakeError> {
        self.record("open_dir");
        if path != "/" {
            return Err(FakeError::NotFound);
        }
        Ok(self.tree.clone().open())
    }
}
