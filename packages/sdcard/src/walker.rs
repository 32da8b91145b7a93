use core::fmt::{self, Write};

use heapless::{String, Vec};

use crate::{api::Node, config::ENTRY_NAME_MAX};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListingKind {
    File { size: u32 },
    /// `descended` is false when the traversal stack was full and the
    /// directory's children were not listed.
    Directory { descended: bool },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingLine {
    pub depth: usize,
    pub name: String<ENTRY_NAME_MAX>,
    pub kind: ListingKind,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub files: u32,
    pub directories: u32,
    pub max_depth: usize,
    pub enumeration_errors: u32,
    pub skipped_directories: u32,
}

/// Depth-first listing over an explicit stack of open directory handles.
///
/// The stack holds at most `DEPTH` handles, root included. A handle is
/// released as soon as its directory is exhausted; dropping the walker
/// releases whatever is still open, innermost first.
pub struct DirectoryWalker<N: Node, const DEPTH: usize> {
    stack: Vec<N, DEPTH>,
    summary: WalkSummary,
}

impl<N: Node, const DEPTH: usize> DirectoryWalker<N, DEPTH> {
    pub fn new(root: N) -> Self {
        let mut stack = Vec::new();
        // DEPTH == 0 leaves nothing to enumerate; the root is released here.
        let _ = stack.push(root);
        Self {
            stack,
            summary: WalkSummary::default(),
        }
    }

    pub fn summary(&self) -> WalkSummary {
        self.summary
    }

    pub fn is_finished(&self) -> bool {
        self.stack.is_empty()
    }
}

impl<N: Node, const DEPTH: usize> Iterator for DirectoryWalker<N, DEPTH> {
    type Item = ListingLine;

    fn next(&mut self) -> Option<ListingLine> {
        loop {
            let depth = self.stack.len().checked_sub(1)?;
            let dir = self.stack.last_mut()?;

            let child = match dir.next_child() {
                Ok(Some(child)) => child,
                Ok(None) => {
                    self.stack.pop();
                    continue;
                }
                Err(err) => {
                    log::warn!("walk: enum_error depth={} err={:?}", depth, err);
                    self.summary.enumeration_errors += 1;
                    self.stack.pop();
                    continue;
                }
            };

            let name = short_name(child.name());
            self.summary.max_depth = self.summary.max_depth.max(depth);

            if !child.is_directory() {
                self.summary.files += 1;
                return Some(ListingLine {
                    depth,
                    name,
                    kind: ListingKind::File { size: child.size() },
                });
            }

            self.summary.directories += 1;
            let descended = match self.stack.push(child) {
                Ok(()) => true,
                Err(_skipped) => {
                    log::warn!("walk: depth_limit depth={} name={}", depth + 1, name);
                    self.summary.skipped_directories += 1;
                    false
                }
            };
            return Some(ListingLine {
                depth,
                name,
                kind: ListingKind::Directory { descended },
            });
        }
    }
}

impl<N: Node, const DEPTH: usize> Drop for DirectoryWalker<N, DEPTH> {
    fn drop(&mut self) {
        while self.stack.pop().is_some() {}
    }
}

/// Cuts `name` to the width of an 8.3 short name.
pub(crate) fn short_name(name: &str) -> String<ENTRY_NAME_MAX> {
    let mut out = String::new();
    for ch in name.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

pub fn write_line<W: Write>(console: &mut W, line: &ListingLine) -> fmt::Result {
    for _ in 0..line.depth {
        console.write_char('\t')?;
    }
    console.write_str(&line.name)?;
    match line.kind {
        ListingKind::Directory { .. } => console.write_str("/\n"),
        ListingKind::File { size } => writeln!(console, "\t\t{}", size),
    }
}

/// Prints every line the walker yields. A console error stops the walk at
/// the line that failed to print.
pub fn write_listing<W, N, const DEPTH: usize>(
    console: &mut W,
    walker: &mut DirectoryWalker<N, DEPTH>,
) -> fmt::Result
where
    W: Write,
    N: Node,
{
    for line in walker {
        write_line(console, &line)?;
    }
    Ok(())
}
