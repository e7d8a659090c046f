//! Filesystem watcher feeding the content service.
//!
//! Bridges notify's synchronous callback into the async world: the
//! callback forwards simplified [`FsEvent`]s over a tokio channel via
//! `blocking_send`, and the content service drains them from its event
//! loop. Watches are added recursively for every non-excluded, non-hidden
//! subdirectory; directories created at runtime are added by the service
//! when their create event arrives.

use crate::log;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use walkdir::WalkDir;

/// Simplified filesystem operation, collapsed from notify's event kinds to
/// the classes the event classifier cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    Create,
    Write,
    Remove,
    Rename,
    Other,
}

/// A single filesystem change delivered to the content service.
#[derive(Debug, Clone)]
pub struct FsEvent {
    pub path: PathBuf,
    pub op: FsOp,
}

/// Start a watcher rooted at `root` and return its handle plus the event
/// receiver. The handle must stay alive for events to flow.
pub fn start(
    root: &Path,
    include_hidden: bool,
) -> Result<(RecommendedWatcher, mpsc::Receiver<FsEvent>), notify::Error> {
    let (tx, rx) = mpsc::channel::<FsEvent>(256);

    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                log!("watch"; "error: {e}");
                return;
            }
        };
        let op = map_kind(&event.kind);
        for path in event.paths {
            // A closed channel means the service shut down; drop the event.
            let _ = tx.blocking_send(FsEvent { path, op });
        }
    })?;

    add_recursive(&mut watcher, root, include_hidden);
    Ok((watcher, rx))
}

/// Watch `dir` and every non-excluded, non-hidden subdirectory below it.
///
/// Individual failures are logged and skipped; a directory that vanishes
/// mid-walk must not tear down the watcher.
pub fn add_recursive(watcher: &mut RecommendedWatcher, dir: &Path, include_hidden: bool) {
    let walker = WalkDir::new(dir).into_iter().filter_entry(|entry| {
        if !entry.file_type().is_dir() {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        if entry.path() != dir {
            if !include_hidden && name.starts_with('.') {
                return false;
            }
            if is_excluded_dir(&name) {
                return false;
            }
        }
        true
    });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Err(e) = watcher.watch(entry.path(), RecursiveMode::NonRecursive) {
            log!("watch"; "failed to watch {}: {e}", entry.path().display());
        }
    }
}

/// Directory names never watched, matching the tree builder's exclusions.
fn is_excluded_dir(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "node_modules"
            | "vendor"
            | "venv"
            | ".venv"
            | "deps"
            | "third_party"
            | ".git"
            | ".hg"
            | ".svn"
            | ".idea"
            | ".vscode"
            | "__pycache__"
    )
}

fn map_kind(kind: &EventKind) -> FsOp {
    match kind {
        EventKind::Create(_) => FsOp::Create,
        EventKind::Remove(_) => FsOp::Remove,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FsOp::Create,
        EventKind::Modify(ModifyKind::Name(_)) => FsOp::Rename,
        EventKind::Modify(_) => FsOp::Write,
        _ => FsOp::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    #[test]
    fn test_map_kind() {
        assert_eq!(map_kind(&EventKind::Create(CreateKind::File)), FsOp::Create);
        assert_eq!(map_kind(&EventKind::Remove(RemoveKind::File)), FsOp::Remove);
        assert_eq!(
            map_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            FsOp::Write
        );
        assert_eq!(
            map_kind(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))),
            FsOp::Write
        );
        assert_eq!(
            map_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            FsOp::Rename
        );
        // A moved-to path is new content, not a disappearance.
        assert_eq!(
            map_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            FsOp::Create
        );
        assert_eq!(map_kind(&EventKind::Access(notify::event::AccessKind::Any)), FsOp::Other);
    }

    #[test]
    fn test_excluded_dirs() {
        assert!(is_excluded_dir("node_modules"));
        assert!(is_excluded_dir("Vendor"));
        assert!(is_excluded_dir(".git"));
        assert!(!is_excluded_dir("docs"));
    }

    #[tokio::test]
    async fn test_watcher_delivers_create_event() {
        let dir = tempfile::tempdir().unwrap();
        let (_watcher, mut rx) = start(dir.path(), false).unwrap();

        tokio::fs::write(dir.path().join("new.md"), "# New").await.unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher event within deadline")
            .expect("channel open");
        assert!(event.path.ends_with("new.md"));
    }
}
