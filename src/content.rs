//! Content service: document CRUD, tree snapshots, and change fan-out.
//!
//! The service owns the watcher, the current navigation-tree snapshot, and
//! the subscriber registry. Mutations serialize on a write mutex and land
//! atomically (temp sibling + rename); the watcher loop turns raw
//! filesystem events into typed [`ChangeEvent`]s, rebuilds the tree, and
//! broadcasts to every subscriber with drop-on-lag semantics.
//!
//! # Snapshot publication
//!
//! The tree lives behind an atomic pointer swap (`ArcSwapOption`); readers
//! take a consistent snapshot without locking. Rebuilds serialize on their
//! own mutex with a hard timeout — on failure or timeout the prior
//! snapshot stays live.

use crate::error::WikiError;
use crate::log;
use crate::paths::{PathValidator, is_markdown};
use crate::render::{RenderedDocument, Renderer};
use crate::tree::{TreeNode, TreeOptions};
use crate::watch::{self, FsEvent, FsOp};
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use notify::RecommendedWatcher;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Per-subscriber queue capacity; writers never block on a full queue.
const EVENT_QUEUE_CAPACITY: usize = 8;

/// Hard deadline for a tree rebuild.
const REBUILD_TIMEOUT: Duration = Duration::from_secs(5);

/// Change notification emitted to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    TreeUpdated,
    PageUpdated,
    Deleted,
    Unknown,
}

struct Subscriber {
    cancel: CancellationToken,
    queue: mpsc::Sender<ChangeEvent>,
}

/// Options configuring the content service.
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    pub include_hidden: bool,
}

/// Coordinates content rendering, indexing, and change notifications.
pub struct ContentService {
    root: PathBuf,
    validator: PathValidator,
    renderer: Arc<Renderer>,
    tree: ArcSwapOption<TreeNode>,
    subscribers: Arc<RwLock<HashMap<u64, Subscriber>>>,
    subscriber_counter: AtomicU64,
    write_lock: tokio::sync::Mutex<()>,
    rebuild_lock: tokio::sync::Mutex<()>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    shutdown: CancellationToken,
    include_hidden: bool,
}

impl ContentService {
    /// Initialize content monitoring rooted at `root`: build the initial
    /// tree, start the watcher, and spawn the event loop.
    pub async fn new(
        root: impl Into<PathBuf>,
        renderer: Arc<Renderer>,
        opts: ServiceOptions,
    ) -> Result<Arc<Self>, WikiError> {
        let root = root.into();
        let root = root
            .canonicalize()
            .map_err(|e| WikiError::io("resolve root", &root, e))?;

        let service = Arc::new(Self {
            validator: PathValidator::new(&root),
            renderer,
            tree: ArcSwapOption::empty(),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            subscriber_counter: AtomicU64::new(0),
            write_lock: tokio::sync::Mutex::new(()),
            rebuild_lock: tokio::sync::Mutex::new(()),
            watcher: Mutex::new(None),
            shutdown: CancellationToken::new(),
            include_hidden: opts.include_hidden,
            root,
        });

        let initial = service.build_tree().await?;
        service.tree.store(Some(Arc::new(initial)));

        let (watcher, rx) = watch::start(&service.root, service.include_hidden)
            .map_err(|e| WikiError::Internal(format!("create watcher: {e}")))?;
        *service.watcher.lock() = Some(watcher);
        tokio::spawn(Arc::clone(&service).run_watcher(rx));

        Ok(service)
    }

    /// Release the watcher and disconnect all subscribers.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.watcher.lock().take();
        let mut subs = self.subscribers.write();
        subs.clear();
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The latest tree snapshot.
    pub fn current_tree(&self) -> Result<Arc<TreeNode>, WikiError> {
        self.tree.load_full().ok_or(WikiError::Uninitialized)
    }

    /// Load and render a markdown document by relative path.
    pub async fn document(&self, path: &str) -> Result<Arc<RenderedDocument>, WikiError> {
        let (rel, abs) = self.validator.resolve(path)?;
        let renderer = Arc::clone(&self.renderer);

        tokio::task::spawn_blocking(move || {
            let meta = std::fs::metadata(&abs).map_err(|e| stat_error(&rel, &abs, e))?;
            if meta.is_dir() {
                return Err(WikiError::IsDirectory(rel));
            }
            let modified: DateTime<Utc> = meta
                .modified()
                .map_err(|e| WikiError::io("stat document", &abs, e))?
                .into();
            let content = std::fs::read_to_string(&abs)
                .map_err(|e| WikiError::io("read document", &abs, e))?;
            Ok(renderer.render(&rel, modified, &content))
        })
        .await
        .map_err(|e| WikiError::Internal(format!("render task: {e}")))?
    }

    /// Write updated markdown contents to an existing document.
    pub async fn save(&self, path: &str, data: &[u8]) -> Result<(), WikiError> {
        let (rel, abs) = self.validator.resolve(path)?;
        let _guard = self.write_lock.lock().await;

        match tokio::fs::metadata(&abs).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WikiError::NotFound(rel));
            }
            Err(e) => return Err(WikiError::io("stat document", &abs, e)),
        }

        write_atomic(&abs, data).await?;
        self.renderer.invalidate(&rel);
        Ok(())
    }

    /// Create a new markdown document with the provided contents.
    pub async fn create(&self, path: &str, data: &[u8]) -> Result<(), WikiError> {
        let (rel, abs) = self.validator.resolve(path)?;
        let _guard = self.write_lock.lock().await;

        match tokio::fs::metadata(&abs).await {
            Ok(_) => return Err(WikiError::AlreadyExists(rel)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(WikiError::io("stat document", &abs, e)),
        }

        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WikiError::io("ensure directory", parent, e))?;
        }

        write_atomic(&abs, data).await?;
        self.renderer.invalidate(&rel);
        Ok(())
    }

    /// Rename an existing markdown document to a new path.
    pub async fn rename(&self, from: &str, to: &str) -> Result<(), WikiError> {
        let (from_rel, from_abs) = self.validator.resolve(from)?;
        let (to_rel, to_abs) = self.validator.resolve(to)?;
        let _guard = self.write_lock.lock().await;

        match tokio::fs::metadata(&from_abs).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WikiError::NotFound(from_rel));
            }
            Err(e) => return Err(WikiError::io("stat source document", &from_abs, e)),
        }
        match tokio::fs::metadata(&to_abs).await {
            Ok(_) => return Err(WikiError::AlreadyExists(to_rel)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(WikiError::io("stat destination document", &to_abs, e)),
        }

        if let Some(parent) = to_abs.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WikiError::io("ensure target directory", parent, e))?;
        }

        tokio::fs::rename(&from_abs, &to_abs)
            .await
            .map_err(|e| WikiError::io("rename document", &from_abs, e))?;

        self.renderer.invalidate(&from_rel);
        self.renderer.invalidate(&to_rel);
        Ok(())
    }

    /// Remove a markdown document from disk.
    pub async fn delete(&self, path: &str) -> Result<(), WikiError> {
        let (rel, abs) = self.validator.resolve(path)?;
        let _guard = self.write_lock.lock().await;

        match tokio::fs::metadata(&abs).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WikiError::NotFound(rel));
            }
            Err(e) => return Err(WikiError::io("stat document", &abs, e)),
        }

        tokio::fs::remove_file(&abs)
            .await
            .map_err(|e| WikiError::io("delete document", &abs, e))?;
        self.renderer.invalidate(&rel);
        Ok(())
    }

    /// Register for change events. The queue is bounded; events are
    /// dropped for this subscriber when it lags. The subscriber detaches
    /// when `cancel` fires, the service shuts down, or the receiver drops.
    pub fn subscribe(&self, cancel: CancellationToken) -> mpsc::Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let id = self.subscriber_counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.subscribers.write().insert(
            id,
            Subscriber {
                cancel: cancel.clone(),
                queue: tx,
            },
        );

        let registry = Arc::clone(&self.subscribers);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = shutdown.cancelled() => {}
            }
            registry.write().remove(&id);
        });

        rx
    }

    fn remove_subscriber(&self, id: u64) {
        self.subscribers.write().remove(&id);
    }

    async fn run_watcher(self: Arc<Self>, mut rx: mpsc::Receiver<FsEvent>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                event = rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => return,
                },
            }
        }
    }

    async fn handle_event(&self, event: FsEvent) {
        let rel = self.relative_path(&event.path);
        let is_md = is_markdown(&rel);

        if is_md
            && matches!(
                event.op,
                FsOp::Create | FsOp::Write | FsOp::Remove | FsOp::Rename
            )
        {
            self.renderer.invalidate(&rel);
        }

        if event.op == FsOp::Create && event.path.is_dir() {
            let mut watcher = self.watcher.lock();
            if let Some(watcher) = watcher.as_mut() {
                watch::add_recursive(watcher, &event.path, self.include_hidden);
            }
        }

        let kind = classify_event(&event.path, event.op, is_md);
        if kind == ChangeKind::Unknown {
            return;
        }

        let rebuild_ok = self.rebuild_tree().await;
        if !rebuild_ok && matches!(kind, ChangeKind::TreeUpdated | ChangeKind::Deleted) {
            // Clients could not reconcile an event against a stale tree.
            log!("content"; "skipping broadcast after rebuild failure: {rel}");
            return;
        }

        self.broadcast(ChangeEvent {
            kind,
            path: rel,
            timestamp: Utc::now(),
        });
    }

    fn broadcast(&self, event: ChangeEvent) {
        let mut stale = Vec::new();
        {
            let subs = self.subscribers.read();
            for (id, sub) in subs.iter() {
                if sub.cancel.is_cancelled() || self.shutdown.is_cancelled() {
                    stale.push(*id);
                    continue;
                }
                match sub.queue.try_send(event.clone()) {
                    Ok(()) => {}
                    // Full queue: the event is dropped for this subscriber.
                    Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Closed(_)) => stale.push(*id),
                }
            }
        }
        for id in stale {
            self.remove_subscriber(id);
        }
    }

    /// Serialize rebuilds and publish the new snapshot. Returns false on
    /// failure or timeout; the prior snapshot stays live either way.
    async fn rebuild_tree(&self) -> bool {
        let _guard = self.rebuild_lock.lock().await;
        match tokio::time::timeout(REBUILD_TIMEOUT, self.build_tree()).await {
            Ok(Ok(node)) => {
                self.tree.store(Some(Arc::new(node)));
                true
            }
            Ok(Err(e)) => {
                log!("content"; "rebuild tree failed: {e}");
                false
            }
            Err(_) => {
                // The blocking walk keeps running but its result is
                // discarded with the join handle.
                log!("content"; "rebuild tree timed out");
                false
            }
        }
    }

    async fn build_tree(&self) -> Result<TreeNode, WikiError> {
        let root = self.root.clone();
        let renderer = Arc::clone(&self.renderer);
        let opts = TreeOptions {
            include_hidden: self.include_hidden,
            exclude_dirs: Vec::new(),
        };
        tokio::task::spawn_blocking(move || crate::tree::build(&root, &renderer, &opts))
            .await
            .map_err(|e| WikiError::Internal(format!("tree build task: {e}")))?
    }

    fn relative_path(&self, abs: &Path) -> String {
        abs.strip_prefix(&self.root)
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| abs.to_string_lossy().into_owned())
    }
}

fn stat_error(rel: &str, abs: &Path, e: std::io::Error) -> WikiError {
    if e.kind() == std::io::ErrorKind::NotFound {
        WikiError::NotFound(rel.to_string())
    } else {
        WikiError::io("stat document", abs, e)
    }
}

/// Atomic write: temp sibling, write, sync, chmod, rename over target.
async fn write_atomic(target: &Path, data: &[u8]) -> Result<(), WikiError> {
    let target = target.to_path_buf();
    let data = data.to_vec();
    tokio::task::spawn_blocking(move || {
        let dir = target
            .parent()
            .ok_or_else(|| WikiError::InvalidPath(target.display().to_string()))?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".wikimd-")
            .tempfile_in(dir)
            .map_err(|e| WikiError::io("create temp file", dir, e))?;
        tmp.write_all(&data)
            .map_err(|e| WikiError::io("write temp file", tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| WikiError::io("sync temp file", tmp.path(), e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))
                .map_err(|e| WikiError::io("chmod temp file", tmp.path(), e))?;
        }
        tmp.persist(&target)
            .map_err(|e| WikiError::io("replace document", &target, e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| WikiError::Internal(format!("write task: {e}")))?
}

/// Map a raw filesystem operation onto a change event type.
///
/// The remove-but-still-exists branch covers editors that save through an
/// atomic rename: the watched path gets a remove notification while the
/// replacement file is already in place, which is an update, not a
/// deletion.
fn classify_event(path: &Path, op: FsOp, is_md: bool) -> ChangeKind {
    match op {
        FsOp::Remove => {
            if is_md {
                if path.exists() {
                    ChangeKind::PageUpdated
                } else {
                    ChangeKind::Deleted
                }
            } else {
                ChangeKind::TreeUpdated
            }
        }
        FsOp::Rename => ChangeKind::TreeUpdated,
        FsOp::Write | FsOp::Create => {
            if is_md {
                ChangeKind::PageUpdated
            } else {
                ChangeKind::TreeUpdated
            }
        }
        FsOp::Other => ChangeKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn service_at(dir: &Path) -> Arc<ContentService> {
        ContentService::new(dir, Arc::new(Renderer::new()), ServiceOptions::default())
            .await
            .unwrap()
    }

    async fn recv_kind(
        rx: &mut mpsc::Receiver<ChangeEvent>,
        kind: ChangeKind,
    ) -> Option<ChangeEvent> {
        timeout(Duration::from_secs(5), async {
            while let Some(event) = rx.recv().await {
                if event.kind == kind {
                    return Some(event);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    #[tokio::test]
    async fn test_document_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.md"), "# Hello").unwrap();
        let service = service_at(dir.path()).await;

        let doc = service.document("index").await.unwrap();
        assert!(doc.html.contains("Hello"));
        assert_eq!(doc.raw, "# Hello");
        service.close();
    }

    #[tokio::test]
    async fn test_document_not_found_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub.md")).unwrap();
        std::fs::write(dir.path().join("a.md"), "# A").unwrap();
        let service = service_at(dir.path()).await;

        assert!(matches!(
            service.document("missing").await,
            Err(WikiError::NotFound(_))
        ));
        assert!(matches!(
            service.document("sub.md").await,
            Err(WikiError::IsDirectory(_))
        ));
        service.close();
    }

    #[tokio::test]
    async fn test_save_requires_existing_document() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "old").unwrap();
        let service = service_at(dir.path()).await;

        assert!(matches!(
            service.save("missing.md", b"x").await,
            Err(WikiError::NotFound(_))
        ));

        service.save("a.md", b"# New body").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.md")).unwrap(),
            "# New body"
        );
        // No temp sibling left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".wikimd-"))
            .collect();
        assert!(leftovers.is_empty());
        service.close();
    }

    #[tokio::test]
    async fn test_create_conflicts_and_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("seed.md"), "# Seed").unwrap();
        let service = service_at(dir.path()).await;

        service.create("notes/a", b"# A").await.unwrap();
        assert!(dir.path().join("notes/a.md").is_file());

        assert!(matches!(
            service.create("notes/a.md", b"# Again").await,
            Err(WikiError::AlreadyExists(_))
        ));
        service.close();
    }

    #[tokio::test]
    async fn test_rename_moves_and_guards() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.md"), "# X").unwrap();
        std::fs::write(dir.path().join("taken.md"), "# T").unwrap();
        let service = service_at(dir.path()).await;

        assert!(matches!(
            service.rename("missing.md", "y.md").await,
            Err(WikiError::NotFound(_))
        ));
        assert!(matches!(
            service.rename("x.md", "taken.md").await,
            Err(WikiError::AlreadyExists(_))
        ));

        service.rename("x.md", "moved/y.md").await.unwrap();
        assert!(!dir.path().join("x.md").exists());
        assert!(dir.path().join("moved/y.md").is_file());
        service.close();
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "# A").unwrap();
        let service = service_at(dir.path()).await;

        service.delete("a.md").await.unwrap();
        assert!(!dir.path().join("a.md").exists());
        assert!(matches!(
            service.delete("a.md").await,
            Err(WikiError::NotFound(_))
        ));
        service.close();
    }

    #[tokio::test]
    async fn test_traversal_rejected_before_io() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "# A").unwrap();
        let service = service_at(dir.path()).await;

        assert!(matches!(
            service.document("../etc/passwd").await,
            Err(WikiError::InvalidPath(_))
        ));
        assert!(matches!(
            service.delete("../../x.md").await,
            Err(WikiError::InvalidPath(_))
        ));
        service.close();
    }

    #[test]
    fn test_classify_event() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("exists.md");
        std::fs::write(&existing, "x").unwrap();
        let missing = dir.path().join("gone.md");

        // Remove of a path that still exists: an atomic replace, not a delete.
        assert_eq!(
            classify_event(&existing, FsOp::Remove, true),
            ChangeKind::PageUpdated
        );
        assert_eq!(
            classify_event(&missing, FsOp::Remove, true),
            ChangeKind::Deleted
        );
        assert_eq!(
            classify_event(&missing, FsOp::Remove, false),
            ChangeKind::TreeUpdated
        );
        assert_eq!(
            classify_event(&missing, FsOp::Rename, true),
            ChangeKind::TreeUpdated
        );
        assert_eq!(
            classify_event(&missing, FsOp::Write, true),
            ChangeKind::PageUpdated
        );
        assert_eq!(
            classify_event(&missing, FsOp::Create, false),
            ChangeKind::TreeUpdated
        );
        assert_eq!(
            classify_event(&missing, FsOp::Other, true),
            ChangeKind::Unknown
        );
    }

    #[tokio::test]
    async fn test_broadcast_drops_on_full_queue() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "# A").unwrap();
        let service = service_at(dir.path()).await;

        let mut rx = service.subscribe(CancellationToken::new());
        for i in 0..20 {
            service.broadcast(ChangeEvent {
                kind: ChangeKind::PageUpdated,
                path: format!("p{i}.md"),
                timestamp: Utc::now(),
            });
        }

        // Only the queue capacity survives; the rest were dropped.
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, EVENT_QUEUE_CAPACITY);

        // A drained subscriber receives the next event normally.
        service.broadcast(ChangeEvent {
            kind: ChangeKind::TreeUpdated,
            path: String::new(),
            timestamp: Utc::now(),
        });
        assert!(rx.try_recv().is_ok());
        service.close();
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_block_fast_one() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "# A").unwrap();
        let service = service_at(dir.path()).await;

        let _slow = service.subscribe(CancellationToken::new());
        let mut fast = service.subscribe(CancellationToken::new());

        for i in 0..20 {
            service.broadcast(ChangeEvent {
                kind: ChangeKind::PageUpdated,
                path: format!("p{i}.md"),
                timestamp: Utc::now(),
            });
            // Fast subscriber drains every tick.
            while fast.try_recv().is_ok() {}
        }

        service.broadcast(ChangeEvent {
            kind: ChangeKind::PageUpdated,
            path: "final.md".into(),
            timestamp: Utc::now(),
        });
        let event = fast.try_recv().unwrap();
        assert_eq!(event.path, "final.md");
        service.close();
    }

    #[tokio::test]
    async fn test_cancelled_subscriber_detaches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "# A").unwrap();
        let service = service_at(dir.path()).await;

        let cancel = CancellationToken::new();
        let _rx = service.subscribe(cancel.clone());
        assert_eq!(service.subscribers.read().len(), 1);

        cancel.cancel();
        // The detach task runs on the next scheduler tick.
        timeout(Duration::from_secs(2), async {
            while !service.subscribers.read().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscriber removed after cancel");
        service.close();
    }

    #[tokio::test]
    async fn test_repeated_subscribe_cancel_does_not_leak() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "# A").unwrap();
        let service = service_at(dir.path()).await;

        for _ in 0..100 {
            let cancel = CancellationToken::new();
            let rx = service.subscribe(cancel.clone());
            cancel.cancel();
            drop(rx);
        }
        timeout(Duration::from_secs(2), async {
            while !service.subscribers.read().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("registry drained");
        service.close();
    }

    #[tokio::test]
    async fn test_live_update_event_flow() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.md"), "# Old").unwrap();
        let service = service_at(dir.path()).await;

        let mut rx = service.subscribe(CancellationToken::new());
        service.save("index.md", b"# New").await.unwrap();

        let event = recv_kind(&mut rx, ChangeKind::PageUpdated)
            .await
            .expect("pageUpdated within deadline");
        assert_eq!(event.path, "index.md");

        let doc = service.document("index.md").await.unwrap();
        assert!(doc.html.contains("New"));
        assert!(!doc.html.contains("Old"));
        service.close();
    }

    #[tokio::test]
    async fn test_create_appears_in_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("seed.md"), "# Seed").unwrap();
        let service = service_at(dir.path()).await;

        let mut rx = service.subscribe(CancellationToken::new());
        service.create("fresh.md", b"# Fresh").await.unwrap();

        recv_kind(&mut rx, ChangeKind::PageUpdated)
            .await
            .expect("create event within deadline");

        // Rebuild landed before the broadcast, so the snapshot has it.
        let tree = service.current_tree().unwrap();
        assert!(!tree.path_to("fresh.md").is_empty());
        service.close();
    }
}
