//! In-memory workspaces holding a user's uploaded files.

use crate::processing::types::{FileStatus, ProcessedFile, ProcessingError};
use crate::session::SessionSnapshot;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Files belonging to one user session.
///
/// Entries lock independently, so concurrent processing tasks only contend on their own file.
#[derive(Default)]
pub struct Workspace {
    files: DashMap<Uuid, ProcessedFile>,
    sequence: AtomicU64,
}

impl Workspace {
    /// Create an empty workspace.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn insert(&self, file: ProcessedFile) {
        self.files.insert(file.id, file);
    }

    /// Look up a file.
    pub fn get(&self, id: Uuid) -> Option<ProcessedFile> {
        self.files.get(&id).map(|entry| entry.clone())
    }

    /// All files, newest first.
    pub fn list(&self) -> Vec<ProcessedFile> {
        let mut files: Vec<ProcessedFile> =
            self.files.iter().map(|entry| entry.value().clone()).collect();
        files.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        files
    }

    /// Apply `mutate` to a file and return the updated copy.
    ///
    /// Returns `None` when the file was removed in the meantime; the write is dropped.
    pub(crate) fn update<F>(&self, id: Uuid, mutate: F) -> Option<ProcessedFile>
    where
        F: FnOnce(&mut ProcessedFile),
    {
        let mut entry = self.files.get_mut(&id)?;
        mutate(entry.value_mut());
        Some(entry.clone())
    }

    /// Move a file into `processing` unless another task already owns it.
    ///
    /// Successful files only go back to `processing` when `redo_success` is set (crop).
    pub(crate) fn try_begin(
        &self,
        id: Uuid,
        redo_success: bool,
    ) -> Result<ProcessedFile, ProcessingError> {
        let mut entry = self.files.get_mut(&id).ok_or(ProcessingError::NotFound(id))?;
        check_startable(&entry, redo_success)?;
        entry.begin();
        Ok(entry.clone())
    }

    /// Remove a file, releasing its stored bytes.
    pub fn remove(&self, id: Uuid) -> Option<ProcessedFile> {
        self.files.remove(&id).map(|(_, file)| file)
    }

    /// Remove every file. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let count = self.files.len();
        self.files.clear();
        count
    }

    /// Number of files held.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the workspace holds no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Refuse to start a file that is running, or that already succeeded unless this is a crop.
pub(crate) fn check_startable(
    file: &ProcessedFile,
    redo_success: bool,
) -> Result<(), ProcessingError> {
    match file.status {
        FileStatus::Processing => Err(ProcessingError::Busy(file.id)),
        FileStatus::Success if !redo_success => Err(ProcessingError::AlreadyProcessed(file.id)),
        _ => Ok(()),
    }
}

/// Workspaces keyed by user id.
#[derive(Default)]
pub struct WorkspaceRegistry {
    workspaces: DashMap<String, Arc<Workspace>>,
}

impl WorkspaceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Workspace for the session's user. Anonymous sessions get a fresh throwaway workspace.
    pub fn for_session(&self, session: &SessionSnapshot) -> Arc<Workspace> {
        match session.uid() {
            Some(uid) => self
                .workspaces
                .entry(uid.to_string())
                .or_default()
                .clone(),
            None => Arc::new(Workspace::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::processing::types::Upload;

    fn file(workspace: &Workspace, name: &str) -> ProcessedFile {
        let upload = Upload {
            name: name.into(),
            mime_type: "text/plain".into(),
            bytes: b"hello".to_vec(),
        };
        ProcessedFile::new(upload, classify("text/plain", name), workspace.next_sequence())
    }

    #[test]
    fn lists_newest_first_and_removes() {
        let workspace = Workspace::new();
        let first = file(&workspace, "a.txt");
        let second = file(&workspace, "b.txt");
        let (first_id, second_id) = (first.id, second.id);
        workspace.insert(first);
        workspace.insert(second);

        let names: Vec<String> = workspace.list().into_iter().map(|f| f.file.name).collect();
        assert_eq!(names, vec!["b.txt", "a.txt"]);

        assert!(workspace.remove(first_id).is_some());
        assert!(workspace.get(first_id).is_none());
        assert!(workspace.update(first_id, |f| f.fail("late".into())).is_none());
        assert_eq!(workspace.clear(), 1);
        assert!(workspace.get(second_id).is_none());
    }

    #[test]
    fn second_begin_is_busy() {
        let workspace = Workspace::new();
        let entry = file(&workspace, "a.txt");
        let id = entry.id;
        workspace.insert(entry);
        workspace.try_begin(id, false).expect("first begin");
        assert!(matches!(workspace.try_begin(id, true), Err(ProcessingError::Busy(_))));
    }

    #[test]
    fn successful_files_restart_only_for_crop() {
        let workspace = Workspace::new();
        let entry = file(&workspace, "a.txt");
        let id = entry.id;
        workspace.insert(entry);
        workspace.try_begin(id, false).expect("begin");
        workspace.update(id, |f| f.succeed("done".into(), None));

        assert!(matches!(
            workspace.try_begin(id, false),
            Err(ProcessingError::AlreadyProcessed(_))
        ));
        assert_eq!(workspace.get(id).and_then(|f| f.text).as_deref(), Some("done"));
        let restarted = workspace.try_begin(id, true).expect("crop restart");
        assert_eq!(restarted.status, FileStatus::Processing);
    }

    #[test]
    fn registry_shares_workspaces_per_user_only() {
        use crate::backend::Identity;
        let registry = WorkspaceRegistry::new();
        let mut session = SessionSnapshot::anonymous("2026-10".into());
        assert!(!Arc::ptr_eq(
            &registry.for_session(&session),
            &registry.for_session(&session)
        ));

        session.identity = Some(Identity {
            uid: "u1".into(),
            email: None,
        });
        assert!(Arc::ptr_eq(
            &registry.for_session(&session),
            &registry.for_session(&session)
        ));
    }
}
