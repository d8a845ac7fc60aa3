//! High-level orchestrator: owns the entry store and exposes one method per
//! user-facing command.
//!
//! Read paths (list, generate, info, export) and edits refuse to run while
//! any entry carries the secret-storage failure marker. Remove, add, import
//! and wipe stay usable so a broken store can still be repaired.

use std::path::Path;

use crate::totp::core;
use crate::totp::resolver;
use crate::totp::store::SecretBackedEntryStore;
use crate::totp::transfer::{self, ExportDocument, ExportedEntry, FileFormat};
use crate::totp::types::*;

/// Central TOTP service.
#[derive(Debug)]
pub struct TotpService {
    store: SecretBackedEntryStore,
}

impl TotpService {
    pub fn new(store: SecretBackedEntryStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SecretBackedEntryStore {
        &self.store
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Entry CRUD
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Add a new entry.
    pub fn add(&mut self, draft: &EntryDraft) -> Result<AddOutcome, TotpError> {
        self.store.add(draft)
    }

    /// Remove the entry a token resolves to.
    pub fn remove(&mut self, token: &str) -> Result<RemoveOutcome, TotpError> {
        let id = self.store.resolve(token)?.id;
        self.store.remove(id)
    }

    /// Edit the entry a token resolves to.
    pub fn edit(&mut self, token: &str, update: &EntryUpdate) -> Result<EditOutcome, TotpError> {
        if update.is_empty() {
            return Err(TotpError::new(TotpErrorKind::InvalidInput, "No changes specified"));
        }
        self.store.ensure_consistent()?;
        let id = self.store.resolve(token)?.id;
        self.store.update(id, update)
    }

    /// Delete every entry and the database file.
    pub fn wipe(&mut self) -> Result<WipeOutcome, TotpError> {
        self.store.wipe()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Code generation
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Codes for every entry in listing order at `unix_seconds`.
    ///
    /// All or nothing: one unusable secret fails the whole listing.
    pub fn list_at(&self, unix_seconds: u64) -> Result<Vec<ListedCode>, TotpError> {
        self.store.ensure_consistent()?;
        resolver::sorted_by_id(self.store.entries())
            .into_iter()
            .enumerate()
            .map(|(i, entry)| -> Result<ListedCode, TotpError> {
                Ok(ListedCode {
                    ordinal: i + 1,
                    entry: entry.clone(),
                    code: self.store.code_at(entry, unix_seconds)?,
                })
            })
            .collect()
    }

    pub fn list(&self) -> Result<Vec<ListedCode>, TotpError> {
        self.list_at(core::current_unix_time())
    }

    /// Code for the entry a token resolves to.
    pub fn generate_at(&self, token: &str, unix_seconds: u64) -> Result<GeneratedCode, TotpError> {
        self.store.ensure_consistent()?;
        let entry = self.store.resolve(token)?;
        self.store.code_at(entry, unix_seconds)
    }

    pub fn generate(&self, token: &str) -> Result<GeneratedCode, TotpError> {
        self.generate_at(token, core::current_unix_time())
    }

    /// Full details (including the usable secret) of one entry.
    pub fn info_at(&self, token: &str, unix_seconds: u64) -> Result<EntryInfo, TotpError> {
        self.store.ensure_consistent()?;
        let entry = self.store.resolve(token)?;
        let secret = self.store.secret_for(entry)?;
        let code = core::code_for_secret_at(entry.id, &secret, entry.digits, entry.period, unix_seconds)?;
        Ok(EntryInfo {
            ordinal: resolver::ordinal_of(self.store.entries(), entry.id).unwrap_or_default(),
            entry: entry.clone(),
            secret,
            code,
        })
    }

    pub fn info(&self, token: &str) -> Result<EntryInfo, TotpError> {
        self.info_at(token, core::current_unix_time())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Import / Export
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Import every valid entry from a document; invalid ones are reported
    /// in `rejected` and do not stop the rest.
    pub fn import(&mut self, path: &Path, format: FileFormat) -> Result<ImportResult, TotpError> {
        let doc = transfer::read_file(path, format)?;
        let mut result = ImportResult {
            total_found: doc.entries.len(),
            ..Default::default()
        };

        for item in &doc.entries {
            match self.store.add(&item.to_draft()) {
                Ok(outcome) => {
                    result.warnings.extend(outcome.warnings);
                    result.imported.push(outcome.entry);
                }
                Err(e) if e.category() == ErrorCategory::Validation => {
                    log::warn!("skipping imported entry '{}': {}", item.name, e);
                    result.rejected.push((item.name.clone(), e));
                }
                Err(e) => return Err(e),
            }
        }

        log::info!(
            "imported {}/{} entries from {}",
            result.imported.len(),
            result.total_found,
            path.display()
        );
        Ok(result)
    }

    /// Export every entry with its usable secret. Returns the entry count.
    pub fn export(&self, path: &Path, format: FileFormat) -> Result<usize, TotpError> {
        self.store.ensure_consistent()?;
        if self.store.is_empty() {
            return Err(TotpError::new(TotpErrorKind::ExportFailed, "No entries to export"));
        }

        let entries = resolver::sorted_by_id(self.store.entries())
            .into_iter()
            .map(|entry| -> Result<ExportedEntry, TotpError> {
                Ok(ExportedEntry::new(entry, self.store.secret_for(entry)?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let count = entries.len();
        transfer::write_file(path, &ExportDocument { entries }, format)?;
        log::info!("exported {} entries to {}", count, path.display());
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::totp::backend::{MemorySecretBackend, NoSecretBackend};
    use crate::totp::repository::MemoryRepository;

    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";
    const SECRET: &str = "JBSWY3DPEHPK3PXP";

    fn service() -> TotpService {
        let store = SecretBackedEntryStore::open(
            Box::new(MemoryRepository::new()),
            Box::new(NoSecretBackend),
            SecretPlacement::Inline,
        )
        .unwrap();
        TotpService::new(store)
    }

    fn broken_service() -> TotpService {
        let repo = MemoryRepository::new();
        let backend = MemorySecretBackend::new();
        {
            let mut store = SecretBackedEntryStore::open(
                Box::new(repo.clone()),
                Box::new(backend.clone()),
                SecretPlacement::Inline,
            )
            .unwrap();
            store.add(&EntryDraft::new("plain", SECRET)).unwrap();
        }
        {
            let mut store = SecretBackedEntryStore::open(
                Box::new(repo.clone()),
                Box::new(backend.clone()),
                SecretPlacement::PreferBackend,
            )
            .unwrap();
            store.add(&EntryDraft::new("vaulted", SECRET)).unwrap();
        }
        backend.set_available(false);
        let store = SecretBackedEntryStore::open(
            Box::new(repo),
            Box::new(backend),
            SecretPlacement::PreferBackend,
        )
        .unwrap();
        TotpService::new(store)
    }

    // ── Generate / list / info ───────────────────────────────────

    #[test]
    fn generate_by_id_ordinal_and_name() {
        let mut svc = service();
        svc.add(&EntryDraft::new("rfc", RFC_SECRET).with_digits(8)).unwrap();
        assert_eq!(svc.generate_at("1", 59).unwrap().code, "94287082");
        assert_eq!(svc.generate_at("rfc", 59).unwrap().code, "94287082");
        assert_eq!(
            svc.generate_at("missing", 59).unwrap_err().kind,
            TotpErrorKind::NotFound
        );
        assert_eq!(svc.generate("rfc").unwrap().code.len(), 8);
    }

    #[test]
    fn list_is_ordered_by_id_with_ordinals() {
        let mut svc = service();
        for name in ["a", "b", "c"] {
            svc.add(&EntryDraft::new(name, SECRET)).unwrap();
        }
        svc.remove("a").unwrap();
        let listed = svc.list_at(1_000).unwrap();
        let rows: Vec<(usize, u64)> = listed.iter().map(|l| (l.ordinal, l.entry.id)).collect();
        assert_eq!(rows, vec![(1, 2), (2, 3)]);
        assert_eq!(listed[0].code.remaining_seconds, 20);
        assert_eq!(svc.list().unwrap().len(), 2);
    }

    #[test]
    fn info_exposes_secret_and_ordinal() {
        let mut svc = service();
        svc.add(&EntryDraft::new("a", SECRET)).unwrap();
        svc.add(&EntryDraft::new("b", RFC_SECRET)).unwrap();
        let info = svc.info_at("b", 59).unwrap();
        assert_eq!(info.ordinal, 2);
        assert_eq!(info.secret, RFC_SECRET);
        assert_eq!(info.code.code, "287082");
        assert_eq!(info.entry.name, "b");
        assert!(svc.info("a").is_ok());
    }

    // ── Failed-marker policy ─────────────────────────────────────

    #[test]
    fn failed_marker_blocks_reads_and_edits() {
        let mut svc = broken_service();
        let kind = |r: Result<(), TotpError>| r.unwrap_err().kind;

        assert_eq!(kind(svc.list_at(59).map(|_| ())), TotpErrorKind::SecretStorageFailed);
        // Even an entry with an inline secret cannot be generated.
        assert_eq!(kind(svc.generate_at("plain", 59).map(|_| ())), TotpErrorKind::SecretStorageFailed);
        assert_eq!(kind(svc.info_at("plain", 59).map(|_| ())), TotpErrorKind::SecretStorageFailed);
        let update = EntryUpdate {
            name: Some("renamed".into()),
            ..Default::default()
        };
        assert_eq!(kind(svc.edit("plain", &update).map(|_| ())), TotpErrorKind::SecretStorageFailed);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.toml");
        assert_eq!(
            kind(svc.export(&path, FileFormat::Toml).map(|_| ())),
            TotpErrorKind::SecretStorageFailed
        );
        assert!(!path.exists());
    }

    #[test]
    fn removing_failed_entry_restores_service() {
        let mut svc = broken_service();
        let out = svc.remove("vaulted").unwrap();
        assert!(out.removed);
        assert_eq!(svc.list_at(59).unwrap().len(), 1);
    }

    // ── Edit ─────────────────────────────────────────────────────

    #[test]
    fn edit_by_token() {
        let mut svc = service();
        svc.add(&EntryDraft::new("mail", SECRET)).unwrap();
        let update = EntryUpdate {
            secret: Some(RFC_SECRET.into()),
            digits: Some(8),
            ..Default::default()
        };
        let out = svc.edit("mail", &update).unwrap();
        assert_eq!(out.entry.id, 1);
        assert_eq!(svc.generate_at("1", 59).unwrap().code, "94287082");
    }

    #[test]
    fn empty_edit_is_rejected() {
        let mut svc = service();
        svc.add(&EntryDraft::new("mail", SECRET)).unwrap();
        let err = svc.edit("mail", &EntryUpdate::default()).unwrap_err();
        assert_eq!(err.kind, TotpErrorKind::InvalidInput);
    }

    // ── Import / export ──────────────────────────────────────────

    #[test]
    fn export_then_import_into_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.toml");

        let mut svc = service();
        svc.add(&EntryDraft::new("a", SECRET)).unwrap();
        svc.add(&EntryDraft::new("b", RFC_SECRET).with_digits(8).with_period(60)).unwrap();
        assert_eq!(svc.export(&path, FileFormat::Toml).unwrap(), 2);

        let mut fresh = service();
        let result = fresh.import(&path, FileFormat::Toml).unwrap();
        assert_eq!(result.total_found, 2);
        assert_eq!(result.imported.len(), 2);
        assert!(result.rejected.is_empty());
        let b = fresh.info_at("b", 59).unwrap();
        assert_eq!(b.entry.digits, 8);
        assert_eq!(b.entry.period, 60);
        assert_eq!(b.secret, RFC_SECRET);
    }

    #[test]
    fn export_uses_backend_secret_not_reference() {
        let store = SecretBackedEntryStore::open(
            Box::new(MemoryRepository::new()),
            Box::new(MemorySecretBackend::new()),
            SecretPlacement::PreferBackend,
        )
        .unwrap();
        let mut svc = TotpService::new(store);
        svc.add(&EntryDraft::new("mail", SECRET)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");
        svc.export(&path, FileFormat::Json).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(SECRET));
        assert!(!text.contains("SecretStorage:"));
    }

    #[test]
    fn export_of_empty_store_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = service()
            .export(&dir.path().join("x.toml"), FileFormat::Toml)
            .unwrap_err();
        assert_eq!(err.message, "No entries to export");
    }

    #[test]
    fn import_skips_invalid_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.json");
        std::fs::write(
            &path,
            r#"{"entries":[
                {"name":"ok","secret":"JBSWY3DPEHPK3PXP"},
                {"name":"bad digits","secret":"JBSWY3DPEHPK3PXP","digits":4},
                {"name":"bad secret","secret":"not_base32!"}
            ]}"#,
        )
        .unwrap();

        let mut svc = service();
        let result = svc.import(&path, FileFormat::Json).unwrap();
        assert_eq!(result.total_found, 3);
        assert_eq!(result.imported.len(), 1);
        let rejected: Vec<&str> = result.rejected.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(rejected, vec!["bad digits", "bad secret"]);
        assert_eq!(svc.store().entries().len(), 1);
    }

    // ── Wipe ─────────────────────────────────────────────────────

    #[test]
    fn wipe_empties_service() {
        let mut svc = service();
        svc.add(&EntryDraft::new("a", SECRET)).unwrap();
        assert_eq!(svc.wipe().unwrap().removed, 1);
        assert!(svc.list_at(0).unwrap().is_empty());
    }
}
