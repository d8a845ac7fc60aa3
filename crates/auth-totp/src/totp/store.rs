//! Entry store that keeps metadata and backend-held secrets consistent.
//!
//! Metadata always goes through the [`EntryRepository`]. Secrets are
//! either inline or redirected to a [`SecretBackend`] that can fail on its
//! own. Failures on the secret side never corrupt metadata: they either
//! fall back to inline storage, get marked as `BackendFailed` on load, or
//! surface as [`BackendWarning`]s.

use std::collections::HashMap;

use crate::totp::backend::{BackendError, SecretBackend};
use crate::totp::core;
use crate::totp::repository::EntryRepository;
use crate::totp::resolver;
use crate::totp::types::*;
use crate::totp::validation;

pub struct SecretBackedEntryStore {
    repository: Box<dyn EntryRepository>,
    backend: Box<dyn SecretBackend>,
    placement: SecretPlacement,
    entries: Vec<Entry>,
    /// Secrets fetched from the backend, by entry id.
    resolved: HashMap<u64, String>,
}

impl std::fmt::Debug for SecretBackedEntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBackedEntryStore")
            .field("placement", &self.placement)
            .field("entries", &self.entries.len())
            .field("resolved", &self.resolved.len())
            .finish()
    }
}

impl SecretBackedEntryStore {
    /// Load every entry and resolve backend references.
    ///
    /// A reference whose secret cannot be fetched is kept in memory as
    /// `BackendFailed`; it is never written back.
    pub fn open(
        repository: Box<dyn EntryRepository>,
        backend: Box<dyn SecretBackend>,
        placement: SecretPlacement,
    ) -> Result<Self, TotpError> {
        let mut entries = repository.load_all()?;
        let mut resolved = HashMap::new();
        let available = backend.available();

        for entry in entries.iter_mut() {
            let SecretSource::BackendRef(name) = &entry.secret else {
                continue;
            };
            let fetched = if available {
                backend.retrieve(name)
            } else {
                Err(BackendError::Unavailable)
            };
            match fetched {
                Ok(Some(secret)) => {
                    resolved.insert(entry.id, secret);
                }
                Ok(None) => {
                    log::warn!("no stored secret for entry {} ('{}')", entry.id, name);
                    entry.secret = SecretSource::BackendFailed(name.clone());
                }
                Err(e) => {
                    log::warn!("failed to retrieve secret for entry {} ('{}'): {}", entry.id, name, e);
                    entry.secret = SecretSource::BackendFailed(name.clone());
                }
            }
        }

        Ok(Self {
            repository,
            backend,
            placement,
            entries,
            resolved,
        })
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn placement(&self) -> SecretPlacement {
        self.placement
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a token (id, ordinal or name) to an entry.
    pub fn resolve(&self, token: &str) -> Result<&Entry, TotpError> {
        resolver::resolve(&self.entries, token)
    }

    pub fn get(&self, id: u64) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Fail if any entry carries the load-time failure marker.
    pub fn ensure_consistent(&self) -> Result<(), TotpError> {
        let failed: Vec<&str> = self
            .entries
            .iter()
            .filter_map(|e| match &e.secret {
                SecretSource::BackendFailed(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        if failed.is_empty() {
            return Ok(());
        }
        Err(TotpError::new(
            TotpErrorKind::SecretStorageFailed,
            "Failed to retrieve secrets from secret storage",
        )
        .with_detail(format!("affected entries: {}", failed.join(", "))))
    }

    /// The usable Base32 secret for an entry.
    pub fn secret_for(&self, entry: &Entry) -> Result<String, TotpError> {
        match &entry.secret {
            SecretSource::Inline(secret) => Ok(secret.clone()),
            SecretSource::BackendRef(name) => self
                .resolved
                .get(&entry.id)
                .cloned()
                .ok_or_else(|| core::secret_unavailable(name)),
            SecretSource::BackendFailed(name) => Err(core::secret_storage_failed(name)),
        }
    }

    /// Current code for an entry at `unix_seconds`.
    pub fn code_at(&self, entry: &Entry, unix_seconds: u64) -> Result<GeneratedCode, TotpError> {
        let secret = self.secret_for(entry)?;
        core::code_for_secret_at(entry.id, &secret, entry.digits, entry.period, unix_seconds)
    }

    // ── Add ──────────────────────────────────────────────────────

    /// Validate and persist a new entry.
    pub fn add(&mut self, draft: &EntryDraft) -> Result<AddOutcome, TotpError> {
        validation::validate_draft(draft)?;

        let (secret, mut warnings) = self.place_secret(&draft.name, &draft.secret, None);
        let mut entry = Entry::from_draft(draft, secret);

        let id = match self.repository.insert(entry.clone()) {
            Ok(id) => id,
            Err(e) => {
                if let SecretSource::BackendRef(name) = &entry.secret {
                    self.discard_backend_secret(name, &mut warnings);
                }
                return Err(e);
            }
        };
        entry.id = id;

        if matches!(entry.secret, SecretSource::BackendRef(_)) {
            self.resolved.insert(id, draft.secret.clone());
        }
        self.entries.push(entry.clone());
        log::info!("added entry {} ('{}')", id, entry.name);
        Ok(AddOutcome { entry, warnings })
    }

    // ── Edit ─────────────────────────────────────────────────────

    /// Apply a partial update to the entry with `id`.
    pub fn update(&mut self, id: u64, update: &EntryUpdate) -> Result<EditOutcome, TotpError> {
        validation::validate_update(update)?;

        let current = self
            .get(id)
            .cloned()
            .ok_or_else(|| TotpError::not_found(&id.to_string()))?;
        let mut next = current.clone();
        let mut warnings = Vec::new();

        if let Some(name) = &update.name {
            next.name = name.clone();
        }
        if let Some(digits) = update.digits {
            next.digits = digits;
        }
        if let Some(period) = update.period {
            next.period = period;
        }

        // Plain secret for the edited entry, if it ends up in the backend.
        let mut backend_secret: Option<String> = None;
        match (&update.secret, &current.secret) {
            (Some(secret), _) => {
                let (source, placed) = self.place_secret(&next.name, secret, Some(id));
                warnings.extend(placed);
                if matches!(source, SecretSource::BackendRef(_)) {
                    backend_secret = Some(secret.clone());
                }
                next.secret = source;
            }
            (None, SecretSource::Inline(_)) => {}
            (None, SecretSource::BackendRef(old_name)) => {
                let secret = self.resolved.get(&id).cloned().ok_or_else(|| {
                    TotpError::new(
                        TotpErrorKind::SecretUnavailable,
                        "Cannot edit entry with unavailable secret",
                    )
                    .with_detail(format!("entry '{}'", old_name))
                })?;
                if next.name != *old_name {
                    // Follow the rename in the backend.
                    let (source, placed) = self.move_secret(&next.name, &secret, id);
                    warnings.extend(placed);
                    next.secret = source;
                }
                if matches!(next.secret, SecretSource::BackendRef(_)) {
                    backend_secret = Some(secret);
                }
            }
            (None, SecretSource::BackendFailed(name)) => {
                return Err(core::secret_storage_failed(name));
            }
        }
        next.updated_at = chrono::Utc::now();

        let written = match self.repository.update(&next) {
            Ok(written) => written,
            Err(e) => {
                self.undo_backend_write(&current, &next, &mut warnings);
                return Err(e);
            }
        };
        if !written {
            self.undo_backend_write(&current, &next, &mut warnings);
            return Err(TotpError::not_found(&id.to_string()));
        }

        // Drop the old backend secret once nothing points at it.
        if let SecretSource::BackendRef(old_name) = &current.secret {
            if next.secret.backend_name() != Some(old_name.as_str())
                && !self.slot_in_use(old_name, Some(id))
            {
                self.discard_backend_secret(old_name, &mut warnings);
            }
        }

        match backend_secret {
            Some(secret) => {
                self.resolved.insert(id, secret);
            }
            None => {
                self.resolved.remove(&id);
            }
        }
        if let Some(slot) = self.entries.iter_mut().find(|e| e.id == id) {
            *slot = next.clone();
        }
        log::info!("updated entry {} ('{}')", id, next.name);
        Ok(EditOutcome {
            previous_name: current.name,
            entry: next,
            warnings,
        })
    }

    // ── Remove ───────────────────────────────────────────────────

    /// Delete the entry with `id` and, best-effort, its backend secret.
    ///
    /// Only the metadata deletion decides the result; backend cleanup
    /// failures are returned as warnings.
    pub fn remove(&mut self, id: u64) -> Result<RemoveOutcome, TotpError> {
        let entry = self
            .get(id)
            .cloned()
            .ok_or_else(|| TotpError::not_found(&id.to_string()))?;

        let removed = match self.repository.delete(id) {
            Ok(removed) => removed,
            Err(e) => {
                // The backend secret goes regardless of the metadata result.
                let warnings = self.cleanup_backend(&entry);
                log::warn!(
                    "could not delete entry {} ('{}'), backend cleanup left {} warning(s): {}",
                    id,
                    entry.name,
                    warnings.len(),
                    e
                );
                return Err(e);
            }
        };
        if removed {
            self.entries.retain(|e| e.id != id);
            self.resolved.remove(&id);
            log::info!("removed entry {} ('{}')", id, entry.name);
        } else {
            log::warn!("entry {} was already gone from the database", id);
        }

        let warnings = self.cleanup_backend(&entry);
        Ok(RemoveOutcome {
            removed,
            entry,
            warnings,
        })
    }

    // ── Wipe ─────────────────────────────────────────────────────

    /// Delete every entry and the database itself.
    pub fn wipe(&mut self) -> Result<WipeOutcome, TotpError> {
        let entries = std::mem::take(&mut self.entries);
        let mut warnings = Vec::new();
        for entry in &entries {
            warnings.extend(self.cleanup_backend(entry));
        }
        if let Err(e) = self.repository.clear() {
            self.entries = entries;
            return Err(e);
        }
        self.resolved.clear();
        log::info!("wiped {} entries", entries.len());
        Ok(WipeOutcome {
            removed: entries.len(),
            warnings,
        })
    }

    // ── Backend helpers ──────────────────────────────────────────

    /// Whether an entry other than `owner` references the backend slot `name`.
    fn slot_in_use(&self, name: &str, owner: Option<u64>) -> bool {
        self.entries
            .iter()
            .any(|e| Some(e.id) != owner && e.secret.backend_name() == Some(name))
    }

    /// Inline fallback for a secret whose backend slot belongs to another entry.
    fn keep_inline_shared(name: &str, secret: &str) -> (SecretSource, Vec<BackendWarning>) {
        log::warn!("secret name '{}' is already used by another entry, keeping it inline", name);
        let warning = BackendWarning {
            name: name.to_string(),
            operation: BackendOperation::Store,
            error: BackendError::Rejected(format!(
                "secret name '{}' is already used by another entry",
                name
            )),
        };
        (SecretSource::Inline(secret.to_string()), vec![warning])
    }

    /// Decide where a new secret goes, storing it in the backend when
    /// placement and availability allow. `owner` is the entry being edited.
    fn place_secret(
        &self,
        name: &str,
        secret: &str,
        owner: Option<u64>,
    ) -> (SecretSource, Vec<BackendWarning>) {
        if self.placement != SecretPlacement::PreferBackend || !self.backend.available() {
            return (SecretSource::Inline(secret.to_string()), Vec::new());
        }
        if self.slot_in_use(name, owner) {
            return Self::keep_inline_shared(name, secret);
        }
        match self.backend.store(name, secret) {
            Ok(()) => (SecretSource::BackendRef(name.to_string()), Vec::new()),
            Err(error) => {
                log::warn!("secret storage failed for '{}', keeping it inline: {}", name, error);
                let warning = BackendWarning {
                    name: name.to_string(),
                    operation: BackendOperation::Store,
                    error,
                };
                (SecretSource::Inline(secret.to_string()), vec![warning])
            }
        }
    }

    /// Re-store an existing backend secret under a new name, falling back
    /// to inline when the backend refuses.
    fn move_secret(
        &self,
        name: &str,
        secret: &str,
        owner: u64,
    ) -> (SecretSource, Vec<BackendWarning>) {
        if !self.backend.available() {
            return (SecretSource::Inline(secret.to_string()), Vec::new());
        }
        if self.slot_in_use(name, Some(owner)) {
            return Self::keep_inline_shared(name, secret);
        }
        match self.backend.store(name, secret) {
            Ok(()) => (SecretSource::BackendRef(name.to_string()), Vec::new()),
            Err(error) => {
                log::warn!("could not move secret to '{}', keeping it inline: {}", name, error);
                let warning = BackendWarning {
                    name: name.to_string(),
                    operation: BackendOperation::Store,
                    error,
                };
                (SecretSource::Inline(secret.to_string()), vec![warning])
            }
        }
    }

    /// Reverse a backend write made for an edit whose metadata never landed.
    fn undo_backend_write(&self, current: &Entry, next: &Entry, warnings: &mut Vec<BackendWarning>) {
        let Some(new_name) = next.secret.backend_name() else {
            return;
        };
        if !matches!(next.secret, SecretSource::BackendRef(_)) {
            return;
        }
        let previous = match &current.secret {
            SecretSource::BackendRef(old) if old == new_name => self.resolved.get(&current.id),
            _ => None,
        };
        match previous {
            Some(secret) => {
                if let Err(error) = self.backend.store(new_name, secret) {
                    log::warn!("could not restore secret for '{}': {}", new_name, error);
                    warnings.push(BackendWarning {
                        name: new_name.to_string(),
                        operation: BackendOperation::Store,
                        error,
                    });
                }
            }
            None => self.discard_backend_secret(new_name, warnings),
        }
    }

    fn discard_backend_secret(&self, name: &str, warnings: &mut Vec<BackendWarning>) {
        if let Err(error) = self.backend.delete_by_name(name) {
            log::warn!("failed to delete stored secret '{}': {}", name, error);
            warnings.push(BackendWarning {
                name: name.to_string(),
                operation: BackendOperation::Delete,
                error,
            });
        }
    }

    /// Best-effort removal of any backend secret an entry may own.
    ///
    /// Slots still referenced by another entry are left alone.
    fn cleanup_backend(&self, entry: &Entry) -> Vec<BackendWarning> {
        let mut warnings = Vec::new();
        let mut names = vec![entry.name.as_str()];
        if let Some(referenced) = entry.secret.backend_name() {
            if referenced != entry.name {
                names.push(referenced);
            }
        }
        names.retain(|name| !self.slot_in_use(name, Some(entry.id)));

        if !self.backend.available() {
            if let Some(referenced) = entry.secret.backend_name().filter(|r| names.contains(r)) {
                log::warn!("secret storage unavailable, '{}' was left behind", referenced);
                warnings.push(BackendWarning {
                    name: referenced.to_string(),
                    operation: BackendOperation::Delete,
                    error: BackendError::Unavailable,
                });
            }
            return warnings;
        }

        for name in names {
            self.discard_backend_secret(name, &mut warnings);
        }
        warnings
    }
}
