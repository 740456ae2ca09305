//! Sync orchestrator.
//!
//! Drives one reconciliation run through
//! `Idle → Fetching → Diffing → Resolving → Merging → WritingBack →
//! PersistingState → Done`, or `Failed` from any step. Diffing and conflict
//! resolution are pure; all I/O happens in fetch, write-back and persist.
//! Once write-back has started, any failure restores the local file from the
//! backup before the error is returned.

use crate::backup::{self, BackupHandle};
use crate::conflict::{self, ConflictPrompt, ConflictStrategy, Resolution};
use crate::diff::{diff, DiffResult};
use crate::envfile;
use crate::error::SyncResult;
use crate::retry::Retrier;
use crate::state::{SyncState, SyncStateStore};
use crate::vault::VaultClient;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use vaultsync_types::{SyncTarget, VariableSet};

/// Steps of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    Idle,
    Fetching,
    Diffing,
    Resolving,
    Merging,
    WritingBack,
    PersistingState,
    Done,
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How modified keys are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Every modified key goes to the conflict strategy.
    TwoWay,
    /// Keys changed on one side only since the last sync are settled
    /// automatically using the stored checksums. Falls back to two-way when
    /// no baseline exists.
    #[default]
    ThreeWay,
}

/// Options for a sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Strategy for conflicting keys.
    pub strategy: ConflictStrategy,
    /// Back up the local file before overwriting it.
    pub backup: bool,
    /// Compute and report without writing anything. The vault is not
    /// contacted unless `preview_remote` is also set.
    pub dry_run: bool,
    /// During a dry run, read the vault once (no retries) to report a diff.
    #[serde(default)]
    pub preview_remote: bool,
    /// Two-way or three-way reconciliation of modified keys.
    pub merge_mode: MergeMode,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            strategy: ConflictStrategy::Interactive,
            backup: true,
            dry_run: false,
            preview_remote: false,
            merge_mode: MergeMode::ThreeWay,
        }
    }
}

/// Final status of a run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local and remote agree.
    Synced,
    /// Some conflicts were skipped and remain.
    CompletedWithConflicts,
}

impl SyncOutcome {
    /// Process exit status.
    pub fn exit_code(self) -> i32 {
        match self {
            SyncOutcome::Synced => 0,
            SyncOutcome::CompletedWithConflicts => 1,
        }
    }
}

/// What a run found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub diff: DiffResult,
    /// Keys adopted from the remote side.
    pub added: Vec<String>,
    /// Keys dropped because the remote no longer has them.
    pub removed: Vec<String>,
    /// Modified keys whose merged value differs from the local one.
    pub updated: Vec<String>,
    /// Modified keys settled from the sync baseline without consulting the
    /// strategy.
    pub auto_merged: Vec<String>,
    /// Conflicts left as they were.
    pub unresolved: Vec<String>,
    /// Backup taken before the local file was overwritten.
    pub backup: Option<PathBuf>,
    pub local_written: bool,
    pub remote_written: bool,
    pub dry_run: bool,
    /// False if a dry run did not read the vault.
    pub remote_available: bool,
}

impl SyncReport {
    /// Success flavour of this run.
    pub fn outcome(&self) -> SyncOutcome {
        if self.unresolved.is_empty() {
            SyncOutcome::Synced
        } else {
            SyncOutcome::CompletedWithConflicts
        }
    }

    /// Process exit status.
    pub fn exit_code(&self) -> i32 {
        self.outcome().exit_code()
    }
}

/// Everything the merge step decided.
struct MergePlan {
    merged: VariableSet,
    /// What the vault should hold: the merged set, except skipped keys keep
    /// their remote value.
    remote_target: VariableSet,
    decisions: BTreeMap<String, Resolution>,
    auto_merged: Vec<String>,
}

/// Orchestrates reconciliation of one env file with one vault target.
pub struct SyncEngine {
    env_path: PathBuf,
    target: SyncTarget,
    vault: Arc<dyn VaultClient>,
    retrier: Retrier,
    state_store: SyncStateStore,
    options: SyncOptions,
    prompt: Option<Box<dyn ConflictPrompt>>,
    phase: SyncPhase,
}

impl SyncEngine {
    /// Creates an engine with default retry settings and the state file next
    /// to the env file.
    pub fn new(
        env_path: impl Into<PathBuf>,
        target: SyncTarget,
        vault: Arc<dyn VaultClient>,
        options: SyncOptions,
    ) -> Self {
        let env_path = env_path.into();
        Self {
            state_store: SyncStateStore::for_env_file(&env_path),
            env_path,
            target,
            vault,
            retrier: Retrier::default(),
            options,
            prompt: None,
            phase: SyncPhase::Idle,
        }
    }

    /// Replaces the retry policy for remote calls.
    pub fn with_retrier(mut self, retrier: Retrier) -> Self {
        self.retrier = retrier;
        self
    }

    /// Sets the prompt used by the interactive strategy.
    pub fn with_prompt(mut self, prompt: Box<dyn ConflictPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Replaces the sync state store.
    pub fn with_state_store(mut self, store: SyncStateStore) -> Self {
        self.state_store = store;
        self
    }

    /// The phase the engine is in (or ended in).
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// The local env file.
    pub fn env_path(&self) -> &Path {
        &self.env_path
    }

    /// The remote target.
    pub fn target(&self) -> &SyncTarget {
        &self.target
    }

    /// The run options.
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// The state store.
    pub fn state_store(&self) -> &SyncStateStore {
        &self.state_store
    }

    fn enter(&mut self, phase: SyncPhase) {
        debug!("Sync {} → {}", self.phase, phase);
        self.phase = phase;
    }

    /// Runs one full reconciliation.
    pub async fn run(&mut self) -> SyncResult<SyncReport> {
        self.enter(SyncPhase::Idle);
        info!(
            "Syncing {} with {} ({}, strategy {}{})",
            self.env_path.display(),
            self.target,
            self.vault.provider_name(),
            self.options.strategy,
            if self.options.dry_run { ", dry run" } else { "" }
        );

        let result = self.run_phases().await;
        self.vault.end_run().await;

        match result {
            Ok(report) => {
                self.enter(SyncPhase::Done);
                info!(
                    "Sync finished: {} added, {} removed, {} updated, {} unresolved",
                    report.added.len(),
                    report.removed.len(),
                    report.updated.len(),
                    report.unresolved.len()
                );
                Ok(report)
            }
            Err(e) => {
                error!("Sync failed during {}: {}", self.phase, e);
                self.enter(SyncPhase::Failed);
                Err(e)
            }
        }
    }

    async fn run_phases(&mut self) -> SyncResult<SyncReport> {
        let mut report = SyncReport {
            dry_run: self.options.dry_run,
            remote_available: true,
            ..Default::default()
        };

        // ── Fetching ─────────────────────────────────────────────
        self.enter(SyncPhase::Fetching);
        let fetch_label = format!("fetch {}", self.target);
        let preview = Retrier::single_attempt();
        let fetch_remote = async {
            let retrier = match (self.options.dry_run, self.options.preview_remote) {
                (false, _) => &self.retrier,
                (true, true) => &preview,
                (true, false) => return None,
            };
            Some(
                retrier
                    .run(&fetch_label, || self.vault.read_variables(&self.target))
                    .await,
            )
        };
        let (local, remote, baseline) = tokio::join!(
            envfile::read(&self.env_path),
            fetch_remote,
            self.state_store.load_for(&self.target),
        );
        let local = local?;
        let remote = match remote {
            Some(Ok(remote)) => remote,
            None => {
                info!("Dry run: vault not contacted");
                report.remote_available = false;
                return Ok(report);
            }
            Some(Err(e)) if self.options.dry_run => {
                warn!("Vault unavailable for preview: {}", e);
                report.remote_available = false;
                return Ok(report);
            }
            Some(Err(e)) => return Err(e.in_operation(fetch_label)),
        };

        // ── Diffing ──────────────────────────────────────────────
        self.enter(SyncPhase::Diffing);
        report.diff = diff(&local, &remote);
        if report.diff.is_empty() {
            info!("{} is already in sync", self.env_path.display());
            return Ok(report);
        }
        debug!(
            "Diff: {} additions, {} deletions, {} modifications",
            report.diff.additions.len(),
            report.diff.deletions.len(),
            report.diff.modifications.len()
        );

        // ── Resolving / Merging ─────────────────────────────────
        let baseline = match self.options.merge_mode {
            MergeMode::ThreeWay => baseline,
            MergeMode::TwoWay => None,
        };
        let plan = self.plan_merge(&local, &remote, &report.diff, baseline.as_ref())?;

        report.added = report.diff.additions.iter().cloned().collect();
        report.removed = report.diff.deletions.iter().cloned().collect();
        report.auto_merged = plan.auto_merged.clone();
        for (key, decision) in &plan.decisions {
            match decision {
                Resolution::Skip => report.unresolved.push(key.clone()),
                _ if plan.merged.get(key) != local.get(key) => report.updated.push(key.clone()),
                _ => {}
            }
        }

        if self.options.dry_run {
            info!("Dry run: nothing written");
            return Ok(report);
        }

        // ── WritingBack / PersistingState ───────────────────────
        let write_local = plan.merged != local;
        let write_remote = plan.remote_target != remote;

        self.enter(SyncPhase::WritingBack);
        let handle = if write_local && self.options.backup {
            Some(backup::backup(&self.env_path).await?)
        } else {
            None
        };
        report.backup = handle.as_ref().and_then(|h| h.backup.clone());

        match self
            .write_back(&plan, baseline.as_ref(), write_local, write_remote)
            .await
        {
            Ok(()) => {
                report.local_written = write_local;
                report.remote_written = write_remote;
                Ok(report)
            }
            Err(e) => {
                if write_local {
                    self.roll_back(handle.as_ref()).await;
                }
                Err(e)
            }
        }
    }

    /// Decides the value of every differing key and builds the merged sets.
    fn plan_merge(
        &mut self,
        local: &VariableSet,
        remote: &VariableSet,
        diff: &DiffResult,
        baseline: Option<&SyncState>,
    ) -> SyncResult<MergePlan> {
        self.enter(SyncPhase::Resolving);
        let mut decisions = BTreeMap::new();
        let mut auto_merged = Vec::new();

        for key in &diff.modifications {
            let (Some(local_value), Some(remote_value)) = (local.get(key), remote.get(key)) else {
                continue;
            };

            if let Some(state) = baseline {
                if state.is_unchanged(key, local_value) {
                    debug!("{} changed only in the vault", key);
                    decisions.insert(key.clone(), Resolution::UseRemote);
                    auto_merged.push(key.clone());
                    continue;
                }
                if state.is_unchanged(key, remote_value) {
                    debug!("{} changed only locally", key);
                    decisions.insert(key.clone(), Resolution::UseLocal);
                    auto_merged.push(key.clone());
                    continue;
                }
            }

            let decision = if self.options.dry_run
                && self.options.strategy == ConflictStrategy::Interactive
            {
                Resolution::Skip
            } else {
                let strategy = self.options.strategy;
                match self.prompt.as_deref_mut() {
                    Some(prompt) => {
                        conflict::resolve(key, local_value, remote_value, strategy, Some(prompt))?
                    }
                    None => conflict::resolve(key, local_value, remote_value, strategy, None)?,
                }
            };
            debug!("{} resolved as {:?}", key, decision);
            decisions.insert(key.clone(), decision);
        }

        self.enter(SyncPhase::Merging);
        let mut merged = local.clone();
        for key in &diff.additions {
            if let Some(value) = remote.get(key) {
                merged.insert(key.as_str(), value)?;
            }
        }
        for key in &diff.deletions {
            merged.remove(key);
        }
        for (key, decision) in &decisions {
            let value = match decision {
                Resolution::UseLocal | Resolution::Skip => continue,
                Resolution::UseRemote => remote.get(key).unwrap_or_default().to_string(),
                Resolution::UseEdited(value) => value.clone(),
            };
            merged.insert(key.as_str(), value)?;
        }

        let mut remote_target = merged.clone();
        for (key, decision) in &decisions {
            if *decision == Resolution::Skip {
                if let Some(value) = remote.get(key) {
                    remote_target.insert(key.as_str(), value)?;
                }
            }
        }

        Ok(MergePlan {
            merged,
            remote_target,
            decisions,
            auto_merged,
        })
    }

    async fn write_back(
        &mut self,
        plan: &MergePlan,
        baseline: Option<&SyncState>,
        write_local: bool,
        write_remote: bool,
    ) -> SyncResult<()> {
        if write_local {
            envfile::write(&self.env_path, &plan.merged).await?;
        }
        if write_remote {
            let label = format!("push {}", self.target);
            self.retrier
                .run(&label, || {
                    self.vault
                        .write_variables(&self.target, &plan.remote_target)
                })
                .await
                .map_err(|e| e.in_operation(label.clone()))?;
        }

        self.enter(SyncPhase::PersistingState);
        let mut state = SyncState::capture(&self.target, &plan.merged);
        for (key, decision) in &plan.decisions {
            if *decision != Resolution::Skip {
                continue;
            }
            // A skipped key has no agreed value; keep the previous baseline so
            // it is still seen as a conflict next time.
            match baseline.and_then(|b| b.checksum_of(key)) {
                Some(previous) => {
                    state.checksums.insert(key.clone(), previous.to_string());
                }
                None => {
                    state.checksums.remove(key);
                }
            }
        }
        self.state_store.save(&state).await
    }

    async fn roll_back(&self, handle: Option<&BackupHandle>) {
        let Some(handle) = handle else {
            warn!(
                "No backup of {} was taken; it may be partially updated",
                self.env_path.display()
            );
            return;
        };
        if let Err(e) = backup::restore(handle).await {
            error!("Failed to restore {}: {}", self.env_path.display(), e);
        }
    }
}

