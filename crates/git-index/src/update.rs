//! Bringing index entries in line with the working directory.

use std::collections::BTreeSet;

use bstr::{BStr, BString, ByteSlice};
use git_odb::ObjectStore;
use tracing::{debug, trace};

use crate::entry::IndexEntry;
use crate::workdir::{WorkdirError, WorkingDirectory};
use crate::{Index, IndexError, Stage};

/// What to do with one matched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    /// Stage the working directory state of the path.
    Proceed,
    /// Leave the path as it is.
    Skip,
    /// Stop; paths already handled stay updated.
    Abort,
}

/// Counts from a completed update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Paths whose staged content or mode changed, or that were newly staged.
    pub updated: usize,
    /// Tracked paths dropped because the file is gone.
    pub removed: usize,
    /// Paths the callback chose to skip.
    pub skipped: usize,
}

enum Outcome {
    Updated,
    Removed,
    Unchanged,
}

impl Index {
    /// [`Index::update_pathspecs`] with every matched path proceeding.
    pub fn update_all(&mut self, patterns: Option<&[&str]>) -> Result<UpdateSummary, IndexError> {
        self.update_pathspecs(patterns, None::<fn(&str, &BStr) -> UpdateDecision>)
    }

    /// Stage the working directory state of every path matched by `patterns`.
    ///
    /// Candidates are tracked paths plus working directory files. Patterns
    /// are applied in order and paths in sorted order; a path matched by an
    /// earlier pattern is not visited again, and exclude patterns remove
    /// paths from every pattern. `None` selects every candidate with `""` as
    /// the matched pattern. `decide` sees each `(pattern, path)` before it is
    /// touched; without it every path proceeds.
    ///
    /// On `Abort` the update stops with [`IndexError::Aborted`] and the paths
    /// already handled keep their new state. Any other failure restores the
    /// entries as they were before the call.
    pub fn update_pathspecs<F>(
        &mut self,
        patterns: Option<&[&str]>,
        mut decide: Option<F>,
    ) -> Result<UpdateSummary, IndexError>
    where
        F: FnMut(&str, &BStr) -> UpdateDecision,
    {
        let repo = self.require_repo()?.clone();
        let workdir = repo.require_workdir()?;
        let matcher = repo.matcher();

        let patterns = patterns.unwrap_or_default();
        for pattern in patterns {
            matcher.validate(pattern)?;
        }
        let (mut includes, excludes): (Vec<&str>, Vec<&str>) =
            patterns.iter().copied().partition(|p| !matcher.is_exclude(p));
        if includes.is_empty() {
            includes.push("");
        }

        let mut candidates: BTreeSet<BString> = workdir.list_files()?.into_iter().collect();
        candidates.extend(self.entries().iter().map(|e| e.path().to_owned()));

        let selects = |pattern: &str, path: &BStr| {
            (pattern.is_empty() || matcher.matches(pattern, path))
                && !excludes.iter().any(|x| matcher.matches(x, path))
        };

        let trust_executable_bit = repo.options().trust_executable_bit;
        let snapshot = self.store().clone();
        let mut summary = UpdateSummary::default();
        for pattern in includes {
            let matched: Vec<BString> = candidates
                .iter()
                .filter(|path| selects(pattern, path.as_bstr()))
                .cloned()
                .collect();

            for path in matched {
                candidates.remove(&path);
                let decision = match decide.as_mut() {
                    Some(decide) => decide(pattern, path.as_bstr()),
                    None => UpdateDecision::Proceed,
                };
                match decision {
                    UpdateDecision::Skip => summary.skipped += 1,
                    UpdateDecision::Abort => {
                        debug!(%path, pattern, "update aborted");
                        return Err(IndexError::Aborted { path });
                    }
                    UpdateDecision::Proceed => {
                        match self.sync_path(workdir, repo.odb(), path.as_bstr(), trust_executable_bit) {
                            Ok(Outcome::Updated) => summary.updated += 1,
                            Ok(Outcome::Removed) => summary.removed += 1,
                            Ok(Outcome::Unchanged) => {}
                            Err(e) => {
                                debug!(%path, error = %e, "update failed, restoring index");
                                *self.store_mut() = snapshot;
                                return Err(e);
                            }
                        }
                    }
                }
            }
        }

        debug!(
            updated = summary.updated,
            removed = summary.removed,
            skipped = summary.skipped,
            "updated index from working directory"
        );
        Ok(summary)
    }

    fn sync_path(
        &mut self,
        workdir: &dyn WorkingDirectory,
        odb: &dyn ObjectStore,
        path: &BStr,
        trust_executable_bit: bool,
    ) -> Result<Outcome, IndexError> {
        let tracked = self.store().find(path).cloned();
        if tracked.as_ref().is_some_and(|e| e.flags().skip_worktree) {
            return Ok(Outcome::Unchanged);
        }

        let info = match workdir.file_info(path) {
            Ok(info) => info,
            Err(WorkdirError::NotFound(_)) => {
                if self.store_mut().remove(path) > 0 {
                    trace!(%path, "removed vanished file");
                    return Ok(Outcome::Removed);
                }
                return Ok(Outcome::Unchanged);
            }
            Err(e) => return Err(e.into()),
        };
        let mode = self.effective_mode(path, info.mode, trust_executable_bit);

        if let Some(existing) = &tracked {
            if existing.mode() == mode && existing.stat().matches(&info.stat) {
                return Ok(Outcome::Unchanged);
            }
        }

        let content = workdir.read_file(path)?;
        let oid = odb.write_blob(&content)?;
        let mut stat = info.stat;
        stat.size = content.len() as u32;

        let mut flags = tracked.as_ref().map(|e| e.flags()).unwrap_or_default();
        flags.intent_to_add = false;
        let entry = IndexEntry::new(path, oid, mode, Stage::Normal)?
            .with_stat(stat)
            .with_flags(flags);
        self.store_mut().insert_or_replace(entry);

        let changed = tracked.map_or(true, |e| e.oid() != oid || e.mode() != mode);
        trace!(%path, %oid, changed, "staged working file");
        Ok(if changed { Outcome::Updated } else { Outcome::Unchanged })
    }
}
