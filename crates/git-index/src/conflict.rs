//! Conflicted paths grouped by side.

use bstr::BStr;

use crate::entry::IndexEntry;
use crate::Stage;

/// The stage 1-3 entries of one conflicted path. At least one side is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict<'a> {
    pub path: &'a BStr,
    pub ancestor: Option<&'a IndexEntry>,
    pub ours: Option<&'a IndexEntry>,
    pub theirs: Option<&'a IndexEntry>,
}

/// Group the conflict entries of sorted `entries` by path, in path order.
pub(crate) fn group(entries: &[IndexEntry]) -> Vec<Conflict<'_>> {
    let mut conflicts: Vec<Conflict<'_>> = Vec::new();
    for entry in entries.iter().filter(|e| e.is_conflicted()) {
        if conflicts.last().map_or(true, |c| c.path != entry.path()) {
            conflicts.push(Conflict {
                path: entry.path(),
                ancestor: None,
                ours: None,
                theirs: None,
            });
        }
        let Some(conflict) = conflicts.last_mut() else {
            continue;
        };
        match entry.stage() {
            Stage::Base => conflict.ancestor = Some(entry),
            Stage::Ours => conflict.ours = Some(entry),
            Stage::Theirs => conflict.theirs = Some(entry),
            Stage::Normal => {}
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use git_hash::ObjectId;
    use git_odb::FileMode;

    use super::*;

    fn entry(path: &str, stage: Stage) -> IndexEntry {
        IndexEntry::new(path, ObjectId::NULL_SHA1, FileMode::Regular, stage).unwrap()
    }

    #[test]
    fn groups_by_path() {
        let entries = vec![
            entry("a", Stage::Normal),
            entry("b", Stage::Base),
            entry("b", Stage::Ours),
            entry("b", Stage::Theirs),
            entry("c", Stage::Theirs),
        ];
        let conflicts = group(&entries);
        assert_eq!(conflicts.len(), 2);

        assert_eq!(conflicts[0].path, "b");
        assert!(conflicts[0].ancestor.is_some());
        assert!(conflicts[0].ours.is_some());
        assert!(conflicts[0].theirs.is_some());

        assert_eq!(conflicts[1].path, "c");
        assert!(conflicts[1].ancestor.is_none());
        assert!(conflicts[1].ours.is_none());
        assert_eq!(conflicts[1].theirs.map(|e| e.stage()), Some(Stage::Theirs));
    }

    #[test]
    fn no_conflicts() {
        assert!(group(&[entry("x", Stage::Normal)]).is_empty());
    }
}
