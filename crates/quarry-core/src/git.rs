use std::path::{Path, PathBuf};
use std::process::Command;

use crate::{ChangeKind, CommitInfo, FileChange};

pub const DEFAULT_MAX_COMMITS: usize = 500;

const SHORT_HASH_LEN: usize = 7;

pub struct GitContext {
    repo: gix::Repository,
}

impl GitContext {
    pub fn open(workspace: &Path) -> Option<Self> {
        gix::discover(workspace).ok().map(|repo| Self { repo })
    }

    /// Up to `limit` commits reachable from HEAD, newest first.
    pub fn commit_history(&self, limit: usize) -> Vec<CommitInfo> {
        if limit == 0 {
            return Vec::new();
        }

        let Some(head_id) = self.repo.head_id().ok().map(|id| id.detach()) else {
            return Vec::new();
        };

        let walk = self
            .repo
            .rev_walk([head_id])
            .sorting(gix::revision::walk::Sorting::ByCommitTime(
                gix::traverse::commit::simple::CommitTimeOrder::NewestFirst,
            ))
            .all();
        let walk = match walk {
            Ok(walk) => walk,
            Err(err) => {
                tracing::warn!(error = %err, "failed to walk commit log");
                return Vec::new();
            }
        };

        let mut commits = Vec::with_capacity(limit.min(64));
        for entry in walk {
            let Ok(info) = entry else {
                continue;
            };

            match self.commit_info(info.id) {
                Some(commit) => commits.push(commit),
                None => tracing::warn!(commit = %info.id, "skipping unreadable commit"),
            }
            if commits.len() >= limit {
                break;
            }
        }

        commits
    }

    fn commit_info(&self, id: gix::ObjectId) -> Option<CommitInfo> {
        let commit = self.repo.find_commit(id).ok()?;

        let (author_name, author_email) = commit
            .author()
            .ok()
            .map(|signature| {
                (
                    decode_text(signature.name.as_ref()),
                    decode_text(signature.email.as_ref()),
                )
            })
            .unwrap_or_default();

        let message = decode_text(commit.message_raw_sloppy().as_ref());
        let timestamp = commit.time().ok().map(|time| time.seconds).unwrap_or(0);
        let parent_hashes: Vec<String> = commit
            .parent_ids()
            .map(|parent| parent.detach().to_string().to_ascii_lowercase())
            .collect();

        let hash = id.to_string().to_ascii_lowercase();
        let files_changed = match parent_hashes.first() {
            Some(parent) => self.diff_summary(parent, &hash),
            None => Vec::new(),
        };

        let total_additions = files_changed.iter().map(|change| change.additions).sum();
        let total_deletions = files_changed.iter().map(|change| change.deletions).sum();
        let files_changed_count = files_changed.len() as u32;

        Some(CommitInfo {
            short_hash: hash.chars().take(SHORT_HASH_LEN).collect(),
            hash,
            author_name,
            author_email,
            timestamp,
            message,
            files_changed,
            total_additions,
            total_deletions,
            files_changed_count,
            parent_hashes,
        })
    }

    /// Per-file stats between a commit and its first parent. Any failure
    /// yields an empty list rather than dropping the commit.
    fn diff_summary(&self, parent: &str, hash: &str) -> Vec<FileChange> {
        let Some(workdir) = self.workdir() else {
            return Vec::new();
        };

        let output = Command::new("git")
            .arg("-C")
            .arg(&workdir)
            .args(["diff", "--raw", "--numstat", "--no-color", "-M", parent, hash])
            .output();

        match output {
            Ok(output) if output.status.success() => {
                parse_diff_summary(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                tracing::debug!(
                    commit = hash,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "git diff failed"
                );
                Vec::new()
            }
            Err(err) => {
                tracing::debug!(commit = hash, error = %err, "git diff could not run");
                Vec::new()
            }
        }
    }

    fn workdir(&self) -> Option<PathBuf> {
        self.repo
            .workdir()
            .map(Path::to_path_buf)
            .or_else(|| Some(self.repo.path().to_path_buf()))
    }
}

/// Commit history for `root`; a directory outside any repository has none.
pub fn extract_history(root: &Path, max_commits: usize) -> Vec<CommitInfo> {
    match GitContext::open(root) {
        Some(context) => context.commit_history(max_commits),
        None => {
            tracing::info!(root = %root.display(), "not a git repository, skipping history");
            Vec::new()
        }
    }
}

/// Combines `--raw` status lines with the `--numstat` lines that follow them.
/// Git emits both blocks in the same file order, so they pair by position.
pub fn parse_diff_summary(output: &str) -> Vec<FileChange> {
    let mut raw = Vec::new();
    let mut numstat = Vec::new();

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix(':') {
            let mut parts = rest.split('\t');
            let meta = parts.next().unwrap_or_default();
            let status = meta.split_whitespace().last().unwrap_or_default();
            let paths: Vec<&str> = parts.collect();
            let Some(path) = paths.last() else {
                continue;
            };
            raw.push((ChangeKind::from_status(status), (*path).to_owned()));
        } else if !line.trim().is_empty() {
            let mut parts = line.splitn(3, '\t');
            let additions = parts.next().unwrap_or_default();
            let deletions = parts.next().unwrap_or_default();
            // Binary files report "-" for both counts.
            numstat.push((
                additions.parse::<u32>().unwrap_or(0),
                deletions.parse::<u32>().unwrap_or(0),
            ));
        }
    }

    raw.into_iter()
        .enumerate()
        .map(|(index, (kind, filename))| {
            let (additions, deletions) = numstat.get(index).copied().unwrap_or((0, 0));
            FileChange {
                filename,
                additions,
                deletions,
                kind,
            }
        })
        .collect()
}

fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_summary_pairs_raw_and_numstat_lines() {
        let output = "\
:100644 100644 1111111 2222222 M\tsrc/a.js
:000000 100644 0000000 3333333 A\tsrc/b.js
:100644 100644 4444444 5555555 R092\told/c.js\tnew/c.js
:100644 100644 6666666 7777777 M\tlogo.png
3\t1\tsrc/a.js
10\t0\tsrc/b.js
1\t1\t{old => new}/c.js
-\t-\tlogo.png
";
        let changes = parse_diff_summary(output);
        assert_eq!(changes.len(), 4);
        assert_eq!(changes[0].filename, "src/a.js");
        assert_eq!(changes[0].kind, ChangeKind::Modified);
        assert_eq!((changes[0].additions, changes[0].deletions), (3, 1));
        assert_eq!(changes[1].kind, ChangeKind::Added);
        assert_eq!(changes[2].filename, "new/c.js");
        assert_eq!(changes[2].kind, ChangeKind::Renamed);
        assert_eq!((changes[3].additions, changes[3].deletions), (0, 0));
    }

    #[test]
    fn empty_diff_output_has_no_changes() {
        assert!(parse_diff_summary("").is_empty());
    }

    #[test]
    fn non_repository_directory_has_no_history() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(extract_history(temp.path(), DEFAULT_MAX_COMMITS).is_empty());
    }
}
