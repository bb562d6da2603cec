use std::error::Error;
use std::fs;
use std::path::Path;
use std::process::Command;

use quarry_core::{ChangeKind, GitContext, extract_history};
use tempfile::tempdir;

#[test]
fn non_git_workspace_has_no_context_or_history() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    assert!(GitContext::open(temp.path()).is_none());
    assert!(extract_history(temp.path(), 500).is_empty());
    Ok(())
}

#[test]
fn history_is_newest_first_with_per_file_stats() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;

    fs::write(workspace.join("a.js"), "line 1\nline 2\n")?;
    let first = commit_all_at(workspace, "add a", "2024-01-01T00:00:00Z")?;

    fs::write(workspace.join("a.js"), "line 1\nline two\nline 3\n")?;
    fs::write(workspace.join("b.js"), "one\n")?;
    let second = commit_all_at(workspace, "touch a and add b", "2024-01-02T00:00:00Z")?;

    let history = extract_history(workspace, 500);
    assert_eq!(history.len(), 2);

    let newest = &history[0];
    assert_eq!(newest.hash, second.to_ascii_lowercase());
    assert_eq!(newest.short_hash, newest.hash[..7]);
    assert_eq!(newest.message, "touch a and add b");
    assert_eq!(newest.author_name, "Quarry Test");
    assert_eq!(newest.author_email, "quarry-test@example.com");
    assert_eq!(newest.parent_hashes, vec![first.to_ascii_lowercase()]);
    assert_eq!(newest.files_changed_count, 2);

    let a = newest
        .files_changed
        .iter()
        .find(|change| change.filename == "a.js")
        .ok_or("a.js change")?;
    assert_eq!(a.kind, ChangeKind::Modified);
    assert_eq!((a.additions, a.deletions), (2, 1));

    let b = newest
        .files_changed
        .iter()
        .find(|change| change.filename == "b.js")
        .ok_or("b.js change")?;
    assert_eq!(b.kind, ChangeKind::Added);
    assert_eq!(newest.total_additions, 3);
    assert_eq!(newest.total_deletions, 1);

    let oldest = &history[1];
    assert_eq!(oldest.hash, first.to_ascii_lowercase());
    assert!(oldest.parent_hashes.is_empty());
    assert!(oldest.files_changed.is_empty());
    assert_eq!(oldest.total_additions, 0);

    Ok(())
}

#[test]
fn history_respects_commit_limit() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;

    for day in 1..=3 {
        fs::write(workspace.join("notes.md"), format!("day {day}\n"))?;
        commit_all_at(
            workspace,
            &format!("day {day}"),
            &format!("2024-02-0{day}T00:00:00Z"),
        )?;
    }

    let history = extract_history(workspace, 2);
    let messages: Vec<&str> = history.iter().map(|c| c.message.as_str()).collect();
    assert_eq!(messages, vec!["day 3", "day 2"]);
    Ok(())
}

fn run_git(workspace: &Path, args: &[&str]) -> Result<String, Box<dyn Error>> {
    let output = Command::new("git")
        .args(args)
        .current_dir(workspace)
        .output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("git {:?} failed: {}", args, stderr.trim()).into());
    }

    Ok(String::from_utf8(output.stdout)?.trim().to_owned())
}

fn init_git_repo(workspace: &Path) -> Result<(), Box<dyn Error>> {
    run_git(workspace, &["init"])?;
    run_git(workspace, &["config", "user.name", "Quarry Test"])?;
    run_git(
        workspace,
        &["config", "user.email", "quarry-test@example.com"],
    )?;
    Ok(())
}

fn commit_all_at(workspace: &Path, message: &str, date: &str) -> Result<String, Box<dyn Error>> {
    run_git(workspace, &["add", "."])?;

    let output = Command::new("git")
        .args(["commit", "-m", message])
        .env("GIT_AUTHOR_DATE", date)
        .env("GIT_COMMITTER_DATE", date)
        .current_dir(workspace)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("git commit failed: {}", stderr.trim()).into());
    }

    run_git(workspace, &["rev-parse", "--verify", "HEAD"])
}
