//! Notes: markdown files under the session's `Notes/` directory plus legacy
//! database rows, deduplicated by name with the filesystem winning.

use std::path::Path;

use crate::store::{SqlOutcome, Store};

/// One note surfaced to the prompt.
#[derive(Clone, Debug, PartialEq)]
pub struct Note {
    pub name: String,
    pub content: String,
}

fn fs_notes(root: &Path) -> Vec<Note> {
    let notes_dir = root.join("Notes");
    let mut notes = Vec::new();
    let entries = match std::fs::read_dir(&notes_dir) {
        Ok(entries) => entries,
        Err(_) => return notes,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match std::fs::read_to_string(&path) {
            Ok(content) => notes.push(Note {
                name: name.to_string(),
                content,
            }),
            Err(e) => tracing::warn!(note = name, error = %e, "skipping unreadable note"),
        }
    }
    notes.sort_by(|a, b| a.name.cmp(&b.name));
    notes
}

/// Legacy note rows, present only on databases that carried a `note` table
/// forward (for example via the raw SQL tool).
async fn legacy_db_notes(store: &Store) -> Vec<Note> {
    let directory = match store.table_directory().await {
        Ok(d) => d,
        Err(_) => return Vec::new(),
    };
    if !directory.iter().any(|(name, _)| name == "note") {
        return Vec::new();
    }
    match store.execute_raw("SELECT name, content FROM note").await {
        Ok(SqlOutcome::Rows(rows)) => rows
            .into_iter()
            .filter_map(|row| {
                let name = row.values.first()?.as_str()?.to_string();
                let content = row.values.get(1)?.as_str()?.to_string();
                Some(Note { name, content })
            })
            .collect(),
        Ok(_) => Vec::new(),
        Err(e) => {
            tracing::warn!(error = %e, "legacy note query failed");
            Vec::new()
        }
    }
}

/// All notes for a session root: legacy DB rows and filesystem notes,
/// deduplicated by name, filesystem winning.
pub async fn load_notes(store: &Store, root: &Path) -> Vec<Note> {
    let (from_fs, from_db) = tokio::join!(
        async { fs_notes(root) },
        legacy_db_notes(store)
    );
    let mut notes = from_fs;
    for note in from_db {
        if !notes.iter().any(|n| n.name == note.name) {
            notes.push(note);
        }
    }
    notes
}
