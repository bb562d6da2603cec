use rusqlite::{Connection, Row, params};

use super::{EdgeRecord, NewEdge, StoreError, parse_column};

const EDGE_COLUMNS: &str = "id, subject_id, source_kind, source_id, target_kind, target_id, \
    target_name, edge_kind, is_external";

/// Drops the subject's previous edge set and writes `edges` in one transaction.
pub(crate) fn replace_edges(
    conn: &Connection,
    subject_id: i64,
    edges: &[NewEdge],
) -> Result<usize, StoreError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM dependency_edges WHERE subject_id = ?1",
        params![subject_id],
    )?;

    {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO dependency_edges (
                subject_id, source_kind, source_id, target_kind, target_id, target_name,
                edge_kind, is_external
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )?;
        for edge in edges {
            stmt.execute(params![
                subject_id,
                edge.source_kind.as_str(),
                edge.source_id,
                edge.target_kind.as_str(),
                edge.target_id,
                edge.target_name,
                edge.kind.as_str(),
                edge.is_external,
            ])?;
        }
    }

    tx.commit()?;
    tracing::debug!(subject_id, edges = edges.len(), "replaced dependency edges");
    Ok(edges.len())
}

pub(crate) fn list_edges(
    conn: &Connection,
    subject_id: i64,
) -> Result<Vec<EdgeRecord>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT {EDGE_COLUMNS}
        FROM dependency_edges
        WHERE subject_id = ?1
        ORDER BY id ASC
        "#
    ))?;
    let rows = stmt.query_map(params![subject_id], edge_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Edges whose source or target touches any of the given files or symbols.
pub(crate) fn neighborhood_edges(
    conn: &Connection,
    subject_id: i64,
    file_ids: &[i64],
    symbol_ids: &[i64],
    limit: usize,
) -> Result<Vec<EdgeRecord>, StoreError> {
    if (file_ids.is_empty() && symbol_ids.is_empty()) || limit == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT {EDGE_COLUMNS}
        FROM dependency_edges
        WHERE subject_id = ?1
          AND (
              (source_kind = 'file' AND source_id IN (SELECT value FROM json_each(?2)))
              OR (target_kind = 'file' AND target_id IN (SELECT value FROM json_each(?2)))
              OR (source_kind = 'function' AND source_id IN (SELECT value FROM json_each(?3)))
              OR (target_kind = 'function' AND target_id IN (SELECT value FROM json_each(?3)))
          )
        ORDER BY id ASC
        LIMIT ?4
        "#
    ))?;
    let rows = stmt.query_map(
        params![
            subject_id,
            serde_json::to_string(file_ids)?,
            serde_json::to_string(symbol_ids)?,
            limit as i64
        ],
        edge_from_row,
    )?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<EdgeRecord> {
    Ok(EdgeRecord {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        edge: NewEdge {
            source_kind: parse_column(row, 2)?,
            source_id: row.get(3)?,
            target_kind: parse_column(row, 4)?,
            target_id: row.get(5)?,
            target_name: row.get(6)?,
            kind: parse_column(row, 7)?,
            is_external: row.get(8)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use quarry_core::{EdgeKind, NodeKind};
    use tempfile::tempdir;

    use crate::{SqliteStore, Store};

    use super::*;

    fn import(source_id: i64, target: Option<i64>, name: &str) -> NewEdge {
        NewEdge {
            source_kind: NodeKind::File,
            source_id,
            target_kind: if target.is_some() {
                NodeKind::File
            } else {
                NodeKind::External
            },
            target_id: target,
            target_name: name.to_owned(),
            kind: EdgeKind::Import,
            is_external: target.is_none(),
        }
    }

    fn call(source_id: i64, target_id: i64, name: &str) -> NewEdge {
        NewEdge {
            source_kind: NodeKind::Function,
            source_id,
            target_kind: NodeKind::Function,
            target_id: Some(target_id),
            target_name: name.to_owned(),
            kind: EdgeKind::Call,
            is_external: false,
        }
    }

    #[test]
    fn replace_edges_swaps_the_whole_set() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteStore::open(temp.path()).expect("open store");
        let subject = store.register_subject("demo", "/demo").expect("register");

        store
            .replace_edges(subject.id, &[import(1, Some(2), "./b"), import(1, None, "lodash")])
            .expect("first edge set");
        let written = store
            .replace_edges(subject.id, &[call(10, 11, "foo")])
            .expect("second edge set");
        assert_eq!(written, 1);

        let edges = store.list_edges(subject.id).expect("list edges");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge.kind, EdgeKind::Call);
        assert_eq!(edges[0].edge.target_id, Some(11));
    }

    #[test]
    fn external_edges_keep_null_target() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteStore::open(temp.path()).expect("open store");
        let subject = store.register_subject("demo", "/demo").expect("register");

        store
            .replace_edges(subject.id, &[import(1, None, "react")])
            .expect("edges");
        let edges = store.list_edges(subject.id).expect("list edges");
        assert_eq!(edges[0].edge.target_kind, NodeKind::External);
        assert_eq!(edges[0].edge.target_id, None);
        assert!(edges[0].edge.is_external);
    }

    #[test]
    fn neighborhood_matches_files_and_symbols_by_kind() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteStore::open(temp.path()).expect("open store");
        let subject = store.register_subject("demo", "/demo").expect("register");

        store
            .replace_edges(
                subject.id,
                &[
                    import(1, Some(2), "./b"),
                    import(3, Some(4), "./d"),
                    call(2, 5, "helper"),
                ],
            )
            .expect("edges");

        let near_file_two = store
            .neighborhood_edges(subject.id, &[2], &[], 50)
            .expect("file neighborhood");
        assert_eq!(near_file_two.len(), 1);
        assert_eq!(near_file_two[0].edge.target_name, "./b");

        let near_symbol_two = store
            .neighborhood_edges(subject.id, &[], &[2], 50)
            .expect("symbol neighborhood");
        assert_eq!(near_symbol_two.len(), 1);
        assert_eq!(near_symbol_two[0].edge.kind, EdgeKind::Call);

        let limited = store
            .neighborhood_edges(subject.id, &[1, 2, 3, 4], &[], 1)
            .expect("limited");
        assert_eq!(limited.len(), 1);

        assert!(
            store
                .neighborhood_edges(subject.id, &[], &[], 50)
                .expect("empty")
                .is_empty()
        );
    }
}
