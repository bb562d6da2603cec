use rusqlite::{Connection, Row, params};

use super::{EmbeddingRecord, NewEmbedding, StoreError, json_column, parse_column};

/// Encode a float vector as little-endian `f32` bytes.
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Reverses [`vec_to_blob`]. Trailing bytes that do not form a full `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Deletes every prior embedding of the subject, then inserts the new batch.
///
/// A record that fails to insert is logged and skipped. The return value counts
/// the records actually written.
pub(crate) fn replace_embeddings(
    conn: &Connection,
    subject_id: i64,
    embeddings: &[NewEmbedding],
) -> Result<usize, StoreError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM embeddings WHERE subject_id = ?1",
        params![subject_id],
    )?;

    let created_at = quarry_core::now_millis();
    let mut written = 0usize;
    {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO embeddings (
                subject_id, entity_kind, entity_id, entity_name, content, content_kind,
                dimension, vector, metadata, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )?;
        for embedding in embeddings {
            let metadata = match serde_json::to_string(&embedding.metadata) {
                Ok(metadata) => metadata,
                Err(err) => {
                    tracing::warn!(
                        entity_id = %embedding.entity_id,
                        error = %err,
                        "skipping embedding with unserializable metadata"
                    );
                    continue;
                }
            };

            let result = stmt.execute(params![
                subject_id,
                embedding.entity_kind.as_str(),
                embedding.entity_id,
                embedding.entity_name,
                embedding.content,
                embedding.content_kind.as_str(),
                embedding.vector.len() as i64,
                vec_to_blob(&embedding.vector),
                metadata,
                created_at,
            ]);
            match result {
                Ok(_) => written += 1,
                Err(err) => tracing::warn!(
                    entity_id = %embedding.entity_id,
                    error = %err,
                    "failed to store embedding"
                ),
            }
        }
    }

    tx.commit()?;
    Ok(written)
}

pub(crate) fn list_embeddings(
    conn: &Connection,
    subject_id: i64,
) -> Result<Vec<EmbeddingRecord>, StoreError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, subject_id, entity_kind, entity_id, entity_name, content, content_kind,
               vector, metadata
        FROM embeddings
        WHERE subject_id = ?1
        ORDER BY id ASC
        "#,
    )?;
    let rows = stmt.query_map(params![subject_id], embedding_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

fn embedding_from_row(row: &Row<'_>) -> rusqlite::Result<EmbeddingRecord> {
    let blob: Vec<u8> = row.get(7)?;
    Ok(EmbeddingRecord {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        embedding: NewEmbedding {
            entity_kind: parse_column(row, 2)?,
            entity_id: row.get(3)?,
            entity_name: row.get(4)?,
            content: row.get(5)?,
            content_kind: parse_column(row, 6)?,
            vector: blob_to_vec(&blob),
            metadata: json_column(row, 8)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use quarry_core::{ContentKind, EntityKind};
    use serde_json::json;
    use tempfile::tempdir;

    use crate::{SqliteStore, Store};

    use super::*;

    fn embedding(entity_id: &str, vector: Vec<f32>) -> NewEmbedding {
        NewEmbedding {
            entity_kind: EntityKind::File,
            entity_id: entity_id.to_owned(),
            entity_name: format!("src/{entity_id}.js"),
            content: "export const x = 1;".to_owned(),
            content_kind: ContentKind::Code,
            vector,
            metadata: json!({ "path": format!("src/{entity_id}.js"), "language": "javascript" }),
        }
    }

    #[test]
    fn blob_encoding_is_little_endian_f32() {
        let blob = vec_to_blob(&[1.0, -0.5]);
        assert_eq!(blob.len(), 8);
        assert_eq!(&blob[..4], &1.0f32.to_le_bytes());
        assert_eq!(blob_to_vec(&blob), vec![1.0, -0.5]);
        assert_eq!(blob_to_vec(&blob[..7]), vec![1.0]);
    }

    #[test]
    fn replace_embeddings_regenerates_the_subject_set() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteStore::open(temp.path()).expect("open store");
        let subject = store.register_subject("demo", "/demo").expect("register");
        let other = store.register_subject("other", "/other").expect("register other");

        store
            .replace_embeddings(
                subject.id,
                &[embedding("1", vec![0.1, 0.2]), embedding("2", vec![0.3, 0.4])],
            )
            .expect("first batch");
        store
            .replace_embeddings(other.id, &[embedding("9", vec![1.0, 0.0])])
            .expect("other batch");
        let written = store
            .replace_embeddings(subject.id, &[embedding("3", vec![0.5, 0.6, 0.7])])
            .expect("second batch");
        assert_eq!(written, 1);

        let records = store.list_embeddings(subject.id).expect("list");
        assert_eq!(records.len(), 1);
        let record = &records[0].embedding;
        assert_eq!(record.entity_id, "3");
        assert_eq!(record.vector, vec![0.5, 0.6, 0.7]);
        assert_eq!(record.metadata["language"], "javascript");
        assert_eq!(record.entity_kind, EntityKind::File);

        assert_eq!(store.list_embeddings(other.id).expect("other").len(), 1);
    }
}
