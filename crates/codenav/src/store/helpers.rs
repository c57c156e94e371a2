//! Helper functions for database row conversion and parsing.
//!
//! These utilities convert between database representations and domain types.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::types::{RepositoryId, Upload, UploadId, UploadMeta, UploadState};

/// SQL column list for uploads table.
///
/// Use with `row_to_upload` for consistent column ordering.
pub(crate) const UPLOADS_COLUMNS: &str = "id, repository_id, commit_hash, root, indexer, state";

/// Parse an upload state string from the database.
///
/// Returns an error for unrecognized values, indicating possible database corruption.
pub(crate) fn parse_upload_state(s: &str) -> rusqlite::Result<UploadState> {
    match s {
        "queued" => Ok(UploadState::Queued),
        "processing" => Ok(UploadState::Processing),
        "completed" => Ok(UploadState::Completed),
        "errored" => Ok(UploadState::Errored),
        "deleted" => Ok(UploadState::Deleted),
        unknown => Err(rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("Unknown upload state '{unknown}' in database. Database may be corrupted or from a newer version.").into(),
        )),
    }
}

/// Convert a database row to an `Upload`.
///
/// Expects columns in the order of [`UPLOADS_COLUMNS`].
pub(crate) fn row_to_upload(row: &rusqlite::Row<'_>) -> rusqlite::Result<Upload> {
    let state: String = row.get(5)?;
    Ok(Upload {
        id: UploadId(row.get(0)?),
        repository_id: RepositoryId(row.get(1)?),
        commit: row.get(2)?,
        root: row.get(3)?,
        indexer: row.get(4)?,
        state: parse_upload_state(&state)?,
    })
}

/// Read a non-negative edge distance stored as `INTEGER`.
pub(crate) fn column_distance(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u32> {
    let raw: i64 = row.get(idx)?;
    u32::try_from(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Integer, e.into())
    })
}

/// Encode a direct node's upload list as a JSON object of upload id to distance.
///
/// Keys are emitted in ascending id order, so an unchanged list always encodes
/// to identical text and the store's diff can compare rows as strings.
pub(crate) fn serialize_upload_metas(uploads: &[UploadMeta]) -> Result<String> {
    let by_id: BTreeMap<i64, u32> = uploads
        .iter()
        .map(|meta| (meta.upload_id.as_i64(), meta.distance))
        .collect();
    Ok(serde_json::to_string(&by_id)?)
}

/// Decode an upload list written by [`serialize_upload_metas`].
pub(crate) fn deserialize_upload_metas(encoded: &str) -> Result<Vec<UploadMeta>> {
    let by_id: BTreeMap<i64, u32> = serde_json::from_str(encoded)?;
    Ok(by_id
        .into_iter()
        .map(|(id, distance)| UploadMeta::new(UploadId(id), distance))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_list_encoding_is_canonical() {
        let forward = serialize_upload_metas(&[
            UploadMeta::new(UploadId(2), 0),
            UploadMeta::new(UploadId(10), 3),
        ])
        .unwrap();
        let backward = serialize_upload_metas(&[
            UploadMeta::new(UploadId(10), 3),
            UploadMeta::new(UploadId(2), 0),
        ])
        .unwrap();

        assert_eq!(forward, r#"{"2":0,"10":3}"#);
        assert_eq!(forward, backward);
    }

    #[test]
    fn upload_list_decodes_in_id_order() {
        let metas = deserialize_upload_metas(r#"{"10":3,"2":0}"#).unwrap();
        assert_eq!(
            metas,
            vec![
                UploadMeta::new(UploadId(2), 0),
                UploadMeta::new(UploadId(10), 3)
            ]
        );
    }

    #[test]
    fn empty_upload_list_is_an_empty_object() {
        assert_eq!(serialize_upload_metas(&[]).unwrap(), "{}");
        assert!(deserialize_upload_metas("{}").unwrap().is_empty());
    }

    #[test]
    fn corrupt_upload_list_is_an_error() {
        assert!(deserialize_upload_metas("[1,2").is_err());
    }

    #[test]
    fn unknown_state_is_rejected() {
        assert!(parse_upload_state("archived").is_err());
        assert_eq!(parse_upload_state("completed").unwrap(), UploadState::Completed);
    }
}
