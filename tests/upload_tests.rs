//! Uploader behavior against a recording, fault-injecting store.

mod common;

use bytes::Bytes;
use common::{Call, Op, RecordingStore, dataset};
use floe::error::{ChunkFailureReason, CleanupError, UploadError};
use floe::sink::{MemoryStager, ParquetSerializer, TempFileStager};
use floe::upload::{
    ChunkRequest, ChunkedUploader, TransactionalUploader, UploadOutcome, UploadPlan,
    delete_prefix,
};
use std::sync::Arc;
use tempfile::TempDir;

mod transactional_tests {
    use super::*;

    fn uploader(store: &Arc<RecordingStore>, min_part_size: usize) -> TransactionalUploader {
        TransactionalUploader::new(store.clone(), ParquetSerializer::default(), min_part_size)
            .unwrap()
    }

    fn serialized_len(rows: usize) -> usize {
        ParquetSerializer::default()
            .serialize(dataset(rows).batch())
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_small_payload_is_a_single_put() {
        let store = RecordingStore::new();
        let bytes = Bytes::from(vec![7u8; 4]);

        let outcome = uploader(&store, 5)
            .upload_bytes(bytes.clone(), "data/files.parquet")
            .await
            .unwrap();

        assert_eq!(outcome, UploadOutcome::SinglePut { bytes: 4 });
        assert_eq!(
            store.calls(),
            vec![Call::Put {
                key: "data/files.parquet".into(),
                len: 4
            }]
        );
        assert_eq!(store.object("data/files.parquet"), Some(bytes));
    }

    #[tokio::test]
    async fn test_payload_equal_to_threshold_is_a_single_put() {
        let store = RecordingStore::new();
        let len = serialized_len(50);

        let outcome = uploader(&store, len)
            .upload(&dataset(50), "data/files.parquet")
            .await
            .unwrap();

        assert_eq!(outcome, UploadOutcome::SinglePut { bytes: len });
        assert_eq!(store.count(Op::Put), 1);
        assert_eq!(store.count(Op::CreateMultipart), 0);
    }

    #[tokio::test]
    async fn test_large_payload_is_split_into_ordered_parts() {
        let store = RecordingStore::new();
        let bytes = Bytes::from((0..12u8).collect::<Vec<_>>());

        let outcome = uploader(&store, 5)
            .upload_bytes(bytes.clone(), "data/files.parquet")
            .await
            .unwrap();

        assert_eq!(outcome, UploadOutcome::Multipart { bytes: 12, parts: 3 });
        let key = "data/files.parquet".to_string();
        assert_eq!(
            store.calls(),
            vec![
                Call::CreateMultipart { key: key.clone() },
                Call::UploadPart {
                    key: key.clone(),
                    part_number: 1,
                    len: 5
                },
                Call::UploadPart {
                    key: key.clone(),
                    part_number: 2,
                    len: 5
                },
                Call::UploadPart {
                    key: key.clone(),
                    part_number: 3,
                    len: 2
                },
                Call::Complete {
                    key: key.clone(),
                    parts: vec![1, 2, 3]
                },
            ]
        );
        assert_eq!(store.object(&key), Some(bytes));
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_multipart_object_equals_serialized_dataset() {
        let store = RecordingStore::new();
        let expected = ParquetSerializer::default()
            .serialize(dataset(500).batch())
            .unwrap();
        let part_size = expected.len() / 3;

        let outcome = uploader(&store, part_size)
            .upload(&dataset(500), "data/files.parquet")
            .await
            .unwrap();

        assert!(matches!(outcome, UploadOutcome::Multipart { parts, .. } if parts >= 3));
        assert_eq!(store.object("data/files.parquet"), Some(expected));
    }

    #[tokio::test]
    async fn test_part_failure_aborts_once() {
        let store = RecordingStore::new();
        store.fail_nth(Op::UploadPart, 1);

        let err = uploader(&store, 5)
            .upload_bytes(Bytes::from(vec![0u8; 12]), "data/files.parquet")
            .await
            .unwrap_err();

        match &err {
            UploadError::MultipartAborted { key, upload_id, .. } => {
                assert_eq!(key, "data/files.parquet");
                assert_eq!(upload_id, "upload-1");
            }
            other => panic!("Expected MultipartAborted, got {other:?}"),
        }
        assert!(err.is_aborted_session());
        assert_eq!(store.count(Op::Abort), 1);
        assert_eq!(store.count(Op::UploadPart), 2);
        assert_eq!(store.count(Op::Complete), 0);
        assert_eq!(store.open_sessions(), 0);
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_commit_failure_aborts_once() {
        let store = RecordingStore::new();
        store.fail_all(Op::Complete);

        let err = uploader(&store, 5)
            .upload_bytes(Bytes::from(vec![0u8; 12]), "data/files.parquet")
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::MultipartAborted { .. }));
        assert_eq!(store.count(Op::UploadPart), 3);
        assert_eq!(store.count(Op::Abort), 1);
        assert!(matches!(
            store.calls().last(),
            Some(Call::Abort { id, .. }) if id == "upload-1"
        ));
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_abort_failure_reports_both_errors() {
        let store = RecordingStore::new();
        store.fail_nth(Op::UploadPart, 0);
        store.fail_all(Op::Abort);

        let err = uploader(&store, 5)
            .upload_bytes(Bytes::from(vec![0u8; 12]), "data/files.parquet")
            .await
            .unwrap_err();

        match &err {
            UploadError::MultipartAbortFailed { cause, abort, .. } => {
                assert!(cause.to_string().contains("Storage operation failed"));
                assert!(abort.to_string().contains("Storage operation failed"));
            }
            other => panic!("Expected MultipartAbortFailed, got {other:?}"),
        }
        assert!(err.is_aborted_session());
        assert!(err.to_string().contains("abort"));
        assert_eq!(store.count(Op::Abort), 1);
    }

    #[tokio::test]
    async fn test_session_creation_failure_is_connectivity() {
        let store = RecordingStore::new();
        store.fail_all(Op::CreateMultipart);

        let err = uploader(&store, 5)
            .upload_bytes(Bytes::from(vec![0u8; 12]), "data/files.parquet")
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::StoreConnectivity { .. }));
        assert_eq!(store.count(Op::Abort), 0);
        assert_eq!(store.count(Op::UploadPart), 0);
    }

    #[tokio::test]
    async fn test_put_failure_is_connectivity() {
        let store = RecordingStore::new();
        store.fail_all(Op::Put);

        let err = uploader(&store, 5)
            .upload_bytes(Bytes::from(vec![0u8; 3]), "data/files.parquet")
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::StoreConnectivity { .. }));
        assert_eq!(store.count(Op::CreateMultipart), 0);
    }

    #[tokio::test]
    async fn test_empty_dataset_uses_single_put() {
        let store = RecordingStore::new();

        let outcome = uploader(&store, 5 * 1024 * 1024)
            .upload(&dataset(0), "data/empty.parquet")
            .await
            .unwrap();

        assert!(matches!(outcome, UploadOutcome::SinglePut { bytes } if bytes > 0));
        assert_eq!(store.count(Op::Put), 1);
    }

    #[tokio::test]
    async fn test_large_payload_without_multipart_is_a_single_put() {
        let store = RecordingStore::without_multipart();
        let bytes = Bytes::from(vec![3u8; 12]);
        let uploader = uploader(&store, 5);

        assert_eq!(uploader.plan(12), UploadPlan::SinglePut);
        let outcome = uploader
            .upload_bytes(bytes.clone(), "data/files.parquet")
            .await
            .unwrap();

        assert_eq!(outcome, UploadOutcome::SinglePut { bytes: 12 });
        assert_eq!(
            store.calls(),
            vec![Call::Put {
                key: "data/files.parquet".into(),
                len: 12
            }]
        );
        assert_eq!(store.count(Op::CreateMultipart), 0);
        assert_eq!(store.object("data/files.parquet"), Some(bytes));
    }
}

mod chunked_tests {
    use super::*;

    fn memory_uploader(store: &Arc<RecordingStore>) -> ChunkedUploader {
        ChunkedUploader::new(store.clone(), Arc::new(MemoryStager::default()))
    }

    #[tokio::test]
    async fn test_eleven_rows_in_chunks_of_three() {
        let store = RecordingStore::new();
        let request = ChunkRequest::new("data/", "files", 3);

        let report = memory_uploader(&store)
            .upload(&dataset(11), &request)
            .await
            .unwrap();

        assert_eq!(
            report.keys(),
            vec![
                "data/files_part_0.parquet",
                "data/files_part_1.parquet",
                "data/files_part_2.parquet",
                "data/files_part_3.parquet",
            ]
        );
        let rows: Vec<usize> = report.chunks.iter().map(|c| c.rows).collect();
        assert_eq!(rows, vec![3, 3, 3, 2]);
        assert_eq!(report.deleted, 0);
        assert_eq!(store.count(Op::Put), 4);
        assert_eq!(store.count(Op::List), 0);
    }

    #[tokio::test]
    async fn test_eleven_rows_in_chunks_of_two() {
        let store = RecordingStore::new();
        let request = ChunkRequest::new("", "files", 2);

        let report = memory_uploader(&store)
            .upload(&dataset(11), &request)
            .await
            .unwrap();

        let rows: Vec<usize> = report.chunks.iter().map(|c| c.rows).collect();
        assert_eq!(rows, vec![2, 2, 2, 2, 2, 1]);
        assert_eq!(report.chunks[5].key, "files_part_5.parquet");
    }

    #[tokio::test]
    async fn test_chunk_objects_are_parquet_of_each_slice() {
        let store = RecordingStore::new();
        let data = dataset(7);
        let request = ChunkRequest::new("data/", "files", 4);

        memory_uploader(&store).upload(&data, &request).await.unwrap();

        let serializer = ParquetSerializer::default();
        for (index, offset, len) in [(0, 0, 4), (1, 4, 3)] {
            let expected = serializer
                .serialize(&data.batch().slice(offset, len))
                .unwrap();
            assert_eq!(store.object(&request.key(index)), Some(expected));
        }
    }

    #[tokio::test]
    async fn test_failed_chunks_do_not_stop_the_rest() {
        let store = RecordingStore::new();
        store.fail_nth(Op::Put, 1);
        store.fail_nth(Op::Put, 3);
        let request = ChunkRequest::new("data/", "files", 2);

        let err = memory_uploader(&store)
            .upload(&dataset(11), &request)
            .await
            .unwrap_err();

        assert_eq!(err.failed_chunks(), vec![1, 3]);
        match &err {
            UploadError::PartialBatchFailure { failures, total } => {
                assert_eq!(*total, 6);
                assert_eq!(failures[0].key, "data/files_part_1.parquet");
                assert!(matches!(failures[0].reason, ChunkFailureReason::Put(_)));
            }
            other => panic!("Expected PartialBatchFailure, got {other:?}"),
        }
        assert!(err.to_string().contains("2 of 6"));

        assert_eq!(store.count(Op::Put), 6);
        assert_eq!(
            store.keys(),
            vec![
                "data/files_part_0.parquet",
                "data/files_part_2.parquet",
                "data/files_part_4.parquet",
                "data/files_part_5.parquet",
            ]
        );
    }

    #[tokio::test]
    async fn test_temp_file_staging_cleans_up_on_success_and_failure() {
        let store = RecordingStore::new();
        store.fail_nth(Op::Put, 0);
        let staging = TempDir::new().unwrap();
        let stager = TempFileStager::new(
            ParquetSerializer::default(),
            Some(staging.path().to_path_buf()),
        );
        let uploader = ChunkedUploader::new(store.clone(), Arc::new(stager));

        let err = uploader
            .upload(&dataset(9), &ChunkRequest::new("data/", "files", 3))
            .await
            .unwrap_err();

        assert_eq!(err.failed_chunks(), vec![0]);
        assert_eq!(store.keys().len(), 2);
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_staging_failure_is_a_chunk_failure() {
        let store = RecordingStore::new();
        let missing = TempDir::new().unwrap().path().join("gone");
        let stager = TempFileStager::new(ParquetSerializer::default(), Some(missing));
        let uploader = ChunkedUploader::new(store.clone(), Arc::new(stager));

        let err = uploader
            .upload(&dataset(4), &ChunkRequest::new("", "files", 2))
            .await
            .unwrap_err();

        match &err {
            UploadError::PartialBatchFailure { failures, total } => {
                assert_eq!(*total, 2);
                assert!(
                    failures
                        .iter()
                        .all(|f| matches!(f.reason, ChunkFailureReason::Stage(_)))
                );
            }
            other => panic!("Expected PartialBatchFailure, got {other:?}"),
        }
        assert_eq!(store.count(Op::Put), 0);
    }

    #[tokio::test]
    async fn test_clean_prefix_runs_before_upload() {
        let store = RecordingStore::new();
        store.insert("data/old_part_0.parquet", b"old");
        store.insert("data/old_part_1.parquet", b"old");
        store.insert("keep/other.parquet", b"keep");
        let request = ChunkRequest::new("data/", "files", 5).with_clean_prefix(true);

        let report = memory_uploader(&store)
            .upload(&dataset(5), &request)
            .await
            .unwrap();

        assert_eq!(report.deleted, 2);
        assert_eq!(
            store.keys(),
            vec!["data/files_part_0.parquet", "keep/other.parquet"]
        );
        let first_put = store
            .calls()
            .iter()
            .position(|c| matches!(c, Call::Put { .. }))
            .unwrap();
        let last_delete = store
            .calls()
            .iter()
            .rposition(|c| matches!(c, Call::Delete { .. }))
            .unwrap();
        assert!(last_delete < first_put);
    }

    #[tokio::test]
    async fn test_cleanup_failure_stops_before_any_chunk() {
        let store = RecordingStore::new();
        store.insert("data/old.parquet", b"old");
        store.fail_all(Op::Delete);
        let request = ChunkRequest::new("data/", "files", 5).with_clean_prefix(true);

        let err = memory_uploader(&store)
            .upload(&dataset(5), &request)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::Cleanup {
                source: CleanupError::Delete { deleted: 0, .. }
            }
        ));
        assert_eq!(store.count(Op::Put), 0);
    }

    #[tokio::test]
    async fn test_zero_chunk_size_rejected() {
        let store = RecordingStore::new();

        let err = memory_uploader(&store)
            .upload(&dataset(5), &ChunkRequest::new("", "files", 0))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::InvalidChunkSize));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_dataset_uploads_nothing() {
        let store = RecordingStore::new();

        let report = memory_uploader(&store)
            .upload(&dataset(0), &ChunkRequest::new("", "files", 5))
            .await
            .unwrap();

        assert!(report.chunks.is_empty());
        assert!(store.calls().is_empty());
    }
}

mod cleanup_tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_prefix_reports_zero() {
        let store = RecordingStore::new();

        let deleted = delete_prefix(store.as_ref(), "data/", 100).await.unwrap();

        assert_eq!(deleted, 0);
        assert_eq!(store.count(Op::List), 1);
        assert_eq!(store.count(Op::Delete), 0);
    }

    #[tokio::test]
    async fn test_follows_continuation_tokens() {
        let store = RecordingStore::new();
        for key in [
            "data/a.parquet",
            "data/b.parquet",
            "data/c.parquet",
            "data/d.parquet",
            "data/e.parquet",
        ] {
            store.insert(key, b"x");
        }

        let deleted = delete_prefix(store.as_ref(), "data/", 2).await.unwrap();

        assert_eq!(deleted, 5);
        assert!(store.keys().is_empty());
        assert_eq!(store.count(Op::Delete), 3);
        let tokens: Vec<Option<String>> = store
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::List { token, .. } => Some(token),
                _ => None,
            })
            .collect();
        assert_eq!(
            tokens,
            vec![
                None,
                Some("data/b.parquet".to_string()),
                Some("data/d.parquet".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_failure() {
        let store = RecordingStore::new();
        store.fail_all(Op::List);

        let err = delete_prefix(store.as_ref(), "data/", 10)
            .await
            .unwrap_err();

        assert!(matches!(err, CleanupError::List { ref prefix, .. } if prefix == "data/"));
    }

    #[tokio::test]
    async fn test_delete_failure_reports_progress() {
        let store = RecordingStore::new();
        for key in ["data/a.parquet", "data/b.parquet", "data/c.parquet"] {
            store.insert(key, b"x");
        }
        store.fail_nth(Op::Delete, 1);

        let err = delete_prefix(store.as_ref(), "data/", 2)
            .await
            .unwrap_err();

        assert!(matches!(err, CleanupError::Delete { deleted: 2, .. }));
        assert_eq!(store.keys(), vec!["data/c.parquet"]);
    }
}
