//! Shared test fixtures: datasets and a recording, fault-injecting store.

#![allow(dead_code)]

use arrow::array::{Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use bytes::Bytes;
use floe::dataset::Dataset;
use floe::error::StorageError;
use floe::storage::{CompletedPart, ListPage, MultipartId, ObjectStoreClient};
use object_store::PutPayload;
use object_store::multipart::PartId;
use object_store::path::Path;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

pub fn test_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("column1", DataType::Int64, false),
        Field::new("column2", DataType::Utf8, true),
    ]))
}

/// A dataset whose `column1` holds `0..rows`.
pub fn dataset(rows: usize) -> Dataset {
    let ids: Vec<i64> = (0..rows as i64).collect();
    let names: Vec<String> = (0..rows).map(|i| format!("row-{i}")).collect();

    let batch = RecordBatch::try_new(
        test_schema(),
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(StringArray::from(names)),
        ],
    )
    .unwrap();
    Dataset::new(batch)
}

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Put,
    CreateMultipart,
    UploadPart,
    Complete,
    Abort,
    List,
    Delete,
}

/// One call as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Put { key: String, len: usize },
    CreateMultipart { key: String },
    UploadPart { key: String, part_number: usize, len: usize },
    Complete { key: String, parts: Vec<usize> },
    Abort { key: String, id: String },
    List { prefix: String, token: Option<String> },
    Delete { keys: Vec<String> },
}

#[derive(Debug, Clone, Copy)]
struct Fault {
    op: Op,
    /// 0-based occurrence of `op` to fail; every occurrence when `None`.
    nth: Option<usize>,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<String, Bytes>,
    sessions: HashMap<String, (String, BTreeMap<usize, Bytes>)>,
    calls: Vec<Call>,
    faults: Vec<Fault>,
    counts: HashMap<Op, usize>,
    next_id: usize,
}

/// In-memory `ObjectStoreClient` that records every call.
#[derive(Debug, Default)]
pub struct RecordingStore {
    state: Mutex<State>,
    /// Behave like a backend without multipart sessions.
    single_put_only: bool,
}

fn injected(op: Op) -> StorageError {
    StorageError::ObjectStore {
        source: object_store::Error::Generic {
            store: "recording",
            source: format!("injected {op:?} failure").into(),
        },
    }
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A store that reports no multipart support, like the local filesystem.
    pub fn without_multipart() -> Arc<Self> {
        Arc::new(Self {
            single_put_only: true,
            ..Self::default()
        })
    }

    /// Fail the `nth` (0-based) call of `op`.
    pub fn fail_nth(&self, op: Op, nth: usize) {
        let mut state = self.state.lock().unwrap();
        state.faults.push(Fault { op, nth: Some(nth) });
    }

    /// Fail every call of `op`.
    pub fn fail_all(&self, op: Op) {
        let mut state = self.state.lock().unwrap();
        state.faults.push(Fault { op, nth: None });
    }

    pub fn insert(&self, key: &str, data: &'static [u8]) {
        let mut state = self.state.lock().unwrap();
        state
            .objects
            .insert(key.to_string(), Bytes::from_static(data));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.state
            .lock()
            .unwrap()
            .counts
            .get(&op)
            .copied()
            .unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    /// Record `call` and decide whether it should fail.
    fn enter(&self, op: Op, call: Call) -> Result<std::sync::MutexGuard<'_, State>, StorageError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        let seen = state.counts.entry(op).or_default();
        let nth = *seen;
        *seen += 1;

        let fail = state
            .faults
            .iter()
            .any(|f| f.op == op && f.nth.is_none_or(|n| n == nth));
        if fail { Err(injected(op)) } else { Ok(state) }
    }
}

fn payload_bytes(payload: PutPayload) -> Bytes {
    payload.into()
}

#[async_trait]
impl ObjectStoreClient for RecordingStore {
    fn supports_multipart(&self) -> bool {
        !self.single_put_only
    }

    async fn put(&self, key: &Path, payload: PutPayload) -> Result<(), StorageError> {
        let data = payload_bytes(payload);
        let mut state = self.enter(
            Op::Put,
            Call::Put {
                key: key.to_string(),
                len: data.len(),
            },
        )?;
        state.objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn create_multipart(&self, key: &Path) -> Result<MultipartId, StorageError> {
        let mut state = self.enter(
            Op::CreateMultipart,
            Call::CreateMultipart {
                key: key.to_string(),
            },
        )?;
        state.next_id += 1;
        let id = format!("upload-{}", state.next_id);
        state
            .sessions
            .insert(id.clone(), (key.to_string(), BTreeMap::new()));
        Ok(id)
    }

    async fn upload_part(
        &self,
        key: &Path,
        id: &MultipartId,
        part_number: usize,
        payload: PutPayload,
    ) -> Result<PartId, StorageError> {
        let data = payload_bytes(payload);
        let mut state = self.enter(
            Op::UploadPart,
            Call::UploadPart {
                key: key.to_string(),
                part_number,
                len: data.len(),
            },
        )?;
        let (_, parts) = state
            .sessions
            .get_mut(id)
            .expect("part uploaded to an unknown session");
        parts.insert(part_number, data);
        Ok(PartId {
            content_id: format!("{id}-{part_number}"),
        })
    }

    async fn complete_multipart(
        &self,
        key: &Path,
        id: &MultipartId,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError> {
        let numbers: Vec<usize> = parts.iter().map(|p| p.part_number).collect();
        let mut state = self.enter(
            Op::Complete,
            Call::Complete {
                key: key.to_string(),
                parts: numbers,
            },
        )?;
        let (target, uploaded) = state
            .sessions
            .remove(id)
            .expect("commit of an unknown session");

        let mut object = Vec::new();
        for part in parts {
            assert_eq!(part.tag.content_id, format!("{id}-{}", part.part_number));
            object.extend_from_slice(&uploaded[&part.part_number]);
        }
        state.objects.insert(target, Bytes::from(object));
        Ok(())
    }

    async fn abort_multipart(&self, key: &Path, id: &MultipartId) -> Result<(), StorageError> {
        let mut state = self.enter(
            Op::Abort,
            Call::Abort {
                key: key.to_string(),
                id: id.clone(),
            },
        )?;
        state.sessions.remove(id);
        Ok(())
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
        page_size: usize,
    ) -> Result<ListPage, StorageError> {
        let state = self.enter(
            Op::List,
            Call::List {
                prefix: prefix.to_string(),
                token: continuation_token.map(String::from),
            },
        )?;

        let mut keys: Vec<Path> = state
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| continuation_token.is_none_or(|t| k.as_str() > t))
            .take(page_size.saturating_add(1))
            .map(|k| Path::from(k.as_str()))
            .collect();

        let next_token = if keys.len() > page_size {
            keys.truncate(page_size);
            keys.last().map(|k| k.to_string())
        } else {
            None
        };
        Ok(ListPage { keys, next_token })
    }

    async fn delete_batch(&self, keys: &[Path]) -> Result<(), StorageError> {
        let mut state = self.enter(
            Op::Delete,
            Call::Delete {
                keys: keys.iter().map(|k| k.to_string()).collect(),
            },
        )?;
        for key in keys {
            state.objects.remove(&key.to_string());
        }
        Ok(())
    }
}
