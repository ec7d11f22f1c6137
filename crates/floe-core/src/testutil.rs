use std::collections::HashMap;
use std::io::Read;
use std::sync::Mutex;

use rand::RngCore;

use crate::error::{FloeError, Result};
use crate::id::{ContentId, StorageId};
use crate::store::{Blob, ObjectKind, ObjectStore};

/// In-memory object store for testing. Thread-safe via Mutex.
///
/// Encryption is simulated by assigning a fresh random storage id on
/// every save, so storing the same plaintext twice yields two distinct
/// objects, just like the real encrypting store. Every upload is
/// recorded so tests can assert dedup behavior.
pub struct MemoryStore {
    objects: Mutex<HashMap<(ObjectKind, StorageId), StoredObject>>,
    uploads: Mutex<Vec<(ObjectKind, ContentId)>>,
}

struct StoredObject {
    id: ContentId,
    data: Vec<u8>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    fn fresh_storage_id() -> StorageId {
        let mut buf = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut buf);
        StorageId(buf)
    }

    /// Number of live objects of `kind`.
    pub fn count(&self, kind: ObjectKind) -> usize {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Content ids of every upload of `kind`, in upload order. Removed
    /// race losers stay recorded; live objects do not shrink this list.
    pub fn uploads_of(&self, kind: ObjectKind) -> Vec<ContentId> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| *id)
            .collect()
    }

    /// How many times `id` was uploaded as a data blob.
    pub fn data_uploads(&self, id: &ContentId) -> usize {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, i)| *k == ObjectKind::Data && i == id)
            .count()
    }

    /// Insert raw object bytes without recording an upload, bypassing
    /// content hashing. For corruption tests.
    pub fn put_raw(&self, kind: ObjectKind, data: Vec<u8>) -> StorageId {
        let storage = Self::fresh_storage_id();
        self.objects.lock().unwrap().insert(
            (kind, storage),
            StoredObject {
                id: ContentId::compute(&data),
                data,
            },
        );
        storage
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for MemoryStore {
    fn save_from(
        &self,
        kind: ObjectKind,
        id: ContentId,
        length: u64,
        reader: &mut dyn Read,
    ) -> Result<Blob> {
        let mut data = Vec::with_capacity(length as usize);
        reader.read_to_end(&mut data)?;
        if data.len() as u64 != length {
            return Err(FloeError::Store(format!(
                "save_from: read {} bytes, expected {length}",
                data.len()
            )));
        }

        self.uploads.lock().unwrap().push((kind, id));

        let storage = Self::fresh_storage_id();
        self.objects
            .lock()
            .unwrap()
            .insert((kind, storage), StoredObject { id, data });
        Ok(Blob {
            kind,
            id,
            storage,
            size: length,
        })
    }

    fn save_json(&self, kind: ObjectKind, data: &[u8]) -> Result<Blob> {
        let id = ContentId::compute(data);
        self.uploads.lock().unwrap().push((kind, id));

        let storage = Self::fresh_storage_id();
        let size = data.len() as u64;
        self.objects.lock().unwrap().insert(
            (kind, storage),
            StoredObject {
                id,
                data: data.to_vec(),
            },
        );
        Ok(Blob {
            kind,
            id,
            storage,
            size,
        })
    }

    fn load(&self, kind: ObjectKind, storage: &StorageId) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(kind, *storage))
            .map(|obj| obj.data.clone())
            .ok_or_else(|| FloeError::Store(format!("object not found: {kind:?}/{storage}")))
    }

    fn test(&self, kind: ObjectKind, storage: &StorageId) -> Result<bool> {
        Ok(self.objects.lock().unwrap().contains_key(&(kind, *storage)))
    }

    fn remove(&self, kind: ObjectKind, storage: &StorageId) -> Result<()> {
        self.objects.lock().unwrap().remove(&(kind, *storage));
        Ok(())
    }

    fn each_id(&self, kind: ObjectKind, f: &mut dyn FnMut(StorageId)) -> Result<()> {
        let ids: Vec<StorageId> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, storage)| *storage)
            .collect();
        for id in ids {
            f(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_plaintext_gets_distinct_storage_ids() {
        let store = MemoryStore::new();
        let id = ContentId::compute(b"dup");
        let a = store
            .save_from(ObjectKind::Data, id, 3, &mut &b"dup"[..])
            .unwrap();
        let b = store
            .save_from(ObjectKind::Data, id, 3, &mut &b"dup"[..])
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.storage, b.storage);
        assert_eq!(store.count(ObjectKind::Data), 2);
        assert_eq!(store.data_uploads(&id), 2);
    }

    #[test]
    fn save_load_roundtrip() {
        let store = MemoryStore::new();
        let blob = store.save_json(ObjectKind::Tree, b"{\"nodes\":[]}\n").unwrap();
        assert_eq!(store.load(ObjectKind::Tree, &blob.storage).unwrap(), b"{\"nodes\":[]}\n");
        assert!(store.test(ObjectKind::Tree, &blob.storage).unwrap());
        // Kinds are separate namespaces.
        assert!(!store.test(ObjectKind::Data, &blob.storage).unwrap());
    }

    #[test]
    fn save_from_rejects_short_reads() {
        let store = MemoryStore::new();
        let id = ContentId::compute(b"xy");
        let err = store
            .save_from(ObjectKind::Data, id, 5, &mut &b"xy"[..])
            .unwrap_err();
        assert!(matches!(err, FloeError::Store(_)));
    }

    #[test]
    fn remove_is_idempotent() {
        let store = MemoryStore::new();
        let blob = store.save_json(ObjectKind::Data, b"x").unwrap();
        store.remove(ObjectKind::Data, &blob.storage).unwrap();
        assert!(!store.test(ObjectKind::Data, &blob.storage).unwrap());
        store.remove(ObjectKind::Data, &blob.storage).unwrap();
    }

    #[test]
    fn each_id_filters_by_kind() {
        let store = MemoryStore::new();
        store.save_json(ObjectKind::Tree, b"t1").unwrap();
        store.save_json(ObjectKind::Tree, b"t2").unwrap();
        store.save_json(ObjectKind::Snapshot, b"s").unwrap();

        let mut seen = 0;
        store
            .each_id(ObjectKind::Tree, &mut |storage| {
                assert!(store.test(ObjectKind::Tree, &storage).unwrap());
                seen += 1;
            })
            .unwrap();
        assert_eq!(seen, 2);
    }
}
