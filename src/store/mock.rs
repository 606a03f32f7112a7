use super::{BucketInfo, ObjectStore, StoreOptions, StoredObject};
use crate::error::ErrorKind;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// In-memory [`ObjectStore`] with fault injection, keyed by `bucket/key`.
#[derive(Clone)]
pub struct MockObjectStore {
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    options: Arc<Mutex<HashMap<String, StoreOptions>>>,
    base_url: String,
    buckets: Arc<Mutex<Vec<String>>>,
    write_failures: Arc<Mutex<VecDeque<(String, ErrorKind)>>>,
    list_failure: Arc<Mutex<Option<String>>>,
    list_buckets_failure: Arc<Mutex<Option<String>>>,
    report_zero_size: Arc<Mutex<bool>>,
    store_count: Arc<Mutex<usize>>,
    list_count: Arc<Mutex<usize>>,
    remove_count: Arc<Mutex<usize>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            options: Arc::new(Mutex::new(HashMap::new())),
            base_url: "https://mock-storage.example.com".to_string(),
            buckets: Arc::new(Mutex::new(vec!["bike-images".to_string()])),
            write_failures: Arc::new(Mutex::new(VecDeque::new())),
            list_failure: Arc::new(Mutex::new(None)),
            list_buckets_failure: Arc::new(Mutex::new(None)),
            report_zero_size: Arc::new(Mutex::new(false)),
            store_count: Arc::new(Mutex::new(0)),
            list_count: Arc::new(Mutex::new(0)),
            remove_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_buckets(self, buckets: Vec<String>) -> Self {
        *self.buckets.lock().unwrap() = buckets;
        self
    }

    pub fn with_object(self, bucket: &str, key: &str, content: Vec<u8>) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{}/{}", bucket, key), content);
        self
    }

    /// Queues a failure for the next `store_object` call.
    pub fn with_write_failure(self, message: &str, kind: ErrorKind) -> Self {
        self.write_failures
            .lock()
            .unwrap()
            .push_back((message.to_string(), kind));
        self
    }

    pub fn with_list_failure(self, message: &str) -> Self {
        *self.list_failure.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn with_list_buckets_failure(self, message: &str) -> Self {
        *self.list_buckets_failure.lock().unwrap() = Some(message.to_string());
        self
    }

    /// Makes listings report every object as 0 bytes, as a broken backend would.
    pub fn with_zero_size_listing(self) -> Self {
        *self.report_zero_size.lock().unwrap() = true;
        self
    }

    pub fn get_store_count(&self) -> usize {
        *self.store_count.lock().unwrap()
    }

    pub fn get_list_count(&self) -> usize {
        *self.list_count.lock().unwrap()
    }

    pub fn get_remove_count(&self) -> usize {
        *self.remove_count.lock().unwrap()
    }

    pub fn get_object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&format!("{}/{}", bucket, key))
            .cloned()
    }

    pub fn get_options(&self, bucket: &str, key: &str) -> Option<StoreOptions> {
        self.options
            .lock()
            .unwrap()
            .get(&format!("{}/{}", bucket, key))
            .cloned()
    }

    pub fn get_keys(&self, bucket: &str) -> Vec<String> {
        let prefix = format!("{}/", bucket);
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn store_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: &StoreOptions,
    ) -> Result<()> {
        *self.store_count.lock().unwrap() += 1;

        if let Some((message, kind)) = self.write_failures.lock().unwrap().pop_front() {
            return Err(Error::StoreWrite { message, kind });
        }

        let path = format!("{}/{}", bucket, key);
        let mut objects = self.objects.lock().unwrap();
        if !options.upsert && objects.contains_key(&path) {
            return Err(Error::StoreWrite {
                message: format!("object {} already exists", key),
                kind: ErrorKind::Permanent,
            });
        }
        objects.insert(path.clone(), data.to_vec());
        self.options.lock().unwrap().insert(path, options.clone());
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, search_prefix: &str) -> Result<Vec<StoredObject>> {
        *self.list_count.lock().unwrap() += 1;

        if let Some(message) = self.list_failure.lock().unwrap().clone() {
            return Err(Error::Store {
                message,
                kind: ErrorKind::Transient,
            });
        }

        let zero = *self.report_zero_size.lock().unwrap();
        let prefix = format!("{}/{}", bucket, search_prefix);
        let bucket_prefix = format!("{}/", bucket);
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, data)| {
                path.strip_prefix(&bucket_prefix).map(|name| StoredObject {
                    name: name.to_string(),
                    size: Some(if zero { 0 } else { data.len() as u64 }),
                })
            })
            .collect())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.base_url, bucket, key)
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<()> {
        *self.remove_count.lock().unwrap() += 1;

        match self
            .objects
            .lock()
            .unwrap()
            .remove(&format!("{}/{}", bucket, key))
        {
            Some(_) => Ok(()),
            None => Err(Error::Store {
                message: format!("Object not found: {}", key),
                kind: ErrorKind::Permanent,
            }),
        }
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        if let Some(message) = self.list_buckets_failure.lock().unwrap().clone() {
            return Err(Error::Store {
                message,
                kind: ErrorKind::Transient,
            });
        }
        Ok(self
            .buckets
            .lock()
            .unwrap()
            .iter()
            .map(|name| BucketInfo { name: name.clone() })
            .collect())
    }
}
