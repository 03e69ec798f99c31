//! NVS (Non-Volatile Storage) backing for the secret store and network
//! profile.
//!
//! `EspNvs::set_str` commits after every write, so `commit` has nothing
//! left to flush.

use std::sync::{Mutex, MutexGuard, PoisonError};

use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use log::debug;
use provision_core::{DurableStorage, StorageError};

use crate::storage_error;

/// One NVS namespace opened read-write.
pub struct NvsStorage {
    nvs: Mutex<EspNvs<NvsDefault>>,
}

impl NvsStorage {
    pub fn open(partition: EspDefaultNvsPartition, namespace: &str) -> Result<Self, StorageError> {
        let nvs = EspNvs::new(partition, namespace, true)
            .map_err(|err| storage_error("nvs_open", err))?;
        debug!("Opened NVS namespace '{}'", namespace);
        Ok(Self {
            nvs: Mutex::new(nvs),
        })
    }

    fn lock(&self) -> MutexGuard<'_, EspNvs<NvsDefault>> {
        self.nvs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DurableStorage for NvsStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let nvs = self.lock();
        let Some(len) = nvs
            .str_len(key)
            .map_err(|err| storage_error("nvs_get_str", err))?
        else {
            return Ok(None);
        };
        let mut buf = vec![0u8; len.max(1)];
        let value = nvs
            .get_str(key, &mut buf)
            .map_err(|err| storage_error("nvs_get_str", err))?;
        Ok(value.map(str::to_string))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock()
            .set_str(key, value)
            .map_err(|err| storage_error("nvs_set_str", err))
    }

    fn commit(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
