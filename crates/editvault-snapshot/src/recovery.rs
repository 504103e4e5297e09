//! Single-slot crash recovery.

use editvault_core::now_millis;
use editvault_store::{Collection, Record, Store};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::workspace::Workspace;

const SLOT_KEY: &str = "last-known-good";

/// Workspace content captured when a session failed unexpectedly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashRecord {
    pub slot: String,
    pub captured_at: i64,
    pub reason: String,
    pub workspace: Workspace,
}

impl Record for CrashRecord {
    const KIND: &'static str = "crash_record";
    const SCHEMA_VERSION: u32 = 1;

    fn primary_key(&self) -> String {
        self.slot.clone()
    }
}

/// Holds at most one [`CrashRecord`]; each capture overwrites the last.
#[derive(Clone)]
pub struct RecoverySlot {
    records: Collection<CrashRecord>,
}

impl RecoverySlot {
    pub const COLLECTION: &'static str = "recovery";

    pub async fn open(store: &Store) -> Result<Self> {
        Ok(Self {
            records: store.collection(Self::COLLECTION).await?,
        })
    }

    pub async fn capture(&self, workspace: &Workspace, reason: impl Into<String>) -> Result<CrashRecord> {
        let record = CrashRecord {
            slot: SLOT_KEY.to_string(),
            captured_at: now_millis(),
            reason: reason.into(),
            workspace: workspace.clone(),
        };
        self.records.put(&record).await?;
        log::info!("Captured recovery copy ({} files): {}", record.workspace.files.len(), record.reason);
        Ok(record)
    }

    pub async fn peek(&self) -> Result<Option<CrashRecord>> {
        Ok(self.records.get(SLOT_KEY).await?)
    }

    /// Return the pending record and empty the slot.
    pub async fn take(&self) -> Result<Option<CrashRecord>> {
        let record = self.records.get(SLOT_KEY).await?;
        if record.is_some() {
            self.records.delete(SLOT_KEY).await?;
        }
        Ok(record)
    }

    pub async fn discard(&self) -> Result<bool> {
        let existed = self.records.get(SLOT_KEY).await?.is_some();
        self.records.delete(SLOT_KEY).await?;
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_overwrites_and_take_empties() {
        let store = Store::memory();
        let slot = RecoverySlot::open(&store).await.unwrap();
        assert!(slot.peek().await.unwrap().is_none());

        slot.capture(&Workspace::new().with_main("a.rs", "1"), "first").await.unwrap();
        slot.capture(&Workspace::new().with_main("a.rs", "2"), "second").await.unwrap();

        let record = slot.peek().await.unwrap().unwrap();
        assert_eq!(record.reason, "second");
        assert_eq!(record.workspace.main_code(), "2");

        assert!(slot.take().await.unwrap().is_some());
        assert!(slot.take().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_discard_reports_presence() {
        let store = Store::memory();
        let slot = RecoverySlot::open(&store).await.unwrap();

        assert!(!slot.discard().await.unwrap());
        slot.capture(&Workspace::new(), "boom").await.unwrap();
        assert!(slot.discard().await.unwrap());
    }
}
