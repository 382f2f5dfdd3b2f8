use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use uuid::Uuid;

use registry_core::{CompanyRecord, CompanyRepository, StoreError};

/// In-process [`CompanyRepository`] with the same semantics as the SQLite one.
#[derive(Debug, Default)]
pub struct MemoryCompanyRepository {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: HashMap<String, StoredRow>,
    next_seq: u64,
}

#[derive(Debug, Clone)]
struct StoredRow {
    seq: u64,
    record: CompanyRecord,
}

impl MemoryCompanyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory repository lock poisoned".into()))
    }
}

impl MemoryState {
    fn tax_id_taken(&self, tax_id: &str, except_id: &str) -> bool {
        self.rows
            .values()
            .any(|row| row.record.tax_id == tax_id && row.record.id != except_id)
    }
}

#[async_trait]
impl CompanyRepository for MemoryCompanyRepository {
    async fn create(&self, company: &CompanyRecord) -> Result<CompanyRecord, StoreError> {
        let mut state = self.state()?;
        if state.tax_id_taken(&company.tax_id, "") {
            return Err(StoreError::Duplicate);
        }

        let mut created = company.clone();
        created.id = Uuid::new_v4().to_string();
        state.next_seq += 1;
        let seq = state.next_seq;
        state.rows.insert(
            created.id.clone(),
            StoredRow {
                seq,
                record: created.clone(),
            },
        );
        Ok(created)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<CompanyRecord>, StoreError> {
        Ok(self.state()?.rows.get(id).map(|row| row.record.clone()))
    }

    async fn get_by_tax_id(&self, tax_id: &str) -> Result<Option<CompanyRecord>, StoreError> {
        Ok(self
            .state()?
            .rows
            .values()
            .find(|row| row.record.tax_id == tax_id)
            .map(|row| row.record.clone()))
    }

    async fn update(&self, company: &CompanyRecord) -> Result<CompanyRecord, StoreError> {
        let mut state = self.state()?;
        if !state.rows.contains_key(&company.id) {
            return Err(StoreError::NotFound);
        }
        if state.tax_id_taken(&company.tax_id, &company.id) {
            return Err(StoreError::Duplicate);
        }

        let row = state.rows.get_mut(&company.id).ok_or(StoreError::NotFound)?;
        let created_at = row.record.created_at;
        row.record = CompanyRecord {
            created_at,
            ..company.clone()
        };
        Ok(row.record.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.state()?
            .rows
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn list(&self, page: u32, limit: u32) -> Result<Vec<CompanyRecord>, StoreError> {
        let state = self.state()?;
        let mut rows: Vec<&StoredRow> = state.rows.values().collect();
        rows.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        let skip = (page.max(1) as usize - 1) * limit as usize;
        Ok(rows
            .into_iter()
            .skip(skip)
            .take(limit as usize)
            .map(|row| row.record.clone())
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.state()?.rows.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn record(tax_id: &str, name: &str, minutes: i64) -> CompanyRecord {
        let mut record = CompanyRecord::draft(
            tax_id,
            name,
            format!("{name} Industria LTDA"),
            "Rua Teste, 123",
            10,
            1,
        );
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes);
        record.stamp_created(at);
        record
    }

    #[tokio::test]
    async fn enforces_unique_tax_id_on_create_and_update() {
        let repo = MemoryCompanyRepository::new();
        let first = repo
            .create(&record("11444777000161", "Acme", 0))
            .await
            .expect("create");
        let second = repo
            .create(&record("11222333000181", "Beta", 1))
            .await
            .expect("create");

        assert!(matches!(
            repo.create(&record("11444777000161", "Clone", 2)).await,
            Err(StoreError::Duplicate)
        ));

        let mut clash = second.clone();
        clash.tax_id = first.tax_id.clone();
        assert!(matches!(repo.update(&clash).await, Err(StoreError::Duplicate)));

        let mut same = first.clone();
        same.fantasy_name = "Acme Renamed".to_string();
        let updated = repo.update(&same).await.expect("update own tax id");
        assert_eq!(updated.fantasy_name, "Acme Renamed");
    }

    #[tokio::test]
    async fn update_keeps_created_at() {
        let repo = MemoryCompanyRepository::new();
        let created = repo
            .create(&record("11444777000161", "Acme", 0))
            .await
            .expect("create");

        let mut changed = created.clone();
        changed.created_at = created.created_at + Duration::days(1);
        let updated = repo.update(&changed).await.expect("update");
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn list_orders_newest_first() {
        let repo = MemoryCompanyRepository::new();
        for (minutes, tax_id) in ["11444777000161", "11222333000181", "60701190000104"]
            .iter()
            .enumerate()
        {
            repo.create(&record(tax_id, &format!("Company {minutes}"), minutes as i64))
                .await
                .expect("create");
        }

        let page = repo.list(1, 2).await.expect("list");
        assert_eq!(page[0].fantasy_name, "Company 2");
        assert_eq!(page[1].fantasy_name, "Company 1");
        assert_eq!(repo.list(2, 2).await.expect("list").len(), 1);
        assert_eq!(repo.count().await.expect("count"), 3);
    }

    #[tokio::test]
    async fn missing_targets_report_not_found() {
        let repo = MemoryCompanyRepository::new();
        assert!(repo.get_by_id("nope").await.expect("get").is_none());
        assert!(matches!(repo.delete("nope").await, Err(StoreError::NotFound)));

        let mut ghost = record("11444777000161", "Ghost", 0);
        ghost.id = "nope".to_string();
        assert!(matches!(repo.update(&ghost).await, Err(StoreError::NotFound)));
    }
}
