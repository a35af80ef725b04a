//! Topology Tables

use crate::sqlite::SqliteStore;
use crate::{is_unique_violation, StorageError};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use topology::{Host, HostId, HostState, Link, Scope, TopologyError, TopologyStore};
use tracing::debug;

impl SqliteStore {
    pub async fn insert_host(&self, tenant_id: &str, host: &Host) -> Result<(), StorageError> {
        let result = sqlx::query(
            "INSERT INTO hosts (id, tenant_id, map_id, external_id, name, host_group, location, is_critical, current_status) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(host.id)
        .bind(tenant_id)
        .bind(host.map_id)
        .bind(&host.external_id)
        .bind(&host.name)
        .bind(&host.group)
        .bind(&host.location)
        .bind(host.is_critical)
        .bind(host.current_status.as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(StorageError::Conflict(format!("host {} already exists", host.id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn insert_link(&self, tenant_id: &str, link: &Link) -> Result<(), StorageError> {
        let result = sqlx::query(
            "INSERT INTO links (id, tenant_id, map_id, origin_host_id, dest_host_id, is_ring, priority, origin_role, dest_role) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(link.id)
        .bind(tenant_id)
        .bind(link.map_id)
        .bind(link.origin_host_id)
        .bind(link.dest_host_id)
        .bind(link.is_ring)
        .bind(link.priority)
        .bind(&link.origin_role)
        .bind(&link.dest_role)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                let (a, b) = link.pair();
                Err(StorageError::Conflict(format!(
                    "link {} duplicates hosts {}-{}",
                    link.id, a, b
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn select_hosts(&self, scope: &Scope) -> Result<Vec<Host>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, map_id, external_id, name, host_group, location, is_critical, current_status \
             FROM hosts WHERE tenant_id = ? AND map_id = ? ORDER BY id",
        )
        .bind(&scope.tenant_id)
        .bind(scope.map_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(host_from_row).collect()
    }

    async fn select_links(&self, scope: &Scope) -> Result<Vec<Link>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, map_id, origin_host_id, dest_host_id, is_ring, priority, origin_role, dest_role \
             FROM links WHERE tenant_id = ? AND map_id = ? ORDER BY id",
        )
        .bind(&scope.tenant_id)
        .bind(scope.map_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(link_from_row).collect()
    }

    async fn write_statuses(
        &self,
        scope: &Scope,
        statuses: &[(HostId, HostState)],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for (host_id, state) in statuses {
            sqlx::query(
                "UPDATE hosts SET current_status = ? WHERE id = ? AND tenant_id = ? AND map_id = ?",
            )
            .bind(state.as_str())
            .bind(*host_id)
            .bind(&scope.tenant_id)
            .bind(scope.map_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!("Persisted {} host statuses for {}", statuses.len(), scope);
        Ok(())
    }
}

fn host_from_row(row: &SqliteRow) -> Result<Host, StorageError> {
    let status: String = row.try_get("current_status")?;
    Ok(Host {
        id: row.try_get("id")?,
        map_id: row.try_get("map_id")?,
        external_id: row.try_get("external_id")?,
        name: row.try_get("name")?,
        group: row.try_get("host_group")?,
        location: row.try_get("location")?,
        is_critical: row.try_get("is_critical")?,
        current_status: HostState::from_str(&status)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?,
    })
}

fn link_from_row(row: &SqliteRow) -> Result<Link, StorageError> {
    Ok(Link {
        id: row.try_get("id")?,
        map_id: row.try_get("map_id")?,
        origin_host_id: row.try_get("origin_host_id")?,
        dest_host_id: row.try_get("dest_host_id")?,
        is_ring: row.try_get("is_ring")?,
        priority: row.try_get("priority")?,
        origin_role: row.try_get("origin_role")?,
        dest_role: row.try_get("dest_role")?,
    })
}

#[async_trait]
impl TopologyStore for SqliteStore {
    async fn hosts(&self, scope: &Scope) -> Result<Vec<Host>, TopologyError> {
        Ok(self.select_hosts(scope).await?)
    }

    async fn links(&self, scope: &Scope) -> Result<Vec<Link>, TopologyError> {
        Ok(self.select_links(scope).await?)
    }

    async fn update_current_status(
        &self,
        scope: &Scope,
        statuses: &[(HostId, HostState)],
    ) -> Result<(), TopologyError> {
        Ok(self.write_statuses(scope, statuses).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatabaseConfig;

    async fn store() -> SqliteStore {
        SqliteStore::connect(&DatabaseConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
        })
        .await
        .unwrap()
    }

    async fn seed_ring(store: &SqliteStore) {
        for id in 1..=3 {
            let host = Host::new(id, 1, format!("H{id}")).with_external_id(format!("h{id}"));
            store.insert_host("acme", &host).await.unwrap();
        }
        store.insert_link("acme", &Link::ring(1, 1, 1, 2).unwrap()).await.unwrap();
        store.insert_link("acme", &Link::ring(2, 1, 2, 3).unwrap()).await.unwrap();
        store
            .insert_link("acme", &Link::ring(3, 1, 3, 1).unwrap().with_roles(Some("core"), None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_scoped_reads() {
        let store = store().await;
        seed_ring(&store).await;

        let hosts = store.hosts(&Scope::new("acme", 1)).await.unwrap();
        assert_eq!(hosts.len(), 3);
        assert_eq!(hosts[0].external_id.as_deref(), Some("h1"));
        assert_eq!(hosts[0].current_status, HostState::Unknown);

        let links = store.links(&Scope::new("acme", 1)).await.unwrap();
        assert!(links.iter().all(|l| l.is_ring));
        assert_eq!(links[2].origin_role.as_deref(), Some("core"));

        assert!(store.hosts(&Scope::new("globex", 1)).await.unwrap().is_empty());
        assert!(store.links(&Scope::new("acme", 2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reverse_link_rejected() {
        let store = store().await;
        seed_ring(&store).await;
        let err = store
            .insert_link("acme", &Link::new(9, 1, 2, 1).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_status_update_persists() {
        let store = store().await;
        seed_ring(&store).await;
        let scope = Scope::new("acme", 1);
        store
            .update_current_status(&scope, &[(1, HostState::Up), (2, HostState::Down), (99, HostState::Up)])
            .await
            .unwrap();

        let hosts = store.hosts(&scope).await.unwrap();
        assert_eq!(hosts[0].current_status, HostState::Up);
        assert_eq!(hosts[1].current_status, HostState::Down);
        assert_eq!(hosts[2].current_status, HostState::Unknown);
    }
}
