//! SQLite-backed resource store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{ResourceFilter, ResourceStore, StoreError};
use crate::events::EntityKind;
use crate::glidein::{Glidein, GlideinState};
use crate::site::{Site, SiteState};

const SITE_COLUMNS: &str = "id, name, state, short_message, long_message, install_path, local_path, condor, staging_service, glidein_service, environment, subject, local_username, created, last_update";

const GLIDEIN_COLUMNS: &str = "id, site_id, site_name, state, short_message, long_message, condor_host, count, host_count, wall_time, num_cpus, idle_time, condor_debug, condor_config, gcb_broker, ccb_address, lowport, highport, rsl, resubmit, submits, subject, local_username, created, last_update";

/// SQLite-backed store for sites, glideins and their state history.
pub struct SqliteStore {
    pub(crate) conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS site (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                state TEXT NOT NULL,
                short_message TEXT NOT NULL,
                long_message TEXT,
                install_path TEXT NOT NULL,
                local_path TEXT NOT NULL,
                condor TEXT NOT NULL,
                staging_service TEXT NOT NULL,
                glidein_service TEXT NOT NULL,
                environment TEXT NOT NULL,
                subject TEXT,
                local_username TEXT NOT NULL,
                created TEXT NOT NULL,
                last_update TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS glidein (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_id INTEGER NOT NULL,
                site_name TEXT NOT NULL,
                state TEXT NOT NULL,
                short_message TEXT NOT NULL,
                long_message TEXT,
                condor_host TEXT NOT NULL,
                count INTEGER NOT NULL,
                host_count INTEGER NOT NULL,
                wall_time INTEGER NOT NULL,
                num_cpus INTEGER NOT NULL,
                idle_time INTEGER NOT NULL,
                condor_debug TEXT,
                condor_config TEXT,
                gcb_broker TEXT,
                ccb_address TEXT,
                lowport INTEGER,
                highport INTEGER,
                rsl TEXT,
                resubmit TEXT NOT NULL,
                submits INTEGER NOT NULL DEFAULT 0,
                subject TEXT,
                local_username TEXT NOT NULL,
                created TEXT NOT NULL,
                last_update TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS site_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_id INTEGER NOT NULL,
                state TEXT NOT NULL,
                time TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS glidein_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                glidein_id INTEGER NOT NULL,
                state TEXT NOT NULL,
                time TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_site_owner ON site(local_username);
            CREATE INDEX IF NOT EXISTS idx_glidein_site ON glidein(site_id);
            CREATE INDEX IF NOT EXISTS idx_glidein_owner ON glidein(local_username);
            CREATE INDEX IF NOT EXISTS idx_site_history_site ON site_history(site_id);
            CREATE INDEX IF NOT EXISTS idx_glidein_history_glidein ON glidein_history(glidein_id);
            "#,
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn build_where_clause(
        filter: &ResourceFilter,
        with_site: bool,
    ) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref owner) = filter.owner {
            conditions.push("local_username = ?");
            params.push(Box::new(owner.clone()));
        }

        if let Some(ref state) = filter.state {
            conditions.push("state = ?");
            params.push(Box::new(state.clone()));
        }

        if with_site {
            if let Some(site_id) = filter.site_id {
                conditions.push("site_id = ?");
                params.push(Box::new(site_id));
            }
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_site(row: &rusqlite::Row) -> rusqlite::Result<Site> {
        let state: String = row.get(2)?;
        Ok(Site {
            id: row.get(0)?,
            name: row.get(1)?,
            state: state.parse().map_err(|e: String| conversion_error(2, e))?,
            short_message: row.get(3)?,
            long_message: row.get(4)?,
            install_path: row.get(5)?,
            local_path: row.get(6)?,
            condor: from_json(row, 7)?,
            staging_service: from_json(row, 8)?,
            glidein_service: from_json(row, 9)?,
            environment: from_json(row, 10)?,
            subject: row.get(11)?,
            local_username: row.get(12)?,
            created: timestamp(row, 13)?,
            last_update: timestamp(row, 14)?,
        })
    }

    fn row_to_glidein(row: &rusqlite::Row) -> rusqlite::Result<Glidein> {
        let state: String = row.get(3)?;
        Ok(Glidein {
            id: row.get(0)?,
            site_id: row.get(1)?,
            site_name: row.get(2)?,
            state: state.parse().map_err(|e: String| conversion_error(3, e))?,
            short_message: row.get(4)?,
            long_message: row.get(5)?,
            condor_host: row.get(6)?,
            count: row.get(7)?,
            host_count: row.get(8)?,
            wall_time: row.get(9)?,
            num_cpus: row.get(10)?,
            idle_time: row.get(11)?,
            condor_debug: row.get(12)?,
            condor_config: row.get(13)?,
            gcb_broker: row.get(14)?,
            ccb_address: row.get(15)?,
            lowport: row.get(16)?,
            highport: row.get(17)?,
            rsl: row.get(18)?,
            resubmit: from_json(row, 19)?,
            submits: row.get(20)?,
            subject: row.get(21)?,
            local_username: row.get(22)?,
            created: timestamp(row, 23)?,
            last_update: timestamp(row, 24)?,
        })
    }

    fn list_ids(&self, table: &str) -> Result<Vec<i64>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!("SELECT id FROM {} ORDER BY id", table))
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| StoreError::Database(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<i64>>>()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn list<T>(
        &self,
        table: &str,
        columns: &str,
        filter: &ResourceFilter,
        map: fn(&rusqlite::Row) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter, table == "glidein");
        let sql = format!(
            "SELECT {} FROM {} {} ORDER BY id LIMIT ? OFFSET ?",
            columns, table, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), map)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.collect::<rusqlite::Result<Vec<T>>>()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Run an UPDATE or DELETE that must touch exactly one row.
    fn execute_one(
        &self,
        kind: EntityKind,
        id: i64,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(sql, params)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if changed == 0 {
            return Err(StoreError::NotFound { kind, id });
        }
        Ok(())
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_json<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(idx, e))
}

fn timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err.into())
}

fn load_error(kind: EntityKind, id: i64, err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound { kind, id },
        e => StoreError::Database(e.to_string()),
    }
}

impl ResourceStore for SqliteStore {
    fn create_site(&self, site: &Site) -> Result<i64, StoreError> {
        let condor = to_json(&site.condor)?;
        let staging = to_json(&site.staging_service)?;
        let glidein = to_json(&site.glidein_service)?;
        let environment = to_json(&site.environment)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO site (name, state, short_message, long_message, install_path, local_path, condor, staging_service, glidein_service, environment, subject, local_username, created, last_update) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                site.name,
                site.state.as_str(),
                site.short_message,
                site.long_message,
                site.install_path,
                site.local_path,
                condor,
                staging,
                glidein,
                environment,
                site.subject,
                site.local_username,
                site.created.to_rfc3339(),
                site.last_update.to_rfc3339(),
            ],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn load_site(&self, id: i64) -> Result<Site, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM site WHERE id = ?", SITE_COLUMNS),
            params![id],
            Self::row_to_site,
        )
        .map_err(|e| load_error(EntityKind::Site, id, e))
    }

    fn store_site(&self, site: &Site) -> Result<(), StoreError> {
        let condor = to_json(&site.condor)?;
        let staging = to_json(&site.staging_service)?;
        let glidein = to_json(&site.glidein_service)?;
        let environment = to_json(&site.environment)?;

        self.execute_one(
            EntityKind::Site,
            site.id,
            "UPDATE site SET name = ?, state = ?, short_message = ?, long_message = ?, install_path = ?, local_path = ?, condor = ?, staging_service = ?, glidein_service = ?, environment = ?, subject = ?, local_username = ?, last_update = ? WHERE id = ?",
            params![
                site.name,
                site.state.as_str(),
                site.short_message,
                site.long_message,
                site.install_path,
                site.local_path,
                condor,
                staging,
                glidein,
                environment,
                site.subject,
                site.local_username,
                site.last_update.to_rfc3339(),
                site.id,
            ],
        )
    }

    fn update_site_state(
        &self,
        id: i64,
        state: SiteState,
        short_message: &str,
        long_message: Option<&str>,
        time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.execute_one(
            EntityKind::Site,
            id,
            "UPDATE site SET state = ?, short_message = ?, long_message = ?, last_update = ? WHERE id = ?",
            params![state.as_str(), short_message, long_message, time.to_rfc3339(), id],
        )
    }

    fn delete_site(&self, id: i64) -> Result<(), StoreError> {
        self.execute_one(
            EntityKind::Site,
            id,
            "DELETE FROM site WHERE id = ?",
            params![id],
        )
    }

    fn list_site_ids(&self) -> Result<Vec<i64>, StoreError> {
        self.list_ids("site")
    }

    fn list_sites(&self, filter: &ResourceFilter) -> Result<Vec<Site>, StoreError> {
        self.list("site", SITE_COLUMNS, filter, Self::row_to_site)
    }

    fn has_glideins(&self, site_id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM glidein WHERE site_id = ?",
                params![site_id],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(count > 0)
    }

    fn glidein_ids(&self, site_id: i64) -> Result<Vec<i64>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id FROM glidein WHERE site_id = ? ORDER BY id")
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![site_id], |row| row.get(0))
            .map_err(|e| StoreError::Database(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<i64>>>()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn create_glidein(&self, glidein: &Glidein) -> Result<i64, StoreError> {
        let resubmit = to_json(&glidein.resubmit)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO glidein (site_id, site_name, state, short_message, long_message, condor_host, count, host_count, wall_time, num_cpus, idle_time, condor_debug, condor_config, gcb_broker, ccb_address, lowport, highport, rsl, resubmit, submits, subject, local_username, created, last_update) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                glidein.site_id,
                glidein.site_name,
                glidein.state.as_str(),
                glidein.short_message,
                glidein.long_message,
                glidein.condor_host,
                glidein.count,
                glidein.host_count,
                glidein.wall_time,
                glidein.num_cpus,
                glidein.idle_time,
                glidein.condor_debug,
                glidein.condor_config,
                glidein.gcb_broker,
                glidein.ccb_address,
                glidein.lowport,
                glidein.highport,
                glidein.rsl,
                resubmit,
                glidein.submits,
                glidein.subject,
                glidein.local_username,
                glidein.created.to_rfc3339(),
                glidein.last_update.to_rfc3339(),
            ],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn load_glidein(&self, id: i64) -> Result<Glidein, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM glidein WHERE id = ?", GLIDEIN_COLUMNS),
            params![id],
            Self::row_to_glidein,
        )
        .map_err(|e| load_error(EntityKind::Glidein, id, e))
    }

    fn store_glidein(&self, glidein: &Glidein) -> Result<(), StoreError> {
        let resubmit = to_json(&glidein.resubmit)?;

        self.execute_one(
            EntityKind::Glidein,
            glidein.id,
            "UPDATE glidein SET state = ?, short_message = ?, long_message = ?, condor_host = ?, count = ?, host_count = ?, wall_time = ?, num_cpus = ?, idle_time = ?, condor_debug = ?, condor_config = ?, gcb_broker = ?, ccb_address = ?, lowport = ?, highport = ?, rsl = ?, resubmit = ?, submits = ?, subject = ?, local_username = ?, last_update = ? WHERE id = ?",
            params![
                glidein.state.as_str(),
                glidein.short_message,
                glidein.long_message,
                glidein.condor_host,
                glidein.count,
                glidein.host_count,
                glidein.wall_time,
                glidein.num_cpus,
                glidein.idle_time,
                glidein.condor_debug,
                glidein.condor_config,
                glidein.gcb_broker,
                glidein.ccb_address,
                glidein.lowport,
                glidein.highport,
                glidein.rsl,
                resubmit,
                glidein.submits,
                glidein.subject,
                glidein.local_username,
                glidein.last_update.to_rfc3339(),
                glidein.id,
            ],
        )
    }

    fn update_glidein_state(
        &self,
        id: i64,
        state: GlideinState,
        short_message: &str,
        long_message: Option<&str>,
        time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.execute_one(
            EntityKind::Glidein,
            id,
            "UPDATE glidein SET state = ?, short_message = ?, long_message = ?, last_update = ? WHERE id = ?",
            params![state.as_str(), short_message, long_message, time.to_rfc3339(), id],
        )
    }

    fn delete_glidein(&self, id: i64) -> Result<(), StoreError> {
        self.execute_one(
            EntityKind::Glidein,
            id,
            "DELETE FROM glidein WHERE id = ?",
            params![id],
        )
    }

    fn list_glidein_ids(&self) -> Result<Vec<i64>, StoreError> {
        self.list_ids("glidein")
    }

    fn list_glideins(&self, filter: &ResourceFilter) -> Result<Vec<Glidein>, StoreError> {
        self.list("glidein", GLIDEIN_COLUMNS, filter, Self::row_to_glidein)
    }

    fn increment_submits(&self, id: i64) -> Result<u32, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "UPDATE glidein SET submits = submits + 1 WHERE id = ? RETURNING submits",
            params![id],
            |row| row.get(0),
        )
        .map_err(|e| load_error(EntityKind::Glidein, id, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condor::{EnvironmentVariable, GridType};
    use crate::glidein::{CreateGlideinRequest, ResubmitPolicy};
    use crate::site::{CreateSiteRequest, ExecutionService};

    fn create_test_store() -> SqliteStore {
        SqliteStore::in_memory().unwrap()
    }

    fn test_site(name: &str, owner: &str) -> Site {
        CreateSiteRequest {
            name: name.to_string(),
            install_path: "/home/user/glidein".to_string(),
            local_path: "/tmp".to_string(),
            condor_package: Some("http://example.org/condor.tar.gz".to_string()),
            staging_service: Some(ExecutionService::new(GridType::Gt2, "gk/jobmanager-fork")),
            glidein_service: Some(
                ExecutionService::new(GridType::Gt5, "gk/jobmanager-pbs")
                    .with_project("TG-123")
                    .with_queue("normal"),
            ),
            environment: vec![EnvironmentVariable::new("GLOBUS_LOCATION", "/opt/globus")],
            local_username: owner.to_string(),
            ..Default::default()
        }
        .into_site(Utc::now())
        .unwrap()
    }

    fn test_glidein(site_id: i64) -> Glidein {
        let mut req = CreateGlideinRequest::new(site_id, "central.example.org", 60);
        req.local_username = "user".to_string();
        req.condor_debug = Some("D_JOB,D_MACHINE".to_string());
        req.lowport = Some(40000);
        req.highport = Some(41000);
        req.into_glidein("dev", ResubmitPolicy::Count { max: 3 }, Utc::now())
    }

    #[test]
    fn test_create_and_load_site() {
        let store = create_test_store();
        let site = test_site("dev", "user");
        let id = store.create_site(&site).unwrap();
        assert!(id > 0);

        let loaded = store.load_site(id).unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.name, "dev");
        assert_eq!(loaded.state, SiteState::New);
        assert_eq!(loaded.condor, site.condor);
        assert_eq!(loaded.glidein_service, site.glidein_service);
        assert_eq!(loaded.environment, site.environment);
        assert_eq!(loaded.created.timestamp(), site.created.timestamp());
    }

    #[test]
    fn test_load_missing_site() {
        let store = create_test_store();
        assert!(matches!(
            store.load_site(42),
            Err(StoreError::NotFound {
                kind: EntityKind::Site,
                id: 42
            })
        ));
    }

    #[test]
    fn test_update_site_state() {
        let store = create_test_store();
        let id = store.create_site(&test_site("dev", "user")).unwrap();
        let later = Utc::now() + chrono::Duration::seconds(5);

        store
            .update_site_state(id, SiteState::Failed, "Install failed", Some("detail"), later)
            .unwrap();

        let loaded = store.load_site(id).unwrap();
        assert_eq!(loaded.state, SiteState::Failed);
        assert_eq!(loaded.short_message, "Install failed");
        assert_eq!(loaded.long_message.as_deref(), Some("detail"));
        assert_eq!(loaded.last_update.timestamp(), later.timestamp());

        assert!(store
            .update_site_state(99, SiteState::Ready, "x", None, later)
            .is_err());
    }

    #[test]
    fn test_store_site_overwrites() {
        let store = create_test_store();
        let id = store.create_site(&test_site("dev", "user")).unwrap();
        let mut site = store.load_site(id).unwrap();
        site.name = "renamed".to_string();
        site.state = SiteState::Staging;
        store.store_site(&site).unwrap();

        let loaded = store.load_site(id).unwrap();
        assert_eq!(loaded.name, "renamed");
        assert_eq!(loaded.state, SiteState::Staging);
    }

    #[test]
    fn test_list_sites_with_filter() {
        let store = create_test_store();
        let a = store.create_site(&test_site("a", "alice")).unwrap();
        store.create_site(&test_site("b", "bob")).unwrap();
        store.create_site(&test_site("c", "alice")).unwrap();
        store
            .update_site_state(a, SiteState::Ready, "Installed", None, Utc::now())
            .unwrap();

        let all = store.list_sites(&ResourceFilter::new()).unwrap();
        assert_eq!(all.len(), 3);

        let alice = store
            .list_sites(&ResourceFilter::new().with_owner("alice"))
            .unwrap();
        assert_eq!(alice.len(), 2);

        let ready = store
            .list_sites(&ResourceFilter::new().with_state("READY"))
            .unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, a);

        let page = store
            .list_sites(&ResourceFilter::new().with_limit(1).with_offset(1))
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "b");

        assert_eq!(store.list_site_ids().unwrap().len(), 3);
    }

    #[test]
    fn test_glidein_round_trip() {
        let store = create_test_store();
        let site_id = store.create_site(&test_site("dev", "user")).unwrap();
        let glidein = test_glidein(site_id);
        let id = store.create_glidein(&glidein).unwrap();

        let loaded = store.load_glidein(id).unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.site_id, site_id);
        assert_eq!(loaded.resubmit, ResubmitPolicy::Count { max: 3 });
        assert_eq!(loaded.condor_debug.as_deref(), Some("D_JOB,D_MACHINE"));
        assert_eq!(loaded.lowport, Some(40000));
        assert_eq!(loaded.state, GlideinState::New);
    }

    #[test]
    fn test_site_glidein_membership() {
        let store = create_test_store();
        let site_id = store.create_site(&test_site("dev", "user")).unwrap();
        let other = store.create_site(&test_site("other", "user")).unwrap();
        assert!(!store.has_glideins(site_id).unwrap());

        let g1 = store.create_glidein(&test_glidein(site_id)).unwrap();
        let g2 = store.create_glidein(&test_glidein(site_id)).unwrap();
        store.create_glidein(&test_glidein(other)).unwrap();

        assert!(store.has_glideins(site_id).unwrap());
        assert_eq!(store.glidein_ids(site_id).unwrap(), vec![g1, g2]);

        let listed = store
            .list_glideins(&ResourceFilter::new().with_site(site_id))
            .unwrap();
        assert_eq!(listed.len(), 2);

        store.delete_glidein(g1).unwrap();
        store.delete_glidein(g2).unwrap();
        assert!(!store.has_glideins(site_id).unwrap());
        assert!(store.delete_glidein(g1).is_err());
    }

    #[test]
    fn test_increment_submits() {
        let store = create_test_store();
        let site_id = store.create_site(&test_site("dev", "user")).unwrap();
        let id = store.create_glidein(&test_glidein(site_id)).unwrap();

        assert_eq!(store.increment_submits(id).unwrap(), 1);
        assert_eq!(store.increment_submits(id).unwrap(), 2);
        assert_eq!(store.load_glidein(id).unwrap().submits, 2);
        assert!(matches!(
            store.increment_submits(77),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_update_glidein_state() {
        let store = create_test_store();
        let site_id = store.create_site(&test_site("dev", "user")).unwrap();
        let id = store.create_glidein(&test_glidein(site_id)).unwrap();

        store
            .update_glidein_state(id, GlideinState::Queued, "Glidein job queued", None, Utc::now())
            .unwrap();
        assert_eq!(store.load_glidein(id).unwrap().state, GlideinState::Queued);
        assert_eq!(store.list_glidein_ids().unwrap(), vec![id]);
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("corral.db");

        let id = {
            let store = SqliteStore::new(&db_path).unwrap();
            store.create_site(&test_site("dev", "user")).unwrap()
        };

        let store = SqliteStore::new(&db_path).unwrap();
        assert_eq!(store.load_site(id).unwrap().name, "dev");
    }
}
