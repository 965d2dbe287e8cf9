use crate::model::{join_numbers, zip_live_ports, ScanId, ScanRecord, StoredRecord, SCAN_TIME_FORMAT};
use crate::{Error, Result};
use rusqlite::{params, Connection, Row};
use std::net::Ipv4Addr;
use std::path::Path;
use time::PrimitiveDateTime;
use tracing::{debug, info, warn};

const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE scan_results (
  id              INTEGER PRIMARY KEY AUTOINCREMENT,
  scan_id         INTEGER NOT NULL,
  domain          TEXT NOT NULL,
  subdomain       TEXT NOT NULL,
  http_codes      TEXT NOT NULL,
  ports           TEXT NOT NULL,
  ip_address      TEXT,
  scan_time       TEXT NOT NULL,
  image_http      BLOB,
  image_https     BLOB
);

CREATE INDEX idx_scan_results_scan ON scan_results(scan_id);

COMMIT;
"#;

// region:        --- Interfaces

/// Hands out the id shared by every record of one run.
pub trait ScanIdAllocator {
    fn next_scan_id(&self) -> Result<ScanId>;
}

pub trait ScanStore: ScanIdAllocator {
    fn insert(&self, scan_id: ScanId, record: &ScanRecord) -> Result<()>;

    /// Every stored record, most recent scan first.
    fn select_all(&self) -> Result<Vec<StoredRecord>>;
}

// endregion:     --- Interfaces

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get::<_, String>(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        migrate(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(SqliteStore { conn })
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name='scan_results'",
        [],
        |r| r.get(0),
    )?;
    if exists == 0 {
        info!("Creating scan_results table");
        conn.execute_batch(MIG_0001_INIT)?;
    }
    Ok(())
}

impl ScanIdAllocator for SqliteStore {
    fn next_scan_id(&self) -> Result<ScanId> {
        let max: Option<ScanId> =
            self.conn
                .query_row("SELECT MAX(scan_id) FROM scan_results", [], |r| r.get(0))?;
        Ok(max.map_or(1, |max| max + 1))
    }
}

impl ScanStore for SqliteStore {
    fn insert(&self, scan_id: ScanId, record: &ScanRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO scan_results(scan_id,domain,subdomain,http_codes,ports,ip_address,scan_time,image_http,image_https)
             VALUES (?,?,?,?,?,?,?,?,?)",
            params![
                scan_id,
                record.domain,
                record.subdomain,
                join_numbers(&record.http_codes()),
                join_numbers(&record.ports()),
                record.ip_address.map(|ip| ip.to_string()),
                record.scan_time.format(SCAN_TIME_FORMAT)?,
                record.image_http,
                record.image_https,
            ],
        )?;
        Ok(())
    }

    fn select_all(&self) -> Result<Vec<StoredRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT scan_id, domain, subdomain, http_codes, ports, ip_address, scan_time, image_http, image_https
             FROM scan_results
             ORDER BY scan_id DESC, scan_time DESC",
        )?;

        let rows = stmt.query_map([], RawRow::from_row)?;
        let mut records = Vec::new();
        for row in rows {
            match row?.into_stored() {
                Ok(stored) => records.push(stored),
                Err(err) => warn!("Skipping stored row: {}", err),
            }
        }

        debug!("{} stored records", records.len());
        Ok(records)
    }
}

// region:        --- Row decoding

struct RawRow {
    scan_id: ScanId,
    domain: String,
    subdomain: String,
    http_codes: String,
    ports: String,
    ip_address: Option<String>,
    scan_time: String,
    image_http: Option<Vec<u8>>,
    image_https: Option<Vec<u8>>,
}

impl RawRow {
    fn from_row(r: &Row) -> rusqlite::Result<Self> {
        Ok(RawRow {
            scan_id: r.get(0)?,
            domain: r.get(1)?,
            subdomain: r.get(2)?,
            http_codes: r.get(3)?,
            ports: r.get(4)?,
            ip_address: r.get(5)?,
            scan_time: r.get(6)?,
            image_http: r.get(7)?,
            image_https: r.get(8)?,
        })
    }

    fn into_stored(self) -> Result<StoredRecord> {
        let live_ports = zip_live_ports(&self.http_codes, &self.ports).ok_or_else(|| {
            Error::MalformedRecord(format!(
                "{}: codes {:?} do not match ports {:?}",
                self.subdomain, self.http_codes, self.ports
            ))
        })?;

        let ip_address = match self.ip_address.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(ip) => Some(ip.parse::<Ipv4Addr>().map_err(|_| {
                Error::MalformedRecord(format!("{}: bad ip {:?}", self.subdomain, ip))
            })?),
        };

        Ok(StoredRecord {
            scan_id: self.scan_id,
            record: ScanRecord {
                domain: self.domain,
                subdomain: self.subdomain,
                live_ports,
                ip_address,
                scan_time: PrimitiveDateTime::parse(&self.scan_time, SCAN_TIME_FORMAT)?,
                image_http: self.image_http.filter(|image| !image.is_empty()),
                image_https: self.image_https.filter(|image| !image.is_empty()),
            },
        })
    }
}

// endregion:     --- Row decoding
