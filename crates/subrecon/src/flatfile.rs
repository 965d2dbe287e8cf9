use crate::model::{join_numbers, zip_live_ports, ScanRecord, SCAN_TIME_FORMAT};
use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use time::PrimitiveDateTime;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

// domain,subdomain,http_codes,ports,ip_address,scan_time[,image_http,image_https]
const BASE_FIELDS: usize = 6;
const IMAGE_FIELDS: usize = 8;

pub fn format_line(record: &ScanRecord) -> Result<String> {
    let mut line = format!(
        "{},{},{},{},{},{}",
        record.domain,
        record.subdomain,
        join_numbers(&record.http_codes()),
        join_numbers(&record.ports()),
        record
            .ip_address
            .map(|ip| ip.to_string())
            .unwrap_or_default(),
        record.scan_time.format(SCAN_TIME_FORMAT)?,
    );

    if record.image_http.is_some() || record.image_https.is_some() {
        let encode = |image: &Option<Vec<u8>>| {
            image
                .as_ref()
                .map(|image| BASE64.encode(image))
                .unwrap_or_default()
        };
        line.push(',');
        line.push_str(&encode(&record.image_http));
        line.push(',');
        line.push_str(&encode(&record.image_https));
    }

    Ok(line)
}

pub fn parse_line(line: &str) -> Result<ScanRecord> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
    if fields.len() != BASE_FIELDS && fields.len() != IMAGE_FIELDS {
        return Err(Error::MalformedRecord(format!(
            "expected {} or {} fields, found {}",
            BASE_FIELDS,
            IMAGE_FIELDS,
            fields.len()
        )));
    }

    let live_ports = zip_live_ports(fields[2], fields[3]).ok_or_else(|| {
        Error::MalformedRecord(format!(
            "codes {:?} do not match ports {:?}",
            fields[2], fields[3]
        ))
    })?;

    let ip_address = match fields[4].trim() {
        "" => None,
        ip => Some(
            ip.parse::<Ipv4Addr>()
                .map_err(|_| Error::MalformedRecord(format!("bad ip {:?}", ip)))?,
        ),
    };

    let decode = |field: Option<&&str>| -> Result<Option<Vec<u8>>> {
        match field.map(|field| field.trim()) {
            None | Some("") => Ok(None),
            Some(encoded) => Ok(Some(BASE64.decode(encoded)?)),
        }
    };

    Ok(ScanRecord {
        domain: fields[0].trim().to_string(),
        subdomain: fields[1].trim().to_string(),
        live_ports,
        ip_address,
        scan_time: PrimitiveDateTime::parse(fields[5].trim(), SCAN_TIME_FORMAT)?,
        image_http: decode(fields.get(6))?,
        image_https: decode(fields.get(7))?,
    })
}

/// Every well formed record of `path`, malformed lines are logged and skipped.
pub async fn read_records(path: &Path) -> Result<Vec<ScanRecord>> {
    let content = tokio::fs::read_to_string(path).await?;
    let records: Vec<ScanRecord> = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(idx, line)| match parse_line(line) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("{}:{} skipped: {}", path.display(), idx + 1, err);
                None
            }
        })
        .collect();

    debug!("{} records read from {}", records.len(), path.display());
    Ok(records)
}

/// Replaces the content of `path` with `records`, one line each.
pub async fn write_records(path: &Path, records: &[ScanRecord]) -> Result<()> {
    let mut content = String::new();
    for record in records {
        content.push_str(&format_line(record)?);
        content.push('\n');
    }
    tokio::fs::write(path, content).await?;
    debug!("{} records written to {}", records.len(), path.display());
    Ok(())
}

/// Append-only results file of one run.
pub struct ResultsWriter {
    path: PathBuf,
    file: File,
}

impl ResultsWriter {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&mut self, record: &ScanRecord) -> Result<()> {
        let mut line = format_line(record)?;
        line.push('\n');
        self.file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.file.flush().await?;
        Ok(())
    }
}
