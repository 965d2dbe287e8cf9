use serde::Serialize;
use std::net::Ipv4Addr;
use time::{OffsetDateTime, PrimitiveDateTime};

pub type ScanId = i64;

pub const HTTP_PORT: u16 = 80;
pub const HTTPS_PORT: u16 = 443;

/// Format shared by the store, the results file and the reports.
pub const SCAN_TIME_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] =
    time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Serializes scan times with `SCAN_TIME_FORMAT` instead of time's tuple form.
pub mod scan_time_format {
    use super::SCAN_TIME_FORMAT;
    use serde::{ser::Error, Serializer};
    use time::PrimitiveDateTime;

    pub fn serialize<S: Serializer>(
        scan_time: &PrimitiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let formatted = scan_time.format(SCAN_TIME_FORMAT).map_err(S::Error::custom)?;
        serializer.serialize_str(&formatted)
    }

    pub mod option {
        use serde::Serializer;
        use time::PrimitiveDateTime;

        pub fn serialize<S: Serializer>(
            scan_time: &Option<PrimitiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match scan_time {
                Some(scan_time) => super::serialize(scan_time, serializer),
                None => serializer.serialize_none(),
            }
        }
    }
}

// region:        --- Models

/// A probed port that answered with an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LivePort {
    pub port: u16,
    pub status: u16,
}

impl LivePort {
    /// Only 2xx/3xx (and informational) answers are worth a screenshot.
    pub fn is_capturable(&self) -> bool {
        matches!(self.port, HTTP_PORT | HTTPS_PORT) && self.status < 400
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRecord {
    pub domain: String,
    pub subdomain: String,
    pub live_ports: Vec<LivePort>,
    pub ip_address: Option<Ipv4Addr>,
    #[serde(serialize_with = "scan_time_format::serialize")]
    pub scan_time: PrimitiveDateTime,
    #[serde(skip)]
    pub image_http: Option<Vec<u8>>,
    #[serde(skip)]
    pub image_https: Option<Vec<u8>>,
}

impl ScanRecord {
    pub fn http_codes(&self) -> Vec<u16> {
        self.live_ports.iter().map(|live| live.status).collect()
    }

    pub fn ports(&self) -> Vec<u16> {
        self.live_ports.iter().map(|live| live.port).collect()
    }
}

/// A record read back from the store, tagged with the run that wrote it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub scan_id: ScanId,
    pub record: ScanRecord,
}

// endregion:     --- Models

// region:        --- Field helpers

pub fn now_scan_time() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    let now = now.replace_nanosecond(0).unwrap_or(now);
    PrimitiveDateTime::new(now.date(), now.time())
}

/// `[200, 301]` -> `"200-301"`
pub fn join_numbers(numbers: &[u16]) -> String {
    numbers
        .iter()
        .map(|number| number.to_string())
        .collect::<Vec<String>>()
        .join("-")
}

pub fn split_numbers(field: &str) -> Option<Vec<u16>> {
    let field = field.trim();
    if field.is_empty() {
        return Some(Vec::new());
    }
    field
        .split('-')
        .map(|part| part.trim().parse::<u16>().ok())
        .collect()
}

/// Zips the `http_codes` and `ports` columns back into live ports,
/// refusing columns of different lengths.
pub fn zip_live_ports(http_codes: &str, ports: &str) -> Option<Vec<LivePort>> {
    let codes = split_numbers(http_codes)?;
    let ports = split_numbers(ports)?;
    if codes.len() != ports.len() {
        return None;
    }
    Some(
        ports
            .into_iter()
            .zip(codes)
            .map(|(port, status)| LivePort { port, status })
            .collect(),
    )
}

// endregion:     --- Field helpers

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_and_splits_numbers() {
        assert_eq!("200-301", join_numbers(&[200, 301]));
        assert_eq!("", join_numbers(&[]));
        assert_eq!(Some(vec![80, 443]), split_numbers("80-443"));
        assert_eq!(None, split_numbers("80-abc"));
    }

    #[test]
    fn zip_rejects_mismatched_columns() {
        assert_eq!(None, zip_live_ports("200-301", "80"));
        assert_eq!(
            Some(vec![
                LivePort { port: 80, status: 200 },
                LivePort { port: 443, status: 404 }
            ]),
            zip_live_ports("200-404", "80-443")
        );
    }

    #[test]
    fn capturable_ports() {
        assert!(LivePort { port: 80, status: 200 }.is_capturable());
        assert!(LivePort { port: 443, status: 302 }.is_capturable());
        assert!(!LivePort { port: 443, status: 403 }.is_capturable());
        assert!(!LivePort { port: 80, status: 503 }.is_capturable());
        assert!(!LivePort { port: 8080, status: 200 }.is_capturable());
    }

    #[test]
    fn scan_time_has_second_precision() {
        assert_eq!(0, now_scan_time().nanosecond());
    }
}
