use crate::diff::{Change, DiffRow, HistoryReport, RowKind, ScanDiff, Totals};
use crate::model::{join_numbers, ScanRecord, SCAN_TIME_FORMAT};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::fmt::Write;
use std::net::Ipv4Addr;
use time::PrimitiveDateTime;

const ABSENT: &str = "N/A";

pub fn render_history(report: &HistoryReport, title: &str) -> String {
    let mut images = ImageIds::default();
    let sections: String = report
        .scans
        .iter()
        .map(|scan| scan_section(scan, &mut images))
        .collect();

    page(
        title,
        &format!(
            "{legend}\n{totals}\n{sections}",
            legend = legend(),
            totals = totals(&report.totals),
            sections = sections
        ),
    )
}

/// Flat table of one results file, without any comparison. Screenshots
/// found in the file are embedded behind toggle buttons.
pub fn render_minimal(records: &[ScanRecord], title: &str) -> String {
    let mut images = ImageIds::default();
    let totals = Totals {
        scans: 1,
        subdomains: distinct(records.iter().map(|record| record.subdomain.as_str())),
        domains: distinct(records.iter().map(|record| record.domain.as_str())),
    };

    let mut rows = String::new();
    for record in records {
        let _ = write!(
            rows,
            r#"
            <tr>
                <td>{}</td>
                <td>{}</td>
                <td>{}</td>
                <td>{}</td>
                <td>{}</td>
                <td>{}</td>
                <td>{}</td>
                <td>{}</td>
            </tr>"#,
            escape_html(&record.domain),
            escape_html(&record.subdomain),
            join_numbers(&record.http_codes()),
            join_numbers(&record.ports()),
            ip_text(&record.ip_address),
            time_text(Some(record.scan_time)),
            image_cell(record.image_http.as_deref(), "HTTP", &mut images),
            image_cell(record.image_https.as_deref(), "HTTPS", &mut images),
        );
    }

    page(
        title,
        &format!(
            r#"{totals}
        <h2>Results</h2>
        <table>
            <tr>
                <th>Domain</th>
                <th>Subdomain</th>
                <th>HTTP codes</th>
                <th>Ports</th>
                <th>IP address</th>
                <th>Scan time</th>
                <th>HTTP screenshot</th>
                <th>HTTPS screenshot</th>
            </tr>{rows}
        </table>"#,
            totals = self::totals(&totals),
            rows = rows
        ),
    )
}

// region:        --- Sections

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <style>{css}</style>
    <script>{js}</script>
</head>
<body>
    <h1>{title}</h1>
    {body}
</body>
</html>
"#,
        title = escape_html(title),
        css = CSS,
        js = JS,
        body = body
    )
}

fn legend() -> &'static str {
    r#"<h3>Legend</h3>
        <table class="legend-table">
            <tr>
                <td class="added">Added</td>
                <td class="modified">Modified</td>
                <td class="removed">Removed</td>
                <td class="unchanged">Unchanged</td>
            </tr>
        </table>"#
}

fn totals(totals: &Totals) -> String {
    format!(
        r#"<div class="stats">
            <div class="stat-box">Scans: {}</div>
            <div class="stat-box">Subdomains scanned: {}</div>
            <div class="stat-box">Domains scanned: {}</div>
        </div>"#,
        totals.scans, totals.subdomains, totals.domains
    )
}

fn scan_section(scan: &ScanDiff, images: &mut ImageIds) -> String {
    let rows: String = scan.rows.iter().map(|row| diff_row(row, images)).collect();

    format!(
        r#"
        <div class="scan-result">
            <h2>Scan {scan_id}</h2>
            <h3>Date: {date}</h3>
            <div class="stats">
                <div class="stat-box">Subdomains: {total}</div>
                <div class="stat-box">Added: {added}</div>
                <div class="stat-box">Modified: {modified}</div>
                <div class="stat-box">Removed: {removed}</div>
                <div class="stat-box">Unchanged: {unchanged}</div>
            </div>
            <table>
                <tr>
                    <th>Domain</th>
                    <th>Subdomain</th>
                    <th>HTTP codes</th>
                    <th>Ports</th>
                    <th>IP address</th>
                    <th>Scan time</th>
                    <th>HTTP screenshot</th>
                    <th>HTTPS screenshot</th>
                </tr>{rows}
            </table>
        </div>"#,
        scan_id = scan.scan_id,
        date = time_text(scan.scan_time),
        total = scan.counts.total,
        added = scan.counts.added,
        modified = scan.counts.modified,
        removed = scan.counts.removed,
        unchanged = scan.counts.unchanged,
        rows = rows
    )
}

fn diff_row(row: &DiffRow, images: &mut ImageIds) -> String {
    let (image_http, image_https) = match row.kind {
        RowKind::Removed => (ABSENT.to_string(), ABSENT.to_string()),
        _ => (
            image_cell(row.image_http.as_deref(), "HTTP", images),
            image_cell(row.image_https.as_deref(), "HTTPS", images),
        ),
    };

    let scan_time = match row.kind {
        RowKind::Removed => String::new(),
        _ => time_text(row.scan_time),
    };

    format!(
        r#"
                <tr class="{class}">
                    <td>{domain}</td>
                    <td>{subdomain}</td>
                    <td>{http_codes}</td>
                    <td>{ports}</td>
                    <td>{ip}</td>
                    <td>{scan_time}</td>
                    <td>{image_http}</td>
                    <td>{image_https}</td>
                </tr>"#,
        class = row.kind.as_str(),
        domain = escape_html(&row.domain),
        subdomain = escape_html(&row.subdomain),
        http_codes = change_cell(&row.http_codes, |codes| join_numbers(codes)),
        ports = change_cell(&row.ports, |ports| join_numbers(ports)),
        ip = change_cell(&row.ip_address, ip_text),
        scan_time = scan_time,
        image_http = image_http,
        image_https = image_https,
    )
}

// endregion:     --- Sections

// region:        --- Cells

fn change_cell<T>(change: &Change<T>, text: impl Fn(&T) -> String) -> String {
    match change {
        Change::Same(value) => text(value),
        Change::Changed { old, new } => format!(
            "<span class='old-value'>{}</span> &rarr; <span class='new-value'>{}</span>",
            text(old),
            text(new)
        ),
    }
}

/// Sequential ids for the toggleable screenshots of one document.
#[derive(Default)]
struct ImageIds(usize);

impl ImageIds {
    fn next(&mut self, scheme: &str) -> String {
        self.0 += 1;
        format!("img_{}_{}", scheme.to_lowercase(), self.0)
    }
}

fn image_cell(image: Option<&[u8]>, scheme: &str, images: &mut ImageIds) -> String {
    let Some(image) = image.filter(|image| !image.is_empty()) else {
        return ABSENT.to_string();
    };

    let id = images.next(scheme);
    format!(
        r#"<button onclick="toggleImage('{id}')">Show {scheme} screenshot</button>
                    <div class="image-container">
                        <img id="{id}" src="data:image/png;base64,{data}" style="display:none;"/>
                    </div>"#,
        id = id,
        scheme = scheme,
        data = BASE64.encode(image)
    )
}

fn ip_text(ip: &Option<Ipv4Addr>) -> String {
    ip.map(|ip| ip.to_string())
        .unwrap_or_else(|| ABSENT.to_string())
}

fn time_text(scan_time: Option<PrimitiveDateTime>) -> String {
    scan_time
        .and_then(|scan_time| scan_time.format(SCAN_TIME_FORMAT).ok())
        .map(|formatted| format!("{} UTC", formatted))
        .unwrap_or_default()
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> usize {
    values.collect::<std::collections::HashSet<&str>>().len()
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

// endregion:     --- Cells

const CSS: &str = r#"
        body {
            font-family: 'Roboto', sans-serif;
            margin: 20px;
            background-color: #f9f9f9;
            color: #333;
        }
        h1, h2, h3 {
            color: #4CAF50;
        }
        .stats {
            display: flex;
            gap: 20px;
            margin-bottom: 20px;
        }
        .stat-box {
            padding: 10px;
            border: 2px solid #4CAF50;
            border-radius: 5px;
            background-color: #f1f1f1;
            color: #4CAF50;
            font-weight: bold;
        }
        .added { background-color: lightgreen; }
        .removed { background-color: lightcoral; }
        .modified { background-color: lightyellow; }
        .unchanged { background-color: lightgray; }
        .scan-result {
            border: 1px solid #ddd;
            padding: 10px;
            margin-bottom: 20px;
            border-radius: 5px;
            background-color: #fff;
        }
        table {
            width: 100%;
            border-collapse: collapse;
            margin-bottom: 20px;
        }
        th, td {
            border: 1px solid #ddd;
            padding: 12px;
            text-align: left;
        }
        th {
            background-color: #4CAF50;
            color: white;
        }
        .legend-table {
            width: 50%;
            margin: 20px auto;
            text-align: center;
        }
        .old-value { color: red; font-weight: bold; }
        .new-value { color: green; font-weight: bold; }
        .image-container img { max-width: 100%; height: auto; }
"#;

const JS: &str = r#"
        function toggleImage(id) {
            var img = document.getElementById(id);
            img.style.display = img.style.display === "none" ? "block" : "none";
        }
"#;
