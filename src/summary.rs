//! End-of-run reporting: a human-readable summary on stderr and
//! machine-readable `key=value` outputs on stdout.
//!
//! Purely cosmetic; nothing here is consulted for control decisions.

use crate::error::TransferError;
use crate::request::TransferResult;

/// Machine-readable outputs, one `key=value` per line.  `contentLength` is
/// the relayed byte count, never the header value.
pub fn emit_outputs(result: &TransferResult) {
    println!("statusCode={}", result.status_code);
    println!("contentLength={}", result.bytes_transferred);
    println!("s3Url={}", result.url);
    println!("s3Etag={}", result.e_tag);
    println!("objectExisted={}", result.existed_already);
}

pub fn print_success(source: &str, result: &TransferResult) {
    let status = if result.existed_already {
        "✓ skipped (object already existed)".to_string()
    } else {
        "✓ transferred".to_string()
    };
    eprint!(
        "{}",
        render(&[
            ("Source", source.to_string()),
            ("Destination", result.url.clone()),
            ("Status", status),
            ("Bytes", result.bytes_transferred.to_string()),
            ("ETag", result.e_tag.clone()),
        ])
    );
}

pub fn print_failure(source: &str, destination: &str, err: &TransferError) {
    eprint!(
        "{}",
        render(&[
            ("Source", source.to_string()),
            ("Destination", destination.to_string()),
            ("Status", "✗ failed".to_string()),
            ("Error", err.to_string()),
        ])
    );
}

fn render(rows: &[(&str, String)]) -> String {
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (label, value) in rows {
        out.push_str(&format!("  {label:>width$}  {value}\n"));
    }
    out
}
