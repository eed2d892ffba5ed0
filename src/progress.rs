//! End-of-run summaries
//!
//! Printed to standard error in verbose mode; standard output may be
//! carrying the archive itself.

use crate::create::CreateSummary;
use crate::extract::ExtractSummary;
use humansize::{format_size, BINARY};
use std::time::Duration;

/// Print a summary of a create run
pub fn print_create_summary(summary: &CreateSummary) {
    eprintln!();
    eprintln!("Archive created");
    eprintln!("─────────────────────────────────────────────────");
    eprintln!("  Directories: {}", format_number(summary.dirs));
    eprintln!("  Files:       {}", format_number(summary.files));
    eprintln!("  Data:        {}", format_size(summary.bytes_read, BINARY));
    eprintln!("  Archive:     {}", format_size(summary.bytes_written, BINARY));
    if summary.excluded > 0 {
        eprintln!("  Excluded:    {}", format_number(summary.excluded));
    }
    if summary.symlinks_skipped > 0 {
        eprintln!("  Symlinks:    {} (skipped)", format_number(summary.symlinks_skipped));
    }
    if summary.warnings > 0 {
        eprintln!("  Warnings:    {}", format_number(summary.warnings));
    }
    eprintln!(
        "  Time:        {} ({}/s)",
        format_elapsed(summary.duration),
        format_size(rate(summary.bytes_read, summary.duration), BINARY)
    );
    eprintln!();
}

/// Print a summary of an extract run
pub fn print_extract_summary(summary: &ExtractSummary) {
    eprintln!();
    eprintln!("Archive extracted");
    eprintln!("─────────────────────────────────────────────────");
    eprintln!("  Directories: {}", format_number(summary.dirs));
    eprintln!("  Files:       {}", format_number(summary.files));
    eprintln!("  Data:        {}", format_size(summary.bytes, BINARY));
    if summary.warnings > 0 {
        eprintln!("  Warnings:    {}", format_number(summary.warnings));
    }
    eprintln!(
        "  Time:        {} ({}/s)",
        format_elapsed(summary.duration),
        format_size(rate(summary.bytes, summary.duration), BINARY)
    );
    eprintln!();
}

fn rate(bytes: u64, duration: Duration) -> u64 {
    let secs = duration.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

/// Format a duration as seconds with two decimals
pub fn format_elapsed(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f64())
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }
}
