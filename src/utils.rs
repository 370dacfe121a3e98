//! Terminal output helpers.

use std::fs;
use std::path::Path;

/// Create an OSC8 file:// hyperlink for terminal output
pub fn osc8_file_link(path: &Path, text: &str) -> String {
    let abs_path = fs::canonicalize(path)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string_lossy().into_owned());
    format!("\x1b]8;;file://{}\x1b\\{}\x1b]8;;\x1b\\", abs_path, text)
}

/// File size in megabytes with two decimals, e.g. "1.25 MB".
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_megabytes() {
        assert_eq!(format_megabytes(0), "0.00 MB");
        assert_eq!(format_megabytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_megabytes(1_310_720), "1.25 MB");
    }

    #[test]
    fn test_osc8_file_link_falls_back_to_given_path() {
        let link = osc8_file_link(Path::new("no/such/file.csv"), "file.csv");
        assert_eq!(
            link,
            "\x1b]8;;file://no/such/file.csv\x1b\\file.csv\x1b]8;;\x1b\\"
        );
    }
}
