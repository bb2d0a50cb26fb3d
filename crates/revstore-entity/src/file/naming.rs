//! Filename helpers: extensions, download names, sizes.

/// Byte offset in `name` where its extension (the final `.xxx`) starts.
///
/// Dotfiles such as `.bashrc` and names ending in a dot have no extension.
fn extension_start(name: &str) -> Option<usize> {
    let base_start = name.rfind(['/', '\\']).map(|p| p + 1).unwrap_or(0);
    let base = &name[base_start..];
    let pos = base.rfind('.')?;
    if pos + 1 == base.len() || base[..pos].chars().all(|c| c == '.') {
        return None;
    }
    Some(base_start + pos)
}

/// Lowercased extension of `name`, including the leading dot, or empty.
pub fn extension_of(name: &str) -> String {
    extension_start(name)
        .map(|pos| name[pos..].to_lowercase())
        .unwrap_or_default()
}

/// `name` without its extension.
pub fn stem_of(name: &str) -> &str {
    match extension_start(name) {
        Some(pos) => &name[..pos],
        None => name,
    }
}

/// Filename a download should be served under.
///
/// The latest revision is served under the display name itself. Any other
/// revision is served as `{display name stem}_v{n}{revision extension}`,
/// e.g. `report_v1.pdf`.
pub fn suggested_filename(
    display_name: &str,
    file_extension: &str,
    revision_number: i32,
    is_latest: bool,
) -> String {
    if is_latest {
        return display_name.to_string();
    }
    format!("{}_v{revision_number}{file_extension}", stem_of(display_name))
}

/// Human-readable size, e.g. `"0 bytes"`, `"1.5 KB"`, `"3.0 GB"`.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 bytes".to_string();
    }
    const UNITS: [&str; 5] = ["bytes", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("report.PDF"), ".pdf");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("noext"), "");
        assert_eq!(extension_of(".bashrc"), "");
        assert_eq!(extension_of("trailing."), "");
        assert_eq!(extension_of("dir/sub/file.txt"), ".txt");
    }

    #[test]
    fn test_stem_of() {
        assert_eq!(stem_of("report.pdf"), "report");
        assert_eq!(stem_of("archive.tar.gz"), "archive.tar");
        assert_eq!(stem_of("noext"), "noext");
    }

    #[test]
    fn test_suggested_filename_latest_is_display_name() {
        assert_eq!(suggested_filename("report.pdf", ".pdf", 3, true), "report.pdf");
    }

    #[test]
    fn test_suggested_filename_older_revision() {
        assert_eq!(suggested_filename("report.pdf", ".pdf", 1, false), "report_v1.pdf");
        assert_eq!(suggested_filename("A", "", 2, false), "A_v2");
    }

    #[test]
    fn test_suggested_filename_extension_differs_from_name() {
        // Revision 1 was uploaded as a .docx before the file was renamed.
        assert_eq!(suggested_filename("report.pdf", ".docx", 1, false), "report_v1.docx");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 bytes");
        assert_eq!(format_size(512), "512.0 bytes");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(10 * 1024 * 1024), "10.0 MB");
    }
}
