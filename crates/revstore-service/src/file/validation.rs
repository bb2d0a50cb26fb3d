//! Upload validation: display names, extensions, content types.

use revstore_core::config::StorageConfig;
use revstore_core::error::AppError;
use revstore_core::result::AppResult;
use revstore_entity::file::naming;

/// Longest accepted display name, in characters.
pub const MAX_DISPLAY_NAME_CHARS: usize = 255;

/// Longest extension kept on a revision, dot included.
const MAX_EXTENSION_LEN: usize = 16;

const INVALID_CHARS: [char; 9] = ['<', '>', ':', '"', '|', '?', '*', '\\', '/'];

const RESERVED_NAMES: [&str; 22] = [
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Validate a display name and return it trimmed.
pub fn validate_display_name(name: &str) -> AppResult<String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(AppError::validation("Filename cannot be empty"));
    }
    if name.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(AppError::validation(format!(
            "Filename too long. Maximum {MAX_DISPLAY_NAME_CHARS} characters allowed"
        )));
    }
    if let Some(c) = name.chars().find(|c| INVALID_CHARS.contains(c)) {
        return Err(AppError::validation(format!(
            "Filename contains invalid character: {c}"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(AppError::validation(
            "Filename contains invalid control characters",
        ));
    }
    if RESERVED_NAMES.contains(&naming::stem_of(name).to_lowercase().as_str()) {
        return Err(AppError::validation(format!(
            "Filename \"{name}\" is not allowed"
        )));
    }

    Ok(name.to_string())
}

/// Extension to record for an upload: from the original filename when one
/// was supplied, otherwise from the display name.
///
/// Anything other than a short alphanumeric extension is dropped, since the
/// extension also ends up in the storage key.
pub fn upload_extension(filename: Option<&str>, display_name: &str) -> String {
    let ext = naming::extension_of(filename.unwrap_or(display_name));
    let valid = ext.len() <= MAX_EXTENSION_LEN
        && ext.chars().skip(1).all(|c| c.is_ascii_alphanumeric());
    if valid { ext } else { String::new() }
}

/// Longest accepted content type, parameters included.
pub const MAX_CONTENT_TYPE_CHARS: usize = 255;

/// Content type to record: the supplied one if it is a well-formed MIME
/// type, else a guess from the extension, else `application/octet-stream`.
pub fn resolve_content_type(supplied: Option<&str>, extension: &str) -> AppResult<String> {
    match supplied.map(str::trim).filter(|ct| !ct.is_empty()) {
        Some(content_type) => {
            validate_content_type(content_type)?;
            Ok(content_type.to_string())
        }
        None => Ok(mime_guess::from_ext(extension.trim_start_matches('.'))
            .first_or_octet_stream()
            .to_string()),
    }
}

/// Reject content types that are too long, contain control characters, or
/// are not `type/subtype` (optionally followed by `;` parameters).
fn validate_content_type(content_type: &str) -> AppResult<()> {
    if content_type.chars().count() > MAX_CONTENT_TYPE_CHARS {
        return Err(AppError::validation(format!(
            "Content type too long. Maximum {MAX_CONTENT_TYPE_CHARS} characters allowed"
        )));
    }
    if content_type.chars().any(char::is_control) {
        return Err(AppError::validation(
            "Content type contains invalid control characters",
        ));
    }
    let well_formed = essence(content_type)
        .split_once('/')
        .is_some_and(|(kind, subtype)| is_token(kind) && is_token(subtype));
    if !well_formed {
        return Err(AppError::validation(format!(
            "Invalid content type \"{content_type}\", expected type/subtype"
        )));
    }
    Ok(())
}

/// `type/subtype` part of a content type, lowercased.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// RFC 6838 restricted-name characters.
fn is_token(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$&-^_.+".contains(c))
}

/// Deployment-wide restrictions on what may be uploaded.
#[derive(Debug, Clone, Default)]
pub struct UploadPolicy {
    /// Lowercased, without the dot. Empty accepts any.
    allowed_extensions: Vec<String>,
    /// Lowercased `type/subtype`. Empty accepts any.
    allowed_content_types: Vec<String>,
    owner_quota_bytes: Option<u64>,
}

impl UploadPolicy {
    /// Build the policy from the storage section.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
            allowed_content_types: config
                .allowed_content_types
                .iter()
                .map(|ct| essence(ct.as_str()))
                .filter(|ct| !ct.is_empty())
                .collect(),
            owner_quota_bytes: config.owner_quota_bytes,
        }
    }

    /// Bytes one owner may store in total, if limited.
    pub fn owner_quota_bytes(&self) -> Option<u64> {
        self.owner_quota_bytes
    }

    /// Check a recorded extension (`.pdf`, or empty) against the allowlist.
    pub fn check_extension(&self, extension: &str) -> AppResult<()> {
        if self.allowed_extensions.is_empty() {
            return Ok(());
        }
        let ext = extension.trim_start_matches('.');
        if self.allowed_extensions.iter().any(|allowed| allowed == ext) {
            return Ok(());
        }
        Err(AppError::validation(if ext.is_empty() {
            "Files without an extension are not allowed".to_string()
        } else {
            format!("File type .{ext} is not allowed")
        }))
    }

    /// Check a resolved content type against the allowlist.
    pub fn check_content_type(&self, content_type: &str) -> AppResult<()> {
        if self.allowed_content_types.is_empty() {
            return Ok(());
        }
        let essence = essence(content_type);
        if self.allowed_content_types.contains(&essence) {
            return Ok(());
        }
        Err(AppError::validation(format!(
            "Content type {essence} is not allowed"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revstore_core::error::ErrorKind;

    #[test]
    fn test_display_name_is_trimmed() {
        assert_eq!(validate_display_name("  report.pdf \n").unwrap(), "report.pdf");
    }

    #[test]
    fn test_rejects_empty_and_blank_names() {
        for name in ["", "   ", "\t\n"] {
            let err = validate_display_name(name).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation);
        }
    }

    #[test]
    fn test_rejects_long_names() {
        let ok = "a".repeat(255);
        assert!(validate_display_name(&ok).is_ok());
        assert!(validate_display_name(&"a".repeat(256)).is_err());
        // Counted in characters, not bytes.
        assert!(validate_display_name(&"é".repeat(200)).is_ok());
    }

    #[test]
    fn test_rejects_invalid_characters() {
        for name in ["a<b", "a>b", "c:d", "q\"", "p|q", "why?", "st*r", "a\\b", "a/b"] {
            assert!(validate_display_name(name).is_err(), "{name}");
        }
        assert!(validate_display_name("tab\tinside").is_err());
    }

    #[test]
    fn test_rejects_reserved_device_names() {
        for name in ["CON", "nul.txt", "Com1.log", "lpt9"] {
            assert!(validate_display_name(name).is_err(), "{name}");
        }
        assert!(validate_display_name("console.txt").is_ok());
    }

    #[test]
    fn test_upload_extension_prefers_original_filename() {
        assert_eq!(upload_extension(Some("scan.PNG"), "Report.pdf"), ".png");
        assert_eq!(upload_extension(None, "Report.pdf"), ".pdf");
        assert_eq!(upload_extension(Some("noext"), "Report.pdf"), "");
        assert_eq!(upload_extension(None, "A"), "");
    }

    #[test]
    fn test_upload_extension_drops_unsafe_values() {
        assert_eq!(upload_extension(Some("x.p df"), "a"), "");
        assert_eq!(upload_extension(Some("x.averyveryverylongext"), "a"), "");
    }

    #[test]
    fn test_resolve_content_type_guesses_from_extension() {
        assert_eq!(resolve_content_type(None, ".pdf").unwrap(), "application/pdf");
        assert_eq!(resolve_content_type(Some("  "), ".png").unwrap(), "image/png");
        assert_eq!(
            resolve_content_type(None, ".weird").unwrap(),
            "application/octet-stream"
        );
        assert_eq!(
            resolve_content_type(None, "").unwrap(),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_resolve_content_type_keeps_valid_supplied_type() {
        assert_eq!(
            resolve_content_type(Some("text/markdown"), ".md").unwrap(),
            "text/markdown"
        );
        assert_eq!(
            resolve_content_type(Some(" text/plain; charset=utf-8 "), ".txt").unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            resolve_content_type(Some("application/vnd.ms-excel"), ".xls").unwrap(),
            "application/vnd.ms-excel"
        );
    }

    #[test]
    fn test_resolve_content_type_rejects_overlong_type() {
        let long = format!("text/{}", "x".repeat(300));
        let err = resolve_content_type(Some(&long), ".txt").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let exact = format!("text/{}", "x".repeat(MAX_CONTENT_TYPE_CHARS - 5));
        assert!(resolve_content_type(Some(&exact), ".txt").is_ok());
    }

    #[test]
    fn test_resolve_content_type_rejects_header_injection() {
        let err = resolve_content_type(Some("text/plain\r\nSet-Cookie: x=1"), ".txt").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_resolve_content_type_rejects_malformed_types() {
        for ct in ["text", "text/", "/plain", "text plain/x", "a/b/c", "text/pl ain"] {
            let err = resolve_content_type(Some(ct), ".txt").unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation, "{ct}");
        }
    }

    #[test]
    fn test_default_policy_accepts_everything() {
        let policy = UploadPolicy::default();
        assert!(policy.check_extension("").is_ok());
        assert!(policy.check_extension(".exe").is_ok());
        assert!(policy.check_content_type("application/x-msdownload").is_ok());
        assert_eq!(policy.owner_quota_bytes(), None);
    }

    #[test]
    fn test_policy_extension_allowlist() {
        let policy = UploadPolicy::from_config(&StorageConfig {
            allowed_extensions: vec!["PDF".to_string(), ".docx".to_string()],
            ..StorageConfig::default()
        });
        assert!(policy.check_extension(".pdf").is_ok());
        assert!(policy.check_extension(".docx").is_ok());
        assert_eq!(policy.check_extension(".exe").unwrap_err().kind, ErrorKind::Validation);
        assert_eq!(policy.check_extension("").unwrap_err().kind, ErrorKind::Validation);
    }

    #[test]
    fn test_policy_content_type_allowlist_ignores_parameters_and_case() {
        let policy = UploadPolicy::from_config(&StorageConfig {
            allowed_content_types: vec!["Text/Plain".to_string()],
            owner_quota_bytes: Some(1024),
            ..StorageConfig::default()
        });
        assert!(policy.check_content_type("text/plain; charset=utf-8").is_ok());
        assert!(policy.check_content_type("image/png").is_err());
        assert_eq!(policy.owner_quota_bytes(), Some(1024));
    }
}
