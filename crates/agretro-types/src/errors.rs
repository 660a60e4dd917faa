use serde::{Deserialize, Serialize};

/// Closed classification of tool-result failures.
///
/// Classification happens once at ingest time so downstream aggregation
/// never re-derives categories from free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    SiblingError,
    FileNotRead,
    EditConflict,
    FileNotFound,
    FileChanged,
    FileTooLarge,
    PermissionDenied,
    UserRejected,
    CommandFailed,
    NetworkError,
    ValidationError,
    Timeout,
    TaskError,
    Other,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::SiblingError => "sibling_error",
            ToolErrorKind::FileNotRead => "file_not_read",
            ToolErrorKind::EditConflict => "edit_conflict",
            ToolErrorKind::FileNotFound => "file_not_found",
            ToolErrorKind::FileChanged => "file_changed",
            ToolErrorKind::FileTooLarge => "file_too_large",
            ToolErrorKind::PermissionDenied => "permission_denied",
            ToolErrorKind::UserRejected => "user_rejected",
            ToolErrorKind::CommandFailed => "command_failed",
            ToolErrorKind::NetworkError => "network_error",
            ToolErrorKind::ValidationError => "validation_error",
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::TaskError => "task_error",
            ToolErrorKind::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sibling_error" => Some(ToolErrorKind::SiblingError),
            "file_not_read" => Some(ToolErrorKind::FileNotRead),
            "edit_conflict" => Some(ToolErrorKind::EditConflict),
            "file_not_found" => Some(ToolErrorKind::FileNotFound),
            "file_changed" => Some(ToolErrorKind::FileChanged),
            "file_too_large" => Some(ToolErrorKind::FileTooLarge),
            "permission_denied" => Some(ToolErrorKind::PermissionDenied),
            "user_rejected" => Some(ToolErrorKind::UserRejected),
            "command_failed" => Some(ToolErrorKind::CommandFailed),
            "network_error" => Some(ToolErrorKind::NetworkError),
            "validation_error" => Some(ToolErrorKind::ValidationError),
            "timeout" => Some(ToolErrorKind::Timeout),
            "task_error" => Some(ToolErrorKind::TaskError),
            "other" => Some(ToolErrorKind::Other),
            _ => None,
        }
    }

    /// Classify an error message. Rules are checked in a fixed order and the
    /// first match wins, so more specific categories shadow generic ones
    /// (e.g. "file has not been read yet" never falls through to
    /// `FileNotFound` despite containing "file").
    pub fn classify(text: &str) -> Self {
        let t = text.to_lowercase();

        if t.contains("sibling tool call errored") {
            return ToolErrorKind::SiblingError;
        }
        if t.contains("file has not been read yet") || t.contains("read it first before writing") {
            return ToolErrorKind::FileNotRead;
        }
        if t.contains("string to replace not found")
            || t.contains("matches of the string to replace")
            || t.contains("replace_all is false")
        {
            return ToolErrorKind::EditConflict;
        }
        if t.contains("file does not exist")
            || t.contains("no such file")
            || t.contains("file not found")
            || t.contains("cannot find")
            || t.contains("path does not exist")
            || t.contains("eisdir")
        {
            return ToolErrorKind::FileNotFound;
        }
        if t.contains("file has changed")
            || t.contains("file was modified")
            || t.contains("has been modified")
        {
            return ToolErrorKind::FileChanged;
        }
        if t.contains("too large")
            || t.contains("exceeds maximum")
            || (t.contains("file content") && t.contains("tokens"))
        {
            return ToolErrorKind::FileTooLarge;
        }
        if (t.contains("permission to use") && t.contains("denied"))
            || (t.contains("requested permissions") && t.contains("but you"))
        {
            return ToolErrorKind::PermissionDenied;
        }
        if t.contains("doesn't want to proceed")
            || t.contains("tool use was rejected")
            || t.contains("user rejected")
            || t.contains("user cancelled")
            || t.contains("user denied")
        {
            return ToolErrorKind::UserRejected;
        }
        if t.contains("exit code") || t.contains("returned non-zero") || t.contains("non-zero exit")
        {
            return ToolErrorKind::CommandFailed;
        }
        if t.contains("request failed") || t.contains("status code") || t.contains("network error")
        {
            return ToolErrorKind::NetworkError;
        }
        if t.contains("inputvalidationerror") || t.contains("validation error") {
            return ToolErrorKind::ValidationError;
        }
        if t.contains("timed out") || t.contains("timeout") {
            return ToolErrorKind::Timeout;
        }
        if t.contains("task not found") || t.contains("is not running") || t.contains("tool_use_error")
        {
            return ToolErrorKind::TaskError;
        }

        ToolErrorKind::Other
    }
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_common_messages() {
        assert_eq!(
            ToolErrorKind::classify("file not found: /x"),
            ToolErrorKind::FileNotFound
        );
        assert_eq!(
            ToolErrorKind::classify("Error: No such file or directory"),
            ToolErrorKind::FileNotFound
        );
        assert_eq!(
            ToolErrorKind::classify("String to replace not found in file."),
            ToolErrorKind::EditConflict
        );
        assert_eq!(
            ToolErrorKind::classify("Command exited with exit code 2"),
            ToolErrorKind::CommandFailed
        );
        assert_eq!(
            ToolErrorKind::classify("The user doesn't want to proceed with this tool use."),
            ToolErrorKind::UserRejected
        );
        assert_eq!(
            ToolErrorKind::classify("InputValidationError: field `path` is required"),
            ToolErrorKind::ValidationError
        );
        assert_eq!(
            ToolErrorKind::classify("something inexplicable"),
            ToolErrorKind::Other
        );
    }

    #[test]
    fn earlier_rules_shadow_later_ones() {
        // Contains both "file" wording and a not-read marker; the not-read
        // rule is checked first.
        assert_eq!(
            ToolErrorKind::classify("File has not been read yet. Read it first before writing."),
            ToolErrorKind::FileNotRead
        );
        // "exit code" outranks "timed out".
        assert_eq!(
            ToolErrorKind::classify("command timed out and returned exit code 124"),
            ToolErrorKind::CommandFailed
        );
        // Sibling marker outranks everything else.
        assert_eq!(
            ToolErrorKind::classify("sibling tool call errored: file not found"),
            ToolErrorKind::SiblingError
        );
    }

    #[test]
    fn classify_is_case_insensitive() {
        assert_eq!(
            ToolErrorKind::classify("FILE NOT FOUND"),
            ToolErrorKind::FileNotFound
        );
        assert_eq!(
            ToolErrorKind::classify("Request Failed with Status Code 502"),
            ToolErrorKind::NetworkError
        );
    }

    #[test]
    fn round_trips_through_str() {
        for kind in [
            ToolErrorKind::SiblingError,
            ToolErrorKind::FileNotRead,
            ToolErrorKind::EditConflict,
            ToolErrorKind::FileNotFound,
            ToolErrorKind::FileChanged,
            ToolErrorKind::FileTooLarge,
            ToolErrorKind::PermissionDenied,
            ToolErrorKind::UserRejected,
            ToolErrorKind::CommandFailed,
            ToolErrorKind::NetworkError,
            ToolErrorKind::ValidationError,
            ToolErrorKind::Timeout,
            ToolErrorKind::TaskError,
            ToolErrorKind::Other,
        ] {
            assert_eq!(ToolErrorKind::from_str(kind.as_str()), Some(kind));
        }
    }
}
