//! Human-readable status-line formatting.

/// Titles longer than this are truncated in log lines.
const MAX_TITLE_LEN: usize = 50;

/// Error messages longer than this collapse to the error-kind name.
const MAX_ERROR_LEN: usize = 50;

/// Formats a dataset for display as `"[productId] title..."`.
#[must_use]
pub fn format_display_title(product_id: i64, title: &str) -> String {
    let truncated: String = title.chars().take(MAX_TITLE_LEN).collect();
    if title.chars().count() > MAX_TITLE_LEN {
        format!("[{product_id}] {truncated}...")
    } else {
        format!("[{product_id}] {truncated}")
    }
}

/// Keeps error log lines scannable: long messages collapse to just the
/// error-kind name.
#[must_use]
pub fn format_error_message(kind: &str, message: &str) -> String {
    if message.chars().count() > MAX_ERROR_LEN {
        kind.to_string()
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_titles_pass_through() {
        assert_eq!(format_display_title(7, "Trade"), "[7] Trade");
    }

    #[test]
    fn long_titles_are_truncated() {
        let title = "A very long dataset title that keeps going well past the cutoff";
        let display = format_display_title(7, title);
        assert!(display.ends_with("..."));
        assert!(display.chars().count() <= MAX_TITLE_LEN + "[7] ...".chars().count());
    }

    #[test]
    fn truncation_respects_multibyte_titles() {
        let title = "é".repeat(80);
        let display = format_display_title(7, &title);
        assert!(display.ends_with("..."));
    }

    #[test]
    fn short_errors_keep_their_message() {
        assert_eq!(
            format_error_message("HttpError", "connection refused"),
            "connection refused"
        );
    }

    #[test]
    fn long_errors_collapse_to_the_kind() {
        let message = "x".repeat(120);
        assert_eq!(format_error_message("HttpError", &message), "HttpError");
    }
}
