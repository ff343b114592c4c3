//! Naming rules: folder/blob keys and column-name sanitization.
//!
//! The folder key `"{product_id}-{slug(title)}"` is the join point between
//! catalog metadata and object-store contents, so slugging and id
//! extraction must round-trip exactly.

/// Builds the folder/blob key for a dataset.
///
/// The title slug keeps alphanumeric characters, spaces, and hyphens,
/// lowercases the result, and collapses runs of whitespace into single
/// hyphens: `create_folder_name(12100163, "International Trade")` is
/// `"12100163-international-trade"`.
#[must_use]
pub fn create_folder_name(product_id: i64, title: &str) -> String {
    let clean: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-')
        .collect();
    let slug = clean
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    format!("{product_id}-{slug}")
}

/// Extracts the product ID from a folder key.
///
/// Takes the substring before the first hyphen and parses it as an
/// integer. Returns `None` for keys that don't follow the convention —
/// callers treat those as non-dataset prefixes, not errors.
#[must_use]
pub fn extract_product_id(folder: &str) -> Option<i64> {
    let (prefix, _) = folder.split_once('-')?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}

/// Sanitizes a single column name for columnar-format compatibility:
/// spaces, slashes, and hyphens become underscores.
#[must_use]
pub fn sanitize_column_name(name: &str) -> String {
    name.replace([' ', '/', '-'], "_")
}

/// Sanitizes a full header row. The same rule is applied by the header
/// pre-scan and the conversion itself, so the two can never drift.
#[must_use]
pub fn sanitize_column_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names
        .iter()
        .map(|n| sanitize_column_name(n.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_folder_names() {
        assert_eq!(
            create_folder_name(12_100_163, "International Trade"),
            "12100163-international-trade"
        );
        assert_eq!(
            create_folder_name(43_100_050, "Immigrant income, by year (x 1,000)"),
            "43100050-immigrant-income-by-year-x-1000"
        );
    }

    #[test]
    fn folder_name_round_trips_product_id() {
        for (id, title) in [
            (12_100_163, "International Trade"),
            (1, ""),
            (98_100_524, "Languages — détail / summary"),
            (7, "   spaced   out   "),
        ] {
            let folder = create_folder_name(id, title);
            assert_eq!(extract_product_id(&folder), Some(id), "folder {folder:?}");
        }
    }

    #[test]
    fn rejects_malformed_folder_keys() {
        assert_eq!(extract_product_id("catalog"), None);
        assert_eq!(extract_product_id("notanumber-title"), None);
        assert_eq!(extract_product_id("-leading-hyphen"), None);
        assert_eq!(extract_product_id("12x34-title"), None);
        assert_eq!(extract_product_id(""), None);
    }

    #[test]
    fn sanitizes_column_names() {
        let names = ["Ref Date", "GEO/Region", "Value-Added", "plain"];
        assert_eq!(
            sanitize_column_names(&names),
            vec!["Ref_Date", "GEO_Region", "Value_Added", "plain"]
        );
    }

    #[test]
    fn sanitization_is_idempotent() {
        let names = ["Ref Date", "GEO/Region", "Value-Added"];
        let once = sanitize_column_names(&names);
        let twice = sanitize_column_names(&once);
        assert_eq!(once, twice);
    }
}
