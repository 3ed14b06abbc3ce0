//! Shortcode inventory.
//!
//! Scans a raw body for shortcode calls: `{{< name args >}}` (output
//! inserted as-is) and `{{% name args %}}` (output processed as markup).
//! Closing tags and commented-out calls (`{{</* name */>}}`) are skipped.

use std::sync::LazyLock;

use regex::Regex;

static SHORTCODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{([<%])\s*(/\*)?\s*(/)?\s*([A-Za-z0-9_./-]+)").unwrap()
});

/// One shortcode call in a body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shortcode {
    /// Shortcode name (e.g., `figure`, `docs/note`).
    pub name: String,
    /// Position among the calls of the body, from 0.
    pub ordinal: usize,
    /// Called with `{{% %}}` delimiters.
    pub markdown: bool,
    /// Byte offset of the call in the body.
    pub offset: usize,
}

/// Every shortcode call in `body`, in order.
#[must_use]
pub fn scan(body: &str) -> Vec<Shortcode> {
    SHORTCODE_RE
        .captures_iter(body)
        .filter(|caps| caps.get(2).is_none() && caps.get(3).is_none())
        .enumerate()
        .filter_map(|(ordinal, caps)| {
            let whole = caps.get(0)?;
            Some(Shortcode {
                name: caps.get(4)?.as_str().to_owned(),
                ordinal,
                markdown: caps.get(1)?.as_str() == "%",
                offset: whole.start(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_scan_both_delimiters() {
        let body = "Intro {{< figure src=\"a.png\" >}}\n\n{{% note %}}Careful{{% /note %}}\n";

        let found = scan(body);

        assert_eq!(
            found,
            vec![
                Shortcode {
                    name: "figure".to_owned(),
                    ordinal: 0,
                    markdown: false,
                    offset: 6,
                },
                Shortcode {
                    name: "note".to_owned(),
                    ordinal: 1,
                    markdown: true,
                    offset: 34,
                },
            ]
        );
    }

    #[test]
    fn test_scan_skips_comments_and_closing_tags() {
        let body = "{{</* figure */>}} {{< /tabs >}} {{<docs/tabs>}}";

        let names: Vec<String> = scan(body).into_iter().map(|s| s.name).collect();

        assert_eq!(names, vec!["docs/tabs".to_owned()]);
    }

    #[test]
    fn test_scan_plain_body() {
        assert!(scan("no {{ template }} calls here").is_empty());
    }
}
