//! Path algebra for capture sub-paths that climb out of the configured source
//! path (`..\OtherShare\Run`), used when an instrument's share name no longer
//! matches the path registered for it. No filesystem access happens here.

use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciled {
    pub source_path: String,
    pub capture_sub_path: String,
    pub changed: bool,
}

fn is_separator(ch: char) -> bool {
    ch == '\\' || ch == '/'
}

pub fn reconcile(share_root: &str, source_path: &str, capture_sub_path: &str) -> Reconciled {
    let unchanged = Reconciled {
        source_path: source_path.to_string(),
        capture_sub_path: capture_sub_path.to_string(),
        changed: false,
    };

    let trimmed = capture_sub_path.trim_start_matches(is_separator);
    if !trimmed.starts_with("..") {
        return unchanged;
    }

    let separator = if share_root.starts_with(r"\\") {
        "\\"
    } else if share_root.starts_with("//") {
        "/"
    } else {
        debug!(share_root, "share root is not a UNC path; leaving capture path as-is");
        return unchanged;
    };

    let capture_segments: Vec<&str> = trimmed
        .split(is_separator)
        .filter(|segment| !segment.is_empty())
        .collect();
    if capture_segments.first() != Some(&"..") {
        return unchanged;
    }

    let mut source_segments: Vec<&str> = source_path
        .split(is_separator)
        .filter(|segment| !segment.is_empty())
        .collect();

    let mut index = 0;
    while capture_segments.get(index) == Some(&"..") {
        if source_segments.pop().is_none() {
            debug!(
                source_path,
                capture_sub_path, "capture sub-path climbs to the share root"
            );
        }
        index += 1;
    }

    let Some(tail) = capture_segments.get(index) else {
        warn!(capture_sub_path, "capture sub-path names no directory");
        return unchanged;
    };
    source_segments.push(tail);

    let mut new_source = source_segments.join(separator);
    if source_path.ends_with(is_separator) {
        new_source.push_str(separator);
    }
    let new_capture = capture_segments[index + 1..].join(separator);

    debug!(
        from_source = source_path,
        from_capture = capture_sub_path,
        to_source = %new_source,
        to_capture = %new_capture,
        "reconciled capture sub-path"
    );
    Reconciled {
        source_path: new_source,
        capture_sub_path: new_capture,
        changed: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_segment_replaces_source_tail() {
        let result = reconcile(r"\\host\share\", "ProteomicsData", r"..\ProteomicsData2");
        assert_eq!(result.source_path, "ProteomicsData2");
        assert_eq!(result.capture_sub_path, "");
        assert!(result.changed);
    }

    #[test]
    fn remainder_becomes_capture_sub_path() {
        let result = reconcile(
            r"\\host\share\",
            r"Instruments\ProteomicsData\",
            r"\..\Archive\2024\Run5",
        );
        assert_eq!(result.source_path, r"Instruments\Archive\");
        assert_eq!(result.capture_sub_path, r"2024\Run5");
        assert!(result.changed);
    }

    #[test]
    fn forward_slash_share_uses_forward_slashes() {
        let result = reconcile("//host/share/", "a/b", "../../c/d");
        assert_eq!(result.source_path, "c");
        assert_eq!(result.capture_sub_path, "d");
        assert!(result.changed);
    }

    #[test]
    fn plain_sub_path_is_unchanged() {
        let result = reconcile(r"\\host\share\", "ProteomicsData", r"Run5\raw");
        assert_eq!(result.source_path, "ProteomicsData");
        assert_eq!(result.capture_sub_path, r"Run5\raw");
        assert!(!result.changed);
    }

    #[test]
    fn local_share_root_is_unchanged() {
        let result = reconcile("/mnt/share/", "ProteomicsData", "../ProteomicsData2");
        assert!(!result.changed);
    }

    #[test]
    fn climbing_past_the_share_root_stops_at_the_root() {
        let result = reconcile(r"\\host\share\", "ProteomicsData", r"..\..\Other\Run5");
        assert_eq!(result.source_path, "Other");
        assert_eq!(result.capture_sub_path, "Run5");
        assert!(result.changed);
    }
}
