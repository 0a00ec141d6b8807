use capture_task_manager::share_path::reconcile;

#[test]
fn sibling_share_replaces_source_path() {
    let result = reconcile(r"\\host\share\", "ProteomicsData", r"..\ProteomicsData2");
    assert_eq!(result.source_path, "ProteomicsData2");
    assert_eq!(result.capture_sub_path, "");
    assert!(result.changed);
}

#[test]
fn sub_path_without_parent_segment_is_unchanged() {
    for capture in [r"Run5", r"Run5\raw", "", r"Run5\..\Other"] {
        let result = reconcile(r"\\host\share\", "ProteomicsData", capture);
        assert_eq!(result.source_path, "ProteomicsData");
        assert_eq!(result.capture_sub_path, capture);
        assert!(!result.changed);
    }
}

#[test]
fn deeper_source_keeps_its_prefix() {
    let result = reconcile(
        r"\\proto-5\Lumos01\",
        r"Data\ProteomicsData",
        r"..\Archive\2024",
    );
    assert_eq!(result.source_path, r"Data\Archive");
    assert_eq!(result.capture_sub_path, "2024");
    assert!(result.changed);
}

#[test]
fn parent_segments_only_is_unchanged() {
    let result = reconcile(r"\\host\share\", r"a\b", r"..\..");
    assert_eq!(result.source_path, r"a\b");
    assert!(!result.changed);
}

#[test]
fn extra_parent_segments_stop_at_the_share_root() {
    let result = reconcile(r"\\host\share\", "ProteomicsData", r"..\..\Other\Run5");
    assert_eq!(result.source_path, "Other");
    assert_eq!(result.capture_sub_path, "Run5");
    assert!(result.changed);
}
