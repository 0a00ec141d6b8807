use std::fs;

use camino::Utf8PathBuf;

use capture_task_manager::domain::DatasetType;
use capture_task_manager::normalizer::Substitutions;
use capture_task_manager::resolver::DatasetResolver;
use capture_task_manager::taxonomy::InstrumentClass;

fn temp_source() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

#[test]
fn single_file_resolves_as_file() {
    let (_temp, root) = temp_source();
    fs::write(root.join("Sample1.raw").as_std_path(), b"raw").unwrap();

    let resolution = DatasetResolver::default()
        .resolve(&root, "Sample1", true)
        .unwrap();
    let info = resolution.info;
    assert_eq!(info.dataset_type, DatasetType::File);
    assert_eq!(info.file_or_directory_name, "Sample1.raw");
    assert_eq!(info.files, vec!["Sample1.raw"]);
    assert!(info.related_files.is_empty());
}

#[test]
fn several_matching_files_resolve_as_multi_file() {
    let (_temp, root) = temp_source();
    fs::write(root.join("Sample1.d1").as_std_path(), b"1").unwrap();
    fs::write(root.join("Sample1.d2").as_std_path(), b"2").unwrap();

    let info = DatasetResolver::default()
        .resolve(&root, "Sample1", true)
        .unwrap()
        .info;
    assert_eq!(info.dataset_type, DatasetType::MultiFile);
    assert_eq!(info.file_or_directory_name, "Sample1");
    let mut files = info.files.clone();
    files.sort();
    assert_eq!(files, vec!["Sample1.d1", "Sample1.d2"]);
}

#[test]
fn hand_edited_name_matches_after_normalization() {
    let (_temp, root) = temp_source();
    fs::write(root.join("Sample 1.raw").as_std_path(), b"raw").unwrap();

    let info = DatasetResolver::default()
        .resolve(&root, "Sample_1", true)
        .unwrap()
        .info;
    assert_eq!(info.dataset_type, DatasetType::File);
    assert_eq!(info.file_or_directory_name, "Sample 1.raw");
}

#[test]
fn custom_substitutions_are_used() {
    let (_temp, root) = temp_source();
    fs::write(root.join("Run#4.raw").as_std_path(), b"raw").unwrap();

    let resolver = DatasetResolver::new(Substitutions::new(vec![('#', "num".to_string())]));
    let info = resolver.resolve(&root, "Runnum4", true).unwrap().info;
    assert_eq!(info.file_or_directory_name, "Run#4.raw");
}

#[test]
fn empty_directory_resolves_to_none() {
    let (_temp, root) = temp_source();
    let info = DatasetResolver::default()
        .resolve(&root, "Sample1", true)
        .unwrap()
        .info;
    assert_eq!(info.dataset_type, DatasetType::None);
    assert!(!info.is_found());
}

#[test]
fn missing_source_directory_resolves_to_none() {
    let (_temp, root) = temp_source();
    let info = DatasetResolver::default()
        .resolve(&root.join("gone"), "Sample1", false)
        .unwrap()
        .info;
    assert_eq!(info.dataset_type, DatasetType::None);
}

#[test]
fn directory_without_extension() {
    let (_temp, root) = temp_source();
    fs::create_dir_all(root.join("Sample1").as_std_path()).unwrap();

    let resolution = DatasetResolver::default()
        .resolve(&root, "Sample1", false)
        .unwrap();
    assert!(resolution.matched_directory);
    assert_eq!(resolution.info.dataset_type, DatasetType::DirectoryNoExt);
    assert_eq!(resolution.info.file_or_directory_name, "Sample1");
}

#[test]
fn bruker_imaging_overrides_directory_type() {
    let (_temp, root) = temp_source();
    fs::create_dir_all(root.join("Tissue_A.d").as_std_path()).unwrap();

    let resolver = DatasetResolver::default();
    let imaging = resolver
        .resolve_for_instrument(&root, "Tissue_A", false, InstrumentClass::BrukerMaldiImaging)
        .unwrap();
    assert_eq!(imaging.info.dataset_type, DatasetType::BrukerImaging);

    let spot = resolver
        .resolve_for_instrument(&root, "Tissue_A", false, InstrumentClass::BrukerMaldiSpot)
        .unwrap();
    assert_eq!(spot.info.dataset_type, DatasetType::BrukerSpot);

    let other = resolver
        .resolve_for_instrument(&root, "Tissue_A", false, InstrumentClass::BrukerTofBaf)
        .unwrap();
    assert_eq!(other.info.dataset_type, DatasetType::DirectoryExt);
}

#[test]
fn bruker_override_leaves_file_matches_alone() {
    let (_temp, root) = temp_source();
    fs::write(root.join("Tissue_A.zip").as_std_path(), b"zip").unwrap();

    let info = DatasetResolver::default()
        .resolve_for_instrument(&root, "Tissue_A", true, InstrumentClass::BrukerMaldiImaging)
        .unwrap()
        .info;
    assert_eq!(info.dataset_type, DatasetType::File);
}

#[test]
fn realtime_search_sidecars_are_related_files() {
    let (_temp, root) = temp_source();
    fs::write(root.join("Run5.raw").as_std_path(), b"raw").unwrap();
    fs::write(
        root.join("Run5_2024-03-01_RealTimeSearch.tsv").as_std_path(),
        b"tsv",
    )
    .unwrap();
    fs::write(
        root.join("Run5_2024-03-01_realtimelibsearch.tsv").as_std_path(),
        b"tsv",
    )
    .unwrap();
    fs::write(root.join("Run6_x_realtimesearch.tsv").as_std_path(), b"tsv").unwrap();

    let info = DatasetResolver::default()
        .resolve(&root, "Run5", true)
        .unwrap()
        .info;
    assert_eq!(info.dataset_type, DatasetType::File);
    let mut related = info.related_files.clone();
    related.sort();
    assert_eq!(
        related,
        vec![
            "Run5_2024-03-01_RealTimeSearch.tsv",
            "Run5_2024-03-01_realtimelibsearch.tsv",
        ]
    );
}
