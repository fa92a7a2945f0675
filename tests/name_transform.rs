//! Name cleaning on the way in (host path to member name) and on the way
//! out (member name to extraction path).

use std::path::PathBuf;

use zipwright::{Error, WindowsNameTransform, ZipEntry, ZipNameTransform};

fn host(parts: &[&str]) -> PathBuf {
    parts.iter().collect()
}

// =============================================================================
// Member names
// =============================================================================

#[test]
fn test_member_name_vectors() {
    let t = ZipNameTransform::new();
    let cases = [
        ("plain.txt", "plain.txt"),
        ("dir\\sub\\file.txt", "dir/sub/file.txt"),
        ("C:\\Users\\me\\notes.md", "Users/me/notes.md"),
        ("/etc//passwd", "etc/passwd"),
        ("\\\\server\\share\\doc.txt", "doc.txt"),
        ("what?.txt", "what_.txt"),
        ("tab\there", "tab_here"),
        ("../up.txt", "../up.txt"),
    ];
    for (input, expected) in cases {
        assert_eq!(t.transform_file(input).unwrap(), expected, "input {input:?}");
    }
}

#[test]
fn test_member_directory_names() {
    let t = ZipNameTransform::new();
    assert_eq!(t.transform_directory("a\\b\\").unwrap(), "a/b/");
    assert_eq!(t.transform_directory("a//").unwrap(), "a/");
    assert!(matches!(t.transform_directory("/"), Err(Error::InvalidName { .. })));
}

#[test]
fn test_trim_prefix_is_case_insensitive() {
    let t = ZipNameTransform::with_trim_prefix("C:\\Data\\");
    assert_eq!(t.trim_prefix(), Some("C:/Data/"));
    assert_eq!(t.transform_file("c:\\data\\report.csv").unwrap(), "report.csv");
    assert_eq!(t.transform_file("D:\\data\\report.csv").unwrap(), "data/report.csv");

    let t = ZipNameTransform::with_trim_prefix("/srv");
    assert_eq!(t.transform_file("/srv/www/index.html").unwrap(), "www/index.html");
    assert_eq!(t.transform_file("/srvx/index.html").unwrap(), "srvx/index.html");
}

#[test]
fn test_member_name_validity() {
    assert!(ZipNameTransform::is_valid_name("a/b/c.txt"));
    assert!(!ZipNameTransform::is_valid_name("/abs.txt"));
    assert!(ZipNameTransform::is_valid_name_relaxed("/abs.txt"));
    assert!(!ZipNameTransform::is_valid_name("back\\slash"));
    assert!(!ZipNameTransform::is_valid_name("pipe|name"));
}

#[test]
fn test_too_long_member_name() {
    let t = ZipNameTransform::new();
    let err = t.transform_file(&"n".repeat(70_000)).unwrap_err();
    assert!(matches!(err, Error::NameTooLong { length: 70_000, .. }));
}

#[test]
fn test_entry_clean_name() {
    assert_eq!(ZipEntry::clean_name("C:\\tmp\\x.txt"), "tmp/x.txt");
    assert_eq!(ZipEntry::clean_name("/rooted/y"), "rooted/y");
}

// =============================================================================
// Extraction paths
// =============================================================================

#[test]
fn test_extraction_paths_stay_under_base() {
    let base = host(&["out"]);
    let t = WindowsNameTransform::with_base_directory(&base);
    assert_eq!(t.transform_file("a/b.txt").unwrap(), host(&["out", "a", "b.txt"]));
    assert_eq!(t.transform_file("a/../b.txt").unwrap(), host(&["out", "b.txt"]));
    assert_eq!(t.transform_file("./a/./b.txt").unwrap(), host(&["out", "a", "b.txt"]));
    assert_eq!(t.transform_file("/rooted.txt").unwrap(), host(&["out", "rooted.txt"]));
    assert_eq!(t.transform_directory("dir/").unwrap(), host(&["out", "dir"]));

    for evil in ["../evil", "a/../../evil", "..\\..\\windows\\system32", "x/../../"] {
        let err = t.transform_file(evil).unwrap_err();
        assert!(err.is_security_error(), "{evil:?} gave {err:?}");
    }
}

#[test]
fn test_traversal_can_be_allowed() {
    let t = WindowsNameTransform::with_base_directory("out").allow_parent_traversal(true);
    assert!(t.is_parent_traversal_allowed());
    assert_eq!(t.transform_file("../up.txt").unwrap(), host(&["out", "..", "up.txt"]));
}

#[test]
fn test_reserved_device_names() {
    let t = WindowsNameTransform::new();
    assert_eq!(t.make_valid_name("dir/CON").unwrap(), "dir/_CON");
    assert_eq!(t.make_valid_name("lpt1.txt").unwrap(), "_lpt1.txt");
    assert_eq!(t.make_valid_name("console.txt").unwrap(), "console.txt");
    assert!(!WindowsNameTransform::is_valid_name("nul"));
    assert!(!WindowsNameTransform::is_valid_name("a/../b"));
    assert!(WindowsNameTransform::is_valid_name("a/b"));
}

#[test]
fn test_custom_replacement_and_trimming() {
    let mut t = WindowsNameTransform::new();
    t.set_replacement('#').unwrap();
    assert_eq!(t.make_valid_name("a<b>c").unwrap(), "a#b#c");
    assert!(t.set_replacement('?').is_err());
    assert_eq!(t.replacement(), '#');

    t.set_trim_incoming_paths(true);
    assert_eq!(t.transform_file("deep/nested/leaf.txt").unwrap(), host(&["leaf.txt"]));
}

#[test]
fn test_max_path() {
    let mut t = WindowsNameTransform::new();
    t.set_max_path(10);
    assert!(t.transform_file("0123456789").is_ok());
    assert!(matches!(
        t.transform_file("0123456789a"),
        Err(Error::NameTooLong { length: 11, max: 10 })
    ));
}
