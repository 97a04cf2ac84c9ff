use fileroot_core::{ErrorKind, FileError, ManagerConfig, PathResolver};
use tempfile::TempDir;

#[test]
fn test_resolve_never_leaves_root() {
    let dir = TempDir::new().unwrap();
    let resolver = PathResolver::new(dir.path()).unwrap();

    let prefixes = ["", "/", "//", "./", "\\", "a/", "a/b/", "/a/b/c/"];
    let climbs = ["", "..", "../..", "../../..", "..\\..", "./../", "x/../../"];
    let tails = ["", "etc/passwd", "../etc", "a/./b", "..."];

    for prefix in prefixes {
        for climb in climbs {
            for tail in tails {
                let input = format!("{prefix}{climb}/{tail}");
                match resolver.resolve_lexical(&input) {
                    Ok(resolved) => {
                        assert!(
                            resolved.as_path().starts_with(resolver.root()),
                            "{input} resolved outside root: {}",
                            resolved.as_path().display()
                        );
                        assert!(!resolved.relative().split('/').any(|s| s == ".."));
                    }
                    Err(err) => assert_eq!(err.kind(), ErrorKind::PathEscape, "{input}"),
                }
            }
        }
    }
}

#[test]
fn test_etc_passwd_scenario() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    std::fs::create_dir(&data).unwrap();
    let resolver = PathResolver::new(&data).unwrap();

    let err = resolver.resolve("../../etc/passwd", true).unwrap_err();
    assert!(matches!(err, FileError::PathEscape { .. }));
}

#[test]
fn test_resolver_rejects_file_root() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("plain.txt");
    std::fs::write(&file, b"not a dir").unwrap();

    assert!(matches!(
        PathResolver::new(&file),
        Err(FileError::NotADirectory { .. })
    ));
    assert!(matches!(
        PathResolver::new(dir.path().join("missing")),
        Err(FileError::NotFound { .. })
    ));
}

#[test]
fn test_config_roundtrips_through_serde_defaults() {
    let config: ManagerConfig = serde_json::from_str(r#"{ "root": "/srv/files" }"#).unwrap();
    assert_eq!(config.max_upload_size, 300 * 1024 * 1024);
    assert_eq!(config.feed_retry_ms, 2000);
    assert!(!config.show_hidden);
    assert!(config.filters().extensions().any(|ext| ext == "mp4"));
}
