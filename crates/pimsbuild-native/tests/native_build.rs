//! Integration tests for the native build against a tiny source archive.

use pimsbuild_core::{NativeConfig, SharedEnv, TimeoutConfig};
use pimsbuild_native::{
    archive, BuildFailure, NativeBuild, NativeBuildRequest, NativeDependencyBuilder, NativeStep,
};
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;

/// Packs `vips-0.0.1/configure` into a gzipped tarball and returns its path.
fn make_source_archive(root: &Path) -> PathBuf {
    let tree = root.join("tree");
    let src = tree.join("vips-0.0.1");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(
        src.join("configure"),
        "echo \"$@\" > configure.args\necho \"$PIMS_NATIVE_MARK\" > env.txt\n",
    )
    .unwrap();

    let archive = root.join("vips-0.0.1.tar.gz");
    let status = StdCommand::new("tar")
        .arg("-czf")
        .arg(&archive)
        .arg("-C")
        .arg(&tree)
        .arg("vips-0.0.1")
        .status()
        .unwrap();
    assert!(status.success());
    archive
}

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

fn native_config(archive: &Path) -> NativeConfig {
    NativeConfig {
        version: "0.0.1".to_string(),
        source: archive.to_string_lossy().to_string(),
        jobs: 2,
        configure: vec![
            "sh".to_string(),
            "./configure".to_string(),
            "--prefix={prefix}".to_string(),
        ],
        compile: sh("echo jobs={jobs} > built.txt"),
        install: sh(
            "mkdir -p {prefix}/lib/pkgconfig && cp built.txt configure.args env.txt {prefix}/lib/ \
             && echo 'Name: vips' > {prefix}/lib/pkgconfig/vips.pc",
        ),
        ..NativeConfig::default()
    }
}

fn request(config: &NativeConfig, root: &Path) -> NativeBuildRequest {
    NativeBuildRequest::from_config(
        config,
        &root.join("variant/native"),
        &root.join("variant/scratch"),
        &SharedEnv::new().with("PIMS_NATIVE_MARK", "shared"),
    )
}

/// Test: a full build installs into the prefix and cleans up scratch.
#[tokio::test]
async fn test_build_installs_into_prefix() {
    let root = tempfile::tempdir().unwrap();
    let archive_path = make_source_archive(root.path());
    let expected_sha = archive::sha256_hex(&std::fs::read(&archive_path).unwrap());

    let mut config = native_config(&archive_path);
    config.sha256 = Some(expected_sha.clone());
    config.config_options = vec!["--without-magick".to_string()];
    let req = request(&config, root.path());

    let builder = NativeDependencyBuilder::new(&config, &TimeoutConfig::default());
    let installed = builder.build(&req).await.expect("native build succeeds");

    assert_eq!(installed.prefix, req.prefix);
    assert_eq!(installed.version, "0.0.1");
    assert_eq!(installed.archive_sha256, expected_sha);
    assert!(installed.pkgconfig_dir.join("vips.pc").is_file());

    let args = std::fs::read_to_string(installed.lib_dir.join("configure.args")).unwrap();
    assert_eq!(
        args.trim(),
        format!("--prefix={} --without-magick", req.prefix.display())
    );
    let built = std::fs::read_to_string(installed.lib_dir.join("built.txt")).unwrap();
    assert_eq!(built.trim(), "jobs=2");
    let env = std::fs::read_to_string(installed.lib_dir.join("env.txt")).unwrap();
    assert_eq!(env.trim(), "shared");

    assert!(!req.scratch.exists(), "scratch is always removed");
}

/// Test: a failing install step leaves no partial prefix behind.
#[tokio::test]
async fn test_failed_install_removes_prefix() {
    let root = tempfile::tempdir().unwrap();
    let archive_path = make_source_archive(root.path());

    let mut config = native_config(&archive_path);
    config.install = sh("mkdir -p {prefix}/lib && touch {prefix}/lib/partial.so && exit 4");
    let req = request(&config, root.path());

    let err = NativeDependencyBuilder::new(&config, &TimeoutConfig::default())
        .build(&req)
        .await
        .unwrap_err();

    assert_eq!(err.step(), NativeStep::Install);
    assert!(err.to_string().contains("exited with code 4"), "{err}");
    assert!(!req.prefix.exists());
    assert!(!req.scratch.exists());
}

/// Test: a checksum mismatch fails before anything is extracted.
#[tokio::test]
async fn test_checksum_mismatch_fails_fetch() {
    let root = tempfile::tempdir().unwrap();
    let archive_path = make_source_archive(root.path());

    let mut config = native_config(&archive_path);
    config.sha256 = Some("deadbeef".to_string());
    let req = request(&config, root.path());

    let err = NativeDependencyBuilder::new(&config, &TimeoutConfig::default())
        .build(&req)
        .await
        .unwrap_err();

    assert!(matches!(err, BuildFailure::ChecksumMismatch { .. }));
    assert_eq!(err.step(), NativeStep::Fetch);
    assert!(!req.prefix.exists());
}

/// Test: a compile step running past its timeout is a timeout failure.
#[tokio::test]
async fn test_compile_timeout() {
    let root = tempfile::tempdir().unwrap();
    let archive_path = make_source_archive(root.path());

    let mut config = native_config(&archive_path);
    config.compile = vec!["sleep".to_string(), "10".to_string()];
    let timeouts = TimeoutConfig {
        compile: 1,
        ..TimeoutConfig::default()
    };
    let req = request(&config, root.path());

    let err = NativeDependencyBuilder::new(&config, &timeouts)
        .build(&req)
        .await
        .unwrap_err();

    assert_eq!(err.step(), NativeStep::Compile);
    assert!(err.is_timeout());
    assert!(!req.prefix.exists());
}

/// Test: an archive that is not a tarball fails at extraction.
#[tokio::test]
async fn test_corrupt_archive_fails_extract() {
    let root = tempfile::tempdir().unwrap();
    let bogus = root.path().join("vips.tar.gz");
    std::fs::write(&bogus, b"not a tarball").unwrap();

    let config = native_config(&bogus);
    let req = request(&config, root.path());

    let err = NativeDependencyBuilder::new(&config, &TimeoutConfig::default())
        .build(&req)
        .await
        .unwrap_err();
    assert_eq!(err.step(), NativeStep::Extract);
}
