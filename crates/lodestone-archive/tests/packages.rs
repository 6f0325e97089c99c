//! End-to-end package extraction and discovery scenarios.

use std::any::Any;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use url::Url;

use lodestone_archive::{ArchiveError, PackageHandler};
use lodestone_resolver::{
    Artifact, BinaryLoader, LoadedBinary, LogRelay, RemoteFetcher, ResolveError, Resolver,
    ResolverResult,
};

const MAGIC: &[u8] = b"LODE";

#[derive(Debug)]
struct FakeBinary {
    path: PathBuf,
}

impl LoadedBinary for FakeBinary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MagicLoader;

impl BinaryLoader for MagicLoader {
    fn load(&self, path: &Path) -> ResolverResult<Artifact> {
        let bytes = std::fs::read(path).map_err(|e| ResolveError::LoadFailure {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if !bytes.starts_with(MAGIC) {
            return Err(ResolveError::LoadFailure {
                path: path.to_path_buf(),
                message: "bad magic".into(),
            });
        }
        Ok(Arc::new(FakeBinary {
            path: path.to_path_buf(),
        }))
    }
}

/// Loader that counts how discovery validates files: cheap probes versus
/// full loads.
#[derive(Default)]
struct ProbeCountingLoader {
    probes: AtomicUsize,
    loads: AtomicUsize,
}

impl BinaryLoader for ProbeCountingLoader {
    fn load(&self, path: &Path) -> ResolverResult<Artifact> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        MagicLoader.load(path)
    }

    fn probe(&self, path: &Path) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        MagicLoader.load(path).is_ok()
    }
}

#[derive(Default)]
struct CountingFetcher {
    responses: Mutex<HashMap<String, Vec<u8>>>,
    calls: AtomicUsize,
}

impl CountingFetcher {
    fn serve(&self, url: &str, bytes: &[u8]) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes.to_vec());
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteFetcher for CountingFetcher {
    async fn fetch(&self, url: &Url) -> ResolverResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.responses.lock().unwrap().get(url.as_str()).cloned();
        response.ok_or_else(|| ResolveError::DownloadFailure {
            url: url.to_string(),
            message: "no canned response".into(),
        })
    }
}

fn valid_binary(tag: &[u8]) -> Vec<u8> {
    let mut bytes = MAGIC.to_vec();
    bytes.extend_from_slice(tag);
    bytes
}

fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for &(path, data) in entries {
        writer.start_file(path, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn write_zip(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, build_zip(entries)).unwrap();
    path
}

fn handler_with(fetcher: Arc<CountingFetcher>) -> (Arc<Resolver>, PackageHandler) {
    handler_with_loader(fetcher, Arc::new(MagicLoader))
}

fn handler_with_loader(
    fetcher: Arc<CountingFetcher>,
    loader: Arc<dyn BinaryLoader>,
) -> (Arc<Resolver>, PackageHandler) {
    let resolver = Arc::new(Resolver::new(fetcher, loader, Arc::new(LogRelay::new())));
    let handler = PackageHandler::new(Arc::clone(&resolver));
    (resolver, handler)
}

#[tokio::test]
async fn all_existing_candidate_dirs_are_processed_in_priority_order() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(
        tmp.path(),
        "Pkg.zip",
        &[
            ("lib/net35/A.dll", &valid_binary(b"a")),
            ("net35/B.dll", &valid_binary(b"b")),
            // Same stem in two candidate dirs: the higher-priority
            // directory must win.
            ("lib/net35/Dup.dll", &valid_binary(b"high")),
            ("35/Dup.dll", &valid_binary(b"low")),
            ("docs/ignored.dll", &valid_binary(b"never searched")),
        ],
    );

    let (resolver, handler) = handler_with(Arc::new(CountingFetcher::default()));
    handler.startup(tmp.path()).await.unwrap();
    handler.add_package(&archive, None).unwrap();

    let extraction = tmp.path().join("cache").join("nupkg").join("Pkg");
    assert_eq!(
        resolver.lookup_local("A"),
        Some(extraction.join("lib/net35/A.dll"))
    );
    assert_eq!(
        resolver.lookup_local("B"),
        Some(extraction.join("net35/B.dll"))
    );
    assert_eq!(
        resolver.lookup_local("Dup"),
        Some(extraction.join("lib/net35/Dup.dll")),
        "priority order decides which duplicate wins"
    );
    assert!(
        resolver.lookup_local("ignored").is_none(),
        "non-candidate dirs are never searched"
    );
}

#[tokio::test]
async fn extraction_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(
        tmp.path(),
        "Pkg.zip",
        &[("net35/A.dll", &valid_binary(b"a"))],
    );

    let (resolver, handler) = handler_with(Arc::new(CountingFetcher::default()));
    handler.startup(tmp.path()).await.unwrap();
    handler.add_package(&archive, None).unwrap();
    assert!(resolver.lookup_local("A").is_some());

    // Rewrite the archive with different contents. The extraction
    // directory already exists, so a second add must be a filesystem
    // no-op and the new entry must not appear.
    write_zip(
        tmp.path(),
        "Pkg.zip",
        &[("net35/New.dll", &valid_binary(b"new"))],
    );
    handler.add_package(&archive, None).unwrap();

    let extraction = tmp.path().join("cache").join("nupkg").join("Pkg");
    assert!(extraction.join("net35/A.dll").exists());
    assert!(!extraction.join("net35/New.dll").exists());
    assert!(resolver.lookup_local("New").is_none());
}

#[tokio::test]
async fn hint_restricts_discovery_to_one_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(
        tmp.path(),
        "Pkg.zip",
        &[
            ("custom/inner/A.dll", &valid_binary(b"a")),
            ("net35/B.dll", &valid_binary(b"b")),
        ],
    );

    let (resolver, handler) = handler_with(Arc::new(CountingFetcher::default()));
    handler.startup(tmp.path()).await.unwrap();
    handler
        .add_package(&archive, Some(Path::new("custom/inner")))
        .unwrap();

    assert!(resolver.lookup_local("A").is_some());
    assert!(
        resolver.lookup_local("B").is_none(),
        "candidate list is not walked when a hint is given"
    );
}

#[tokio::test]
async fn discovery_validates_with_probe_not_load() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(
        tmp.path(),
        "Pkg.zip",
        &[
            ("net35/A.dll", &valid_binary(b"a")),
            ("net35/B.dll", &valid_binary(b"b")),
        ],
    );

    let loader = Arc::new(ProbeCountingLoader::default());
    let (resolver, handler) = handler_with_loader(
        Arc::new(CountingFetcher::default()),
        Arc::clone(&loader) as Arc<dyn BinaryLoader>,
    );
    handler.startup(tmp.path()).await.unwrap();
    handler.add_package(&archive, None).unwrap();

    assert!(resolver.lookup_local("A").is_some());
    assert!(resolver.lookup_local("B").is_some());
    assert_eq!(loader.probes.load(Ordering::SeqCst), 2);
    assert_eq!(
        loader.loads.load(Ordering::SeqCst),
        0,
        "discovery uses the cheap probe, not a full load"
    );
}

#[tokio::test]
async fn hint_escaping_the_extraction_directory_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(
        tmp.path(),
        "Pkg.zip",
        &[("net35/A.dll", &valid_binary(b"a"))],
    );

    // A binary sitting outside the package cache must stay invisible even
    // if a hint points at its directory.
    let outside = tmp.path().join("Outside.dll");
    std::fs::write(&outside, valid_binary(b"outside")).unwrap();

    let (resolver, handler) = handler_with(Arc::new(CountingFetcher::default()));
    handler.startup(tmp.path()).await.unwrap();

    let err = handler
        .add_package(&archive, Some(Path::new("../../..")))
        .unwrap_err();
    assert!(matches!(err, ArchiveError::InvalidHint(_)));

    let err = handler
        .add_package_from_url("Pkg.zip", "http://x/Pkg.zip", Some(Path::new("/tmp")))
        .await
        .unwrap_err();
    assert!(matches!(err, ArchiveError::InvalidHint(_)));

    assert!(resolver.lookup_local("Outside").is_none());
}

#[tokio::test]
async fn damaged_binary_is_deleted_and_never_registered() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(
        tmp.path(),
        "Pkg.zip",
        &[
            ("net35/Good.dll", &valid_binary(b"ok")),
            ("net35/Bad.dll", b"no magic here"),
        ],
    );

    let (resolver, handler) = handler_with(Arc::new(CountingFetcher::default()));
    handler.startup(tmp.path()).await.unwrap();
    handler.add_package(&archive, None).unwrap();

    let extraction = tmp.path().join("cache").join("nupkg").join("Pkg");
    assert!(resolver.lookup_local("Good").is_some());
    assert!(resolver.lookup_local("Bad").is_none());
    assert!(
        !extraction.join("net35/Bad.dll").exists(),
        "damaged binary is removed from disk"
    );
}

#[tokio::test]
async fn packages_added_before_startup_are_buffered_and_drained_once() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(
        tmp.path(),
        "Pkg.zip",
        &[("net35/A.dll", &valid_binary(b"a"))],
    );

    let (resolver, handler) = handler_with(Arc::new(CountingFetcher::default()));
    handler.add_package(&archive, None).unwrap();
    assert!(!handler.is_started());
    assert!(
        !tmp.path().join("cache").exists(),
        "nothing is processed before startup"
    );
    assert!(resolver.lookup_local("A").is_none());

    handler.startup(tmp.path()).await.unwrap();
    assert!(handler.is_started());
    assert!(resolver.lookup_local("A").is_some());

    // A second startup is a no-op.
    handler.startup(tmp.path()).await.unwrap();
}

#[tokio::test]
async fn remote_package_downloads_once_then_reuses_cached_archive() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(CountingFetcher::default());
    fetcher.serve(
        "http://x/pkgs/Pkg.zip",
        &build_zip(&[("net35/A.dll", &valid_binary(b"a"))]),
    );

    let (resolver, handler) = handler_with(Arc::clone(&fetcher));
    handler.startup(tmp.path()).await.unwrap();
    handler
        .add_package_from_url("Pkg.zip", "http://x/pkgs/Pkg.zip", None)
        .await
        .unwrap();

    let package_dir = tmp.path().join("cache").join("nupkg");
    assert!(package_dir.join("Pkg.zip").is_file());
    assert!(resolver.lookup_local("A").is_some());
    assert_eq!(fetcher.calls(), 1);

    // The archive is already on disk: no second download.
    handler
        .add_package_from_url("Pkg.zip", "http://x/pkgs/Pkg.zip", None)
        .await
        .unwrap();
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn remote_package_added_before_startup_is_fetched_at_startup() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(CountingFetcher::default());
    fetcher.serve(
        "http://x/pkgs/Pkg.zip",
        &build_zip(&[("net35/A.dll", &valid_binary(b"a"))]),
    );

    let (resolver, handler) = handler_with(Arc::clone(&fetcher));
    handler
        .add_package_from_url("Pkg.zip", "http://x/pkgs/Pkg.zip", None)
        .await
        .unwrap();
    assert_eq!(fetcher.calls(), 0);

    handler.startup(tmp.path()).await.unwrap();
    assert_eq!(fetcher.calls(), 1);
    assert!(resolver.lookup_local("A").is_some());
}

#[tokio::test]
async fn missing_archive_surfaces_at_registration() {
    let tmp = tempfile::tempdir().unwrap();
    let (_resolver, handler) = handler_with(Arc::new(CountingFetcher::default()));
    handler.startup(tmp.path()).await.unwrap();

    let err = handler
        .add_package(&tmp.path().join("absent.zip"), None)
        .unwrap_err();
    assert!(matches!(err, ArchiveError::ArchiveNotFound(_)));
}

#[tokio::test]
async fn malformed_package_url_surfaces_at_registration() {
    let tmp = tempfile::tempdir().unwrap();
    let (_resolver, handler) = handler_with(Arc::new(CountingFetcher::default()));
    handler.startup(tmp.path()).await.unwrap();

    let err = handler
        .add_package_from_url("Pkg.zip", "not a url", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ArchiveError::Resolve(ResolveError::InvalidUrl { .. })
    ));
}
