//! Remote build client.
//!
//! The project is zipped in memory and submitted to a build service, which
//! is polled until it settles. The finished bundle is then downloaded over
//! the local one.

use std::io::{Cursor, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use url::Url;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::core::bundle::BUNDLE_FILENAME;
use crate::core::context::Context;
use crate::core::runnable::BuildResult;
use crate::error::{Error, Result};
use crate::util::shell::{Shell, Status};

/// Status document reported by the build service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    #[serde(default)]
    pub uuid: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub has_bundle: bool,

    #[serde(default)]
    pub results: Vec<BuildResult>,
}

impl BuildStatus {
    fn is_settled(&self) -> bool {
        self.status == "completed" || self.status == "failed"
    }
}

#[derive(Debug, Deserialize)]
struct BuildStarted {
    uuid: String,
}

/// Transport to a remote build service.
pub trait BuildService {
    /// Submit a source archive, returning the build's uuid.
    fn start(&self, identifier: &str, archive: Vec<u8>) -> Result<String>;

    /// Current status. Errors are treated as transient by the poll loop.
    fn status(&self, uuid: &str) -> Result<BuildStatus>;

    /// Final status including every build result.
    fn results(&self, uuid: &str) -> Result<BuildStatus>;

    /// Stream the finished bundle into `dest`.
    fn download_bundle(&self, uuid: &str, dest: &mut dyn Write) -> Result<()>;
}

/// [`BuildService`] over HTTP.
pub struct HttpBuildService {
    client: reqwest::blocking::Client,
    base: Url,
}

impl HttpBuildService {
    pub fn new(endpoint: &str) -> Result<Self> {
        let mut base = Url::parse(endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("runway/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(HttpBuildService { client, base })
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(&format!("api/v1/build/source/{path}"))?)
    }
}

fn expect_status(
    resp: reqwest::blocking::Response,
    stage: &'static str,
    expected: reqwest::StatusCode,
) -> Result<reqwest::blocking::Response> {
    if resp.status() == expected {
        Ok(resp)
    } else {
        Err(Error::RemoteStatus {
            stage,
            status: resp.status().as_u16(),
        })
    }
}

impl BuildService for HttpBuildService {
    fn start(&self, identifier: &str, archive: Vec<u8>) -> Result<String> {
        let resp = self.client.post(self.url(identifier)?).body(archive).send()?;
        let started: BuildStarted =
            expect_status(resp, "start", reqwest::StatusCode::CREATED)?.json()?;
        Ok(started.uuid)
    }

    fn status(&self, uuid: &str) -> Result<BuildStatus> {
        let resp = self.client.get(self.url(&format!("{uuid}/status"))?).send()?;
        Ok(expect_status(resp, "status", reqwest::StatusCode::OK)?.json()?)
    }

    fn results(&self, uuid: &str) -> Result<BuildStatus> {
        let resp = self.client.get(self.url(&format!("{uuid}/results"))?).send()?;
        Ok(expect_status(resp, "results", reqwest::StatusCode::OK)?.json()?)
    }

    fn download_bundle(&self, uuid: &str, dest: &mut dyn Write) -> Result<()> {
        let mut url = self.url(&format!("{uuid}/bundle"))?;
        url.query_pairs_mut().append_pair("shouldDelete", "true");

        let resp = self.client.get(url).send()?;
        let mut resp = expect_status(resp, "bundle", reqwest::StatusCode::OK)?;
        resp.copy_to(dest)?;
        Ok(())
    }
}

/// Zip the project rooted at `root`, leaving out the previous bundle.
///
/// Entries use slash-separated paths relative to `root`; directories get
/// their own entries so empty ones survive.
pub fn archive_project(root: &Path) -> Result<Vec<u8>> {
    let bundle = root.join(BUNDLE_FILENAME);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            Error::io("walk", path, e.into())
        })?;

        if entry.path() == bundle {
            continue;
        }

        let rel = crate::util::fs::to_slash(&crate::util::fs::relative_path(root, entry.path()));

        if entry.file_type().is_dir() {
            zip.add_directory(rel, options)?;
        } else if entry.file_type().is_file() {
            zip.start_file(rel, options)?;
            let contents = crate::util::fs::read(entry.path())?;
            zip.write_all(&contents)
                .map_err(|e| Error::io("archive", entry.path(), e))?;
        }
    }

    Ok(zip.finish()?.into_inner())
}

/// Build the project through `service` and install the resulting bundle.
///
/// Returns every result the service reported, also when some failed.
pub fn build_remote(
    shell: &Shell,
    ctx: &mut Context,
    service: &dyn BuildService,
    poll_interval: Duration,
) -> Result<Vec<BuildResult>> {
    let identifier = ctx.require_directive("remote build")?.identifier.clone();

    shell.note("preparing remote build");
    let archive = archive_project(&ctx.cwd)?;
    tracing::debug!("source archive is {} bytes", archive.len());

    shell.note("starting remote build");
    let uuid = service.start(&identifier, archive)?;
    tracing::debug!("remote build {uuid} started");

    let mut last = String::new();
    let status = loop {
        match service.status(&uuid) {
            Ok(status) => {
                if status.status != last {
                    shell.note(format!("build has {}", status.status));
                    last = status.status.clone();
                }
                if status.is_settled() {
                    break status;
                }
            }
            Err(e) => shell.warn(format!("status check failed: {e}... will retry")),
        }

        thread::sleep(poll_interval);
    };

    let final_status = service.results(&uuid)?;
    for result in &final_status.results {
        if result.succeeded {
            shell.note(format!("built:\n{}", result.output_log));
        } else {
            shell.status(Status::Failed, format!("failed:\n{}", result.output_log));
        }
    }

    if status.status == "failed" {
        return Err(Error::RemoteBuildFailed(uuid));
    }

    if !final_status.has_bundle {
        return Err(Error::MissingBundle);
    }

    shell.status(Status::Downloading, "build result");

    let mut tmp = tempfile::NamedTempFile::new_in(&ctx.cwd)
        .map_err(|e| Error::io("create temporary file", &ctx.cwd, e))?;
    service.download_bundle(&uuid, tmp.as_file_mut())?;
    tmp.persist(&ctx.bundle.path)
        .map_err(|e| Error::io("persist", &ctx.bundle.path, e.error))?;
    ctx.bundle.exists = true;

    shell.status(Status::Finished, "remote build complete");

    Ok(final_status.results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io::Read;

    use crate::core::directive::Directive;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeService {
        statuses: RefCell<VecDeque<Result<BuildStatus>>>,
        results: BuildStatus,
        archive: RefCell<Vec<u8>>,
        downloads: RefCell<usize>,
    }

    fn status(s: &str) -> Result<BuildStatus> {
        Ok(BuildStatus {
            status: s.to_string(),
            ..Default::default()
        })
    }

    impl BuildService for FakeService {
        fn start(&self, identifier: &str, archive: Vec<u8>) -> Result<String> {
            assert_eq!(identifier, "com.suborbital.app");
            *self.archive.borrow_mut() = archive;
            Ok("b-42".to_string())
        }

        fn status(&self, uuid: &str) -> Result<BuildStatus> {
            assert_eq!(uuid, "b-42");
            self.statuses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| status("completed"))
        }

        fn results(&self, _uuid: &str) -> Result<BuildStatus> {
            Ok(self.results.clone())
        }

        fn download_bundle(&self, _uuid: &str, dest: &mut dyn Write) -> Result<()> {
            *self.downloads.borrow_mut() += 1;
            dest.write_all(b"PK-remote-bundle").unwrap();
            Ok(())
        }
    }

    fn project() -> (TempDir, Context) {
        let tmp = TempDir::new().unwrap();
        let fn_a = tmp.path().join("fn-a");
        std::fs::create_dir_all(fn_a.join("empty")).unwrap();
        std::fs::write(fn_a.join(".runnable.yaml"), "lang: rust\n").unwrap();
        std::fs::write(fn_a.join("lib.rs"), "// fn-a").unwrap();
        std::fs::write(tmp.path().join(BUNDLE_FILENAME), b"old bundle").unwrap();
        Directive::placeholder().write(tmp.path()).unwrap();

        let ctx = Context::for_directory(tmp.path()).unwrap();
        (tmp, ctx)
    }

    fn succeeded(log: &str) -> BuildResult {
        BuildResult {
            succeeded: true,
            output_log: log.to_string(),
        }
    }

    #[test]
    fn test_archive_layout() {
        let (tmp, _ctx) = project();
        let bytes = archive_project(tmp.path()).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();

        let names: Vec<&str> = archive.file_names().collect();
        assert!(names.contains(&"Directive.yaml"));
        assert!(names.contains(&"fn-a/lib.rs"));
        assert!(names.contains(&"fn-a/empty/"));
        assert!(!names.contains(&BUNDLE_FILENAME));
    }

    #[test]
    fn test_logs_only_transitions_and_retries() {
        let (tmp, mut ctx) = project();
        let service = FakeService {
            statuses: RefCell::new(VecDeque::from(vec![
                status("queued"),
                status("queued"),
                Err(Error::RemoteStatus {
                    stage: "status",
                    status: 502,
                }),
                status("running"),
                status("running"),
                status("completed"),
            ])),
            results: BuildStatus {
                status: "completed".to_string(),
                has_bundle: true,
                results: vec![succeeded("fn-a ok")],
                ..Default::default()
            },
            ..Default::default()
        };
        let shell = Shell::capturing();

        let results = build_remote(&shell, &mut ctx, &service, Duration::ZERO).unwrap();
        assert_eq!(results, vec![succeeded("fn-a ok")]);

        let lines = shell.captured();
        let transitions: Vec<_> = lines.iter().filter(|l| l.starts_with("Info build has")).collect();
        assert_eq!(
            transitions,
            vec!["Info build has queued", "Info build has running", "Info build has completed"]
        );
        assert!(lines.iter().any(|l| l.starts_with("Warning status check failed")));
        assert!(lines.iter().any(|l| l.contains("built:\nfn-a ok")));

        let mut installed = String::new();
        std::fs::File::open(tmp.path().join(BUNDLE_FILENAME))
            .unwrap()
            .read_to_string(&mut installed)
            .unwrap();
        assert_eq!(installed, "PK-remote-bundle");
        assert!(ctx.bundle.exists);
        assert!(!service.archive.borrow().is_empty());
    }

    #[test]
    fn test_failed_build_keeps_old_bundle() {
        let (tmp, mut ctx) = project();
        let service = FakeService {
            statuses: RefCell::new(VecDeque::from(vec![status("running"), status("failed")])),
            results: BuildStatus {
                status: "failed".to_string(),
                results: vec![BuildResult {
                    succeeded: false,
                    output_log: "error[E0308]".to_string(),
                }],
                ..Default::default()
            },
            ..Default::default()
        };
        let shell = Shell::capturing();

        let err = build_remote(&shell, &mut ctx, &service, Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::RemoteBuildFailed(ref uuid) if uuid == "b-42"));
        assert!(shell.captured().iter().any(|l| l.starts_with("Failed failed:\nerror[E0308]")));
        assert_eq!(*service.downloads.borrow(), 0);
        assert_eq!(std::fs::read(tmp.path().join(BUNDLE_FILENAME)).unwrap(), b"old bundle");
    }

    #[test]
    fn test_completed_without_bundle() {
        let (_tmp, mut ctx) = project();
        let service = FakeService {
            results: BuildStatus {
                status: "completed".to_string(),
                has_bundle: false,
                ..Default::default()
            },
            ..Default::default()
        };

        let err = build_remote(&Shell::capturing(), &mut ctx, &service, Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::MissingBundle));
    }

    #[test]
    fn test_requires_directive() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = Context::for_directory(tmp.path()).unwrap();
        let service = FakeService::default();

        let err = build_remote(&Shell::capturing(), &mut ctx, &service, Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn test_http_service_happy_path() {
        let mut server = mockito::Server::new();

        let start = server
            .mock("POST", "/api/v1/build/source/com.acme.shop")
            .with_status(201)
            .with_body(r#"{"uuid":"b-7"}"#)
            .create();
        let poll = server
            .mock("GET", "/api/v1/build/source/b-7/status")
            .with_status(200)
            .with_body(r#"{"uuid":"b-7","status":"completed","hasBundle":true}"#)
            .create();
        let results = server
            .mock("GET", "/api/v1/build/source/b-7/results")
            .with_status(200)
            .with_body(
                r#"{"status":"completed","hasBundle":true,"results":[{"succeeded":true,"outputLog":"ok"}]}"#,
            )
            .create();
        let bundle = server
            .mock("GET", "/api/v1/build/source/b-7/bundle")
            .match_query(mockito::Matcher::UrlEncoded(
                "shouldDelete".to_string(),
                "true".to_string(),
            ))
            .with_status(200)
            .with_body("PK-bytes")
            .create();

        let service = HttpBuildService::new(&server.url()).unwrap();
        let uuid = service.start("com.acme.shop", b"zip".to_vec()).unwrap();
        assert_eq!(uuid, "b-7");

        let status = service.status(&uuid).unwrap();
        assert!(status.is_settled());
        assert!(status.has_bundle);

        let final_status = service.results(&uuid).unwrap();
        assert_eq!(final_status.results, vec![succeeded("ok")]);

        let mut out = Vec::new();
        service.download_bundle(&uuid, &mut out).unwrap();
        assert_eq!(out, b"PK-bytes");

        start.assert();
        poll.assert();
        results.assert();
        bundle.assert();
    }

    #[test]
    fn test_http_service_rejects_unexpected_status() {
        let mut server = mockito::Server::new();
        let _start = server
            .mock("POST", "/api/v1/build/source/com.acme.shop")
            .with_status(500)
            .create();

        let service = HttpBuildService::new(&server.url()).unwrap();
        let err = service.start("com.acme.shop", Vec::new()).unwrap_err();
        assert!(matches!(err, Error::RemoteStatus { stage: "start", status: 500 }));
    }
}
