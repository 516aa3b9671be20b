//! Bindle registry publishing.
//!
//! The Directive and every compiled module become parcels of one invoice
//! named after the application. Only parcels the registry reports missing
//! are uploaded.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::context::Context;
use crate::core::directive::DIRECTIVE_FILENAME;
use crate::error::{Error, Result};
use crate::util::hash::sha256_bytes;
use crate::util::shell::{Shell, Status};

const BINDLE_VERSION: &str = "1.0.0";
const AUTHOR: &str = "runway <runway@localhost>";
const INVOICE_FILENAME: &str = "Invoice.toml";
const INVOICE_HEADER: &str = "# Autogenerated Bindle Invoice, do not edit\n\n";

/// A Bindle invoice. Signing is left to the registry operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub bindle_version: String,
    pub bindle: BindleMeta,
    #[serde(default)]
    pub parcel: Vec<Parcel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindleMeta {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub authors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parcel {
    pub label: Label,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub sha256: String,
    pub media_type: String,
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Deserialize)]
struct InvoiceCreated {
    #[serde(default)]
    missing: Vec<Label>,
}

fn parcel_for(name: &str, media_type: &str, data: &[u8]) -> Parcel {
    Parcel {
        label: Label {
            sha256: sha256_bytes(data),
            media_type: media_type.to_string(),
            name: name.to_string(),
            size: data.len() as u64,
        },
    }
}

/// Publish to the Bindle registry at `registry_url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindlePublish {
    pub registry_url: String,
}

impl BindlePublish {
    pub fn new(registry_url: impl Into<String>) -> Self {
        BindlePublish {
            registry_url: registry_url.into(),
        }
    }

    pub(super) fn publish(&self, shell: &Shell, ctx: &Context) -> Result<()> {
        let directive = ctx.require_directive("publishing to bindle")?;
        shell.status(
            Status::Publishing,
            format!("{}@{}", directive.identifier, directive.app_version),
        );

        let (invoice, data) = build_invoice(ctx)?;
        let client = BindleClient::new(&self.registry_url)?;

        let missing = client.create_invoice(&invoice)?;
        tracing::debug!("registry is missing {} parcel(s)", missing.len());

        for label in missing {
            let Some(bytes) = data.get(&label.sha256) else {
                return Err(Error::Target {
                    target: "bindle",
                    message: format!("registry asked for unknown parcel {}", label.sha256),
                });
            };
            shell.status(Status::Uploading, &label.name);
            client.create_parcel(&invoice.bindle, &label.sha256, bytes.clone())?;
        }

        let rendered = format!("{INVOICE_HEADER}{}", toml::to_string(&invoice)?);
        crate::util::fs::write(&ctx.cwd.join(INVOICE_FILENAME), rendered)?;

        shell.status(Status::Finished, "pushed");
        Ok(())
    }
}

/// The invoice for a project plus parcel contents keyed by digest.
pub fn build_invoice(ctx: &Context) -> Result<(Invoice, HashMap<String, Vec<u8>>)> {
    let directive = ctx.require_directive("publishing to bindle")?;

    let mut parcels = Vec::new();
    let mut data = HashMap::new();

    let directive_bytes = directive.to_yaml()?.into_bytes();
    let parcel = parcel_for(DIRECTIVE_FILENAME, "application/yaml", &directive_bytes);
    data.insert(parcel.label.sha256.clone(), directive_bytes);
    parcels.push(parcel);

    for runnable in &ctx.runnables {
        let entries = std::fs::read_dir(&runnable.path)
            .map_err(|e| Error::io("list directory", &runnable.path, e))?;
        let mut modules: Vec<_> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "wasm"))
            .collect();
        modules.sort();

        for path in modules {
            let bytes = crate::util::fs::read(&path)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let parcel = parcel_for(&name, "application/wasm", &bytes);
            data.insert(parcel.label.sha256.clone(), bytes);
            parcels.push(parcel);
        }
    }

    let invoice = Invoice {
        bindle_version: BINDLE_VERSION.to_string(),
        bindle: BindleMeta {
            name: directive.identifier.clone(),
            version: directive.app_version.trim_start_matches('v').to_string(),
            authors: vec![AUTHOR.to_string()],
        },
        parcel: parcels,
    };

    Ok((invoice, data))
}

struct BindleClient {
    client: reqwest::blocking::Client,
    base: Url,
}

impl BindleClient {
    fn new(registry_url: &str) -> Result<Self> {
        let mut base = Url::parse(registry_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(BindleClient {
            client: reqwest::blocking::Client::builder()
                .user_agent(concat!("runway/", env!("CARGO_PKG_VERSION")))
                .build()?,
            base,
        })
    }

    /// Create the invoice, returning the parcels the registry lacks.
    fn create_invoice(&self, invoice: &Invoice) -> Result<Vec<Label>> {
        let resp = self
            .client
            .post(self.base.join("_i")?)
            .header(reqwest::header::CONTENT_TYPE, "application/toml")
            .body(toml::to_string(invoice)?)
            .send()?;

        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            return Err(Error::Target {
                target: "bindle",
                message: format!("creating invoice returned {status}: {body}"),
            });
        }

        let created: InvoiceCreated = toml::from_str(&body)?;
        Ok(created.missing)
    }

    fn create_parcel(&self, bindle: &BindleMeta, sha256: &str, data: Vec<u8>) -> Result<()> {
        let url = self
            .base
            .join(&format!("_i/{}/{}@{sha256}", bindle.name, bindle.version))?;
        let resp = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()?;

        if !resp.status().is_success() {
            return Err(Error::Target {
                target: "bindle",
                message: format!("uploading parcel {sha256} returned {}", resp.status()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::directive::Directive;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("fn-a");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(".runnable.yaml"), "lang: rust\n").unwrap();
        std::fs::write(dir.join("fn-a.wasm"), b"\0asm fn-a").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut directive = Directive::placeholder();
        directive.identifier = "com.acme.shop".to_string();
        directive.app_version = "v1.2.0".to_string();
        directive.write(tmp.path()).unwrap();
        tmp
    }

    #[test]
    fn test_build_invoice() {
        let tmp = project();
        let ctx = Context::for_directory(tmp.path()).unwrap();

        let (invoice, data) = build_invoice(&ctx).unwrap();
        assert_eq!(invoice.bindle.name, "com.acme.shop");
        assert_eq!(invoice.bindle.version, "1.2.0");

        let names: Vec<_> = invoice.parcel.iter().map(|p| p.label.name.as_str()).collect();
        assert_eq!(names, vec!["Directive.yaml", "fn-a.wasm"]);

        let module = &invoice.parcel[1].label;
        assert_eq!(module.media_type, "application/wasm");
        assert_eq!(module.size, 9);
        assert_eq!(data[&module.sha256], b"\0asm fn-a");
    }

    #[test]
    fn test_requires_directive() {
        let tmp = TempDir::new().unwrap();
        let ctx = Context::for_directory(tmp.path()).unwrap();
        assert!(matches!(build_invoice(&ctx), Err(Error::Precondition(_))));
    }

    #[test]
    fn test_uploads_only_missing_parcels() {
        let tmp = project();
        let ctx = Context::for_directory(tmp.path()).unwrap();
        let module_sha = sha256_bytes(b"\0asm fn-a");

        let mut server = mockito::Server::new();
        let invoice = server
            .mock("POST", "/v1/_i")
            .match_header("content-type", "application/toml")
            .with_status(202)
            .with_body(format!(
                "[[missing]]\nsha256 = \"{module_sha}\"\nmediaType = \"application/wasm\"\nname = \"fn-a.wasm\"\nsize = 9\n"
            ))
            .create();
        let parcel = server
            .mock("POST", format!("/v1/_i/com.acme.shop/1.2.0@{module_sha}").as_str())
            .match_body(b"\0asm fn-a".to_vec())
            .with_status(200)
            .create();

        let shell = Shell::capturing();
        BindlePublish::new(format!("{}/v1", server.url()))
            .publish(&shell, &ctx)
            .unwrap();

        invoice.assert();
        parcel.assert();

        let written = std::fs::read_to_string(tmp.path().join(INVOICE_FILENAME)).unwrap();
        assert!(written.starts_with(INVOICE_HEADER));
        let parsed: Invoice = toml::from_str(&written).unwrap();
        assert_eq!(parsed.parcel.len(), 2);
        assert!(shell.captured().contains(&"Uploading fn-a.wasm".to_string()));
    }

    #[test]
    fn test_rejected_invoice() {
        let tmp = project();
        let ctx = Context::for_directory(tmp.path()).unwrap();

        let mut server = mockito::Server::new();
        let _invoice = server.mock("POST", "/v1/_i").with_status(409).with_body("exists").create();

        let err = BindlePublish::new(format!("{}/v1", server.url()))
            .publish(&Shell::capturing(), &ctx)
            .unwrap_err();
        assert!(matches!(err, Error::Target { target: "bindle", .. }));
        assert!(!tmp.path().join(INVOICE_FILENAME).exists());
    }
}
