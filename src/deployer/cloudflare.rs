//! Cloudflare Workers deployment.
//!
//! Every single-function request handler becomes its own worker carrying
//! the function's module. One router worker, service-bound to all of them,
//! owns `<domain>/*` and dispatches by method and path.

use std::collections::BTreeMap;

use reqwest::blocking::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::builder::template::substitute;
use crate::core::bundle;
use crate::core::context::Context;
use crate::core::directive::{HandlerKind, StepKind};
use crate::error::{Error, Result};
use crate::util::shell::{Shell, Status};

/// Cloudflare v4 API root.
pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

const ROUTER_SCRIPT_NAME: &str = "runway-router";
const TOKEN_ENV: &str = "CF_API_TOKEN";
const ACCOUNT_ENV: &str = "CF_ACCOUNT_ID";

const RUNTIME_JS: &str = include_str!("../../templates/cloudflare/runtime.js");
const ROUTER_JS: &str = include_str!("../../templates/cloudflare/router.js");
const REQUEST_WORKER_JS: &str = include_str!("../../templates/cloudflare/request_worker.js");
const ROUTER_WORKER_JS: &str = include_str!("../../templates/cloudflare/router_worker.js");

/// Deploy the bundle's request handlers as Workers under `domain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudflareDeploy {
    pub domain: String,
    pub api_base: String,
}

/// A deployed request worker as seen by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
struct WorkerRoute {
    method: String,
    path: String,
    binding: String,
}

impl CloudflareDeploy {
    pub fn new(domain: impl Into<String>) -> Self {
        CloudflareDeploy {
            domain: domain.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub(super) fn deploy(&self, shell: &Shell, ctx: &Context) -> Result<()> {
        let (token, account) = credentials(
            std::env::var(TOKEN_ENV).ok(),
            std::env::var(ACCOUNT_ENV).ok(),
        )?;
        let api = CloudflareApi::new(&self.api_base, &token, &account)?;
        self.deploy_with(shell, ctx, &api)
    }

    fn deploy_with(&self, shell: &Shell, ctx: &Context, api: &CloudflareApi) -> Result<()> {
        if !ctx.bundle.exists {
            return Err(Error::Precondition("missing project bundle".to_string()));
        }
        let bundle = bundle::read(&ctx.bundle.path)?;
        let directive = &bundle.directive;

        shell.status(
            Status::Deploying,
            format!(
                "{} ({}) functions as workers",
                directive.identifier, self.domain
            ),
        );

        let zone = api.zone_id(&self.domain)?;
        let mut routes = BTreeMap::new();

        for handler in &directive.handlers {
            if handler.kind != HandlerKind::Request {
                shell.warn("unsupported handler type: stream; ignoring.");
                continue;
            }
            if handler.steps.len() != 1 {
                shell.warn("only one step is currently supported per handler");
                continue;
            }
            let Some(StepKind::Fn(func)) = handler.steps[0].kind() else {
                shell.warn("only single-function steps are supported per handler");
                continue;
            };

            let module = bundle
                .modules
                .get(func)
                .ok_or_else(|| Error::MissingFunction(func.to_string()))?;

            let script = render_request_worker(&handler.method, &handler.resource)?;
            let script_name = format!("{}-request-{func}", directive.dashed_identifier());
            let bindings = [Binding::WasmModule {
                name: "WASM_MODULE".to_string(),
                part: "wasm".to_string(),
            }];

            shell.status(Status::Uploading, &script_name);
            api.upload_worker(&script_name, script, &bindings, Some(module.clone()))?;

            routes.insert(
                script_name.clone(),
                WorkerRoute {
                    method: handler.method.to_lowercase(),
                    path: handler.resource.clone(),
                    binding: worker_binding(&script_name),
                },
            );
            shell.status(Status::Info, format!("deployed function {func}"));
        }

        let router = render_router_worker(&routes)?;
        let bindings: Vec<Binding> = routes
            .iter()
            .map(|(script, route)| Binding::Service {
                name: route.binding.clone(),
                service: script.clone(),
                environment: "production".to_string(),
            })
            .collect();

        shell.status(Status::Uploading, ROUTER_SCRIPT_NAME);
        api.upload_worker(ROUTER_SCRIPT_NAME, router, &bindings, None)?;

        let pattern = format!("{}/*", self.domain);
        if let Err(err) = api.create_route(&zone, &pattern, ROUTER_SCRIPT_NAME) {
            shell.warn(format!("error while creating route: {err}"));
        }

        shell.status(
            Status::Finished,
            format!("deployed to Cloudflare at {pattern}"),
        );
        Ok(())
    }
}

fn credentials(token: Option<String>, account: Option<String>) -> Result<(String, String)> {
    match (token, account) {
        (Some(token), Some(account)) if !token.is_empty() && !account.is_empty() => {
            Ok((token, account))
        }
        _ => Err(Error::Precondition(format!(
            "missing {TOKEN_ENV} or {ACCOUNT_ENV}"
        ))),
    }
}

/// Name under which the router sees a worker's service binding.
fn worker_binding(script_name: &str) -> String {
    script_name.to_uppercase().replace('-', "_")
}

fn js_quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

fn render_request_worker(method: &str, path: &str) -> Result<String> {
    substitute(REQUEST_WORKER_JS, |field| match field {
        "Runtime" => Some(RUNTIME_JS.to_string()),
        "Router" => Some(ROUTER_JS.to_string()),
        "Method" => Some(method.to_lowercase()),
        "Path" => Some(js_quote(path)),
        _ => None,
    })
}

fn render_router_worker(routes: &BTreeMap<String, WorkerRoute>) -> Result<String> {
    let table = routes
        .values()
        .map(|route| {
            format!(
                "router.{}('{}', ({{ request }}) => {}.fetch(request));",
                route.method,
                js_quote(&route.path),
                route.binding
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    substitute(ROUTER_WORKER_JS, |field| match field {
        "Router" => Some(ROUTER_JS.to_string()),
        "Routes" => Some(table.clone()),
        _ => None,
    })
}

/// A worker binding in upload metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Binding {
    WasmModule {
        name: String,
        part: String,
    },
    Service {
        name: String,
        service: String,
        environment: String,
    },
}

#[derive(Debug, Serialize)]
struct ScriptMetadata<'a> {
    body_part: &'static str,
    bindings: &'a [Binding],
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

/// Minimal client for the Workers endpoints of the Cloudflare API.
pub struct CloudflareApi {
    client: reqwest::blocking::Client,
    base: Url,
    token: String,
    account_id: String,
}

impl CloudflareApi {
    pub fn new(base: &str, token: &str, account_id: &str) -> Result<Self> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(CloudflareApi {
            client: reqwest::blocking::Client::builder()
                .user_agent(concat!("runway/", env!("CARGO_PKG_VERSION")))
                .build()?,
            base,
            token: token.to_string(),
            account_id: account_id.to_string(),
        })
    }

    /// Id of the zone serving `name`.
    pub fn zone_id(&self, name: &str) -> Result<String> {
        let mut url = self.base.join("zones")?;
        url.query_pairs_mut().append_pair("name", name);

        let resp = self.client.get(url).bearer_auth(&self.token).send()?;
        let zones: Vec<Zone> = decode(resp, "zone lookup")?.unwrap_or_default();
        zones
            .into_iter()
            .next()
            .map(|z| z.id)
            .ok_or_else(|| Error::Target {
                target: "cloudflare",
                message: format!("no zone found for {name}"),
            })
    }

    /// Create or replace a worker script.
    pub fn upload_worker(
        &self,
        script_name: &str,
        script: String,
        bindings: &[Binding],
        module: Option<Vec<u8>>,
    ) -> Result<()> {
        let metadata = serde_json::to_string(&ScriptMetadata {
            body_part: "script",
            bindings,
        })?;

        let mut form = Form::new()
            .part("metadata", Part::text(metadata).mime_str("application/json")?)
            .part(
                "script",
                Part::text(script)
                    .file_name("worker.js")
                    .mime_str("application/javascript")?,
            );
        if let Some(module) = module {
            form = form.part(
                "wasm",
                Part::bytes(module)
                    .file_name("module.wasm")
                    .mime_str("application/wasm")?,
            );
        }

        let url = self.base.join(&format!(
            "accounts/{}/workers/scripts/{script_name}",
            self.account_id
        ))?;
        let resp = self
            .client
            .put(url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()?;
        decode::<serde_json::Value>(resp, "worker upload")?;
        Ok(())
    }

    /// Route `pattern` in `zone` to `script_name`.
    pub fn create_route(&self, zone: &str, pattern: &str, script_name: &str) -> Result<()> {
        let url = self.base.join(&format!("zones/{zone}/workers/routes"))?;
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "pattern": pattern, "script": script_name }))
            .send()?;
        decode::<serde_json::Value>(resp, "route creation")?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(resp: reqwest::blocking::Response, what: &str) -> Result<Option<T>> {
    let status = resp.status();
    let body = resp.text()?;

    let envelope: Option<Envelope<T>> = serde_json::from_str(&body).ok();
    match envelope {
        Some(envelope) if status.is_success() && envelope.success => Ok(envelope.result),
        Some(envelope) if !envelope.errors.is_empty() => {
            let messages: Vec<String> = envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect();
            Err(Error::Target {
                target: "cloudflare",
                message: format!("{what} failed: {}", messages.join(", ")),
            })
        }
        _ => Err(Error::Target {
            target: "cloudflare",
            message: format!("{what} failed with status {status}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bundle::{BundleFile, BUNDLE_FILENAME};
    use mockito::Matcher;
    use tempfile::TempDir;

    const DIRECTIVE: &str = r#"
identifier: com.acme.shop
appVersion: v1.0.0
handlers:
  - type: request
    method: GET
    resource: /hello/:name
    steps:
      - fn: fn-a
  - type: request
    method: POST
    resource: /pipeline
    steps:
      - fn: fn-a
      - fn: fn-b
  - type: stream
    resource: /events
    steps:
      - fn: fn-b
"#;

    fn project() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let modules = vec![
            BundleFile {
                name: "fn-a".to_string(),
                contents: b"\0asm fn-a".to_vec(),
            },
            BundleFile {
                name: "fn-b".to_string(),
                contents: b"\0asm fn-b".to_vec(),
            },
        ];
        bundle::write(
            DIRECTIVE.as_bytes(),
            &modules,
            &[],
            &tmp.path().join(BUNDLE_FILENAME),
        )
        .unwrap();
        tmp
    }

    #[test]
    fn test_worker_binding() {
        assert_eq!(
            worker_binding("com-acme-shop-request-fn-a"),
            "COM_ACME_SHOP_REQUEST_FN_A"
        );
    }

    #[test]
    fn test_credentials_required() {
        let err = credentials(Some("tok".to_string()), None).unwrap_err();
        assert_eq!(err.to_string(), "missing CF_API_TOKEN or CF_ACCOUNT_ID");
        assert!(credentials(Some(String::new()), Some("acct".to_string())).is_err());
        assert!(credentials(Some("tok".to_string()), Some("acct".to_string())).is_ok());
    }

    #[test]
    fn test_render_request_worker() {
        let script = render_request_worker("GET", "/hello/:name").unwrap();
        assert!(script.contains("router.get('/hello/:name'"));
        assert!(script.contains("function runFunction("));
        assert!(script.contains("function Router()"));
        assert!(!script.contains("{{ ."));
    }

    #[test]
    fn test_render_router_worker() {
        let mut routes = BTreeMap::new();
        routes.insert(
            "com-acme-shop-request-fn-a".to_string(),
            WorkerRoute {
                method: "get".to_string(),
                path: "/hello/:name".to_string(),
                binding: "COM_ACME_SHOP_REQUEST_FN_A".to_string(),
            },
        );

        let script = render_router_worker(&routes).unwrap();
        assert!(script.contains(
            "router.get('/hello/:name', ({ request }) => COM_ACME_SHOP_REQUEST_FN_A.fetch(request));"
        ));
    }

    #[test]
    fn test_binding_metadata() {
        let bindings = [
            Binding::WasmModule {
                name: "WASM_MODULE".to_string(),
                part: "wasm".to_string(),
            },
            Binding::Service {
                name: "A".to_string(),
                service: "a".to_string(),
                environment: "production".to_string(),
            },
        ];
        let json = serde_json::to_value(ScriptMetadata {
            body_part: "script",
            bindings: &bindings,
        })
        .unwrap();

        assert_eq!(json["body_part"], "script");
        assert_eq!(json["bindings"][0]["type"], "wasm_module");
        assert_eq!(json["bindings"][1]["type"], "service");
        assert_eq!(json["bindings"][1]["environment"], "production");
    }

    #[test]
    fn test_deploy_workers_and_router() {
        let tmp = project();
        let ctx = Context::for_directory(tmp.path()).unwrap();

        let mut server = mockito::Server::new();
        let zone = server
            .mock("GET", "/zones")
            .match_query(Matcher::UrlEncoded("name".into(), "shop.example.com".into()))
            .match_header("authorization", "Bearer tok")
            .with_body(r#"{"success":true,"errors":[],"result":[{"id":"zone-1"}]}"#)
            .create();
        let worker = server
            .mock("PUT", "/accounts/acct/workers/scripts/com-acme-shop-request-fn-a")
            .match_body(Matcher::Regex("WASM_MODULE".to_string()))
            .with_body(r#"{"success":true,"errors":[],"result":{}}"#)
            .expect(1)
            .create();
        let router = server
            .mock("PUT", "/accounts/acct/workers/scripts/runway-router")
            .match_body(Matcher::Regex("COM_ACME_SHOP_REQUEST_FN_A".to_string()))
            .with_body(r#"{"success":true,"errors":[],"result":{}}"#)
            .create();
        let route = server
            .mock("POST", "/zones/zone-1/workers/routes")
            .match_body(Matcher::PartialJsonString(
                r#"{"pattern":"shop.example.com/*","script":"runway-router"}"#.to_string(),
            ))
            .with_status(409)
            .with_body(r#"{"success":false,"errors":[{"code":10020,"message":"route exists"}],"result":null}"#)
            .create();

        let api = CloudflareApi::new(&server.url(), "tok", "acct").unwrap();
        let shell = Shell::capturing();
        CloudflareDeploy::new("shop.example.com")
            .deploy_with(&shell, &ctx, &api)
            .unwrap();

        zone.assert();
        worker.assert();
        router.assert();
        route.assert();

        let lines = shell.captured();
        assert!(lines.contains(&"Warning only one step is currently supported per handler".to_string()));
        assert!(lines.contains(&"Warning unsupported handler type: stream; ignoring.".to_string()));
        assert!(lines.iter().any(|l| l.starts_with("Warning error while creating route")));
        assert!(lines.contains(&"Finished deployed to Cloudflare at shop.example.com/*".to_string()));
    }

    #[test]
    fn test_upload_failure_is_fatal() {
        let tmp = project();
        let ctx = Context::for_directory(tmp.path()).unwrap();

        let mut server = mockito::Server::new();
        let _zone = server
            .mock("GET", "/zones")
            .match_query(Matcher::Any)
            .with_body(r#"{"success":true,"errors":[],"result":[{"id":"zone-1"}]}"#)
            .create();
        let _worker = server
            .mock("PUT", Matcher::Regex("^/accounts/acct/workers/scripts/".to_string()))
            .with_status(403)
            .with_body(r#"{"success":false,"errors":[{"code":10000,"message":"Authentication error"}]}"#)
            .create();

        let api = CloudflareApi::new(&server.url(), "tok", "acct").unwrap();
        let err = CloudflareDeploy::new("shop.example.com")
            .deploy_with(&Shell::capturing(), &ctx, &api)
            .unwrap_err();
        assert!(err.to_string().contains("Authentication error"));
    }

    #[test]
    fn test_requires_bundle() {
        let tmp = TempDir::new().unwrap();
        let ctx = Context::for_directory(tmp.path()).unwrap();
        let api = CloudflareApi::new(DEFAULT_API_BASE, "tok", "acct").unwrap();

        let err = CloudflareDeploy::new("shop.example.com")
            .deploy_with(&Shell::capturing(), &ctx, &api)
            .unwrap_err();
        assert!(err.to_string().contains("missing project bundle"));
    }
}
