use crate::builder::template::substitute;
use crate::core::context::Context;
use crate::core::directive::Directive;
use crate::error::Result;
use crate::util::process::{require_executable, ProcessBuilder};
use crate::util::shell::{Shell, Status};

use super::DEPLOYMENT_DIR;

const MANIFESTS: [(&str, &str); 2] = [
    (
        "deployment.yaml",
        include_str!("../../templates/k8s/deployment.yaml"),
    ),
    ("service.yaml", include_str!("../../templates/k8s/service.yaml")),
];

/// Apply the project's container image to the current kubectl context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubernetesDeploy {
    pub domain: String,
    pub namespace: String,
}

impl KubernetesDeploy {
    pub fn new(domain: impl Into<String>, namespace: impl Into<String>) -> Self {
        KubernetesDeploy {
            domain: domain.into(),
            namespace: namespace.into(),
        }
    }

    /// Render every manifest for `directive`, in apply order.
    pub fn render(&self, directive: &Directive) -> Result<Vec<(&'static str, String)>> {
        let identifier = directive.dashed_identifier();
        let image = directive.docker_image_name()?;

        MANIFESTS
            .iter()
            .map(|(name, template)| {
                let rendered = substitute(template, |field| match field {
                    "Identifier" => Some(identifier.clone()),
                    "AppVersion" => Some(directive.app_version.clone()),
                    "ImageName" => Some(image.clone()),
                    "Domain" => Some(self.domain.clone()),
                    "Namespace" => Some(self.namespace.clone()),
                    _ => None,
                })?;
                Ok((*name, rendered))
            })
            .collect()
    }

    pub(super) fn deploy(&self, shell: &Shell, ctx: &Context) -> Result<()> {
        let directive = ctx.require_directive("deploying to kubernetes")?;
        let manifests = self.render(directive)?;

        let out_dir = ctx.cwd.join(DEPLOYMENT_DIR);
        crate::util::fs::remove_dir_all_if_exists(&out_dir)?;
        crate::util::fs::ensure_dir(&out_dir)?;
        for (name, contents) in &manifests {
            crate::util::fs::write(&out_dir.join(name), contents)?;
        }
        shell.status(
            Status::Created,
            format!("{} manifest(s) in {DEPLOYMENT_DIR}", manifests.len()),
        );

        let kubectl = require_executable("kubectl")?;

        // The namespace usually exists already.
        let created = ProcessBuilder::new(&kubectl)
            .args(["create", "ns", &self.namespace])
            .exec_tee(false)?;
        if !created.status.success() {
            tracing::debug!("kubectl create ns: {}", created.log.trim());
        }

        shell.status(
            Status::Deploying,
            format!("{} to namespace {}", directive.identifier, self.namespace),
        );
        ProcessBuilder::new(&kubectl)
            .args(["apply", "-f", &format!("{DEPLOYMENT_DIR}/")])
            .cwd(&ctx.cwd)
            .exec_and_check(shell.echo_output())?;

        shell.status(Status::Finished, "applied deployment");
        Ok(())
    }
}
