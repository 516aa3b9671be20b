//! Prerequisite files a native build needs, and how to fetch them.

use crate::builder::exec::ExecEnv;
use crate::builder::template::TemplateContext;
use crate::core::runnable::{BuildResult, Language, Runnable};
use crate::error::{Error, Result};
use crate::util::shell::{Shell, Status};

/// A file (relative to the Runnable directory) paired with the command that
/// creates it when missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prereq {
    pub file: &'static str,
    pub command: &'static str,
}

const JS_INSTALL: Prereq = Prereq {
    file: "node_modules",
    command: "{{ .JsToolchain }} install",
};

const GRAIN_LIB_DIR: Prereq = Prereq {
    file: "_lib",
    command: "mkdir _lib",
};

const GRAIN_LIB_ARCHIVE: Prereq = Prereq {
    file: "_lib/_lib.tar.gz",
    command: "curl -L https://github.com/suborbital/reactr/archive/v{{ .APIVersion }}.tar.gz -o _lib/_lib.tar.gz",
};

/// Prerequisites for `language` on `os`, in the order they must be fixed.
pub fn prereqs(os: &str, language: Language) -> Result<Vec<Prereq>> {
    let list = match (os, language) {
        ("linux" | "macos", Language::Rust | Language::Swift | Language::TinyGo | Language::Wat) => {
            Vec::new()
        }
        ("linux" | "macos", Language::AssemblyScript | Language::TypeScript | Language::JavaScript) => {
            vec![JS_INSTALL]
        }
        ("macos", Language::Grain) => vec![
            GRAIN_LIB_DIR,
            GRAIN_LIB_ARCHIVE,
            Prereq {
                file: "_lib/suborbital",
                command: "tar --strip-components=3 -C _lib -xvzf _lib/_lib.tar.gz **/api/grain/suborbital/*",
            },
        ],
        ("linux", Language::Grain) => vec![
            GRAIN_LIB_DIR,
            GRAIN_LIB_ARCHIVE,
            Prereq {
                file: "_lib/suborbital",
                command: "tar --wildcards --strip-components=3 -C _lib -xvzf _lib/_lib.tar.gz **/api/grain/suborbital/*",
            },
        ],
        _ => {
            return Err(Error::Unsupported {
                what: "prerequisites",
                os: os.to_string(),
                language: language.to_string(),
            })
        }
    };

    Ok(list)
}

/// Fix every missing prerequisite of `runnable`.
///
/// Fix commands run in the Runnable directory and their output is appended
/// to `result`. The first failing fix stops the build of this Runnable.
pub fn check_and_fix(
    shell: &Shell,
    runnable: &Runnable,
    prereqs: &[Prereq],
    template: &TemplateContext,
    result: &mut BuildResult,
) -> Result<()> {
    for prereq in prereqs {
        if runnable.path.join(prereq.file).exists() {
            continue;
        }

        shell.status(Status::Fixing, format!("missing {}", prereq.file));

        let fixed = template.render(prereq.command).and_then(|command| {
            ExecEnv::Host
                .command(&command, &runnable.path)
                .exec_and_check(shell.echo_output())
        });

        match fixed {
            Ok(log) => {
                result.append(&log);
                shell.status(Status::Fixed, prereq.file);
            }
            Err(e) => {
                if let Some(log) = e.log() {
                    result.append(log);
                }
                return Err(Error::Prerequisite {
                    file: prereq.file.to_string(),
                    source: Box::new(e),
                });
            }
        }
    }

    Ok(())
}
