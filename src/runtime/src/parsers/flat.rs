//! The `dockerfile` parser: one top-level key per category.

use ocifit_core::error::Result;
use ocifit_core::spec::{normalize_model, DockerfileModel, ModelShape};
use serde_json::Value;

use super::dockerfile::{Dockerfile, Instruction};
use super::facts::{detect_os, extract_packages};
use super::DockerfileParser;

/// Registry name of the flat parser.
pub const FLAT_PARSER_NAME: &str = "dockerfile";

/// Parser producing flat category lists.
#[derive(Debug, Default)]
pub struct FlatParser;

impl DockerfileParser for FlatParser {
    fn name(&self) -> &'static str {
        FLAT_PARSER_NAME
    }

    fn shape(&self) -> ModelShape {
        ModelShape::Flat
    }

    fn parse_dockerfile(&self, content: &str) -> Result<DockerfileModel> {
        let dockerfile = Dockerfile::parse(content)?;
        Ok(normalize_model(build_model(&dockerfile)))
    }
}

/// Categories that only keep their last value.
#[derive(Default)]
struct Scalars {
    user: Option<String>,
    workdir: Option<String>,
    entrypoint: Option<String>,
    cmd: Option<String>,
    maintainer: Option<String>,
}

fn build_model(dockerfile: &Dockerfile) -> DockerfileModel {
    let mut labels = Vec::new();
    let mut env = Vec::new();
    let mut expose = Vec::new();
    let mut args = Vec::new();
    let mut volumes = Vec::new();
    let mut packages = Vec::new();
    let mut scalars = Scalars::default();

    for instruction in dockerfile.final_lineage() {
        match instruction {
            Instruction::Label { pairs } => {
                labels.extend(pairs.iter().map(|(k, v)| format!("{}={}", k, v)));
            }
            Instruction::Env { pairs } => {
                env.extend(pairs.iter().map(|(k, v)| format!("{}={}", k, v)));
            }
            Instruction::Expose { ports } => expose.extend(ports.iter().cloned()),
            Instruction::Arg { name, default } => args.push(match default {
                Some(default) => format!("{}={}", name, default),
                None => name.clone(),
            }),
            Instruction::Volume { paths } => volumes.extend(paths.iter().cloned()),
            Instruction::Run { command } => packages.extend(extract_packages(command)),
            Instruction::User { user } => scalars.user = Some(user.clone()),
            Instruction::Workdir { path } => scalars.workdir = Some(path.clone()),
            Instruction::Entrypoint { command } => {
                scalars.entrypoint = Some(command.to_command_line())
            }
            Instruction::Cmd { command } => scalars.cmd = Some(command.to_command_line()),
            Instruction::Maintainer { name } => scalars.maintainer = Some(name.clone()),
            _ => {}
        }
    }

    let mut model = DockerfileModel::new();
    let stages = dockerfile.stages();
    let base_image = dockerfile.base_image();

    if let Some(os) = base_image.as_deref().and_then(detect_os) {
        model.insert("os_name".into(), Value::String(os.name));
        if let Some(version) = os.version {
            model.insert("os_version".into(), Value::String(version));
        }
    }
    if let Some(base) = base_image {
        model.insert("base_image".into(), Value::String(base));
    }
    if stages.len() > 1 {
        model.insert(
            "stages".into(),
            strings(stages.into_iter().map(|s| s.image).collect()),
        );
    }

    model.insert("labels".into(), strings(labels));
    model.insert("env".into(), strings(env));
    model.insert("expose".into(), strings(expose));
    model.insert("args".into(), strings(args));
    model.insert("volumes".into(), strings(volumes));
    model.insert("packages".into(), strings(packages));

    let Scalars {
        user,
        workdir,
        entrypoint,
        cmd,
        maintainer,
    } = scalars;
    for (key, value) in [
        ("user", user),
        ("workdir", workdir),
        ("entrypoint", entrypoint),
        ("cmd", cmd),
        ("maintainer", maintainer),
    ] {
        if let Some(value) = value {
            model.insert(key.into(), Value::String(value));
        }
    }

    model
}

fn strings(items: Vec<String>) -> Value {
    Value::Array(items.into_iter().map(Value::String).collect())
}
