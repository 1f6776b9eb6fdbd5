//! Dockerfile reconstruction from an image configuration.
//!
//! Registry images do not ship their Dockerfile. The config blob does carry
//! a `history` list whose `created_by` entries are the instructions that
//! produced each layer, in one of two dialects:
//!
//! - classic builder: `/bin/sh -c #(nop)  ENV A=b` or `/bin/sh -c apt-get ...`
//! - BuildKit: `ENV A=b`, `RUN /bin/sh -c apt-get ... # buildkit`
//!
//! Both are normalized back into Dockerfile lines. When the history is
//! empty the runtime config fields (Env, ExposedPorts, Labels, ...) are
//! rendered instead.

use oci_spec::image::ImageConfiguration;

/// Shell prefix used by the classic builder for every history entry.
const SHELL_PREFIX: &str = "/bin/sh -c ";

/// Marker for metadata-only instructions in classic history.
const NOP_MARKER: &str = "#(nop)";

/// Suffix BuildKit appends to RUN/COPY history entries.
const BUILDKIT_SUFFIX: &str = "# buildkit";

/// Base line for reconstructed Dockerfiles; the real base is not recorded.
const RECONSTRUCTED_FROM: &str = "FROM scratch";

const KNOWN_INSTRUCTIONS: &[&str] = &[
    "ADD",
    "ARG",
    "CMD",
    "COPY",
    "ENTRYPOINT",
    "ENV",
    "EXPOSE",
    "HEALTHCHECK",
    "LABEL",
    "MAINTAINER",
    "ONBUILD",
    "RUN",
    "SHELL",
    "STOPSIGNAL",
    "USER",
    "VOLUME",
    "WORKDIR",
];

/// Render a Dockerfile equivalent to the image configuration.
pub fn reconstruct_dockerfile(config: &ImageConfiguration) -> String {
    let mut lines = vec![RECONSTRUCTED_FROM.to_string()];

    let from_history: Vec<String> = config
        .history()
        .iter()
        .filter_map(|entry| entry.created_by().as_deref())
        .filter_map(normalize_created_by)
        .collect();

    if from_history.is_empty() {
        lines.extend(lines_from_config(config));
    } else {
        lines.extend(from_history);
    }

    let mut dockerfile = lines.join("\n");
    dockerfile.push('\n');
    dockerfile
}

/// Turn one `created_by` entry into a Dockerfile line.
fn normalize_created_by(created_by: &str) -> Option<String> {
    // Heredocs and multi-line RUNs collapse onto one logical line
    let flat = created_by.replace('\n', " ");
    let mut line = flat.trim();
    if let Some(stripped) = line.strip_suffix(BUILDKIT_SUFFIX) {
        line = stripped.trim_end();
    }
    if line.is_empty() {
        return None;
    }

    // Classic builder RUN with build args: "|2 A=1 B=2 /bin/sh -c make"
    if line.starts_with('|') {
        if let Some(pos) = line.find(SHELL_PREFIX) {
            line = &line[pos..];
        }
    }

    if let Some(rest) = line.strip_prefix(SHELL_PREFIX) {
        let rest = rest.trim();
        return match rest.strip_prefix(NOP_MARKER) {
            Some(instruction) => normalize_instruction(instruction.trim()),
            None => Some(format!("RUN {}", rest)),
        };
    }

    normalize_instruction(line).or_else(|| Some(format!("RUN {}", line)))
}

/// Normalize a line that already starts with an instruction keyword.
fn normalize_instruction(line: &str) -> Option<String> {
    let (keyword, rest) = match line.find(char::is_whitespace) {
        Some(pos) => (&line[..pos], line[pos..].trim()),
        None => (line, ""),
    };
    let keyword = keyword.to_uppercase();
    if !KNOWN_INSTRUCTIONS.contains(&keyword.as_str()) {
        return None;
    }

    match keyword.as_str() {
        "RUN" => {
            let command = rest.strip_prefix(SHELL_PREFIX).unwrap_or(rest).trim();
            Some(format!("RUN {}", command))
        }
        // BuildKit renders ports as a Go map: "map[8080/tcp:{} 53/udp:{}]"
        "EXPOSE" => {
            let ports = rest
                .trim_start_matches("map[")
                .trim_end_matches(']')
                .split_whitespace()
                .map(|p| p.trim_end_matches(":{}"))
                .collect::<Vec<_>>()
                .join(" ");
            Some(format!("EXPOSE {}", ports))
        }
        _ if rest.is_empty() => None,
        _ => Some(format!("{} {}", keyword, rest)),
    }
}

/// Render config fields when no history is available.
fn lines_from_config(config: &ImageConfiguration) -> Vec<String> {
    let Some(runtime) = config.config().as_ref() else {
        return Vec::new();
    };

    let mut lines = Vec::new();

    if let Some(env) = runtime.env() {
        for pair in env {
            if let Some((key, value)) = pair.split_once('=') {
                lines.push(format!("ENV {}={}", key, quote(value)));
            }
        }
    }
    if let Some(labels) = runtime.labels() {
        let mut labels: Vec<_> = labels.iter().collect();
        labels.sort();
        for (key, value) in labels {
            lines.push(format!("LABEL {}={}", key, quote(value)));
        }
    }
    if let Some(ports) = runtime.exposed_ports() {
        if !ports.is_empty() {
            lines.push(format!("EXPOSE {}", ports.join(" ")));
        }
    }
    if let Some(volumes) = runtime.volumes() {
        for volume in volumes {
            lines.push(format!("VOLUME {}", volume));
        }
    }
    if let Some(dir) = runtime.working_dir().as_deref().filter(|d| !d.is_empty()) {
        lines.push(format!("WORKDIR {}", dir));
    }
    if let Some(user) = runtime.user().as_deref().filter(|u| !u.is_empty()) {
        lines.push(format!("USER {}", user));
    }
    if let Some(entrypoint) = runtime.entrypoint().as_ref().filter(|e| !e.is_empty()) {
        lines.push(format!("ENTRYPOINT {}", json_array(entrypoint)));
    }
    if let Some(cmd) = runtime.cmd().as_ref().filter(|c| !c.is_empty()) {
        lines.push(format!("CMD {}", json_array(cmd)));
    }

    lines
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\\\""))
}

fn json_array(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_from(value: serde_json::Value) -> ImageConfiguration {
        serde_json::from_value(value).unwrap()
    }

    fn base_config(history: serde_json::Value, config: serde_json::Value) -> ImageConfiguration {
        config_from(json!({
            "architecture": "amd64",
            "os": "linux",
            "config": config,
            "rootfs": {"type": "layers", "diff_ids": []},
            "history": history,
        }))
    }

    #[test]
    fn test_normalize_classic_nop() {
        assert_eq!(
            normalize_created_by("/bin/sh -c #(nop)  ENV PATH=/opt/bin:/usr/bin"),
            Some("ENV PATH=/opt/bin:/usr/bin".to_string())
        );
    }

    #[test]
    fn test_normalize_classic_run() {
        assert_eq!(
            normalize_created_by("/bin/sh -c apt-get update && apt-get install -y openmpi-bin"),
            Some("RUN apt-get update && apt-get install -y openmpi-bin".to_string())
        );
    }

    #[test]
    fn test_normalize_classic_run_with_build_args() {
        assert_eq!(
            normalize_created_by("|1 VERSION=4.1 /bin/sh -c make install"),
            Some("RUN make install".to_string())
        );
    }

    #[test]
    fn test_normalize_buildkit_run() {
        assert_eq!(
            normalize_created_by("RUN /bin/sh -c spack install openmpi # buildkit"),
            Some("RUN spack install openmpi".to_string())
        );
    }

    #[test]
    fn test_normalize_buildkit_expose_map() {
        assert_eq!(
            normalize_created_by("EXPOSE map[8080/tcp:{} 53/udp:{}]"),
            Some("EXPOSE 8080/tcp 53/udp".to_string())
        );
    }

    #[test]
    fn test_normalize_unknown_keyword_becomes_run() {
        assert_eq!(
            normalize_created_by("echo hello"),
            Some("RUN echo hello".to_string())
        );
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_created_by("   "), None);
        assert_eq!(normalize_created_by("/bin/sh -c #(nop) WORKDIR"), None);
    }

    #[test]
    fn test_reconstruct_from_history() {
        let config = base_config(
            json!([
                {"created_by": "/bin/sh -c #(nop) ADD file:abc in / "},
                {"created_by": "/bin/sh -c #(nop)  CMD [\"bash\"]", "empty_layer": true},
                {"created_by": "RUN /bin/sh -c apt-get install -y libopenmpi-dev # buildkit"},
            ]),
            json!({}),
        );
        let dockerfile = reconstruct_dockerfile(&config);
        assert_eq!(
            dockerfile,
            "FROM scratch\nADD file:abc in /\nCMD [\"bash\"]\nRUN apt-get install -y libopenmpi-dev\n"
        );
    }

    #[test]
    fn test_reconstruct_from_config_when_history_empty() {
        let config = base_config(
            json!([]),
            json!({
                "Env": ["PATH=/usr/bin", "MPI_HOME=/opt/mpi"],
                "ExposedPorts": {"8080/tcp": {}},
                "Labels": {"org.opencontainers.image.title": "app"},
                "WorkingDir": "/app",
                "Cmd": ["mpirun", "-n", "2"],
            }),
        );
        let dockerfile = reconstruct_dockerfile(&config);
        assert!(dockerfile.starts_with("FROM scratch\n"));
        assert!(dockerfile.contains("ENV PATH=\"/usr/bin\"\n"));
        assert!(dockerfile.contains("ENV MPI_HOME=\"/opt/mpi\"\n"));
        assert!(dockerfile.contains("LABEL org.opencontainers.image.title=\"app\"\n"));
        assert!(dockerfile.contains("EXPOSE 8080/tcp\n"));
        assert!(dockerfile.contains("WORKDIR /app\n"));
        assert!(dockerfile.contains("CMD [\"mpirun\",\"-n\",\"2\"]\n"));
    }
}
