//! Facts derived from Dockerfile instructions.
//!
//! Operating system detection from a base image reference and package
//! names from `RUN` lines that call a package manager.

use super::dockerfile::shell_words;

/// Distribution images and the OS name they report.
const KNOWN_DISTROS: &[(&str, &str)] = &[
    ("almalinux", "almalinux"),
    ("alpine", "alpine"),
    ("amazonlinux", "amazonlinux"),
    ("archlinux", "arch"),
    ("centos", "centos"),
    ("debian", "debian"),
    ("fedora", "fedora"),
    ("leap", "opensuse"),
    ("opensuse", "opensuse"),
    ("oraclelinux", "oraclelinux"),
    ("rockylinux", "rocky"),
    ("rocky", "rocky"),
    ("ubi", "rhel"),
    ("ubi8", "rhel"),
    ("ubi9", "rhel"),
    ("ubuntu", "ubuntu"),
];

/// Operating system implied by a base image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsInfo {
    pub name: String,
    pub version: Option<String>,
}

/// Detect the OS of a base image such as `ubuntu:22.04`,
/// `docker.io/library/rockylinux:9` or `nvidia/cuda:12.2.0-devel-ubuntu22.04`.
pub fn detect_os(image: &str) -> Option<OsInfo> {
    let without_digest = image.split('@').next().unwrap_or(image);
    let name_start = without_digest.rfind('/').map_or(0, |p| p + 1);
    let last = &without_digest[name_start..];
    let (repo, tag) = match last.split_once(':') {
        Some((repo, tag)) => (repo, Some(tag)),
        None => (last, None),
    };

    if let Some(os) = distro_name(repo) {
        let version = tag
            .filter(|t| t.starts_with(|c: char| c.is_ascii_digit()))
            .map(|t| t.split('-').next().unwrap_or(t).to_string());
        return Some(OsInfo {
            name: os.to_string(),
            version,
        });
    }

    // Vendor images often encode the distro in the tag: "...-ubuntu22.04"
    let tag = tag?;
    tag.split('-').find_map(|part| {
        let split = part.find(|c: char| c.is_ascii_digit())?;
        let (name, version) = part.split_at(split);
        distro_name(name).map(|os| OsInfo {
            name: os.to_string(),
            version: Some(version.to_string()),
        })
    })
}

fn distro_name(repo: &str) -> Option<&'static str> {
    KNOWN_DISTROS
        .iter()
        .find(|(image, _)| *image == repo)
        .map(|(_, os)| *os)
}

/// Package names installed by a `RUN` command.
///
/// Understands apt-get, apt, yum, dnf, microdnf, zypper, apk, pip, conda,
/// mamba and spack. Version pins and variants are stripped from the names.
pub fn extract_packages(command: &str) -> Vec<String> {
    let mut packages = Vec::new();
    for segment in split_commands(command) {
        let words = shell_words(&segment);
        let words: Vec<&str> = words
            .iter()
            .map(String::as_str)
            .skip_while(|w| *w == "sudo" || is_env_assignment(w))
            .collect();
        packages.extend(packages_from_words(&words));
    }
    packages
}

/// Split on `&&`, `||`, `;` and `|`.
fn split_commands(command: &str) -> Vec<String> {
    command
        .replace("&&", ";")
        .replace("||", ";")
        .replace('|', ";")
        .replace('\n', ";")
        .split(';')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_env_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

fn packages_from_words(words: &[&str]) -> Vec<String> {
    let Some((&program, rest)) = words.split_first() else {
        return Vec::new();
    };
    let program = program.rsplit('/').next().unwrap_or(program);

    // python -m pip install ...
    let (manager, rest) = match (program, rest) {
        (p, [flag, module, tail @ ..]) if p.starts_with("python") && *flag == "-m" => {
            (*module, tail)
        }
        _ => (program, rest),
    };

    let install_verbs: &[&str] = match manager {
        "apt-get" | "apt" | "yum" | "dnf" | "microdnf" => &["install"],
        "zypper" => &["install", "in"],
        "apk" => &["add"],
        "pip" | "pip3" | "conda" | "mamba" | "micromamba" | "spack" => &["install"],
        _ => return Vec::new(),
    };

    let Some(verb_pos) = rest.iter().position(|w| install_verbs.contains(w)) else {
        return Vec::new();
    };

    let mut names = Vec::new();
    let mut args = rest[verb_pos + 1..].iter();
    while let Some(&word) = args.next() {
        if takes_value(manager, word) {
            args.next();
            continue;
        }
        if word.starts_with('-') || !looks_like_package(word) {
            continue;
        }
        if let Some(name) = package_name(manager, word) {
            names.push(name);
        }
    }
    names
}

/// Flags whose following word is a value, not a package.
fn takes_value(manager: &str, flag: &str) -> bool {
    match manager {
        "pip" | "pip3" => matches!(
            flag,
            "-r" | "--requirement" | "-c" | "--constraint" | "-e" | "--editable" | "-i"
                | "--index-url" | "--extra-index-url" | "-t" | "--target"
        ),
        "conda" | "mamba" | "micromamba" => {
            matches!(flag, "-c" | "--channel" | "-n" | "--name" | "-p" | "--prefix")
        }
        "apt-get" | "apt" => flag == "-o",
        "apk" => matches!(flag, "--repository" | "-X" | "--virtual" | "-t"),
        _ => false,
    }
}

fn looks_like_package(word: &str) -> bool {
    !(word.contains('$')
        || word.contains("://")
        || word.starts_with('.')
        || word.starts_with('/')
        || word.starts_with('+')
        || word.starts_with('~')
        || word.starts_with('^')
        || word.starts_with('%')
        || word.ends_with(".rpm")
        || word.ends_with(".deb")
        || word.ends_with(".whl")
        || word.ends_with(".txt"))
}

/// Strip version pins: `pkg=1.2`, `pkg==1.0`, `pkg>=2`, `openmpi@4.1`,
/// `pkg[extra]`.
fn package_name(manager: &str, word: &str) -> Option<String> {
    let end = match manager {
        "spack" => word.find(['@', '+', '~', '%', '^']),
        "pip" | "pip3" => word.find(['=', '<', '>', '!', '~', '[', ';']),
        "conda" | "mamba" | "micromamba" => word.find(['=', '<', '>']),
        _ => word.find(['=', '<', '>']),
    };
    let name = &word[..end.unwrap_or(word.len())];
    // conda channel prefix: conda-forge::openmpi
    let name = name.rsplit("::").next().unwrap_or(name);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_os_official_image() {
        assert_eq!(
            detect_os("ubuntu:22.04"),
            Some(OsInfo {
                name: "ubuntu".to_string(),
                version: Some("22.04".to_string()),
            })
        );
    }

    #[test]
    fn test_detect_os_registry_prefix_and_suffix() {
        let os = detect_os("docker.io/library/rockylinux:9-minimal").unwrap();
        assert_eq!(os.name, "rocky");
        assert_eq!(os.version.as_deref(), Some("9"));
    }

    #[test]
    fn test_detect_os_named_tag_has_no_version() {
        let os = detect_os("debian:bookworm-slim").unwrap();
        assert_eq!(os.name, "debian");
        assert_eq!(os.version, None);
    }

    #[test]
    fn test_detect_os_from_vendor_tag() {
        let os = detect_os("nvidia/cuda:12.2.0-devel-ubuntu22.04").unwrap();
        assert_eq!(os.name, "ubuntu");
        assert_eq!(os.version.as_deref(), Some("22.04"));
    }

    #[test]
    fn test_detect_os_unknown() {
        assert_eq!(detect_os("ghcr.io/org/app:1.0"), None);
        assert_eq!(detect_os("scratch"), None);
    }

    #[test]
    fn test_extract_packages_apt() {
        let packages = extract_packages(
            "apt-get update && DEBIAN_FRONTEND=noninteractive apt-get install -y --no-install-recommends openmpi-bin libopenmpi-dev=4.1.2 && rm -rf /var/lib/apt/lists/*",
        );
        assert_eq!(packages, vec!["openmpi-bin", "libopenmpi-dev"]);
    }

    #[test]
    fn test_extract_packages_apk_and_yum() {
        assert_eq!(
            extract_packages("apk add --no-cache curl bash"),
            vec!["curl", "bash"]
        );
        assert_eq!(
            extract_packages("sudo yum install -y mpich-devel; yum clean all"),
            vec!["mpich-devel"]
        );
    }

    #[test]
    fn test_extract_packages_pip() {
        assert_eq!(
            extract_packages("pip install --no-cache-dir -r requirements.txt mpi4py==3.1.5 'numpy>=1.24' ."),
            vec!["mpi4py", "numpy"]
        );
        assert_eq!(
            extract_packages("python3 -m pip install requests[socks]"),
            vec!["requests"]
        );
    }

    #[test]
    fn test_extract_packages_spack_and_conda() {
        assert_eq!(
            extract_packages("spack install openmpi@4.1.5 +cuda %gcc@12"),
            vec!["openmpi"]
        );
        assert_eq!(
            extract_packages("conda install -y -c conda-forge mpich=4.0 conda-forge::hdf5"),
            vec!["mpich", "hdf5"]
        );
    }

    #[test]
    fn test_extract_packages_ignores_other_commands() {
        assert!(extract_packages("make -j4 install").is_empty());
        assert!(extract_packages("apt-get update").is_empty());
        assert!(extract_packages("").is_empty());
    }
}
