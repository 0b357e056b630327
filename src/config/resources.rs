//! Resource file loading (YAML).
//!
//! A resource file has a single `Resources` mapping from label to record:
//!
//! ```yaml
//! Resources:
//!   Micro:
//!     type: zip
//!     location: https://github.com/zyedidia/micro/releases/download/v1.4.1/micro-1.4.1-win64.zip
//!     remove: true
//!   Editors:
//!     type: apt
//!     packages: [nano, vim]
//!     depends: Micro
//! ```
//!
//! Entries keep their file order.  Resources named in another entry's
//! `depends` become dependencies of that entry and are not repeated at the
//! top level.
use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::resources::repository::PackageList;
use crate::resources::{ArchiveFormat, InstallerFormat, Location, ResourceDescriptor, ResourceKind};

/// Name of the top-level section.
pub const SECTION: &str = "Resources";

/// A field that may hold one string or a list of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

/// Install arguments: `false` for none, a whitespace-separated string, or a
/// list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Arguments {
    Flag(bool),
    One(String),
    Many(Vec<String>),
}

/// One record exactly as written in the file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResource {
    #[serde(rename = "type")]
    kind: Option<String>,
    location: Option<String>,
    extension: Option<String>,
    arguments: Option<Arguments>,
    #[serde(default)]
    remove: bool,
    #[serde(default)]
    overwrite_agreement: bool,
    packages: Option<OneOrMany>,
    ppa: Option<String>,
    sha256: Option<String>,
    depends: Option<OneOrMany>,
    /// Acquisition state is runtime-only; a recorded value is ignored.
    #[serde(default, rename = "downloaded")]
    _downloaded: Option<serde::de::IgnoredAny>,
}

/// A validated entry before dependencies are attached.
#[derive(Debug)]
struct Entry {
    descriptor: ResourceDescriptor,
    depends: Vec<String>,
}

/// Load the resource file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read, is not valid YAML,
/// or contains an invalid resource declaration.
pub fn load(path: &Path) -> Result<Vec<ResourceDescriptor>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse(&text, &path.display().to_string())
}

/// Load several resource files, concatenating their resources in order.
///
/// A label may only be declared in one file.
///
/// # Errors
///
/// Returns the first [`ConfigError`] encountered, or
/// [`ConfigError::DuplicateLabel`] when two files declare the same label.
pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<ResourceDescriptor>, ConfigError> {
    let mut all = Vec::new();
    let mut origins = HashMap::<String, String>::new();
    for path in paths {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let loaded = load(path)?;

        let mut labels = Vec::new();
        collect_labels(&loaded, &mut labels);
        for label in labels {
            if let Some(first) = origins.get(label) {
                if *first != origin {
                    return Err(ConfigError::DuplicateLabel {
                        label: label.to_string(),
                        first: first.clone(),
                        second: origin,
                    });
                }
            } else {
                origins.insert(label.to_string(), origin.clone());
            }
        }
        all.extend(loaded);
    }
    Ok(all)
}

/// Every label in `descriptors`, dependencies included.
fn collect_labels<'a>(descriptors: &'a [ResourceDescriptor], labels: &mut Vec<&'a str>) {
    for descriptor in descriptors {
        labels.push(&descriptor.label);
        collect_labels(&descriptor.dependencies, labels);
    }
}

/// Parse resource declarations from YAML `text`; `origin` names the source
/// in error messages.
///
/// # Errors
///
/// Returns [`ConfigError`] describing the first invalid declaration.
pub fn parse(text: &str, origin: &str) -> Result<Vec<ResourceDescriptor>, ConfigError> {
    let syntax = |message: String| ConfigError::InvalidSyntax {
        file: origin.to_string(),
        message,
    };

    let document: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| syntax(e.to_string()))?;
    let section = document
        .get(SECTION)
        .ok_or_else(|| ConfigError::MissingSection(SECTION.to_string()))?;
    let mapping = match section {
        serde_yaml::Value::Null => return Ok(Vec::new()),
        serde_yaml::Value::Mapping(mapping) => mapping,
        _ => return Err(syntax(format!("'{SECTION}' must be a mapping of labels"))),
    };

    let mut entries: Vec<(String, Entry)> = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let label = match key {
            serde_yaml::Value::String(label) if !label.trim().is_empty() => label.clone(),
            other => return Err(ConfigError::InvalidLabel(format!("{other:?}"))),
        };
        let raw: RawResource = if value.is_null() {
            RawResource::default()
        } else {
            serde_yaml::from_value(value.clone())
                .map_err(|e| syntax(format!("resource {label}: {e}")))?
        };
        let entry = validate(&label, raw).map_err(|e| match e {
            Invalid::Config(e) => e,
            Invalid::Syntax(message) => syntax(format!("resource {label}: {message}")),
        })?;
        entries.push((label, entry));
    }

    resolve(entries)
}

/// Validation failure for a single record.
enum Invalid {
    Config(ConfigError),
    Syntax(String),
}

impl From<ConfigError> for Invalid {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

fn missing(label: &str, field: &'static str) -> ConfigError {
    ConfigError::MissingField {
        label: label.to_string(),
        field,
    }
}

/// Check a record against the requirements of its type.
fn validate(label: &str, raw: RawResource) -> Result<Entry, Invalid> {
    let tag = raw.kind.as_deref().ok_or_else(|| missing(label, "type"))?;
    let tag = tag.trim().to_ascii_lowercase();

    let kind = match tag.as_str() {
        "exe" => ResourceKind::Installer(InstallerFormat::Exe),
        "msi" => ResourceKind::Installer(InstallerFormat::Msi),
        "deb" => ResourceKind::PackageFile,
        "zip" => ResourceKind::Archive(ArchiveFormat::Zip),
        "tarball" | "tar.gz" | "tgz" => ResourceKind::Archive(ArchiveFormat::TarGz),
        "static" => {
            let extension = raw
                .extension
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .ok_or_else(|| missing(label, "extension"))?;
            let extension = if extension.starts_with('.') {
                extension.to_string()
            } else {
                format!(".{extension}")
            };
            ResourceKind::StaticAsset { extension }
        }
        "apt" => ResourceKind::Repository {
            packages: package_list(label, raw.packages)?,
        },
        "ppa" => {
            let repository = raw
                .ppa
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| missing(label, "ppa"))?;
            let repository = if repository.starts_with("ppa:") {
                repository.to_string()
            } else {
                format!("ppa:{repository}")
            };
            ResourceKind::ThirdPartyRepository {
                repository,
                packages: package_list(label, raw.packages)?,
            }
        }
        _ => {
            return Err(ConfigError::UnknownType {
                label: label.to_string(),
                kind: tag,
            }
            .into());
        }
    };

    let mut descriptor = ResourceDescriptor::new(label, kind);
    if !descriptor.kind.is_repository() {
        let location = raw
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| missing(label, "location"))?;
        descriptor.location = Some(Location::parse(location));
    }
    descriptor.arguments = match raw.arguments {
        None | Some(Arguments::Flag(false)) => Vec::new(),
        Some(Arguments::Flag(true)) => {
            return Err(Invalid::Syntax(
                "arguments must be false, a string or a list".to_string(),
            ));
        }
        Some(Arguments::One(line)) => line.split_whitespace().map(String::from).collect(),
        Some(Arguments::Many(list)) => list,
    };
    descriptor.remove_after_install = raw.remove;
    descriptor.overwrite_agreement = raw.overwrite_agreement;
    descriptor.sha256 = raw.sha256.map(|s| s.trim().to_ascii_lowercase());

    Ok(Entry {
        descriptor,
        depends: raw.depends.map(OneOrMany::into_vec).unwrap_or_default(),
    })
}

fn package_list(label: &str, packages: Option<OneOrMany>) -> Result<PackageList, ConfigError> {
    let names = packages
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    PackageList::new(names).ok_or_else(|| missing(label, "packages"))
}

/// Attach dependencies and select the top-level resources.
fn resolve(entries: Vec<(String, Entry)>) -> Result<Vec<ResourceDescriptor>, ConfigError> {
    let index: HashMap<&str, &Entry> = entries
        .iter()
        .map(|(label, entry)| (label.as_str(), entry))
        .collect();

    for (label, entry) in &entries {
        if let Some(unknown) = entry
            .depends
            .iter()
            .find(|dep| !index.contains_key(dep.as_str()))
        {
            return Err(ConfigError::UnknownDependency {
                label: label.clone(),
                dependency: unknown.clone(),
            });
        }
    }

    let mut finished = HashSet::new();
    for (label, _) in &entries {
        let mut stack = Vec::new();
        check_cycles(label, &index, &mut stack, &mut finished)?;
    }

    let referenced: HashSet<&str> = entries
        .iter()
        .flat_map(|(_, entry)| entry.depends.iter().map(String::as_str))
        .collect();

    Ok(entries
        .iter()
        .filter(|(label, _)| !referenced.contains(label.as_str()))
        .map(|(_, entry)| assemble(entry, &index))
        .collect())
}

/// Depth-first walk failing on the first label that is already on `stack`.
fn check_cycles<'a>(
    label: &'a str,
    index: &HashMap<&'a str, &'a Entry>,
    stack: &mut Vec<&'a str>,
    finished: &mut HashSet<&'a str>,
) -> Result<(), ConfigError> {
    if finished.contains(label) {
        return Ok(());
    }
    if stack.contains(&label) {
        let mut chain: Vec<&str> = stack
            .iter()
            .copied()
            .skip_while(|l| *l != label)
            .collect();
        chain.push(label);
        return Err(ConfigError::DependencyCycle(chain.join(" -> ")));
    }
    stack.push(label);
    if let Some(&entry) = index.get(label) {
        for dep in &entry.depends {
            check_cycles(dep, index, stack, finished)?;
        }
    }
    stack.pop();
    finished.insert(label);
    Ok(())
}

/// Build the full descriptor tree for `entry`.  Only called once the graph
/// is known to be acyclic.
fn assemble(entry: &Entry, index: &HashMap<&str, &Entry>) -> ResourceDescriptor {
    let mut descriptor = entry.descriptor.clone();
    descriptor.dependencies = entry
        .depends
        .iter()
        .filter_map(|dep| index.get(dep.as_str()))
        .map(|dep| assemble(dep, index))
        .collect();
    descriptor
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;

    fn parse_ok(text: &str) -> Vec<ResourceDescriptor> {
        parse(text, "test.yaml").unwrap()
    }

    fn parse_err(text: &str) -> ConfigError {
        parse(text, "test.yaml").unwrap_err()
    }

    // -----------------------------------------------------------------------
    // types
    // -----------------------------------------------------------------------

    #[test]
    fn parses_every_type() {
        let resources = parse_ok(
            r"
Resources:
  Golang:
    type: exe
    location: https://dl.google.com/go/go1.13.windows-amd64.exe
    arguments: /quiet /norestart
  Node:
    type: msi
    location: https://nodejs.org/dist/node.msi
  Code:
    type: deb
    location: /opt/pkgs/code.deb
    remove: true
  Micro Zip:
    type: zip
    location: https://github.com/zyedidia/micro/releases/download/v1.4.1/micro-1.4.1-win64.zip
  Micro Tarball:
    type: tarball
    location: https://github.com/zyedidia/micro/releases/download/v1.4.1/micro-1.4.1-linux64.tar.gz
  Wallpaper:
    type: static
    extension: png
    location: https://example.com/banner.png
  Editors:
    type: apt
    packages: nano
  Neovim:
    type: ppa
    ppa: neovim-ppa/stable
    packages: [neovim, python3-neovim]
",
        );
        let tags: Vec<&str> = resources.iter().map(|r| r.kind.tag()).collect();
        assert_eq!(
            tags,
            vec!["exe", "msi", "deb", "zip", "tarball", "static", "apt", "ppa"]
        );
        assert_eq!(resources[0].arguments, vec!["/quiet", "/norestart"]);
        assert!(resources[2].remove_after_install);
        assert_eq!(
            resources[2].location,
            Some(Location::Local("/opt/pkgs/code.deb".into()))
        );
        assert_eq!(resources[5].kind.extension(), ".png");
        assert_eq!(
            resources[6].kind,
            ResourceKind::Repository {
                packages: PackageList::one("nano")
            }
        );
        let ResourceKind::ThirdPartyRepository {
            repository,
            packages,
        } = &resources[7].kind
        else {
            panic!("expected ppa");
        };
        assert_eq!(repository, "ppa:neovim-ppa/stable");
        assert_eq!(packages.len(), 2);
    }

    #[test]
    fn flags_and_checksum() {
        let resources = parse_ok(
            r"
Resources:
  Tool:
    type: exe
    location: https://example.com/tool.exe
    arguments: false
    overwrite_agreement: true
    sha256: ABCDEF
",
        );
        assert!(resources[0].arguments.is_empty());
        assert!(resources[0].overwrite_agreement);
        assert_eq!(resources[0].sha256.as_deref(), Some("abcdef"));
    }

    #[test]
    fn empty_section_is_empty_list() {
        assert!(parse_ok("Resources:\n").is_empty());
    }

    // -----------------------------------------------------------------------
    // dependencies
    // -----------------------------------------------------------------------

    #[test]
    fn dependencies_nest_and_leave_top_level() {
        let resources = parse_ok(
            r"
Resources:
  Runtime:
    type: apt
    packages: [libc6]
  Golang:
    type: tarball
    location: https://example.com/go.tar.gz
    depends: [Runtime]
  Tools:
    type: apt
    packages: git
    depends: Golang
",
        );
        assert_eq!(resources.len(), 1);
        let tools = &resources[0];
        assert_eq!(tools.label, "Tools");
        assert_eq!(tools.dependencies[0].label, "Golang");
        assert_eq!(tools.dependencies[0].dependencies[0].label, "Runtime");
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = parse_err(
            r"
Resources:
  Tools:
    type: apt
    packages: git
    depends: Missing
",
        );
        assert_eq!(
            err.to_string(),
            "Resource Tools depends on unknown resource 'Missing'"
        );
    }

    #[test]
    fn dependency_cycle_is_rejected() {
        let err = parse_err(
            r"
Resources:
  A:
    type: apt
    packages: a
    depends: B
  B:
    type: apt
    packages: b
    depends: A
",
        );
        assert!(
            matches!(err, ConfigError::DependencyCycle(ref chain) if chain == "A -> B -> A"),
            "got {err:?}"
        );
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = parse_err("Resources:\n  A:\n    type: apt\n    packages: a\n    depends: A\n");
        assert!(matches!(err, ConfigError::DependencyCycle(_)));
    }

    // -----------------------------------------------------------------------
    // validation
    // -----------------------------------------------------------------------

    #[test]
    fn validation_messages_name_label_and_field() {
        let cases = [
            ("Resources:\n  X:\n    location: /a\n", "Resource X does not specify type"),
            ("Resources:\n  X:\n    type: exe\n", "Resource X does not specify location"),
            (
                "Resources:\n  X:\n    type: static\n    location: /a\n",
                "Resource X does not specify extension",
            ),
            ("Resources:\n  X:\n    type: apt\n", "Resource X does not specify packages"),
            (
                "Resources:\n  X:\n    type: apt\n    packages: []\n",
                "Resource X does not specify packages",
            ),
            (
                "Resources:\n  X:\n    type: ppa\n    packages: git\n",
                "Resource X does not specify ppa",
            ),
            ("Resources:\n  X:\n", "Resource X does not specify type"),
            (
                "Resources:\n  X:\n    type: rpm\n    location: /a\n",
                "Resource X has unknown type 'rpm'",
            ),
        ];
        for (text, expected) in cases {
            assert_eq!(parse_err(text).to_string(), expected, "input: {text}");
        }
    }

    #[test]
    fn missing_section_is_rejected() {
        assert!(matches!(
            parse_err("Other: {}\n"),
            ConfigError::MissingSection(ref s) if s == "Resources"
        ));
    }

    #[test]
    fn unknown_fields_are_syntax_errors() {
        let err = parse_err("Resources:\n  X:\n    type: exe\n    locaton: /a\n");
        assert!(
            matches!(err, ConfigError::InvalidSyntax { ref message, .. } if message.contains("resource X")),
            "got {err:?}"
        );
    }

    #[test]
    fn recorded_downloaded_state_is_ignored() {
        let resources = parse_ok(
            "Resources:\n  Code:\n    type: deb\n    location: /opt/pkgs/code.deb\n    downloaded: true\n  Banner:\n    type: static\n    extension: .png\n    location: /srv/banner.png\n    downloaded: {at: 2019-01-01}\n",
        );
        assert_eq!(resources.len(), 2);
        assert_eq!(
            resources[0].location,
            Some(Location::Local("/opt/pkgs/code.deb".into()))
        );
        assert_eq!(resources[1].kind.tag(), "static");
    }

    #[test]
    fn non_string_label_is_rejected() {
        assert!(matches!(
            parse_err("Resources:\n  42:\n    type: apt\n    packages: a\n"),
            ConfigError::InvalidLabel(_)
        ));
    }

    #[test]
    fn malformed_yaml_is_syntax_error() {
        assert!(matches!(
            parse_err("Resources: [unclosed"),
            ConfigError::InvalidSyntax { .. }
        ));
    }

    // -----------------------------------------------------------------------
    // files
    // -----------------------------------------------------------------------

    #[test]
    fn load_all_concatenates_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("base.yaml");
        let second = dir.path().join("extra.yml");
        std::fs::write(&first, "Resources:\n  A:\n    type: apt\n    packages: a\n").unwrap();
        std::fs::write(&second, "Resources:\n  B:\n    type: apt\n    packages: b\n").unwrap();
        let resources = load_all(&[first, second]).unwrap();
        let labels: Vec<&str> = resources.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "B"]);
    }

    #[test]
    fn load_all_rejects_label_repeated_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.yaml");
        let second = dir.path().join("b.yaml");
        std::fs::write(&first, "Resources:\n  Editors:\n    type: apt\n    packages: nano\n")
            .unwrap();
        std::fs::write(&second, "Resources:\n  Editors:\n    type: apt\n    packages: vim\n")
            .unwrap();

        let err = load_all(&[&first, &second]).unwrap_err();
        let ConfigError::DuplicateLabel {
            label,
            first: first_file,
            second: second_file,
        } = err
        else {
            panic!("expected a duplicate label error");
        };
        assert_eq!(label, "Editors");
        assert_eq!(first_file, first.display().to_string());
        assert_eq!(second_file, second.display().to_string());
    }

    #[test]
    fn load_all_allows_the_same_file_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.yaml");
        std::fs::write(&path, "Resources:\n  A:\n    type: apt\n    packages: a\n").unwrap();
        assert_eq!(load_all(&[&path, &path]).unwrap().len(), 2);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
