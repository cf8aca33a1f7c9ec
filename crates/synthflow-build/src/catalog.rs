//! Artifact catalog: one canonical, deterministically ordered input list
//!
//! The catalog is a pure function of its inputs. Lists are classified,
//! sorted by (group, path) and deduplicated before anything else looks at
//! them, so the order in which paths were supplied never leaks into the
//! descriptor.

use crate::artifact::{ArtifactGroup, ArtifactKind, BuildArtifact};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};
use synthflow_config::{SourceRole, SourcesConfig};

/// Unordered source inputs, keyed by role
#[derive(Debug, Clone, Default)]
pub struct SourceLists {
    lists: BTreeMap<SourceRole, Vec<PathBuf>>,
    boundaries: Vec<String>,
    wrapper_dir: PathBuf,
}

impl SourceLists {
    /// Create empty source lists
    pub fn new() -> Self {
        Self {
            lists: BTreeMap::new(),
            boundaries: Vec::new(),
            wrapper_dir: PathBuf::from(".bsc"),
        }
    }

    /// Build source lists from a target's `[sources]` table
    pub fn from_config(sources: &SourcesConfig) -> Self {
        let mut lists = Self::new()
            .with_boundaries(sources.boundaries.clone(), sources.wrapper_dir());
        for role in SourceRole::ALL {
            lists.add(role, sources.paths(role).iter().cloned());
        }
        lists
    }

    /// Add paths under a role
    pub fn add<I, P>(&mut self, role: SourceRole, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.lists
            .entry(role)
            .or_default()
            .extend(paths.into_iter().map(Into::into));
    }

    /// Builder-style variant of [`SourceLists::add`]
    pub fn with<I, P>(mut self, role: SourceRole, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.add(role, paths);
        self
    }

    /// Set module boundaries and the directory their wrappers live in
    pub fn with_boundaries(mut self, boundaries: Vec<String>, wrapper_dir: impl Into<PathBuf>) -> Self {
        self.boundaries = boundaries;
        self.wrapper_dir = wrapper_dir.into();
        self
    }

    /// Paths for a role
    pub fn paths(&self, role: SourceRole) -> &[PathBuf] {
        self.lists.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Canonical ordered list of build artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Catalog {
    artifacts: Vec<BuildArtifact>,
}

impl Catalog {
    /// Classify, sort and deduplicate all inputs, then append one wrapper
    /// source per module boundary.
    pub fn build(lists: &SourceLists) -> Self {
        let mut artifacts: Vec<BuildArtifact> = lists
            .lists
            .iter()
            .flat_map(|(&role, paths)| {
                paths.iter().map(move |path| {
                    BuildArtifact::new(normalize_path(path), ArtifactKind::classify(role, path))
                })
            })
            .collect();

        artifacts.sort_by(|a, b| {
            a.kind
                .group()
                .cmp(&b.kind.group())
                .then_with(|| a.path.cmp(&b.path))
        });

        let mut seen = HashSet::new();
        artifacts.retain(|artifact| seen.insert(artifact.path.clone()));

        let boundaries: BTreeSet<&str> = lists.boundaries.iter().map(String::as_str).collect();
        for boundary in boundaries {
            let path = normalize_path(&lists.wrapper_dir.join(wrapper_file_name(boundary)));
            if seen.insert(path.clone()) {
                artifacts.push(BuildArtifact::new(path, ArtifactKind::RtlSource));
            }
        }

        Self { artifacts }
    }

    /// All artifacts in canonical order
    pub fn artifacts(&self) -> &[BuildArtifact] {
        &self.artifacts
    }

    /// Artifacts of one ordering group, in catalog order
    pub fn group(&self, group: ArtifactGroup) -> Vec<&BuildArtifact> {
        self.artifacts
            .iter()
            .filter(|a| a.kind.group() == group)
            .collect()
    }

    /// Set of every catalogued path
    pub fn paths(&self) -> BTreeSet<PathBuf> {
        self.artifacts.iter().map(|a| a.path.clone()).collect()
    }

    /// Number of artifacts
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Check if the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// File name of the wrapper generated for a module boundary
pub fn wrapper_file_name(boundary: &str) -> String {
    format!("mk_{}_Wrapper.v", boundary)
}

/// Lexically normalize a path: drop `.` components and fold `..` into
/// preceding normal components. Never touches the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }

    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn paths(catalog: &Catalog) -> Vec<String> {
        catalog
            .artifacts()
            .iter()
            .map(|a| a.path.display().to_string())
            .collect()
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = Catalog::build(&SourceLists::new());
        assert!(catalog.is_empty());
        assert_eq!(catalog.len(), 0);
    }

    #[test]
    fn test_sorted_before_grouping() {
        let lists = SourceLists::new()
            .with(SourceRole::Rtl, ["hw/b.v", "hw/a.v"])
            .with(SourceRole::Constraints, ["y.sdc", "x.sdc"])
            .with(SourceRole::ConstraintHeaders, ["h.tcl"]);

        let catalog = Catalog::build(&lists);
        assert_eq!(paths(&catalog), vec!["h.tcl", "x.sdc", "y.sdc", "hw/a.v", "hw/b.v"]);
    }

    #[test]
    fn test_deduplicates_normalized_paths() {
        let lists = SourceLists::new().with(
            SourceRole::Rtl,
            ["hw/a.v", "./hw/a.v", "hw/../hw/a.v", "hw/b.sv"],
        );

        let catalog = Catalog::build(&lists);
        assert_eq!(paths(&catalog), vec!["hw/a.v", "hw/b.sv"]);
        assert_eq!(catalog.artifacts()[1].kind, ArtifactKind::SystemVerilogSource);
    }

    #[test]
    fn test_duplicate_across_roles_keeps_earliest_group() {
        let lists = SourceLists::new()
            .with(SourceRole::Constraints, ["c.sdc"])
            .with(SourceRole::ConstraintHeaders, ["c.sdc"]);

        let catalog = Catalog::build(&lists);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.artifacts()[0].kind, ArtifactKind::ConstraintHeader);
    }

    #[test]
    fn test_wrappers_appended_per_boundary() {
        let lists = SourceLists::new()
            .with(SourceRole::Rtl, ["hw/z.v"])
            .with_boundaries(
                vec!["top".to_string(), "core".to_string(), "core".to_string()],
                ".bsc",
            );

        let catalog = Catalog::build(&lists);
        assert_eq!(
            paths(&catalog),
            vec!["hw/z.v", ".bsc/mk_core_Wrapper.v", ".bsc/mk_top_Wrapper.v"]
        );
        let wrapper = &catalog.artifacts()[1];
        assert_eq!(wrapper.kind, ArtifactKind::RtlSource);
        assert_eq!(wrapper.producing_stage, None);
    }

    #[test]
    fn test_group_query_sorted() {
        let lists = SourceLists::new()
            .with(SourceRole::Rtl, ["b.v", "a.sv"])
            .with(SourceRole::Vhdl, ["z.vhd"]);

        let catalog = Catalog::build(&lists);
        let hdl: Vec<_> = catalog
            .group(ArtifactGroup::Hdl)
            .iter()
            .map(|a| a.path.clone())
            .collect();
        assert_eq!(hdl, vec![PathBuf::from("a.sv"), PathBuf::from("b.v")]);
        assert_eq!(catalog.group(ArtifactGroup::Vhdl).len(), 1);
        assert!(catalog.group(ArtifactGroup::Packages).is_empty());
    }

    #[test]
    fn test_from_config() {
        let sources = SourcesConfig {
            rtl: vec![PathBuf::from("hw/top.v")],
            packages: vec![PathBuf::from("hw/pkg.sv")],
            boundaries: vec!["top".to_string()],
            wrapper_dir: Some(PathBuf::from("gen")),
            ..Default::default()
        };

        let catalog = Catalog::build(&SourceLists::from_config(&sources));
        assert_eq!(
            paths(&catalog),
            vec!["hw/pkg.sv", "hw/top.v", "gen/mk_top_Wrapper.v"]
        );
        assert_eq!(catalog.artifacts()[0].kind, ArtifactKind::Package);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("./a/b/../c.v")), PathBuf::from("a/c.v"));
        assert_eq!(normalize_path(Path::new("../x.v")), PathBuf::from("../x.v"));
        assert_eq!(normalize_path(Path::new("a/../../x.v")), PathBuf::from("../x.v"));
        assert_eq!(normalize_path(Path::new("/a/../../x.v")), PathBuf::from("/x.v"));
        assert_eq!(normalize_path(Path::new("./")), PathBuf::from("."));
    }
}
