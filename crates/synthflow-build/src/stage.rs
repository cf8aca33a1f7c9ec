//! Stage graph: the build as an acyclic graph of declarative stages
//!
//! Edges are implied by path overlap: a stage depends on every stage that
//! declares one of its inputs as an output. The execution order is a
//! topological sort with ties broken by authoring order.

use crate::error::{BuildError, BuildResult};
use crate::staging::StagedLink;
use crate::validator::ValidationSpec;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::PathBuf;

/// External program invocation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ToolInvocation {
    /// Program name or path
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
}

impl ToolInvocation {
    /// Create an invocation with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// What a stage does when it runs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StageCommand {
    /// Run an external toolchain program in the workspace
    Tool(ToolInvocation),
    /// Link external files into the workspace
    Link { links: Vec<StagedLink> },
    /// Emit the deployment script for a bitstream
    DeployScript {
        bitstream: PathBuf,
        script: PathBuf,
        flash_tool: String,
    },
}

impl StageCommand {
    /// Stable textual identity of the command, used for stamps
    pub fn fingerprint(&self) -> String {
        match self {
            Self::Tool(invocation) => {
                let mut parts = vec![invocation.program.as_str()];
                parts.extend(invocation.args.iter().map(String::as_str));
                format!("tool\0{}", parts.join("\0"))
            }
            Self::Link { links } => {
                let pairs: Vec<String> = links
                    .iter()
                    .map(|l| format!("{}>{}", l.source.display(), l.dest.display()))
                    .collect();
                format!("link\0{}", pairs.join("\0"))
            }
            Self::DeployScript {
                bitstream,
                script,
                flash_tool,
            } => format!(
                "deploy\0{}\0{}\0{}",
                bitstream.display(),
                script.display(),
                flash_tool
            ),
        }
    }
}

impl fmt::Display for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tool(invocation) => invocation.fmt(f),
            Self::Link { links } => write!(f, "link {} file(s)", links.len()),
            Self::DeployScript {
                bitstream, script, ..
            } => write!(
                f,
                "write {} for {}",
                script.display(),
                bitstream.display()
            ),
        }
    }
}

/// One step of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    /// Stage name (unique within a graph)
    pub name: String,
    /// Paths read by the stage, relative to the workspace
    pub inputs: BTreeSet<PathBuf>,
    /// Paths written by the stage, relative to the workspace
    pub outputs: BTreeSet<PathBuf>,
    /// Action
    pub command: StageCommand,
    /// Authoring position; assigned when added to a graph
    pub index: usize,
}

impl Stage {
    /// Create a stage
    pub fn new(name: impl Into<String>, command: StageCommand) -> Self {
        Self {
            name: name.into(),
            inputs: BTreeSet::new(),
            outputs: BTreeSet::new(),
            command,
            index: 0,
        }
    }

    /// Create a stage that runs an external tool
    pub fn tool(name: impl Into<String>, invocation: ToolInvocation) -> Self {
        Self::new(name, StageCommand::Tool(invocation))
    }

    /// Add declared inputs
    pub fn with_inputs<I, P>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.inputs.extend(inputs.into_iter().map(Into::into));
        self
    }

    /// Add declared outputs
    pub fn with_outputs<I, P>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.outputs.extend(outputs.into_iter().map(Into::into));
        self
    }
}

/// The build as a directed acyclic graph of stages
#[derive(Debug, Clone, Default)]
pub struct StageGraph {
    stages: Vec<Stage>,
    validation: Option<ValidationSpec>,
}

impl StageGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage; its index becomes its authoring position
    pub fn add_stage(&mut self, mut stage: Stage) -> BuildResult<()> {
        if self.stage(&stage.name).is_some() {
            return Err(BuildError::DuplicateStage(stage.name));
        }
        stage.index = self.stages.len();
        self.stages.push(stage);
        Ok(())
    }

    /// Designate the stage whose report decides the build status
    pub fn set_validation(&mut self, spec: ValidationSpec) {
        self.validation = Some(spec);
    }

    /// Validation designation, if any
    pub fn validation(&self) -> Option<&ValidationSpec> {
        self.validation.as_ref()
    }

    /// Get a stage by name
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Stages in authoring order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Stage count
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if graph is empty
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Indices of the stages that produce one of `index`'s inputs
    fn dependencies(&self, index: usize) -> Vec<usize> {
        let stage = &self.stages[index];
        self.stages
            .iter()
            .filter(|other| !other.outputs.is_disjoint(&stage.inputs))
            .map(|other| other.index)
            .collect()
    }

    /// Names of the stages `name` directly depends on
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        match self.stage(name) {
            Some(stage) => self
                .dependencies(stage.index)
                .into_iter()
                .map(|i| self.stages[i].name.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Validate the graph against the paths available before any stage runs.
    ///
    /// Checks that no two stages declare the same output, that every input
    /// is either available up front or produced by some stage, that the
    /// validation stage exists, and that the graph is acyclic.
    pub fn validate(&self, available: &BTreeSet<PathBuf>) -> BuildResult<()> {
        let mut producers: BTreeMap<&PathBuf, &str> = BTreeMap::new();
        for stage in &self.stages {
            for output in &stage.outputs {
                if let Some(first) = producers.insert(output, &stage.name) {
                    return Err(BuildError::DuplicateOutput {
                        path: output.clone(),
                        first: first.to_string(),
                        second: stage.name.clone(),
                    });
                }
            }
        }

        for stage in &self.stages {
            for input in &stage.inputs {
                if !available.contains(input) && !producers.contains_key(input) {
                    return Err(BuildError::UnmaterializedInput {
                        stage: stage.name.clone(),
                        input: input.clone(),
                    });
                }
            }
        }

        if let Some(spec) = &self.validation {
            let stage = self.stage(&spec.stage).ok_or_else(|| {
                BuildError::InvalidGraph(format!(
                    "validation stage '{}' is not in the graph",
                    spec.stage
                ))
            })?;
            if !stage.outputs.contains(&spec.report) {
                return Err(BuildError::InvalidGraph(format!(
                    "report {} is not an output of stage '{}'",
                    spec.report.display(),
                    spec.stage
                )));
            }
        }

        self.topological_order().map(|_| ())
    }

    /// Compute execution order using Kahn's algorithm.
    /// Among ready stages the lowest authoring index goes first.
    pub fn topological_order(&self) -> BuildResult<Vec<&Stage>> {
        let count = self.stages.len();
        let mut in_degree = vec![0usize; count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];

        for index in 0..count {
            let deps = self.dependencies(index);
            in_degree[index] = deps.len();
            for dep in deps {
                dependents[dep].push(index);
            }
        }

        let mut ready: BTreeSet<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);

        while let Some(index) = ready.pop_first() {
            order.push(&self.stages[index]);
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != count {
            return Err(BuildError::CircularDependency(self.find_cycle()));
        }

        Ok(order)
    }

    /// Find a cycle in the graph (for error reporting)
    fn find_cycle(&self) -> String {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for index in 0..self.stages.len() {
            if let Some(cycle) = self.dfs_find_cycle(index, &mut visited, &mut rec_stack, &mut path) {
                return cycle;
            }
        }

        "unknown cycle".to_string()
    }

    fn dfs_find_cycle(
        &self,
        index: usize,
        visited: &mut HashSet<usize>,
        rec_stack: &mut HashSet<usize>,
        path: &mut Vec<usize>,
    ) -> Option<String> {
        if rec_stack.contains(&index) {
            path.push(index);
            let start = path.iter().position(|&i| i == index).unwrap_or(0);
            let names: Vec<&str> = path[start..]
                .iter()
                .map(|&i| self.stages[i].name.as_str())
                .collect();
            return Some(names.join(" -> "));
        }

        if !visited.insert(index) {
            return None;
        }

        rec_stack.insert(index);
        path.push(index);

        for dep in self.dependencies(index) {
            if let Some(cycle) = self.dfs_find_cycle(dep, visited, rec_stack, path) {
                return Some(cycle);
            }
        }

        rec_stack.remove(&index);
        path.pop();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_stage(name: &str, inputs: &[&str], outputs: &[&str]) -> Stage {
        Stage::tool(name, ToolInvocation::new("true"))
            .with_inputs(inputs.iter().copied())
            .with_outputs(outputs.iter().copied())
    }

    fn names(order: &[&Stage]) -> Vec<String> {
        order.iter().map(|s| s.name.clone()).collect()
    }

    #[test]
    fn test_empty_graph() {
        let graph = StageGraph::new();
        assert!(graph.is_empty());
        assert!(graph.topological_order().unwrap().is_empty());
    }

    #[test]
    fn test_linear_chain_authored_backwards() {
        let mut graph = StageGraph::new();
        graph.add_stage(tool_stage("fit", &["map.out"], &["fit.out"])).unwrap();
        graph.add_stage(tool_stage("asm", &["fit.out"], &["top.sof"])).unwrap();
        graph.add_stage(tool_stage("map", &["a.v"], &["map.out"])).unwrap();

        let order = graph.topological_order().unwrap();
        assert_eq!(names(&order), vec!["map", "fit", "asm"]);
    }

    #[test]
    fn test_ties_broken_by_authoring_index() {
        let mut graph = StageGraph::new();
        graph.add_stage(tool_stage("export", &[], &["snap.qdb"])).unwrap();
        graph.add_stage(tool_stage("import-overlay", &["snap.qdb"], &["overlay.rpt"])).unwrap();
        graph.add_stage(tool_stage("import-base", &["snap.qdb"], &["base.rpt"])).unwrap();
        graph
            .add_stage(tool_stage("fit", &["base.rpt", "overlay.rpt"], &["fit.rpt"]))
            .unwrap();

        let order = graph.topological_order().unwrap();
        assert_eq!(
            names(&order),
            vec!["export", "import-overlay", "import-base", "fit"]
        );
        assert_eq!(order[1].index, 1);
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let mut graph = StageGraph::new();
        graph.add_stage(tool_stage("map", &[], &["a"])).unwrap();
        let err = graph.add_stage(tool_stage("map", &[], &["b"])).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateStage(name) if name == "map"));
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = StageGraph::new();
        graph.add_stage(tool_stage("a", &["b.out"], &["a.out"])).unwrap();
        graph.add_stage(tool_stage("b", &["a.out"], &["b.out"])).unwrap();

        match graph.topological_order() {
            Err(BuildError::CircularDependency(cycle)) => {
                assert!(cycle.contains("a"));
                assert!(cycle.contains("b"));
                assert!(cycle.contains("->"));
            }
            other => panic!("expected CircularDependency, got {:?}", other.map(|o| o.len())),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut graph = StageGraph::new();
        graph.add_stage(tool_stage("loop", &["x"], &["x"])).unwrap();
        assert!(matches!(
            graph.topological_order(),
            Err(BuildError::CircularDependency(_))
        ));
    }

    #[test]
    fn test_validate_unmaterialized_input() {
        let mut graph = StageGraph::new();
        graph.add_stage(tool_stage("map", &["a.v", "b.v"], &["map.out"])).unwrap();

        let available: BTreeSet<PathBuf> = [PathBuf::from("a.v")].into_iter().collect();
        match graph.validate(&available) {
            Err(BuildError::UnmaterializedInput { stage, input }) => {
                assert_eq!(stage, "map");
                assert_eq!(input, PathBuf::from("b.v"));
            }
            other => panic!("expected UnmaterializedInput, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_duplicate_output() {
        let mut graph = StageGraph::new();
        graph.add_stage(tool_stage("sta", &[], &["top.rpt"])).unwrap();
        graph.add_stage(tool_stage("sta2", &[], &["top.rpt"])).unwrap();

        assert!(matches!(
            graph.validate(&BTreeSet::new()),
            Err(BuildError::DuplicateOutput { .. })
        ));
    }

    #[test]
    fn test_validate_checks_validation_stage() {
        let mut graph = StageGraph::new();
        graph.add_stage(tool_stage("sta", &[], &["top.sta.rpt"])).unwrap();
        graph.set_validation(ValidationSpec::new("timing", "top.sta.rpt", "ok", "bad"));
        assert!(matches!(
            graph.validate(&BTreeSet::new()),
            Err(BuildError::InvalidGraph(_))
        ));

        graph.set_validation(ValidationSpec::new("sta", "other.rpt", "ok", "bad"));
        assert!(matches!(
            graph.validate(&BTreeSet::new()),
            Err(BuildError::InvalidGraph(_))
        ));

        graph.set_validation(ValidationSpec::new("sta", "top.sta.rpt", "ok", "bad"));
        assert!(graph.validate(&BTreeSet::new()).is_ok());
    }

    #[test]
    fn test_dependencies_of() {
        let mut graph = StageGraph::new();
        graph.add_stage(tool_stage("map", &[], &["m"])).unwrap();
        graph.add_stage(tool_stage("merge", &["m"], &["g"])).unwrap();
        assert_eq!(graph.dependencies_of("merge"), vec!["map"]);
        assert!(graph.dependencies_of("map").is_empty());
        assert!(graph.dependencies_of("missing").is_empty());
    }

    #[test]
    fn test_fingerprint_changes_with_args() {
        let a = StageCommand::Tool(ToolInvocation::new("quartus_fit").arg("top"));
        let b = StageCommand::Tool(ToolInvocation::new("quartus_fit").arg("top").arg("--seed=2"));
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }

    #[test]
    fn test_invocation_display() {
        let inv = ToolInvocation::new("quartus_cdb").args(["top", "--merge"]);
        assert_eq!(inv.to_string(), "quartus_cdb top --merge");
    }
}
