//! Build step graph
//!
//! Uses petgraph to hold the build's steps as a DAG and groups them into
//! stages: every step of a stage runs concurrently, and a stage starts only
//! after the previous one has fully finished.

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::fmt;

use crate::error::{BuildError, Result};

/// One unit of the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Step {
    /// Destination collision check; must pass before anything is written
    Verify,
    Scripts,
    Styles,
    Assets,
}

impl Step {
    pub const PRODUCERS: [Step; 3] = [Step::Scripts, Step::Styles, Step::Assets];

    pub fn name(&self) -> &'static str {
        match self {
            Step::Verify => "verify",
            Step::Scripts => "scripts",
            Step::Styles => "styles",
            Step::Assets => "assets",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal state of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerReport {
    pub step: Step,
    pub succeeded: usize,
    pub failed: usize,
}

impl ProducerReport {
    pub fn empty(step: Step) -> Self {
        Self {
            step,
            succeeded: 0,
            failed: 0,
        }
    }

    pub fn from_results(step: Step, results: &[bool]) -> Self {
        let succeeded = results.iter().filter(|ok| **ok).count();
        Self {
            step,
            succeeded,
            failed: results.len() - succeeded,
        }
    }
}

/// The build step dependency graph
#[derive(Debug)]
pub struct BuildGraph {
    graph: DiGraph<Step, ()>,
    index: HashMap<Step, NodeIndex>,
}

impl BuildGraph {
    /// `verify` → {`scripts`, `styles`, `assets`}
    pub fn standard() -> Result<Self> {
        let mut deps = vec![(Step::Verify, vec![])];
        for step in Step::PRODUCERS {
            deps.push((step, vec![Step::Verify]));
        }
        Self::from_dependencies(&deps)
    }

    /// Build a graph from `(step, depends_on)` pairs
    pub fn from_dependencies(deps: &[(Step, Vec<Step>)]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for (step, _) in deps {
            index.entry(*step).or_insert_with(|| graph.add_node(*step));
        }

        for (step, depends) in deps {
            let step_idx = index[step];
            for dep in depends {
                let dep_idx = *index.get(dep).ok_or_else(|| BuildError::StepAborted {
                    step: step.to_string(),
                    message: format!("depends on unknown step '{}'", dep),
                })?;
                // Edge goes from dependency TO dependent (dep must run first)
                graph.add_edge(dep_idx, step_idx, ());
            }
        }

        if is_cyclic_directed(&graph) {
            return Err(BuildError::StepAborted {
                step: "graph".to_string(),
                message: "build steps form a cycle".to_string(),
            });
        }

        Ok(Self { graph, index })
    }

    /// Direct dependencies of a step
    pub fn dependencies(&self, step: Step) -> Vec<Step> {
        self.index
            .get(&step)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Incoming)
                    .map(|dep| self.graph[dep])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Group the steps into stages that can run concurrently
    pub fn plan(&self) -> BuildPlan {
        let sorted = toposort(&self.graph, None).unwrap_or_default();
        let mut stages: Vec<Vec<Step>> = Vec::new();

        for idx in sorted {
            let step = self.graph[idx];
            let deps = self.dependencies(step);

            // earliest stage after every dependency
            let mut target = 0;
            for (i, stage) in stages.iter().enumerate() {
                if stage.iter().any(|s| deps.contains(s)) {
                    target = i + 1;
                }
            }

            while stages.len() <= target {
                stages.push(Vec::new());
            }
            stages[target].push(step);
        }

        for stage in &mut stages {
            stage.sort();
        }

        BuildPlan { stages }
    }
}

/// Stages of a build, in execution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub stages: Vec<Vec<Step>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_plan() {
        let plan = BuildGraph::standard().unwrap().plan();
        assert_eq!(
            plan.stages,
            vec![
                vec![Step::Verify],
                vec![Step::Scripts, Step::Styles, Step::Assets],
            ]
        );
    }

    #[test]
    fn test_chain_dependencies() {
        let graph = BuildGraph::from_dependencies(&[
            (Step::Verify, vec![]),
            (Step::Styles, vec![Step::Verify]),
            (Step::Assets, vec![Step::Styles]),
        ])
        .unwrap();

        assert_eq!(
            graph.plan().stages,
            vec![vec![Step::Verify], vec![Step::Styles], vec![Step::Assets]]
        );
        assert_eq!(graph.dependencies(Step::Assets), vec![Step::Styles]);
    }

    #[test]
    fn test_cycle_detection() {
        let result = BuildGraph::from_dependencies(&[
            (Step::Styles, vec![Step::Assets]),
            (Step::Assets, vec![Step::Styles]),
        ]);
        assert!(matches!(result, Err(BuildError::StepAborted { .. })));
    }

    #[test]
    fn test_unknown_dependency() {
        let result = BuildGraph::from_dependencies(&[(Step::Styles, vec![Step::Verify])]);
        assert!(result.is_err());
    }

    #[test]
    fn test_report_counts() {
        let report = ProducerReport::from_results(Step::Assets, &[true, false, true]);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
    }
}
