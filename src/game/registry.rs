//! System Registry
//!
//! Systems declare a name, dependency names, an enable condition and a
//! factory. At startup the registry topologically sorts the enabled set into
//! the one linear execution order every peer uses. A cycle or a reference to
//! a name that was never declared is a fatal startup error - the scheduler
//! must never start over an inconsistent pipeline.

use thiserror::Error;
use tracing::info;

use super::config::MatchOptions;
use super::System;

/// A system declaration.
pub struct SystemSpec {
    /// Unique system name.
    pub name: &'static str,
    /// Names of systems that must run earlier in the tick.
    pub deps: &'static [&'static str],
    /// Whether this system is part of the pipeline for the given options.
    pub condition: fn(&MatchOptions) -> bool,
    /// Instantiate the system.
    pub factory: fn() -> Box<dyn System>,
}

/// Structural pipeline errors. All fatal at startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two declarations share a name.
    #[error("duplicate system declaration: {0}")]
    DuplicateSystem(String),
    /// A dependency names a system that was never declared.
    #[error("system {system} depends on undeclared system {dependency}")]
    UnknownDependency {
        /// Dependent system.
        system: String,
        /// Missing name.
        dependency: String,
    },
    /// The dependency graph has a cycle.
    #[error("dependency cycle among systems: {0:?}")]
    Cycle(Vec<String>),
}

/// Resolve declarations into an ordered pipeline of instantiated systems.
///
/// Dependencies on declared-but-disabled systems impose no edge; the
/// condition predicates are responsible for never disabling a system whose
/// outputs an enabled system needs.
pub fn build_pipeline(
    specs: &[SystemSpec],
    options: &MatchOptions,
) -> Result<Vec<Box<dyn System>>, RegistryError> {
    // Validate declarations against the full set, enabled or not.
    for (i, spec) in specs.iter().enumerate() {
        if specs[..i].iter().any(|other| other.name == spec.name) {
            return Err(RegistryError::DuplicateSystem(spec.name.to_string()));
        }
        for dep in spec.deps {
            if !specs.iter().any(|other| other.name == *dep) {
                return Err(RegistryError::UnknownDependency {
                    system: spec.name.to_string(),
                    dependency: dep.to_string(),
                });
            }
        }
    }

    let enabled: Vec<&SystemSpec> = specs.iter().filter(|s| (s.condition)(options)).collect();
    let index_of = |name: &str| enabled.iter().position(|s| s.name == name);

    // Kahn's algorithm. Ready nodes are taken in declaration order, which
    // makes the result independent of anything but the declarations.
    let mut indegree = vec![0usize; enabled.len()];
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); enabled.len()];
    for (i, spec) in enabled.iter().enumerate() {
        for dep in spec.deps {
            if let Some(d) = index_of(dep) {
                edges[d].push(i);
                indegree[i] += 1;
            }
        }
    }

    let mut order = Vec::with_capacity(enabled.len());
    let mut placed = vec![false; enabled.len()];
    while order.len() < enabled.len() {
        let next = (0..enabled.len()).find(|&i| !placed[i] && indegree[i] == 0);
        let Some(i) = next else {
            let stuck: Vec<String> = (0..enabled.len())
                .filter(|&i| !placed[i])
                .map(|i| enabled[i].name.to_string())
                .collect();
            return Err(RegistryError::Cycle(stuck));
        };
        placed[i] = true;
        for &succ in &edges[i] {
            indegree[succ] -= 1;
        }
        order.push(i);
    }

    let names: Vec<&str> = order.iter().map(|&i| enabled[i].name).collect();
    info!(pipeline = ?names, "system pipeline resolved");

    Ok(order.into_iter().map(|i| (enabled[i].factory)()).collect())
}
