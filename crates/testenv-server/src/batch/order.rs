//! Dependency ordering for a batch of servers.

use std::collections::{BTreeMap, BTreeSet};

use super::RunError;

/// Orders `nodes` so every server follows the servers named in its `after`
/// list. Servers whose dependencies are satisfied at the same time keep
/// their input order.
///
/// `nodes` pairs each name with its dependencies and must already be free
/// of duplicate names.
pub(super) fn start_order(nodes: &[(&str, &[String])]) -> Result<Vec<usize>, RunError> {
    let index: BTreeMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(position, (name, _))| (*name, position))
        .collect();

    let mut pending = vec![0_usize; nodes.len()];
    let mut dependants: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (position, (name, after)) in nodes.iter().enumerate() {
        let unique: BTreeSet<&str> = after.iter().map(String::as_str).collect();
        for dependency in unique {
            let Some(&target) = index.get(dependency) else {
                return Err(RunError::UnknownDependency {
                    server: (*name).to_owned(),
                    dependency: dependency.to_owned(),
                });
            };
            if let Some(count) = pending.get_mut(position) {
                *count += 1;
            }
            if let Some(list) = dependants.get_mut(target) {
                list.push(position);
            }
        }
    }

    let mut ready: BTreeSet<usize> = pending
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(position, _)| position)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependant in dependants.get(next).map_or(&[][..], Vec::as_slice) {
            if let Some(count) = pending.get_mut(dependant) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(dependant);
                }
            }
        }
    }

    if order.len() == nodes.len() {
        return Ok(order);
    }
    let cycle = nodes
        .iter()
        .zip(&pending)
        .filter(|(_, count)| **count > 0)
        .map(|((name, _), _)| (*name).to_owned())
        .collect();
    Err(RunError::DependencyCycle { servers: cycle })
}
