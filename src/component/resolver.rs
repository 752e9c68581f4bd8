//! Selection propagation over the component graph
//!
//! Every toggle runs a full propagation pass over a scratch copy of the
//! selection state and commits it in one step, so readers never observe a
//! half-propagated graph. The rules, in order:
//!
//! 1. Checking a component checks everything it transitively depends on.
//! 2. Unchecking a component unchecks everything that transitively depends
//!    on it.
//! 3. A virtual component's effective state is the OR of its dependees'
//!    checked states (computed to a fixpoint).
//! 4. A tree parent aggregates its children: all checked, all unchecked, or
//!    partially checked. Aggregate states are UI-facing and never set
//!    directly.
//!
//! Disabled components are excluded from propagation entirely; a dependency
//! reference to one is unresolved and blocks selection of the dependees.

use crate::error::{
    Result, component_not_found, component_not_selectable, unresolved_dependency,
};

use super::graph::{ComponentGraph, ComponentId};
use super::CheckState;

/// Stateless selection engine; all state lives in the graph
pub struct Resolver;

impl Resolver {
    /// Resolve dependency edges and seed the selection from the installed
    /// flags, as done once after catalog load
    pub fn initialize(graph: &mut ComponentGraph) -> Result<()> {
        graph.resolve()?;

        let mut scratch = snapshot(graph);
        for id in graph.ids() {
            if graph.get(id).is_installed() && graph.get(id).is_enabled() {
                check_with_dependencies(graph, id, &mut scratch);
            }
        }
        settle_and_commit(graph, scratch);
        Ok(())
    }

    /// Toggle a component by name and propagate
    ///
    /// Virtual and disabled components cannot be toggled directly; checking
    /// a component with an unresolved dependency anywhere below it fails
    /// with `UnresolvedDependency`.
    pub fn set_checked(graph: &mut ComponentGraph, name: &str, checked: bool) -> Result<()> {
        let id = graph.id_of(name).ok_or_else(|| component_not_found(name))?;
        let component = graph.get(id);
        if component.is_virtual() || !component.is_enabled() {
            return Err(component_not_selectable(name));
        }
        if checked {
            if let Some((owner, dependency)) = graph.transitive_unresolved(id) {
                return Err(unresolved_dependency(owner.name(), dependency));
            }
        }

        let mut scratch = snapshot(graph);
        if checked {
            check_with_dependencies(graph, id, &mut scratch);
        } else {
            uncheck_with_dependees(graph, id, &mut scratch);
        }
        settle_and_commit(graph, scratch);
        Ok(())
    }

    /// Components to install: effectively checked and not yet installed,
    /// in catalog order
    pub fn install_set(graph: &ComponentGraph) -> Vec<ComponentId> {
        graph
            .ids()
            .filter(|&id| {
                let c = graph.get(id);
                c.is_enabled() && c.check_state() == CheckState::Checked && !c.is_installed()
            })
            .collect()
    }

    /// Components to uninstall: previously installed and now unchecked,
    /// in catalog order
    ///
    /// Disjoint from the install set by construction: one requires
    /// `installed`, the other requires its negation.
    pub fn uninstall_set(graph: &ComponentGraph) -> Vec<ComponentId> {
        graph
            .ids()
            .filter(|&id| {
                let c = graph.get(id);
                c.is_enabled() && c.check_state() == CheckState::Unchecked && c.is_installed()
            })
            .collect()
    }
}

fn snapshot(graph: &ComponentGraph) -> Vec<CheckState> {
    graph.ids().map(|id| graph.get(id).check_state()).collect()
}

fn check_with_dependencies(
    graph: &ComponentGraph,
    id: ComponentId,
    scratch: &mut [CheckState],
) {
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        if scratch[current.index()] == CheckState::Checked {
            continue;
        }
        scratch[current.index()] = CheckState::Checked;
        for &dep in graph.dependencies_of(current) {
            stack.push(dep);
        }
    }
}

fn uncheck_with_dependees(
    graph: &ComponentGraph,
    id: ComponentId,
    scratch: &mut [CheckState],
) {
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        if scratch[current.index()] == CheckState::Unchecked {
            continue;
        }
        scratch[current.index()] = CheckState::Unchecked;
        for &dependee in graph.dependees_of(current) {
            stack.push(dependee);
        }
    }
}

/// Run the virtual fixpoint and parent aggregation, then commit the scratch
/// state onto the graph in one pass
fn settle_and_commit(graph: &mut ComponentGraph, mut scratch: Vec<CheckState>) {
    // Virtual components follow the OR of their dependees. A change can
    // cascade through chains of virtuals, so iterate to a fixpoint.
    loop {
        let mut changed = false;
        for id in graph.ids() {
            let component = graph.get(id);
            if !component.is_virtual() || !component.is_enabled() {
                continue;
            }
            let implied = graph
                .dependees_of(id)
                .iter()
                .any(|&d| scratch[d.index()] == CheckState::Checked);
            let state = if implied {
                CheckState::Checked
            } else {
                CheckState::Unchecked
            };
            if scratch[id.index()] != state {
                scratch[id.index()] = state;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    for id in graph.ids() {
        if graph.parent_of(id).is_none() {
            aggregate_subtree(graph, id, &mut scratch);
        }
    }

    let ids: Vec<ComponentId> = graph.ids().collect();
    for id in ids {
        let state = scratch[id.index()];
        graph.get_mut(id).set_check_state(state);
    }
}

fn aggregate_subtree(
    graph: &ComponentGraph,
    id: ComponentId,
    scratch: &mut [CheckState],
) -> CheckState {
    let children: Vec<ComponentId> = graph
        .children_of(id)
        .iter()
        .copied()
        .filter(|&c| graph.get(c).is_enabled())
        .collect();
    if children.is_empty() {
        return scratch[id.index()];
    }

    let mut all_checked = true;
    let mut all_unchecked = true;
    for child in children {
        match aggregate_subtree(graph, child, scratch) {
            CheckState::Checked => all_unchecked = false,
            CheckState::Unchecked => all_checked = false,
            CheckState::PartiallyChecked => {
                all_checked = false;
                all_unchecked = false;
            }
        }
    }

    let state = if all_checked {
        CheckState::Checked
    } else if all_unchecked {
        CheckState::Unchecked
    } else {
        CheckState::PartiallyChecked
    };
    scratch[id.index()] = state;
    state
}
