//! Arena-backed component graph
//!
//! All components live in one arena addressed by [`ComponentId`]; the tree
//! relation (UI grouping) and the dependency relation are stored separately
//! as index references. Keeping the relations off the nodes avoids
//! bidirectional pointers between components that reference each other.
//!
//! `resolve()` materializes the name-based dependency edges into index
//! edges, records unresolved references (missing or disabled targets) and
//! rejects dependency cycles with a three-color depth-first search.

use std::collections::HashMap;

use crate::error::{Result, circular_dependency};

use super::Component;

/// Index of a component within the graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(usize);

impl ComponentId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// DFS marking for cycle detection: unvisited, in the current path, done
#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// The set of all components plus their tree and dependency relations
#[derive(Default)]
pub struct ComponentGraph {
    components: Vec<Component>,
    index: HashMap<String, ComponentId>,
    parent: Vec<Option<ComponentId>>,
    children: Vec<Vec<ComponentId>>,
    dependencies: Vec<Vec<ComponentId>>,
    dependees: Vec<Vec<ComponentId>>,
    /// Components whose named dependency is missing or disabled, with the
    /// offending dependency name
    unresolved: HashMap<usize, String>,
}

impl ComponentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component to the arena; names are expected to be unique
    /// (the catalog loader validates this before building the graph)
    pub fn add(&mut self, component: Component) -> ComponentId {
        let id = ComponentId(self.components.len());
        self.index.insert(component.name().to_string(), id);
        self.components.push(component);
        self.parent.push(None);
        self.children.push(Vec::new());
        self.dependencies.push(Vec::new());
        self.dependees.push(Vec::new());
        id
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// All component ids in catalog order
    pub fn ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        (0..self.components.len()).map(ComponentId)
    }

    pub fn get(&self, id: ComponentId) -> &Component {
        &self.components[id.0]
    }

    pub fn get_mut(&mut self, id: ComponentId) -> &mut Component {
        &mut self.components[id.0]
    }

    pub fn id_of(&self, name: &str) -> Option<ComponentId> {
        self.index.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&Component> {
        self.id_of(name).map(|id| self.get(id))
    }

    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut Component> {
        self.id_of(name).map(|id| &mut self.components[id.0])
    }

    /// Attach a child under a parent in the UI grouping tree
    pub fn set_parent(&mut self, child: ComponentId, parent: ComponentId) {
        self.parent[child.0] = Some(parent);
        self.children[parent.0].push(child);
    }

    pub fn parent_of(&self, id: ComponentId) -> Option<ComponentId> {
        self.parent[id.0]
    }

    pub fn children_of(&self, id: ComponentId) -> &[ComponentId] {
        &self.children[id.0]
    }

    /// Resolved direct dependency edges; empty before `resolve()`
    pub fn dependencies_of(&self, id: ComponentId) -> &[ComponentId] {
        &self.dependencies[id.0]
    }

    /// Reverse dependency lookup; empty before `resolve()`
    pub fn dependees_of(&self, id: ComponentId) -> &[ComponentId] {
        &self.dependees[id.0]
    }

    /// The unresolved dependency name recorded for a component, if any
    pub fn unresolved_dependency(&self, id: ComponentId) -> Option<&str> {
        self.unresolved.get(&id.0).map(String::as_str)
    }

    /// Find an unresolved dependency reachable from `id` through the
    /// dependency relation, returning the owning component and the
    /// dependency name. A component with such a reference cannot be
    /// selected, and neither can its dependees.
    pub fn transitive_unresolved(&self, id: ComponentId) -> Option<(&Component, &str)> {
        let mut stack = vec![id];
        let mut seen = vec![false; self.components.len()];
        while let Some(current) = stack.pop() {
            if seen[current.0] {
                continue;
            }
            seen[current.0] = true;
            if let Some(dependency) = self.unresolved_dependency(current) {
                return Some((self.get(current), dependency));
            }
            stack.extend_from_slice(&self.dependencies[current.0]);
        }
        None
    }

    /// Materialize dependency edges from names and reject cycles
    ///
    /// Disabled components are excluded from the relation entirely; a
    /// reference to a missing or disabled component is recorded as
    /// unresolved for the referencing component rather than failing the
    /// whole graph.
    pub fn resolve(&mut self) -> Result<()> {
        for edges in &mut self.dependencies {
            edges.clear();
        }
        for edges in &mut self.dependees {
            edges.clear();
        }
        self.unresolved.clear();

        for from in 0..self.components.len() {
            if !self.components[from].is_enabled() {
                continue;
            }
            let names: Vec<String> = self.components[from].dependencies().to_vec();
            for name in names {
                match self.index.get(&name) {
                    Some(&to) if self.components[to.0].is_enabled() => {
                        self.dependencies[from].push(to);
                        self.dependees[to.0].push(ComponentId(from));
                    }
                    _ => {
                        tracing::warn!(
                            component = %self.components[from].name(),
                            dependency = %name,
                            "unresolved dependency reference"
                        );
                        self.unresolved.entry(from).or_insert(name);
                    }
                }
            }
        }

        self.check_cycles()
    }

    fn check_cycles(&self) -> Result<()> {
        let mut colors = vec![Color::White; self.components.len()];
        let mut path = Vec::new();
        for start in 0..self.components.len() {
            if colors[start] == Color::White {
                self.cycle_dfs(start, &mut colors, &mut path)?;
            }
        }
        Ok(())
    }

    fn cycle_dfs(&self, node: usize, colors: &mut [Color], path: &mut Vec<usize>) -> Result<()> {
        colors[node] = Color::Gray;
        path.push(node);

        for &dep in &self.dependencies[node] {
            match colors[dep.0] {
                Color::Gray => {
                    // Found a back edge; report the cycle portion of the path.
                    let cycle_start = path.iter().position(|&n| n == dep.0).unwrap_or(0);
                    let mut chain: Vec<&str> = path[cycle_start..]
                        .iter()
                        .map(|&n| self.components[n].name())
                        .collect();
                    chain.push(self.components[dep.0].name());
                    return Err(circular_dependency(chain.join(" -> ")));
                }
                Color::White => self.cycle_dfs(dep.0, colors, path)?,
                Color::Black => {}
            }
        }

        path.pop();
        colors[node] = Color::Black;
        Ok(())
    }
}
