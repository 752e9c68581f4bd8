//! Component graph and selection errors

use super::InstackError;

/// Creates a component-not-found error
pub fn not_found(name: impl Into<String>) -> InstackError {
    InstackError::ComponentNotFound { name: name.into() }
}

/// Creates a not-selectable error for virtual or disabled components
pub fn not_selectable(name: impl Into<String>) -> InstackError {
    InstackError::ComponentNotSelectable { name: name.into() }
}

/// Creates an unresolved-dependency error
pub fn unresolved(component: impl Into<String>, dependency: impl Into<String>) -> InstackError {
    InstackError::UnresolvedDependency {
        component: component.into(),
        dependency: dependency.into(),
    }
}

/// Creates a circular-dependency error
pub fn circular(chain: impl Into<String>) -> InstackError {
    InstackError::CircularDependency {
        chain: chain.into(),
    }
}
