//! Controller registry: lowercase collection name -> resource, built once
//! at startup and immutable for the process lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::Resource;
use crate::entities;

#[derive(Default)]
pub struct Registry {
    resources: HashMap<String, Arc<Resource>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in entities: role, user, product,
    /// product-review.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(entities::role());
        registry.register(entities::user());
        registry.register(entities::product());
        registry.register(entities::product_review());
        registry
    }

    pub fn register(&mut self, resource: Resource) {
        self.resources
            .insert(resource.name.to_ascii_lowercase(), Arc::new(resource));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Resource>> {
        self.resources.get(&name.to_ascii_lowercase()).cloned()
    }

    /// Resolve a path segment to a resource, folding a trailing plural `s`
    /// when no controller is registered under the exact name. The singular
    /// form is adopted only if a controller exists for it.
    pub fn resolve(&self, segment: &str) -> Option<Arc<Resource>> {
        if let Some(resource) = self.get(segment) {
            return Some(resource);
        }
        segment
            .strip_suffix('s')
            .filter(|rest| !rest.is_empty())
            .and_then(|singular| self.get(singular))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_all_builtin_collections() {
        let registry = Registry::with_defaults();
        for name in ["role", "user", "product", "product-review"] {
            assert!(registry.get(name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn plural_segment_folds_to_singular() {
        let registry = Registry::with_defaults();
        let folded = registry.resolve("products").unwrap();
        assert_eq!(folded.name, "product");
        let exact = registry.resolve("product").unwrap();
        assert_eq!(exact.name, folded.name);
    }

    #[test]
    fn unknown_names_do_not_resolve() {
        let registry = Registry::with_defaults();
        assert!(registry.resolve("gadgets").is_none());
        assert!(registry.resolve("s").is_none());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = Registry::with_defaults();
        assert!(registry.get("Product").is_some());
    }
}
