//! Registry of open views.

use crate::error::CoreResult;
use crate::view::ViewInner;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps view names to their shared state.
///
/// Ensures every handle to a name observes the same function bindings.
#[derive(Default)]
pub(crate) struct ViewRegistry {
    views: RwLock<HashMap<String, Arc<ViewInner>>>,
}

impl ViewRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<ViewInner>> {
        self.views.read().get(name).cloned()
    }

    /// Returns the registered view, or registers the one built by `create`.
    pub(crate) fn get_or_insert_with<F>(&self, name: &str, create: F) -> CoreResult<Arc<ViewInner>>
    where
        F: FnOnce() -> CoreResult<Arc<ViewInner>>,
    {
        if let Some(existing) = self.get(name) {
            return Ok(existing);
        }
        let mut views = self.views.write();
        if let Some(existing) = views.get(name) {
            return Ok(Arc::clone(existing));
        }
        let inner = create()?;
        views.insert(name.to_string(), Arc::clone(&inner));
        Ok(inner)
    }

    /// Unregisters `name` if it still refers to `inner`.
    pub(crate) fn remove(&self, name: &str, inner: &Arc<ViewInner>) -> bool {
        let mut views = self.views.write();
        match views.get(name) {
            Some(current) if Arc::ptr_eq(current, inner) => {
                views.remove(name);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.views.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docview_storage::ViewId;

    #[test]
    fn insert_once_and_remove() {
        let registry = ViewRegistry::new();
        let first = registry
            .get_or_insert_with("a", || Ok(Arc::new(ViewInner::new("a", ViewId::new(1)))))
            .unwrap();
        let again = registry
            .get_or_insert_with("a", || panic!("must not create twice"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(registry.names(), vec!["a".to_string()]);

        let stranger = Arc::new(ViewInner::new("a", ViewId::new(2)));
        assert!(!registry.remove("a", &stranger));
        assert!(registry.remove("a", &first));
        assert!(registry.get("a").is_none());
    }
}
