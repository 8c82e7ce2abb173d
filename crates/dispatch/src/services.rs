//! Shared bot services and per-invocation scopes.

use std::{
    any::{Any, TypeId},
    sync::Arc,
};

use {parley_common::SyncMap, tracing::trace};

type Service = Arc<dyn Any + Send + Sync>;

/// Type-keyed registry of services shared by every invocation.
#[derive(Default)]
pub struct Services {
    map: SyncMap<TypeId, Service>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, replacing any previous one of the same type.
    pub fn insert<T: Any + Send + Sync>(&self, service: Arc<T>) {
        self.map.insert(TypeId::of::<T>(), service);
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|s| s.downcast::<T>().ok())
    }

    /// Return the registered `T`, creating it with `init` if absent.
    pub fn get_or_insert_with<T, F>(&self, init: F) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        self.map
            .get_or_insert_with(TypeId::of::<T>(), |_| Arc::new(init()) as Service)
            .downcast::<T>()
            .ok()
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("len", &self.map.len())
            .finish()
    }
}

/// Per-invocation view over [`Services`].
///
/// Lookups check scoped values first, then the shared registry. Scoped
/// values are released when the owning context is disposed.
#[derive(Debug)]
pub struct ServiceScope {
    root: Arc<Services>,
    scoped: Services,
}

impl ServiceScope {
    pub fn new(root: Arc<Services>) -> Self {
        Self {
            root,
            scoped: Services::new(),
        }
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.scoped.get::<T>().or_else(|| self.root.get::<T>())
    }

    pub fn insert_scoped<T: Any + Send + Sync>(&self, service: Arc<T>) {
        self.scoped.insert(service);
    }

    /// Scoped instance of `T`, created on first use within this invocation.
    pub fn get_or_create_scoped<T, F>(&self, init: F) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        self.scoped.get_or_insert_with(init)
    }

    pub fn root(&self) -> &Arc<Services> {
        &self.root
    }

    /// Drop every scoped value. Returns how many were released.
    pub(crate) fn release(&self) -> usize {
        let released = self.scoped.len();
        self.scoped.map.clear();
        trace!(released, "service scope released");
        released
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Greeting(&'static str);

    #[test]
    fn insert_and_get_by_type() {
        let services = Services::new();
        assert!(services.get::<Greeting>().is_none());
        services.insert(Arc::new(Greeting("hello")));
        assert_eq!(*services.get::<Greeting>().unwrap(), Greeting("hello"));
        assert!(services.contains::<Greeting>());
        assert!(!services.contains::<String>());
    }

    #[test]
    fn get_or_insert_with_initializes_once() {
        let services = Services::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            services.get_or_insert_with(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                Greeting("lazy")
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(services.len(), 1);
    }

    #[derive(Debug)]
    struct Db(&'static str);

    #[derive(Debug)]
    struct Repo {
        db: Option<Arc<Db>>,
        greeting: Option<Arc<Greeting>>,
    }

    #[test]
    fn scoped_factory_can_resolve_other_services() {
        let root = Arc::new(Services::new());
        root.insert(Arc::new(Greeting("root")));
        let scope = Arc::new(ServiceScope::new(root));
        scope.insert_scoped(Arc::new(Db("scoped-db")));

        let (tx, rx) = std::sync::mpsc::channel();
        let worker = Arc::clone(&scope);
        std::thread::spawn(move || {
            let repo = worker.get_or_create_scoped(|| Repo {
                db: worker.get::<Db>(),
                greeting: worker.get::<Greeting>(),
            });
            tx.send(repo).unwrap();
        });

        let repo = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("factory resolving services must not block")
            .unwrap();
        assert_eq!(repo.db.as_ref().unwrap().0, "scoped-db");
        assert_eq!(*repo.greeting.clone().unwrap(), Greeting("root"));
        assert!(Arc::ptr_eq(&repo, &scope.get::<Repo>().unwrap()));
    }

    #[test]
    fn shared_factory_can_resolve_other_services() {
        let services = Services::new();
        services.insert(Arc::new(Db("shared-db")));
        let repo = services
            .get_or_insert_with(|| Repo {
                db: services.get::<Db>(),
                greeting: None,
            })
            .unwrap();
        assert_eq!(repo.db.as_ref().unwrap().0, "shared-db");
        assert_eq!(services.len(), 2);
    }

    #[test]
    fn scope_shadows_root_and_releases() {
        let root = Arc::new(Services::new());
        root.insert(Arc::new(Greeting("root")));
        let scope = ServiceScope::new(Arc::clone(&root));

        assert_eq!(*scope.get::<Greeting>().unwrap(), Greeting("root"));
        scope.insert_scoped(Arc::new(Greeting("scoped")));
        assert_eq!(*scope.get::<Greeting>().unwrap(), Greeting("scoped"));

        assert_eq!(scope.release(), 1);
        assert_eq!(*scope.get::<Greeting>().unwrap(), Greeting("root"));
        assert_eq!(root.len(), 1);
    }
}
