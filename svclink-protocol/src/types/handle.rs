use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque handle to a remote object returned by a broker
///
/// The handle is type-erased; a service adapter recovers the concrete type
/// with [`RemoteHandle::downcast`]. Cloning shares the underlying object.
#[derive(Clone)]
pub struct RemoteHandle {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl RemoteHandle {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            inner: value,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Recover the concrete object, or `None` if it is not a `T`
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }

    pub fn is<T: Any + Send + Sync>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Type name of the wrapped object, for diagnostics
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether both handles refer to the same remote object
    pub fn ptr_eq(&self, other: &RemoteHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("type", &self.type_name)
            .finish()
    }
}
