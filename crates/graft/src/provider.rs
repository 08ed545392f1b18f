//! Base-type providers.
//!
//! A provider sees a host type together with the base list computed so far
//! and returns the list to use instead. Providers run in registration order,
//! each receiving the previous result, whenever a synthetic type is built.

use std::sync::Arc;

use crate::{
    error::BridgeResult,
    host::{HostObject, HostTypeDef, HostTypeId},
    session::{Session, TypeHandle},
};

/// Augments the bases of synthetic types.
///
/// A provider with no opinion about a host type must return `existing`
/// unchanged.
pub trait BaseTypeProvider: Send + Sync {
    fn base_types(
        &self,
        cx: &mut ProviderContext<'_>,
        host_type: HostTypeId,
        existing: Vec<TypeHandle>,
    ) -> BridgeResult<Vec<TypeHandle>>;
}

/// Adapts a closure into a [`BaseTypeProvider`].
pub fn provider_fn<F>(func: F) -> FnProvider<F>
where
    F: Fn(&mut ProviderContext<'_>, HostTypeId, Vec<TypeHandle>) -> BridgeResult<Vec<TypeHandle>> + Send + Sync,
{
    FnProvider(func)
}

/// A provider backed by a closure. Created by [`provider_fn`].
pub struct FnProvider<F>(F);

impl<F> BaseTypeProvider for FnProvider<F>
where
    F: Fn(&mut ProviderContext<'_>, HostTypeId, Vec<TypeHandle>) -> BridgeResult<Vec<TypeHandle>> + Send + Sync,
{
    fn base_types(
        &self,
        cx: &mut ProviderContext<'_>,
        host_type: HostTypeId,
        existing: Vec<TypeHandle>,
    ) -> BridgeResult<Vec<TypeHandle>> {
        (self.0)(cx, host_type, existing)
    }
}

/// What a provider may do while it runs.
///
/// The context exposes host type metadata and lookup of other bridged types,
/// but not the provider registry, so providers cannot register or remove
/// providers mid-resolution. Asking for the type currently being built fails
/// with `ReentrantConstruction`.
pub struct ProviderContext<'a> {
    session: &'a mut Session,
}

impl<'a> ProviderContext<'a> {
    pub(crate) fn new(session: &'a mut Session) -> Self {
        Self { session }
    }

    pub(crate) fn session(&mut self) -> &mut Session {
        self.session
    }

    pub fn host_type(&self, id: HostTypeId) -> BridgeResult<&HostTypeDef> {
        self.session.hosts.get(id).map(AsRef::as_ref)
    }

    /// The registered id of the Rust type `T`, if any.
    pub fn host_type_id<T: HostObject>(&self) -> Option<HostTypeId> {
        self.session.hosts.id_of::<T>()
    }

    /// The bridged type for another host type, building it if needed.
    pub fn bridged_type(&mut self, id: HostTypeId) -> BridgeResult<TypeHandle> {
        self.session.get_or_create_bridged_type(id)
    }

    /// The builtin `object` type.
    pub fn object_type(&self) -> TypeHandle {
        self.session.object_type()
    }

    pub fn type_name(&self, handle: TypeHandle) -> BridgeResult<String> {
        self.session.type_name(handle)
    }
}

/// Ordered list of providers.
#[derive(Clone, Default)]
pub struct BaseTypeProviderRegistry {
    providers: Vec<Arc<dyn BaseTypeProvider>>,
}

impl std::fmt::Debug for BaseTypeProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseTypeProviderRegistry")
            .field("providers", &self.providers.len())
            .finish()
    }
}

impl BaseTypeProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a provider; it runs after every provider registered before it.
    pub fn register(&mut self, provider: impl BaseTypeProvider + 'static) {
        self.providers.push(Arc::new(provider));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Folds every provider over `bases` in registration order.
    ///
    /// Each provider runs exactly once and sees the previous provider's output.
    /// With no providers the natural bases are returned unchanged.
    pub fn compute_bases(
        &self,
        cx: &mut ProviderContext<'_>,
        host_type: HostTypeId,
        bases: Vec<TypeHandle>,
    ) -> BridgeResult<Vec<TypeHandle>> {
        let host_name = cx.host_type(host_type)?.name().to_owned();
        self.providers
            .iter()
            .enumerate()
            .try_fold(bases, |bases, (index, provider)| {
                let before = cx.session().type_names(&bases);
                let after = provider.base_types(cx, host_type, bases)?;
                let after_names = cx.session().type_names(&after);
                cx.session().tracer.on_provider(&host_name, index, &before, &after_names);
                Ok(after)
            })
    }
}
