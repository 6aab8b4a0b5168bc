//! Directory of buffer pools grouped by backend factory

use super::BufferPool;
use crate::render::{RendererFactory, RenderVideoSettings, ScalingMethod};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

struct PoolGroup {
    factory: Arc<dyn RendererFactory>,
    pools: Vec<Arc<BufferPool>>,
}

/// All buffer pools created by the registered backend factories
///
/// Registration is rare and lookups are cheap, so a single lock guards
/// everything. Pool operations run after the lock is dropped.
#[derive(Default)]
pub struct BufferManager {
    groups: Mutex<Vec<PoolGroup>>,
}

impl BufferManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the pools created by `factory`
    pub fn register_pools(&self, factory: Arc<dyn RendererFactory>, pools: Vec<Arc<BufferPool>>) {
        debug!(
            "Registering {} buffer pools for {}",
            pools.len(),
            factory.render_system_name()
        );
        self.groups.lock().push(PoolGroup { factory, pools });
    }

    /// Pools created by the factory with the given render system name
    pub fn get_pools(&self, render_system_name: &str) -> Vec<Arc<BufferPool>> {
        self.groups
            .lock()
            .iter()
            .filter(|group| group.factory.render_system_name() == render_system_name)
            .flat_map(|group| group.pools.iter().cloned())
            .collect()
    }

    /// All pools, in registration order
    pub fn buffer_pools(&self) -> Vec<Arc<BufferPool>> {
        self.groups
            .lock()
            .iter()
            .flat_map(|group| group.pools.iter().cloned())
            .collect()
    }

    /// Factory that created `pool`
    pub fn factory_for(&self, pool: &BufferPool) -> Option<Arc<dyn RendererFactory>> {
        self.groups
            .lock()
            .iter()
            .find(|group| group.pools.iter().any(|p| p.id() == pool.id()))
            .map(|group| group.factory.clone())
    }

    /// All registered factories, in registration order
    pub fn factories(&self) -> Vec<Arc<dyn RendererFactory>> {
        self.groups
            .lock()
            .iter()
            .map(|group| group.factory.clone())
            .collect()
    }

    /// Flush every pool
    pub fn flush_pools(&self) {
        for pool in self.buffer_pools() {
            pool.flush();
        }
    }

    /// Check if any pool can scale with `method`
    pub fn has_scaling_method(&self, method: ScalingMethod) -> bool {
        let settings = RenderVideoSettings::with_scaling_method(method);
        self.buffer_pools()
            .iter()
            .any(|pool| pool.is_compatible(&settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareFactory;
    use crate::format::PixelFormat;
    use crate::render::BackendContext;

    fn register(
        manager: &BufferManager,
        factory: Arc<dyn RendererFactory>,
    ) -> Vec<Arc<BufferPool>> {
        let pools = factory.create_buffer_pools(&BackendContext::default());
        manager.register_pools(factory, pools.clone());
        pools
    }

    #[test]
    fn test_registration_order_and_lookup() {
        let manager = BufferManager::new();
        let first = register(&manager, Arc::new(SoftwareFactory::new(64, 64)));
        let second = register(&manager, Arc::new(SoftwareFactory::new(64, 64)));

        let all = manager.buffer_pools();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id(), first[0].id());
        assert_eq!(all[1].id(), second[0].id());

        assert_eq!(manager.get_pools("software").len(), 2);
        assert!(manager.get_pools("opengl").is_empty());

        let factory = manager.factory_for(&all[1]).unwrap();
        assert_eq!(factory.render_system_name(), "software");
    }

    #[test]
    fn test_flush_pools() {
        let manager = BufferManager::new();
        let pools = register(&manager, Arc::new(SoftwareFactory::new(64, 64)));
        pools[0].configure(PixelFormat::Xrgb8888).unwrap();
        drop(pools[0].get_buffer(4, 4));
        assert_eq!(pools[0].free_count(), 1);

        manager.flush_pools();
        assert_eq!(pools[0].free_count(), 0);
        assert!(!pools[0].is_configured());
    }

    #[test]
    fn test_scaling_method_query() {
        let manager = BufferManager::new();
        assert!(!manager.has_scaling_method(ScalingMethod::Nearest));

        register(&manager, Arc::new(SoftwareFactory::new(64, 64)));
        assert!(manager.has_scaling_method(ScalingMethod::Nearest));
        assert!(manager.has_scaling_method(ScalingMethod::Linear));
    }
}
