//! Graphics backends

mod software;

pub use software::{
    MemoryStorage, SoftwareFactory, SoftwarePoolBackend, SoftwareRenderer, SOFTWARE_RENDER_SYSTEM,
};

use crate::render::RendererFactory;
use std::sync::Arc;

/// Names of the backends this build can create
pub const BACKEND_NAMES: &[&str] = &[SOFTWARE_RENDER_SYSTEM];

/// Create a backend factory by name
///
/// `width` and `height` size the output surface.
pub fn create_factory(
    name: &str,
    width: u32,
    height: u32,
    max_buffers: Option<usize>,
) -> Option<Arc<dyn RendererFactory>> {
    match name.to_ascii_lowercase().as_str() {
        SOFTWARE_RENDER_SYSTEM => {
            let factory = SoftwareFactory::new(width, height);
            let factory = match max_buffers {
                Some(max) => factory.with_max_buffers(max),
                None => factory,
            };
            Some(Arc::new(factory))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_factory_by_name() {
        let factory = create_factory("Software", 32, 32, Some(2)).unwrap();
        assert_eq!(factory.render_system_name(), "software");
        assert!(create_factory("opengl", 32, 32, None).is_none());
    }
}
