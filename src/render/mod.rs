//! Renderers, render settings and the frame pipeline

mod copy;
mod manager;
mod renderer;
mod settings;
mod speed;

pub use copy::{copy_frame, CopyKind};
pub use manager::{
    FrameSource, RenderManager, RenderManagerConfig, RenderState, RenderStats, StreamConfig,
    VideoBuffer,
};
pub use renderer::{
    BackendContext, RenderPass, Renderer, RendererFactory, RendererInstance, RendererRegistry,
    DEFAULT_HEADER_TIMEOUT,
};
pub use settings::{
    GuiRenderSettings, RenderFeature, RenderVideoSettings, ScalingMethod, StretchMode,
};
pub use speed::PlaybackSpeed;
