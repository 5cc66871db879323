pub mod pipeline;
pub mod renderer;

pub use renderer::GraphRenderer;
