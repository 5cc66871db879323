//! GPU publication of graph geometry.
//!
//! `GraphRenderer` mirrors the engine's published curves into wgpu buffers
//! and draws them. Trace buffers are keyed by stable counter id, reused
//! across frames, and reallocated only when a curve's point count changes;
//! uploads go through `queue.write_buffer`, so no per-frame-in-flight buffer
//! duplication is needed.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::graph::Curve;
use crate::layout::GraphLayout;

use super::pipeline;

/// Color of the border and mid-height gridline.
const BORDER_COLOR: [f32; 4] = [0.5, 0.5, 0.5, 1.0];

/// One NDC point of a trace or border line.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct GraphVertex {
    pub position: [f32; 2],
}

impl GraphVertex {
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<GraphVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            }],
        }
    }
}

struct TraceBuffers {
    vertex_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    vertex_count: usize,
}

struct BorderBuffers {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

pub struct GraphRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    trace_pipeline: wgpu::RenderPipeline,
    border_pipeline: wgpu::RenderPipeline,
    line_bind_group_layout: wgpu::BindGroupLayout,
    // Trace buffers keyed by counter id; retained across visibility toggles
    traces: HashMap<usize, TraceBuffers>,
    border: BorderBuffers,
    /// Counter ids uploaded this frame, in draw order.
    visible: Vec<usize>,
    draw_border: bool,
}

impl GraphRenderer {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        let line_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Line Color Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Graph Pipeline Layout"),
            bind_group_layouts: &[&line_bind_group_layout],
            push_constant_ranges: &[],
        });

        let trace_pipeline = pipeline::create_trace_pipeline(&device, &pipeline_layout, format);
        let border_pipeline = pipeline::create_border_pipeline(&device, &pipeline_layout, format);

        let border_vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Graph Border Vertices"),
            size: (6 * std::mem::size_of::<GraphVertex>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let border_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Graph Border Indices"),
            contents: bytemuck::cast_slice(&GraphLayout::BORDER_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });
        let border_uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Graph Border Color"),
            contents: bytemuck::cast_slice(&[BORDER_COLOR]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let border_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Graph Border Bind Group"),
            layout: &line_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: border_uniform_buffer.as_entire_binding(),
            }],
        });

        Self {
            device,
            queue,
            trace_pipeline,
            border_pipeline,
            line_bind_group_layout,
            traces: HashMap::new(),
            border: BorderBuffers {
                vertex_buffer: border_vertex_buffer,
                index_buffer: border_index_buffer,
                bind_group: border_bind_group,
            },
            visible: Vec::new(),
            draw_border: false,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Mirror the engine's published geometry into GPU buffers.
    pub fn upload(&mut self, curves: &[Curve], layout: &GraphLayout) {
        self.visible.clear();
        self.draw_border = layout.samples() > 0;
        if self.draw_border {
            self.queue.write_buffer(
                &self.border.vertex_buffer,
                0,
                bytemuck::cast_slice(&layout.border_vertices()),
            );
        }

        for curve in curves {
            if curve.points.len() < 2 {
                continue;
            }
            let needs_alloc = self
                .traces
                .get(&curve.counter_id)
                .map(|t| t.vertex_count != curve.points.len())
                .unwrap_or(true);
            if needs_alloc {
                let buffers = self.alloc_trace(curve);
                self.traces.insert(curve.counter_id, buffers);
            }
            if let Some(trace) = self.traces.get(&curve.counter_id) {
                self.queue
                    .write_buffer(&trace.vertex_buffer, 0, bytemuck::cast_slice(&curve.points));
                self.queue
                    .write_buffer(&trace.uniform_buffer, 0, bytemuck::cast_slice(&[curve.color]));
                self.visible.push(curve.counter_id);
            }
        }
    }

    fn alloc_trace(&self, curve: &Curve) -> TraceBuffers {
        let vertex_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Counter Trace Vertices"),
            size: (curve.points.len() * std::mem::size_of::<GraphVertex>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Counter Trace Color"),
            size: std::mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Counter Trace Bind Group"),
            layout: &self.line_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        TraceBuffers {
            vertex_buffer,
            uniform_buffer,
            bind_group,
            vertex_count: curve.points.len(),
        }
    }

    /// Record draw calls for the uploaded geometry into an existing pass.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        if self.draw_border {
            pass.set_pipeline(&self.border_pipeline);
            pass.set_bind_group(0, &self.border.bind_group, &[]);
            pass.set_vertex_buffer(0, self.border.vertex_buffer.slice(..));
            pass.set_index_buffer(self.border.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..GraphLayout::BORDER_INDICES.len() as u32, 0, 0..1);
        }

        pass.set_pipeline(&self.trace_pipeline);
        for id in &self.visible {
            if let Some(trace) = self.traces.get(id) {
                pass.set_bind_group(0, &trace.bind_group, &[]);
                pass.set_vertex_buffer(0, trace.vertex_buffer.slice(..));
                pass.draw(0..trace.vertex_count as u32, 0..1);
            }
        }
    }

    /// Standalone path: upload and draw into `view` in one pass, clearing to
    /// a dark background. Embedding renderers call `upload` + `draw` instead.
    pub fn render(&mut self, view: &wgpu::TextureView, curves: &[Curve], layout: &GraphLayout) {
        self.upload(curves, layout);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Graph Render Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Graph Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.02,
                            g: 0.02,
                            b: 0.03,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.draw(&mut pass);
        }
        self.queue.submit(Some(encoder.finish()));
    }
}
