use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::backend::{CounterBackend, SyntheticBackend, ALL_GROUPS};
use crate::gpu::renderer::GraphRenderer;
use crate::graph::{GraphConfig, ScopeGraph};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the counters exposed by the synthetic backend
    Counters,
    /// Run the graph headless and print legend values
    Run {
        /// Graph config JSON (placement, cadence); defaults apply if absent
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of display ticks to simulate
        #[arg(long, default_value_t = 300)]
        ticks: u32,

        /// Simulated display rate
        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        /// Active counter group
        #[arg(long)]
        group: Option<u32>,

        /// Counter ids to plot (defaults to every counter in the group)
        #[arg(long)]
        show: Vec<usize>,
    },
    /// Render the graph offline to a PNG
    Render {
        /// Graph config JSON (placement, cadence); defaults apply if absent
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output PNG path
        #[arg(long)]
        out: PathBuf,

        /// Display ticks to simulate before the frame is taken
        #[arg(long, default_value_t = 600)]
        ticks: u32,

        /// Output width
        #[arg(long, default_value_t = 800)]
        width: u32,

        /// Output height
        #[arg(long, default_value_t = 600)]
        height: u32,

        /// Active counter group
        #[arg(long)]
        group: Option<u32>,

        /// Counter ids to plot (defaults to every counter in the group)
        #[arg(long)]
        show: Vec<usize>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Counters => list_counters(),
        Commands::Run { config, ticks, fps, group, show } => {
            let config = load_config(config, group)?;
            run_headless(config, ticks, fps, show)
        }
        Commands::Render { config, out, ticks, width, height, group, show } => {
            let mut config = load_config(config, group)?;
            config.viewport_w = width;
            config.viewport_h = height;
            pollster::block_on(render_offline(config, out, ticks, width, height, show))
        }
    }
}

fn load_config(path: Option<PathBuf>, group: Option<u32>) -> Result<GraphConfig> {
    let mut config = match path {
        Some(path) => {
            let mut contents = String::new();
            File::open(&path)?.read_to_string(&mut contents)?;
            serde_json::from_str(&contents)?
        }
        None => GraphConfig::default(),
    };
    if let Some(group) = group {
        config.initial_group = group;
    }
    Ok(config)
}

fn list_counters() -> Result<()> {
    let mut backend = SyntheticBackend::demo();
    for (id, def) in backend.counters().iter().enumerate() {
        let group = if def.group == ALL_GROUPS {
            "all".to_string()
        } else {
            def.group.to_string()
        };
        let kind = if def.is_percentage { "%" } else { " " };
        println!("[{:2}] group {:>3} {} {}", id, group, kind, def.name);
    }
    Ok(())
}

/// Build a demo graph and mark the requested counters (or the whole active
/// group) visible.
fn build_graph(config: GraphConfig, show: &[usize]) -> ScopeGraph<SyntheticBackend> {
    let mut graph = ScopeGraph::new(SyntheticBackend::demo(), config);
    if show.is_empty() {
        for id in 0..graph.counter_num() {
            if graph.is_counter_being_drawn(id) {
                graph.show_counter(id, true);
            }
        }
    } else {
        for &id in show {
            graph.show_counter(id, true);
        }
    }
    graph
}

fn run_headless(config: GraphConfig, ticks: u32, fps: f32, show: Vec<usize>) -> Result<()> {
    let mut graph = build_graph(config, &show);
    let dt = 1.0 / fps.max(1.0);
    let report_every = fps.max(1.0) as u32;

    for tick in 0..ticks {
        graph.ping(dt);

        if tick % report_every == report_every - 1 {
            println!("--- tick {} (group {}) ---", tick + 1, graph.active_group());
            for entry in graph.legends() {
                println!("{}{}", entry.label, entry.value);
            }
        }
    }
    Ok(())
}

async fn render_offline(
    config: GraphConfig,
    out: PathBuf,
    ticks: u32,
    width: u32,
    height: u32,
    show: Vec<usize>,
) -> Result<()> {
    let mut graph = build_graph(config, &show);
    let dt = 1.0 / 60.0;

    // WGPU init, headless
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| anyhow::anyhow!("No adapter found"))?;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await?;

    let texture_desc = wgpu::TextureDescriptor {
        label: Some("Graph Target Texture"),
        size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    };
    let texture = device.create_texture(&texture_desc);
    let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    // Readback buffer with 256-byte row alignment
    let u32_size = std::mem::size_of::<u32>() as u32;
    let unpadded_bytes_per_row = u32_size * width;
    let align = 256;
    let padded_bytes_per_row_padding = (align - unpadded_bytes_per_row % align) % align;
    let padded_bytes_per_row = unpadded_bytes_per_row + padded_bytes_per_row_padding;

    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Buffer"),
        size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut renderer = GraphRenderer::new(device, queue, texture_desc.format);

    println!("Simulating {} ticks...", ticks);
    for _ in 0..ticks {
        graph.ping(dt);
    }

    renderer.render(&texture_view, graph.curves(), graph.layout());

    let mut encoder = renderer
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &output_buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        texture_desc.size,
    );
    renderer.queue().submit(Some(encoder.finish()));

    // Map and unpad
    let buffer_slice = output_buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
        let _ = tx.send(v);
    });
    renderer.device().poll(wgpu::Maintain::Wait);
    rx.recv()??;

    let data = buffer_slice.get_mapped_range();
    let mut unpadded = Vec::with_capacity((width * height * 4) as usize);
    for row in 0..height {
        let start = (row * padded_bytes_per_row) as usize;
        let end = start + (width * 4) as usize;
        unpadded.extend_from_slice(&data[start..end]);
    }
    drop(data);
    output_buffer.unmap();

    image::save_buffer(&out, &unpadded, width, height, image::ColorType::Rgba8)?;
    println!("Wrote {:?}", out);

    Ok(())
}
