//! The counter-sampling backend contract and a synthetic implementation.
//!
//! The graph engine is backend-agnostic: anything that can enumerate counter
//! definitions and fill periodic readings can drive it. Hardware backends
//! wrap a native profiling ABI; [`SyntheticBackend`] generates deterministic
//! waveforms so the demo binary and tests run anywhere.
//!
//! Backend teardown belongs to the implementor's `Drop`; the graph takes
//! ownership of its backend, so teardown runs exactly once on every exit
//! path, including early-return failures during setup.

/// Wildcard group id: counters in this group are sampled regardless of the
/// active group.
pub const ALL_GROUPS: u32 = u32::MAX;

/// One hardware counter as declared by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterDef {
    pub name: String,
    /// Group this counter belongs to, or [`ALL_GROUPS`].
    pub group: u32,
    /// Percentage counters plot against a fixed 0-100 axis.
    pub is_percentage: bool,
}

/// One snapshot of counter values.
///
/// `values` holds one entry per counter enabled in `active_group` (plus
/// wildcard counters), in backend declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterReading {
    pub values: Vec<f32>,
    /// The group that was active when this sample was taken.
    pub active_group: u32,
}

/// A source of periodic counter readings.
pub trait CounterBackend {
    /// The full counter list. May be queried again if the set changes
    /// (the backend is free to re-enumerate, e.g. after a context resize).
    fn counters(&mut self) -> Vec<CounterDef>;

    /// Request a new active group. Fire-and-forget: the backend may apply
    /// the change asynchronously, and readings report the group actually
    /// in effect when they were taken.
    fn set_group(&mut self, group: u32);

    /// Poll the backend once.
    ///
    /// `Some(out)` requests value computation into `out`; `None` keeps the
    /// backend's internal state machine ticking without paying for values.
    /// Returns true only when `out` was supplied and filled.
    fn read(&mut self, out: Option<&mut CounterReading>) -> bool;
}

/// The well-known counters with dedicated fast-access getters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardCounter {
    Fps,
    Load2d,
    Load3d,
    Tiler,
    Compute,
    ShaderPixel,
    ShaderVertex,
    ShaderCompute,
}

impl StandardCounter {
    pub const COUNT: usize = 8;

    pub const ALL: [StandardCounter; Self::COUNT] = [
        StandardCounter::Fps,
        StandardCounter::Load2d,
        StandardCounter::Load3d,
        StandardCounter::Tiler,
        StandardCounter::Compute,
        StandardCounter::ShaderPixel,
        StandardCounter::ShaderVertex,
        StandardCounter::ShaderCompute,
    ];

    /// Whether a counter name denotes this standard counter.
    pub fn matches(self, name: &str) -> bool {
        let n = name.to_ascii_lowercase();
        match self {
            StandardCounter::Fps => n == "fps" || n.contains("frames per second"),
            StandardCounter::Load2d => n.contains("2d"),
            StandardCounter::Load3d => n.contains("3d"),
            StandardCounter::Tiler => n.contains("tiler"),
            // Plain compute load, as opposed to the shader-core compute counter
            StandardCounter::Compute => n.contains("compute") && !n.contains("shader"),
            StandardCounter::ShaderPixel => n.contains("shader") && n.contains("pixel"),
            StandardCounter::ShaderVertex => n.contains("shader") && n.contains("vertex"),
            StandardCounter::ShaderCompute => n.contains("shader") && n.contains("compute"),
        }
    }
}

/// Locate a standard counter within the active group.
///
/// Returns the index into a [`CounterReading::values`] array taken with
/// `group` active, or `None` when the counter is not present in that group.
pub fn find_standard_counter(
    defs: &[CounterDef],
    group: u32,
    kind: StandardCounter,
) -> Option<usize> {
    let mut reading_idx = 0;
    for def in defs {
        if def.group == group || def.group == ALL_GROUPS {
            if kind.matches(&def.name) {
                return Some(reading_idx);
            }
            reading_idx += 1;
        }
    }
    None
}

/// Deterministic waveform backend for demos and tests.
///
/// Carries a representative counter set over three groups plus a wildcard
/// FPS counter, and applies group changes after a configurable latency to
/// exercise the asynchronous-confirmation path.
pub struct SyntheticBackend {
    defs: Vec<CounterDef>,
    active_group: u32,
    /// A requested group change and the polls remaining until it applies.
    pending: Option<(u32, u32)>,
    latency: u32,
    tick: u64,
}

impl SyntheticBackend {
    /// The demo counter set: per-block load percentages in group 0, shader
    /// core counters in group 1, memory traffic in group 2, FPS wildcard.
    pub fn demo() -> Self {
        let def = |name: &str, group, is_percentage| CounterDef {
            name: name.to_string(),
            group,
            is_percentage,
        };
        Self {
            defs: vec![
                def("FPS", ALL_GROUPS, false),
                def("2D Load", 0, true),
                def("3D Load", 0, true),
                def("Tiler Load", 0, true),
                def("Compute Load", 0, true),
                def("Shaded Pixels Per Second", 0, false),
                def("Shader Pixel Load", 1, true),
                def("Shader Vertex Load", 1, true),
                def("Shader Compute Load", 1, true),
                def("Texture Unit Load", 1, true),
                def("Memory Bus Traffic", 2, false),
            ],
            active_group: 0,
            pending: None,
            latency: 2,
            tick: 0,
        }
    }

    /// Polls a group change waits before taking effect.
    pub fn with_group_latency(mut self, polls: u32) -> Self {
        self.latency = polls;
        self
    }

    fn sample(&self, def_index: usize, def: &CounterDef) -> f32 {
        let t = self.tick as f32 * 0.05;
        let phase = def_index as f32 * 0.7;
        if def.is_percentage {
            50.0 + 45.0 * (t + phase).sin()
        } else if def.group == ALL_GROUPS {
            // FPS hovers around refresh rate
            60.0 + 8.0 * (t * 2.0 + phase).sin()
        } else {
            // Large-magnitude throughput counters
            1.0e6 * (1.1 + (t * 0.3 + phase).sin())
        }
    }
}

impl CounterBackend for SyntheticBackend {
    fn counters(&mut self) -> Vec<CounterDef> {
        self.defs.clone()
    }

    fn set_group(&mut self, group: u32) {
        if self.latency == 0 {
            self.active_group = group;
            self.pending = None;
        } else {
            self.pending = Some((group, self.latency));
        }
    }

    fn read(&mut self, out: Option<&mut CounterReading>) -> bool {
        self.tick += 1;
        if let Some((group, remaining)) = self.pending {
            if remaining <= 1 {
                self.active_group = group;
                self.pending = None;
            } else {
                self.pending = Some((group, remaining - 1));
            }
        }
        let Some(out) = out else {
            return false;
        };
        out.values.clear();
        for (i, def) in self.defs.iter().enumerate() {
            if def.group == self.active_group || def.group == ALL_GROUPS {
                out.values.push(self.sample(i, def));
            }
        }
        out.active_group = self.active_group;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs() -> Vec<CounterDef> {
        SyntheticBackend::demo().defs
    }

    #[test]
    fn test_standard_lookup_indexes_into_reading() {
        let defs = defs();
        // Group 0 reading order: FPS (wildcard), 2D, 3D, Tiler, Compute, Shaded Pixels
        assert_eq!(find_standard_counter(&defs, 0, StandardCounter::Fps), Some(0));
        assert_eq!(find_standard_counter(&defs, 0, StandardCounter::Load2d), Some(1));
        assert_eq!(find_standard_counter(&defs, 0, StandardCounter::Tiler), Some(3));
        assert_eq!(find_standard_counter(&defs, 0, StandardCounter::Compute), Some(4));
    }

    #[test]
    fn test_standard_lookup_miss() {
        let defs = defs();
        // Shader counters live in group 1 only
        assert_eq!(find_standard_counter(&defs, 0, StandardCounter::ShaderPixel), None);
        assert_eq!(find_standard_counter(&defs, 1, StandardCounter::ShaderPixel), Some(1));
    }

    #[test]
    fn test_compute_does_not_shadow_shader_compute() {
        assert!(StandardCounter::Compute.matches("Compute Load"));
        assert!(!StandardCounter::Compute.matches("Shader Compute Load"));
        assert!(StandardCounter::ShaderCompute.matches("Shader Compute Load"));
        assert!(!StandardCounter::ShaderCompute.matches("Compute Load"));
    }

    #[test]
    fn test_reading_covers_active_group_and_wildcard() {
        let mut backend = SyntheticBackend::demo();
        let mut reading = CounterReading::default();
        assert!(backend.read(Some(&mut reading)));
        // FPS + the five group-0 counters
        assert_eq!(reading.values.len(), 6);
        assert_eq!(reading.active_group, 0);
    }

    #[test]
    fn test_null_target_poll_returns_false() {
        let mut backend = SyntheticBackend::demo();
        assert!(!backend.read(None));
    }

    #[test]
    fn test_group_change_applies_after_latency() {
        let mut backend = SyntheticBackend::demo().with_group_latency(2);
        let mut reading = CounterReading::default();
        backend.set_group(1);

        backend.read(Some(&mut reading));
        assert_eq!(reading.active_group, 0);

        backend.read(Some(&mut reading));
        assert_eq!(reading.active_group, 1);
        // FPS + the four group-1 counters
        assert_eq!(reading.values.len(), 5);
    }

    #[test]
    fn test_zero_latency_applies_immediately() {
        let mut backend = SyntheticBackend::demo().with_group_latency(0);
        let mut reading = CounterReading::default();
        backend.set_group(2);
        backend.read(Some(&mut reading));
        assert_eq!(reading.active_group, 2);
    }
}
