//! End-to-end tests of the ping → ingest → update pipeline, driven by a
//! scripted backend.

use std::collections::VecDeque;

use scopegraph::backend::{CounterBackend, CounterDef, CounterReading, StandardCounter, ALL_GROUPS};
use scopegraph::graph::{GraphConfig, ScopeGraph};
use scopegraph::layout::PixelRect;
use scopegraph::palette;

/// Backend that replays a scripted queue of readings.
struct Replay {
    defs: Vec<CounterDef>,
    readings: VecDeque<CounterReading>,
}

impl Replay {
    fn new(defs: Vec<CounterDef>) -> Self {
        Self { defs, readings: VecDeque::new() }
    }

    fn queue(&mut self, values: Vec<f32>, active_group: u32) {
        self.readings.push_back(CounterReading { values, active_group });
    }
}

impl CounterBackend for Replay {
    fn counters(&mut self) -> Vec<CounterDef> {
        self.defs.clone()
    }

    fn set_group(&mut self, _group: u32) {}

    fn read(&mut self, out: Option<&mut CounterReading>) -> bool {
        let Some(out) = out else {
            return false;
        };
        match self.readings.pop_front() {
            Some(reading) => {
                *out = reading;
                true
            }
            None => false,
        }
    }
}

fn def(name: &str, group: u32, pct: bool) -> CounterDef {
    CounterDef { name: name.to_string(), group, is_percentage: pct }
}

/// Config with `samples` sample slots and an 800x600 viewport.
fn config(samples: u32) -> GraphConfig {
    GraphConfig {
        viewport_w: 800,
        viewport_h: 600,
        rect: PixelRect { x: 0, y: 0, w: samples, h: 150 },
        ..GraphConfig::default()
    }
}

#[test]
fn end_to_end_demux_scenario() {
    // Three counters, ids {0,1,2}, groups {0,0,1}; active group 0; buffer
    // width 4; one reading [10, 20] for the two group-0 counters.
    let mut backend = Replay::new(vec![
        def("A", 0, false),
        def("B", 0, false),
        def("C", 1, false),
    ]);
    backend.queue(vec![10.0, 20.0], 0);

    let mut graph = ScopeGraph::new(backend, config(4));
    graph.show_counter(0, true);
    graph.show_counter(1, true);
    graph.ping(0.016);

    assert_eq!(graph.counter_history(0).unwrap(), &[10.0, 0.0, 0.0, 0.0]);
    assert_eq!(graph.history_cursor(0), Some(1));
    assert_eq!(graph.counter_history(1).unwrap(), &[20.0, 0.0, 0.0, 0.0]);
    assert_eq!(graph.history_cursor(1), Some(1));

    // Counter 2 was never in the active group: untouched.
    assert_eq!(graph.counter_history(2).unwrap(), &[0.0, 0.0, 0.0, 0.0]);
    assert_eq!(graph.history_cursor(2), Some(0));

    assert_eq!(graph.active_counter_ids(), &[0, 1]);
    assert_eq!(graph.curves().len(), 2);
    assert_eq!(graph.curves()[0].counter_id, 0);
    assert_eq!(graph.curves()[1].counter_id, 1);
}

#[test]
fn write_position_wraps_modulo_buffer_size() {
    let mut backend = Replay::new(vec![def("A", 0, false)]);
    for i in 0..7 {
        backend.queue(vec![i as f32], 0);
    }
    let mut graph = ScopeGraph::new(backend, config(4));
    graph.show_counter(0, true);
    for _ in 0..7 {
        graph.ping(0.016);
    }
    assert_eq!(graph.history_cursor(0), Some(7 % 4));
}

#[test]
fn buffer_length_tracks_resize() {
    let mut backend = Replay::new(vec![def("A", 0, false), def("B", 0, true)]);
    backend.queue(vec![1.0, 2.0], 0);
    let mut graph = ScopeGraph::new(backend, config(4));
    graph.ping(0.016);

    graph.set_position(800, 600, PixelRect { x: 0, y: 0, w: 16, h: 150 });
    for id in 0..2 {
        assert_eq!(graph.counter_history(id).unwrap().len(), 16);
        assert!(graph.counter_history(id).unwrap().iter().all(|&v| v == 0.0));
        assert_eq!(graph.history_cursor(id), Some(0));
    }

    // Moving the rect without rescaling keeps history intact.
    let mut backend = Replay::new(vec![def("A", 0, false)]);
    backend.queue(vec![5.0], 0);
    let mut graph = ScopeGraph::new(backend, config(8));
    graph.ping(0.016);
    graph.set_position(800, 600, PixelRect { x: 40, y: 20, w: 8, h: 150 });
    assert_eq!(graph.history_cursor(0), Some(1));
    assert_eq!(graph.counter_history(0).unwrap()[0], 5.0);
}

#[test]
fn group_switch_zeroes_new_group_and_wildcard_buffers() {
    let mut backend = Replay::new(vec![
        def("Old", 0, false),
        def("New", 1, false),
        def("FPS", ALL_GROUPS, false),
    ]);
    // Two ticks in group 0: reading order is [Old, FPS].
    backend.queue(vec![5.0, 60.0], 0);
    backend.queue(vec![6.0, 61.0], 0);
    // Backend confirms group 1: reading order is [New, FPS].
    backend.queue(vec![9.0, 62.0], 1);

    let mut graph = ScopeGraph::new(backend, config(4));
    for id in 0..3 {
        graph.show_counter(id, true);
    }
    graph.ping(0.016);
    graph.ping(0.016);
    assert_eq!(graph.counter_history(2).unwrap(), &[60.0, 61.0, 0.0, 0.0]);

    assert!(graph.set_active_group(1));
    graph.ping(0.016);

    assert_eq!(graph.active_group(), 1);
    // New-group counter: zeroed, then this tick's sample appended.
    assert_eq!(graph.counter_history(1).unwrap(), &[9.0, 0.0, 0.0, 0.0]);
    assert_eq!(graph.history_cursor(1), Some(1));
    // Wildcard counter: also reset before the append.
    assert_eq!(graph.counter_history(2).unwrap(), &[62.0, 0.0, 0.0, 0.0]);
    // Old-group counter keeps its stale history and leaves the drawn set.
    assert_eq!(graph.counter_history(0).unwrap(), &[5.0, 6.0, 0.0, 0.0]);
    assert!(!graph.is_counter_being_drawn(0));
    assert_eq!(graph.active_counter_ids(), &[1, 2]);
}

#[test]
fn color_index_follows_visible_order() {
    let mut backend = Replay::new(vec![
        def("A", 0, false),
        def("B", 0, false),
        def("C", 0, false),
    ]);
    for _ in 0..2 {
        backend.queue(vec![1.0, 2.0, 3.0], 0);
    }
    let mut graph = ScopeGraph::new(backend, config(4));
    for id in 0..3 {
        graph.show_counter(id, true);
    }
    graph.ping(0.016);
    let colors: Vec<[f32; 4]> = graph.curves().iter().map(|c| c.color).collect();
    assert_eq!(colors, vec![palette::color(0), palette::color(1), palette::color(2)]);

    // Hiding the first visible counter shifts every later counter's color.
    graph.show_counter(0, false);
    graph.ping(0.016);
    assert_eq!(graph.active_counter_ids(), &[1, 2]);
    assert_eq!(graph.curves()[0].color, palette::color(0));
    assert_eq!(graph.curves()[1].color, palette::color(1));
}

#[test]
fn all_zero_autoscale_never_produces_nan() {
    let mut backend = Replay::new(vec![def("A", 0, false)]);
    for _ in 0..4 {
        backend.queue(vec![0.0], 0);
    }
    let mut graph = ScopeGraph::new(backend, config(4));
    graph.show_counter(0, true);
    for _ in 0..4 {
        graph.ping(0.016);
    }

    let curve = &graph.curves()[0];
    let baseline = graph.layout().point(0, 0.0)[1];
    for point in &curve.points {
        assert!(point[0].is_finite() && point[1].is_finite());
        assert_eq!(point[1], baseline);
    }
}

#[test]
fn percentage_counter_plots_against_fixed_ceiling() {
    let mut backend = Replay::new(vec![def("Load", 0, true)]);
    for _ in 0..4 {
        backend.queue(vec![50.0], 0);
    }
    let mut graph = ScopeGraph::new(backend, config(4));
    graph.show_counter(0, true);
    for _ in 0..4 {
        graph.ping(0.016);
    }

    // Constant 50% through the median filter stays 50%, half the 0-100 axis.
    let expected = graph.layout().point(0, 0.5)[1];
    for point in &graph.curves()[0].points {
        assert!((point[1] - expected).abs() < 0.0001);
    }
}

#[test]
fn user_maximum_overrides_autoscale() {
    let mut backend = Replay::new(vec![def("A", 0, false)]);
    for _ in 0..4 {
        backend.queue(vec![50.0], 0);
    }
    let mut graph = ScopeGraph::new(backend, config(4));
    graph.show_counter(0, true);
    graph.set_maximum(0, 200.0);
    assert_eq!(graph.maximum(0), 200.0);
    for _ in 0..4 {
        graph.ping(0.016);
    }

    let expected = graph.layout().point(0, 0.25)[1];
    for point in &graph.curves()[0].points {
        assert!((point[1] - expected).abs() < 0.0001);
    }
}

#[test]
fn standard_counter_hit_and_miss() {
    let mut backend = Replay::new(vec![
        def("FPS", ALL_GROUPS, false),
        def("3D Load", 0, true),
    ]);
    backend.queue(vec![60.0, 35.0], 0);
    let mut graph = ScopeGraph::new(backend, config(4));
    graph.ping(0.016);

    assert_eq!(graph.standard_index(StandardCounter::Fps), Some(0));
    assert_eq!(graph.fps(), 60.0);
    assert_eq!(graph.standard_value(StandardCounter::Load3d), 35.0);

    // Tiler is nowhere in this counter set.
    assert_eq!(graph.standard_index(StandardCounter::Tiler), None);
    assert_eq!(graph.standard_value(StandardCounter::Tiler), -1.0);
}

#[test]
fn invalid_group_request_is_rejected() {
    let backend = Replay::new(vec![def("A", 0, false), def("FPS", ALL_GROUPS, false)]);
    let mut graph = ScopeGraph::new(backend, config(4));

    // Only group 0 and the wildcard exist; 5 has nothing at or above it.
    assert!(!graph.set_active_group(5));
    assert_eq!(graph.selected_group(), 0);

    assert!(graph.set_active_group(0));
}

#[test]
fn legend_created_on_first_sight_then_refreshed_on_cadence() {
    let mut backend = Replay::new(vec![def("A", 0, false)]);
    for v in [1.0, 2.0, 3.0] {
        backend.queue(vec![v], 0);
    }
    let mut graph = ScopeGraph::new(backend, config(4));
    graph.show_counter(0, true);

    // First appearance: entry created immediately with the current value.
    graph.ping(0.2);
    let entry = graph.legend(0).expect("legend created on first visibility");
    assert_eq!(entry.label, "[ 0]  A");
    assert_eq!(entry.value, "       1.00");
    assert_eq!(entry.row, 0);

    // 0.4s cumulative: below the refresh cadence, value text unchanged.
    graph.ping(0.2);
    assert_eq!(graph.legend(0).unwrap().value, "       1.00");

    // 0.6s cumulative: rollover, value refreshes to the latest sample.
    graph.ping(0.2);
    assert_eq!(graph.legend(0).unwrap().value, "       3.00");
}

#[test]
fn legend_survives_hide_and_show() {
    let mut backend = Replay::new(vec![def("A", 0, false)]);
    for _ in 0..3 {
        backend.queue(vec![4.0], 0);
    }
    let mut graph = ScopeGraph::new(backend, config(4));
    graph.show_counter(0, true);
    graph.ping(0.016);
    assert!(graph.legend(0).is_some());

    // Hidden: entry retained, but no longer listed among visible legends.
    graph.show_counter(0, false);
    graph.ping(0.016);
    assert!(graph.legend(0).is_some());
    assert_eq!(graph.legends().count(), 0);

    graph.show_counter(0, true);
    graph.ping(0.016);
    assert_eq!(graph.legends().count(), 1);
}

#[test]
fn zero_width_graph_skips_geometry() {
    let mut backend = Replay::new(vec![def("A", 0, false)]);
    backend.queue(vec![1.0], 0);
    let mut graph = ScopeGraph::new(backend, config(0));
    graph.show_counter(0, true);
    graph.ping(0.016);

    assert!(graph.curves().is_empty());
    // The counter is still tracked as active; only geometry is skipped.
    assert_eq!(graph.active_counter_ids(), &[0]);
}

#[test]
fn curves_span_the_rect_left_to_right() {
    let mut backend = Replay::new(vec![def("A", 0, false)]);
    for i in 0..8 {
        backend.queue(vec![i as f32], 0);
    }
    let mut graph = ScopeGraph::new(backend, config(8));
    graph.show_counter(0, true);
    for _ in 0..8 {
        graph.ping(0.016);
    }

    let curve = &graph.curves()[0];
    assert_eq!(curve.points.len(), 8);
    let x0 = graph.layout().point(0, 0.0)[0];
    let x7 = graph.layout().point(7, 0.0)[0];
    assert!((curve.points[0][0] - x0).abs() < 0.0001);
    assert!((curve.points[7][0] - x7).abs() < 0.0001);
    // X advances monotonically, one slot per pixel.
    for pair in curve.points.windows(2) {
        assert!(pair[1][0] > pair[0][0]);
    }
}
