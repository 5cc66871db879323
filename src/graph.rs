//! The counter-graph engine: ingestion, signal shaping, and publication.
//!
//! `ScopeGraph` is driven by one `ping(dt)` per display frame from the render
//! loop. Each ping makes at most one backend round-trip, demultiplexes the
//! reading into per-counter rings, and rebuilds the renderable curves and
//! legend rows for every visible counter. Everything runs synchronously on
//! the calling thread and reuses its allocations tick to tick.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::backend::{
    find_standard_counter, CounterBackend, CounterDef, CounterReading, StandardCounter, ALL_GROUPS,
};
use crate::filter::{smoothed_peak, MedianWindow};
use crate::layout::{GraphLayout, PixelRect};
use crate::legend::{self, LegendEntry, LEGEND_REFRESH_SECS};
use crate::palette;
use crate::ring::SampleRing;

/// Fixed axis ceiling for percentage counters.
const PERCENTAGE_CEILING: f32 = 100.0;

/// Graph placement and cadence, loadable from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub viewport_w: u32,
    pub viewport_h: u32,
    pub rect: PixelRect,
    /// Pings between backend value computations (1 = every ping).
    pub update_interval: u32,
    pub initial_group: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            viewport_w: 800,
            viewport_h: 600,
            rect: PixelRect { x: 16, y: 16, w: 320, h: 160 },
            update_interval: 1,
            initial_group: 0,
        }
    }
}

/// Renderable line strip for one visible counter, in NDC.
#[derive(Debug, Clone, Default)]
pub struct Curve {
    pub counter_id: usize,
    pub color: [f32; 4],
    pub points: Vec<[f32; 2]>,
}

/// Per-counter plotting state.
struct CounterState {
    ring: SampleRing,
    show: bool,
    /// User axis-ceiling override; 0 means auto-scale.
    user_max: f32,
}

/// Pending group-change request, made explicit so the optimistic flush
/// (request sent, tracker back to `Stable` before the backend confirms)
/// is a stated design choice rather than a bare flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupChange {
    Stable,
    Requested(u32),
}

struct GroupTracker {
    /// Group confirmed by the most recent reading.
    active: u32,
    /// Group most recently requested by the user.
    selected: u32,
    change: GroupChange,
}

impl GroupTracker {
    fn new(initial: u32) -> Self {
        Self {
            active: initial,
            selected: initial,
            change: GroupChange::Stable,
        }
    }

    fn request(&mut self, group: u32) {
        self.selected = group;
        self.change = GroupChange::Requested(group);
    }

    /// Consume a pending request, returning to `Stable`.
    fn take_request(&mut self) -> Option<u32> {
        match std::mem::replace(&mut self.change, GroupChange::Stable) {
            GroupChange::Requested(group) => Some(group),
            GroupChange::Stable => None,
        }
    }

    /// Record the group a reading was taken with. True when it differs from
    /// the previously confirmed group (a hard switch).
    fn confirm(&mut self, seen: u32) -> bool {
        if seen != self.active {
            self.active = seen;
            true
        } else {
            false
        }
    }
}

/// Streaming counter-graph engine over a pluggable sampling backend.
pub struct ScopeGraph<B: CounterBackend> {
    backend: B,
    counters: Vec<CounterDef>,
    states: Vec<CounterState>,
    reading: CounterReading,
    layout: GraphLayout,
    group: GroupTracker,
    update_interval: u32,
    interval_elapsed: u32,
    legend_timer: f32,
    legends: HashMap<usize, LegendEntry>,
    curves: Vec<Curve>,
    active_ids: Vec<usize>,
    standard: [Option<usize>; StandardCounter::COUNT],
}

impl<B: CounterBackend> ScopeGraph<B> {
    /// Build a graph over `backend`, querying its counter list once.
    ///
    /// A backend reporting zero counters yields an inert graph: `ping` is a
    /// no-op and every query returns its safe default.
    pub fn new(mut backend: B, config: GraphConfig) -> Self {
        let counters = backend.counters();
        if counters.is_empty() {
            log::warn!("counter backend reported no counters; graph will stay inert");
        }
        backend.set_group(config.initial_group);

        let layout = GraphLayout::new(config.viewport_w, config.viewport_h, config.rect);
        let states = counters
            .iter()
            .map(|_| CounterState {
                ring: SampleRing::new(layout.samples()),
                show: false,
                user_max: 0.0,
            })
            .collect();

        let mut graph = Self {
            backend,
            counters,
            states,
            reading: CounterReading::default(),
            layout,
            group: GroupTracker::new(config.initial_group),
            update_interval: config.update_interval.max(1),
            interval_elapsed: 0,
            legend_timer: 0.0,
            legends: HashMap::new(),
            curves: Vec::new(),
            active_ids: Vec::new(),
            standard: [None; StandardCounter::COUNT],
        };
        graph.rebuild_standard_indices();
        graph
    }

    /// Advance one display frame: flush a pending group request, poll the
    /// backend (one round-trip at most), ingest any reading, and rebuild
    /// curves and legends. `dt` is the frame time in seconds; it drives only
    /// the legend refresh cadence, not the sampling itself.
    pub fn ping(&mut self, dt: f32) {
        if self.counters.is_empty() {
            return;
        }

        if let Some(group) = self.group.take_request() {
            self.backend.set_group(group);
        }

        self.interval_elapsed += 1;
        if self.interval_elapsed >= self.update_interval {
            // Move the reading out so the backend call doesn't alias self.
            let mut reading = std::mem::take(&mut self.reading);
            let got = self.backend.read(Some(&mut reading));
            self.reading = reading;
            if got {
                self.interval_elapsed = 0;
                if self.group.confirm(self.reading.active_group) {
                    // Hard switch confirmed by the reading: drop stale
                    // cross-group history and re-resolve standard counters.
                    self.rebuild_standard_indices();
                    self.reset_group_buffers();
                }
                self.ingest();
            }
        } else {
            // Off-tick: keep the backend state machine moving, skip values.
            self.backend.read(None);
        }

        self.update(dt);
    }

    /// Zero the ring of every counter sampled under the new active group.
    fn reset_group_buffers(&mut self) {
        let active = self.group.active;
        for id in 0..self.counters.len() {
            let group = self.counters[id].group;
            if group == active || group == ALL_GROUPS {
                self.states[id].ring.clear();
            }
        }
    }

    /// Demultiplex the current reading into per-counter rings, in backend
    /// declaration order.
    fn ingest(&mut self) {
        let active = self.group.active;
        let matching = self
            .counters
            .iter()
            .filter(|d| d.group == active || d.group == ALL_GROUPS)
            .count();
        if matching > self.reading.values.len() {
            // The counter list is stale relative to the reading. Drop the
            // ambiguous sample and re-enumerate rather than guessing which
            // counters the values belong to.
            log::warn!(
                "reading carries {} values for {} active counters; re-querying counter list",
                self.reading.values.len(),
                matching
            );
            self.refresh_counters();
            return;
        }

        let mut src = 0;
        for id in 0..self.counters.len() {
            let group = self.counters[id].group;
            if group == active || group == ALL_GROUPS {
                if src >= self.reading.values.len() {
                    break;
                }
                let value = self.reading.values[src];
                self.states[id].ring.push(value);
                src += 1;
            }
        }
    }

    /// Re-enumerate the backend's counters and rebuild per-counter state,
    /// carrying visibility and axis overrides across by counter name.
    fn refresh_counters(&mut self) {
        let fresh = self.backend.counters();
        let samples = self.layout.samples();
        let mut states = Vec::with_capacity(fresh.len());
        for def in &fresh {
            let carried = self
                .counters
                .iter()
                .position(|d| d.name == def.name)
                .map(|i| (self.states[i].show, self.states[i].user_max));
            let (show, user_max) = carried.unwrap_or((false, 0.0));
            states.push(CounterState {
                ring: SampleRing::new(samples),
                show,
                user_max,
            });
        }
        self.counters = fresh;
        self.states = states;
        // Ids may have shifted; legend rows are rebuilt on the next update.
        self.legends.clear();
        self.rebuild_standard_indices();
    }

    fn rebuild_standard_indices(&mut self) {
        let group = self.group.active;
        for kind in StandardCounter::ALL {
            self.standard[kind as usize] = find_standard_counter(&self.counters, group, kind);
        }
    }

    /// Rebuild curves and legend rows for the currently visible counters.
    fn update(&mut self, dt: f32) {
        self.legend_timer += dt;
        let legend_tick = self.legend_timer > LEGEND_REFRESH_SECS;
        if legend_tick {
            self.legend_timer = 0.0;
        }

        self.active_ids.clear();
        for id in 0..self.counters.len() {
            if self.is_counter_being_drawn(id) && self.states[id].show {
                self.active_ids.push(id);
            }
        }

        if self.layout.samples() == 0 {
            self.curves.clear();
            return;
        }

        let layout = self.layout;
        let samples = layout.samples();
        self.curves.resize_with(self.active_ids.len(), Curve::default);

        for pos in 0..self.active_ids.len() {
            let id = self.active_ids[pos];
            let color = palette::color(pos);
            let maximum = self.axis_maximum(id);

            // Legend: created on first visibility, value refreshed on the
            // 500ms cadence, color/row tracking the visible-order slot.
            let latest = self.states[id].ring.latest();
            let is_percentage = self.counters[id].is_percentage;
            match self.legends.entry(id) {
                Entry::Occupied(mut occupied) => {
                    let entry = occupied.get_mut();
                    entry.color = color;
                    entry.row = pos;
                    if legend_tick {
                        entry.value = legend::format_value(latest, is_percentage, maximum);
                    }
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(LegendEntry {
                        label: legend::format_label(id, &self.counters[id].name),
                        value: legend::format_value(latest, is_percentage, maximum),
                        color,
                        row: pos,
                    });
                }
            }

            // Geometry: oldest-to-newest left-to-right, through a seeded
            // 3-tap median, normalized against the axis ceiling.
            let ring = &self.states[id].ring;
            let curve = &mut self.curves[pos];
            curve.counter_id = id;
            curve.color = color;
            curve.points.resize(samples, [0.0, 0.0]);
            let mut window = MedianWindow::seeded(ring.oldest());
            for (dst, value) in ring.oldest_first().enumerate() {
                let median = window.push(value);
                let ratio = if maximum > 0.0 {
                    (median / maximum).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                curve.points[dst] = layout.point(dst, ratio);
            }
        }
    }

    /// The vertical-axis ceiling for a counter: user override, else 100 for
    /// percentages, else the smoothed peak of the whole buffer.
    fn axis_maximum(&self, id: usize) -> f32 {
        let state = &self.states[id];
        if state.user_max != 0.0 {
            state.user_max
        } else if self.counters[id].is_percentage {
            PERCENTAGE_CEILING
        } else {
            smoothed_peak(&state.ring)
        }
    }

    // === Control API ===

    /// Toggle a counter's contribution to the rendered output. Takes effect
    /// on the next `ping`. Out-of-range ids are ignored.
    pub fn show_counter(&mut self, id: usize, show: bool) {
        if let Some(state) = self.states.get_mut(id) {
            state.show = show;
        }
    }

    /// Request a new active group. Rejected (state unchanged) unless some
    /// counter declares a non-wildcard group at or above `group`.
    pub fn set_active_group(&mut self, group: u32) -> bool {
        let supported = self
            .counters
            .iter()
            .any(|d| d.group != ALL_GROUPS && d.group >= group);
        if !supported {
            log::warn!("rejecting active group {}: no counter group at or above it", group);
            return false;
        }
        if group != self.group.selected {
            self.group.request(group);
        }
        true
    }

    /// Per-counter axis-ceiling override; 0 restores auto-scaling.
    pub fn set_maximum(&mut self, id: usize, maximum: f32) {
        if let Some(state) = self.states.get_mut(id) {
            state.user_max = maximum;
        }
    }

    /// Pings between backend value computations (minimum 1).
    pub fn set_update_interval(&mut self, interval: u32) {
        self.update_interval = interval.max(1);
    }

    /// Reposition or resize the graph. When the sample-slot count or the
    /// pixel scale changes, every counter's ring is cleared and resized in
    /// lockstep; this is the only path that changes the slot count. A pure
    /// move keeps history intact.
    pub fn set_position(&mut self, viewport_w: u32, viewport_h: u32, rect: PixelRect) {
        let next = GraphLayout::new(viewport_w, viewport_h, rect);
        let rescaled = next.samples() != self.layout.samples()
            || next.pixel_w() != self.layout.pixel_w()
            || next.graph_h() != self.layout.graph_h();
        self.layout = next;
        if rescaled {
            let samples = next.samples();
            for state in &mut self.states {
                state.ring.resize(samples);
            }
        }
    }

    // === Query API ===

    pub fn counter_num(&self) -> usize {
        self.counters.len()
    }

    pub fn counter_name(&self, id: usize) -> Option<&str> {
        self.counters.get(id).map(|d| d.name.as_str())
    }

    pub fn counter_group(&self, id: usize) -> Option<u32> {
        self.counters.get(id).map(|d| d.group)
    }

    pub fn is_counter_shown(&self, id: usize) -> bool {
        self.states.get(id).map(|s| s.show).unwrap_or(false)
    }

    /// Whether the counter is sampled under the active group, independent of
    /// its visibility flag.
    pub fn is_counter_being_drawn(&self, id: usize) -> bool {
        self.counters
            .get(id)
            .map(|d| d.group == self.group.active || d.group == ALL_GROUPS)
            .unwrap_or(false)
    }

    pub fn is_counter_percentage(&self, id: usize) -> bool {
        self.counters.get(id).map(|d| d.is_percentage).unwrap_or(false)
    }

    /// The user override for a counter's axis ceiling (0 = auto).
    pub fn maximum(&self, id: usize) -> f32 {
        self.states.get(id).map(|s| s.user_max).unwrap_or(0.0)
    }

    /// Group confirmed by the most recent reading.
    pub fn active_group(&self) -> u32 {
        self.group.active
    }

    /// Group most recently requested via `set_active_group`.
    pub fn selected_group(&self) -> u32 {
        self.group.selected
    }

    /// Reading-array index of a standard counter in the active group.
    pub fn standard_index(&self, kind: StandardCounter) -> Option<usize> {
        self.standard[kind as usize]
    }

    /// Most recent value of a standard counter, or -1.0 when it is not
    /// present in the active group.
    pub fn standard_value(&self, kind: StandardCounter) -> f32 {
        match self.standard[kind as usize].and_then(|i| self.reading.values.get(i)) {
            Some(&value) => value,
            None => -1.0,
        }
    }

    /// Frames-per-second standard counter shortcut.
    pub fn fps(&self) -> f32 {
        self.standard_value(StandardCounter::Fps)
    }

    /// Renderable line strips for the visible counters, in visible order.
    pub fn curves(&self) -> &[Curve] {
        &self.curves
    }

    /// Ids of the counters contributing to rendered output, ascending.
    pub fn active_counter_ids(&self) -> &[usize] {
        &self.active_ids
    }

    /// Legend rows for the visible counters, in row order.
    pub fn legends(&self) -> impl Iterator<Item = &LegendEntry> {
        self.active_ids.iter().filter_map(move |id| self.legends.get(id))
    }

    pub fn legend(&self, id: usize) -> Option<&LegendEntry> {
        self.legends.get(&id)
    }

    /// Raw slot-order sample history of a counter.
    pub fn counter_history(&self, id: usize) -> Option<&[f32]> {
        self.states.get(id).map(|s| s.ring.as_slice())
    }

    /// Write-cursor position of a counter's history ring.
    pub fn history_cursor(&self, id: usize) -> Option<usize> {
        self.states.get(id).map(|s| s.ring.write_pos())
    }

    pub fn layout(&self) -> &GraphLayout {
        &self.layout
    }
}
