//! Breakpoint automation
//!
//! A lane is a sparse, strictly position-ordered set of breakpoints with
//! sample-accurate interpolated lookup. Lanes are edited on the control
//! thread; render snapshots carry immutable `Arc` references, so the
//! audio thread reads them without any lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One automation breakpoint.
///
/// `curve` biases interpolation toward the next point: 0 is linear,
/// positive values skew exponentially (slow start), negative values
/// logarithmically (fast start).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutomationPoint {
    pub position: u64,
    pub value: f64,
    pub curve: f64,
}

impl AutomationPoint {
    pub fn new(position: u64, value: f64) -> Self {
        Self {
            position,
            value,
            curve: 0.0,
        }
    }

    pub fn with_curve(mut self, curve: f64) -> Self {
        self.curve = curve.clamp(-4.0, 4.0);
        self
    }
}

/// Automation lane: time-ordered breakpoints for one parameter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutomationLane {
    points: Vec<AutomationPoint>,
    /// Value reported while the lane has no points
    pub default_value: f64,
}

impl AutomationLane {
    pub fn new(default_value: f64) -> Self {
        Self {
            points: Vec::new(),
            default_value,
        }
    }

    pub fn points(&self) -> &[AutomationPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Insert a point, keeping positions strictly increasing. A point at
    /// an existing position overwrites instead of duplicating.
    pub fn add_point(&mut self, point: AutomationPoint) {
        match self
            .points
            .binary_search_by_key(&point.position, |p| p.position)
        {
            Ok(idx) => self.points[idx] = point,
            Err(idx) => self.points.insert(idx, point),
        }
    }

    /// Remove the point at an exact position
    pub fn remove_point(&mut self, position: u64) -> bool {
        match self.points.binary_search_by_key(&position, |p| p.position) {
            Ok(idx) => {
                self.points.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    /// Remove all points in `[start, end]`
    pub fn remove_range(&mut self, start: u64, end: u64) {
        self.points
            .retain(|p| p.position < start || p.position > end);
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Shift all points in `[start, end]` by `offset` samples. Points
    /// that land on an existing position overwrite it.
    pub fn move_range(&mut self, start: u64, end: u64, offset: i64) {
        if offset == 0 {
            return;
        }

        let moved: Vec<AutomationPoint> = self
            .points
            .iter()
            .filter(|p| p.position >= start && p.position <= end)
            .map(|p| AutomationPoint {
                position: p.position.saturating_add_signed(offset),
                ..*p
            })
            .collect();

        self.points
            .retain(|p| p.position < start || p.position > end);
        for point in moved {
            self.add_point(point);
        }
    }

    /// Multiply values of points in `[start, end]` by `factor`
    pub fn scale_range(&mut self, start: u64, end: u64, factor: f64) {
        for point in &mut self.points {
            if point.position >= start && point.position <= end {
                point.value *= factor;
            }
        }
    }

    /// Add `offset` to values of points in `[start, end]`
    pub fn offset_range(&mut self, start: u64, end: u64, offset: f64) {
        for point in &mut self.points {
            if point.position >= start && point.position <= end {
                point.value += offset;
            }
        }
    }

    /// Sample-accurate value lookup. Positions before the first point
    /// clamp to its value, positions after the last clamp to the last
    /// value, and an empty lane reports `default_value`.
    pub fn value_at(&self, position: u64) -> f64 {
        let Some(first) = self.points.first() else {
            return self.default_value;
        };
        if position <= first.position {
            return first.value;
        }

        let last = self.points[self.points.len() - 1];
        if position >= last.position {
            return last.value;
        }

        let idx = match self.points.binary_search_by_key(&position, |p| p.position) {
            Ok(idx) => return self.points[idx].value,
            Err(idx) => idx,
        };

        let p1 = &self.points[idx - 1];
        let p2 = &self.points[idx];
        let mut t = (position - p1.position) as f64 / (p2.position - p1.position) as f64;

        if p1.curve > 0.0 {
            t = t.powf(1.0 + p1.curve);
        } else if p1.curve < 0.0 {
            t = 1.0 - (1.0 - t).powf(1.0 - p1.curve);
        }

        p1.value + t * (p2.value - p1.value)
    }
}

/// Automation target addressing
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamTarget {
    Track(usize),
    Master,
}

/// Identifies one automatable parameter
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamId {
    pub target: ParamTarget,
    pub name: String,
}

impl ParamId {
    pub fn track_volume(track: usize) -> Self {
        Self {
            target: ParamTarget::Track(track),
            name: "volume".to_string(),
        }
    }

    pub fn track_pan(track: usize) -> Self {
        Self {
            target: ParamTarget::Track(track),
            name: "pan".to_string(),
        }
    }
}

/// Control-thread registry of automation lanes.
///
/// Lanes are stored behind `Arc`; editing uses copy-on-write
/// (`Arc::make_mut`), so a lane already referenced by a published
/// snapshot is never mutated in place.
#[derive(Default)]
pub struct AutomationBank {
    lanes: RwLock<HashMap<ParamId, Arc<AutomationLane>>>,
}

impl AutomationBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_lane(&self, id: ParamId, lane: AutomationLane) {
        self.lanes.write().insert(id, Arc::new(lane));
    }

    pub fn remove_lane(&self, id: &ParamId) -> bool {
        self.lanes.write().remove(id).is_some()
    }

    pub fn lane(&self, id: &ParamId) -> Option<Arc<AutomationLane>> {
        self.lanes.read().get(id).cloned()
    }

    pub fn has_lane(&self, id: &ParamId) -> bool {
        self.lanes.read().contains_key(id)
    }

    /// Edit a lane in place (copy-on-write if a snapshot still holds it)
    pub fn edit_lane(&self, id: &ParamId, edit: impl FnOnce(&mut AutomationLane)) -> bool {
        let mut lanes = self.lanes.write();
        match lanes.get_mut(id) {
            Some(lane) => {
                edit(Arc::make_mut(lane));
                true
            }
            None => false,
        }
    }

    pub fn value_at(&self, id: &ParamId, position: u64) -> Option<f64> {
        self.lanes.read().get(id).map(|lane| lane.value_at(position))
    }

    pub fn clear(&self) {
        self.lanes.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lane_with(points: &[(u64, f64)]) -> AutomationLane {
        let mut lane = AutomationLane::new(0.0);
        for &(pos, value) in points {
            lane.add_point(AutomationPoint::new(pos, value));
        }
        lane
    }

    #[test]
    fn test_empty_lane_default() {
        let lane = AutomationLane::new(0.75);
        assert_eq!(lane.value_at(0), 0.75);
        assert_eq!(lane.value_at(1_000_000), 0.75);
    }

    #[test]
    fn test_boundary_clamping() {
        let lane = lane_with(&[(1000, 0.2), (2000, 0.8)]);
        assert_eq!(lane.value_at(0), 0.2);
        assert_eq!(lane.value_at(1000), 0.2);
        assert_eq!(lane.value_at(2000), 0.8);
        assert_eq!(lane.value_at(50_000), 0.8);
    }

    #[test]
    fn test_linear_interpolation() {
        let lane = lane_with(&[(0, 0.0), (1000, 1.0)]);
        assert!((lane.value_at(500) - 0.5).abs() < 1e-9);
        assert!((lane.value_at(250) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_curve_bias() {
        let mut lane = AutomationLane::new(0.0);
        lane.add_point(AutomationPoint::new(0, 0.0).with_curve(2.0));
        lane.add_point(AutomationPoint::new(1000, 1.0));

        // Exponential skew: midpoint sits below the linear value
        let mid = lane.value_at(500);
        assert!(mid < 0.5);

        let mut log_lane = AutomationLane::new(0.0);
        log_lane.add_point(AutomationPoint::new(0, 0.0).with_curve(-2.0));
        log_lane.add_point(AutomationPoint::new(1000, 1.0));
        assert!(log_lane.value_at(500) > 0.5);
    }

    #[test]
    fn test_duplicate_position_overwrites() {
        let mut lane = lane_with(&[(100, 0.5)]);
        lane.add_point(AutomationPoint::new(100, 0.9));
        assert_eq!(lane.len(), 1);
        assert_eq!(lane.value_at(100), 0.9);
    }

    #[test]
    fn test_points_stay_sorted() {
        let mut lane = AutomationLane::new(0.0);
        for &pos in &[500u64, 100, 900, 300, 700] {
            lane.add_point(AutomationPoint::new(pos, pos as f64));
        }
        let positions: Vec<u64> = lane.points().iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![100, 300, 500, 700, 900]);
    }

    #[test]
    fn test_remove_point() {
        let mut lane = lane_with(&[(100, 0.1), (200, 0.2)]);
        assert!(lane.remove_point(100));
        assert!(!lane.remove_point(100));
        assert_eq!(lane.len(), 1);
    }

    #[test]
    fn test_move_range_keeps_order() {
        let mut lane = lane_with(&[(100, 0.1), (200, 0.2), (300, 0.3)]);
        lane.move_range(100, 200, 250);

        let positions: Vec<u64> = lane.points().iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![300, 350, 450]);
        assert_eq!(lane.value_at(300), 0.3);
        assert_eq!(lane.value_at(350), 0.1);
        assert_eq!(lane.value_at(450), 0.2);
    }

    #[test]
    fn test_move_range_collision_overwrites() {
        let mut lane = lane_with(&[(100, 0.1), (200, 0.2)]);
        lane.move_range(100, 100, 100);
        assert_eq!(lane.len(), 1);
        assert_eq!(lane.value_at(200), 0.1);
    }

    #[test]
    fn test_scale_and_offset_range() {
        let mut lane = lane_with(&[(100, 0.5), (200, 0.5)]);
        lane.scale_range(0, 150, 2.0);
        assert_eq!(lane.value_at(100), 1.0);
        assert_eq!(lane.value_at(200), 0.5);

        lane.offset_range(150, 300, 0.25);
        assert_eq!(lane.value_at(200), 0.75);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut lane = lane_with(&[(0, 0.0), (44100, 1.0)]);
        lane.points[0].curve = 1.5;

        let json = serde_json::to_string(&lane).unwrap();
        let back: AutomationLane = serde_json::from_str(&json).unwrap();
        assert_eq!(back.points(), lane.points());
    }

    #[test]
    fn test_bank_copy_on_write() {
        let bank = AutomationBank::new();
        let id = ParamId::track_volume(0);
        bank.set_lane(id.clone(), lane_with(&[(0, -6.0)]));

        // A snapshot-style reference taken before the edit
        let held = bank.lane(&id).unwrap();

        bank.edit_lane(&id, |lane| {
            lane.add_point(AutomationPoint::new(1000, 0.0));
        });

        assert_eq!(held.len(), 1);
        assert_eq!(bank.lane(&id).unwrap().len(), 2);
    }
}
