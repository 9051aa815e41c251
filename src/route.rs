use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::types::{Coordinate, PositionSample};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub timestamp: f64,
    pub coordinate: Coordinate,
}

/// Decimates raw fixes into the displayable route polyline.
#[derive(Clone, Debug, Default)]
pub struct RouteSampler {
    points: Vec<RoutePoint>,
    last_known: Option<RoutePoint>,
}

impl RouteSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.points.clear();
        self.last_known = None;
    }

    /// Offer a fix; returns true when it was appended.
    pub fn observe(&mut self, sample: &PositionSample, config: &TrackerConfig) -> bool {
        let point = RoutePoint {
            timestamp: sample.timestamp,
            coordinate: sample.coordinate,
        };
        if sample.has_valid_accuracy() {
            self.last_known = Some(point);
        }

        let last = match self.points.last().copied() {
            Some(last) => last,
            None => {
                self.points.push(point);
                self.last_known = Some(point);
                return true;
            }
        };

        if !sample.has_valid_accuracy() || sample.horizontal_accuracy > config.route_max_accuracy_m {
            return false;
        }

        let spaced = last.coordinate.distance_to(&point.coordinate) >= config.route_min_spacing_m;
        let overdue = point.timestamp - last.timestamp >= config.route_max_interval_secs;
        if spaced || overdue {
            self.points.push(point);
            return true;
        }
        false
    }

    /// Append the last known position if the route stops short of it.
    /// Returns true when a point was added.
    pub fn flush_final(&mut self, config: &TrackerConfig) -> bool {
        let last_known = match self.last_known {
            Some(point) => point,
            None => return false,
        };
        let needs_point = match self.points.last() {
            Some(last) => {
                last.coordinate.distance_to(&last_known.coordinate) >= config.route_min_spacing_m
            }
            None => true,
        };
        if needs_point {
            self.points.push(last_known);
        }
        needs_point
    }

    pub fn points(&self) -> &[RoutePoint] {
        &self.points
    }

    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.points.iter().map(|p| p.coordinate).collect()
    }

    pub fn last_known(&self) -> Option<Coordinate> {
        self.last_known.map(|p| p.coordinate)
    }
}
