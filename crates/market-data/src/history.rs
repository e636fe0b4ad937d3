//! Bounded per-variety price history

use common::Grade;
use std::collections::VecDeque;

use crate::types::PricePoint;

/// Chronological, bounded sequence of price points for one variety
///
/// Insertion order is chronological order; the oldest point is evicted once
/// the retention window is exceeded.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    retention: usize,
    points: VecDeque<PricePoint>,
}

impl PriceHistory {
    pub fn new(retention: usize) -> Self {
        let retention = retention.max(1);
        Self {
            retention,
            points: VecDeque::with_capacity(retention),
        }
    }

    /// Append a point, returning the one evicted to make room
    pub fn push(&mut self, point: PricePoint) -> Option<PricePoint> {
        let evicted = if self.points.len() == self.retention {
            self.points.pop_front()
        } else {
            None
        };
        self.points.push_back(point);
        evicted
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.back()
    }

    /// Most recent point of the given grade
    pub fn latest_for_grade(&self, grade: Grade) -> Option<&PricePoint> {
        self.points.iter().rev().find(|p| p.grade == grade)
    }

    /// Prices oldest first
    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price_per_kg).collect()
    }

    pub fn to_vec(&self) -> Vec<PricePoint> {
        self.points.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PricePoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn retention(&self) -> usize {
        self.retention
    }
}
