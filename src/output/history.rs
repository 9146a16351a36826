use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use super::sink::SampleSink;
use crate::sample::Sample;

pub const MAX_DATA_POINTS: usize = 100;

#[derive(Debug, Default)]
struct Series {
    name: String,
    points: VecDeque<(f64, f64)>,
}

/// Rolling per-channel buffer a plot widget can redraw from.
///
/// Points are `(seconds since session start, value)`.
#[derive(Debug, Clone)]
pub struct PlotHistory {
    capacity: usize,
    series: Arc<Mutex<Vec<Series>>>,
}

impl PlotHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push(&self, sample: &Sample) {
        let mut series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        if series.len() != sample.len()
            || series.iter().zip(&sample.channel_names).any(|(s, n)| &s.name != n)
        {
            *series = sample
                .channel_names
                .iter()
                .map(|name| Series {
                    name: name.clone(),
                    points: VecDeque::with_capacity(self.capacity),
                })
                .collect();
        }

        let t = sample.elapsed.as_secs_f64();
        for (s, value) in series.iter_mut().zip(&sample.values) {
            if s.points.len() == self.capacity {
                s.points.pop_front();
            }
            s.points.push_back((t, *value));
        }
    }

    pub fn channel_names(&self) -> Vec<String> {
        let series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        series.iter().map(|s| s.name.clone()).collect()
    }

    pub fn points(&self, channel: usize) -> Vec<(f64, f64)> {
        let series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        series
            .get(channel)
            .map(|s| s.points.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self) -> Vec<Option<f64>> {
        let series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        series.iter().map(|s| s.points.back().map(|p| p.1)).collect()
    }
}

impl Default for PlotHistory {
    fn default() -> Self {
        Self::new(MAX_DATA_POINTS)
    }
}

pub struct HistorySink {
    history: PlotHistory,
}

impl HistorySink {
    pub fn new(history: PlotHistory) -> Self {
        Self { history }
    }
}

impl SampleSink for HistorySink {
    fn name(&self) -> &str {
        "history"
    }

    fn on_sample(&mut self, sample: Sample) {
        self.history.push(&sample);
    }
}
