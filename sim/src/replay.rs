//! Replay: serialize/deserialize simulation logs for offline analysis.

use crate::tank_sim::SimEvent;
use anyhow::Context;
use nav_core::{metrics::GroundTruthPose, BeaconRow};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A full recorded simulation log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayLog {
    pub scenario_name: String,
    pub seed: u64,
    pub sim_dt: f64,
    pub duration: f64,
    /// Surveyed beacon table the events refer to
    pub beacons: Vec<BeaconRow>,
    /// All sensor events in chronological order
    pub events: Vec<SimEvent>,
    /// Ground-truth vehicle pose, sampled every `sim_dt`
    pub ground_truth: Vec<GroundTruthPose>,
}

impl ReplayLog {
    /// Latest ground-truth sample at or before `t` (within 1 µs).
    pub fn truth_at(&self, t: f64) -> Option<&GroundTruthPose> {
        let idx = self.ground_truth.partition_point(|g| g.time <= t + 1e-6);
        idx.checked_sub(1).map(|i| &self.ground_truth[i])
    }

    pub fn detection_batches(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SimEvent::Detections(_)))
            .count()
    }
}

/// Save a replay log to a JSON file.
pub fn save_replay(log: &ReplayLog, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, log)?;
    Ok(())
}

/// Load a replay log from a JSON file.
pub fn load_replay(path: &Path) -> anyhow::Result<ReplayLog> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    let log: ReplayLog = serde_json::from_reader(reader)
        .with_context(|| format!("parsing replay log {}", path.display()))?;
    Ok(log)
}
