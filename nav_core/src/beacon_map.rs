//! Surveyed beacon table and detection → measurement association.

use crate::{
    error::{NavError, Result},
    types::{BeaconId, Detection, Measurement, Position, YawPitchRoll},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row of a beacon survey: `(id, x, y, z)` in meters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeaconRow {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl BeaconRow {
    pub fn new(id: u32, x: f64, y: f64, z: f64) -> Self {
        Self { id, x, y, z }
    }
}

/// A static fiducial at a known position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Beacon {
    pub id: BeaconId,
    pub position: Position,
}

/// Why a detection did not become a [`Measurement`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    /// Id is not in the surveyed table
    UnknownBeacon,
    /// Negative or non-finite range
    InvalidRange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedDetection {
    pub beacon_id: BeaconId,
    pub reason: DropReason,
}

/// Result of pairing one detection batch with the beacon table.
#[derive(Clone, Debug, Default)]
pub struct Association {
    /// Valid measurements, in detection order
    pub measurements: Vec<Measurement>,
    pub dropped: Vec<DroppedDetection>,
}

/// Immutable id → beacon lookup, loaded once at startup.
#[derive(Clone, Debug, Default)]
pub struct BeaconMap {
    beacons: HashMap<BeaconId, Beacon>,
    /// Ids in ascending order, for deterministic iteration
    order: Vec<BeaconId>,
}

impl BeaconMap {
    /// Build the table. Fails on a repeated id or non-finite coordinates.
    pub fn load<I>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = BeaconRow>,
    {
        let mut beacons = HashMap::new();
        for row in rows {
            let id = BeaconId(row.id);
            let position = Position::new(row.x, row.y, row.z);
            if !position.iter().all(|c| c.is_finite()) {
                return Err(NavError::InvalidBeacon {
                    id,
                    reason: format!("non-finite position ({}, {}, {})", row.x, row.y, row.z),
                });
            }
            if beacons.insert(id, Beacon { id, position }).is_some() {
                return Err(NavError::DuplicateBeaconId(id));
            }
        }
        let mut order: Vec<BeaconId> = beacons.keys().copied().collect();
        order.sort_unstable();
        Ok(Self { beacons, order })
    }

    pub fn lookup(&self, id: BeaconId) -> Option<&Beacon> {
        self.beacons.get(&id)
    }

    pub fn len(&self) -> usize {
        self.beacons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beacons.is_empty()
    }

    /// Beacons in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Beacon> + '_ {
        self.order.iter().filter_map(move |id| self.beacons.get(id))
    }

    /// The table as survey rows (ascending id), e.g. for replay logs.
    pub fn rows(&self) -> Vec<BeaconRow> {
        self.iter()
            .map(|b| BeaconRow::new(b.id.0, b.position.x, b.position.y, b.position.z))
            .collect()
    }

    /// Pair each detection with its beacon.
    ///
    /// Detections of unknown beacons or with an invalid range are dropped and
    /// reported; the rest of the batch is still associated.
    pub fn associate(&self, detections: &[Detection]) -> Association {
        let mut out = Association {
            measurements: Vec::with_capacity(detections.len()),
            dropped: Vec::new(),
        };

        for det in detections {
            let Some(beacon) = self.lookup(det.beacon_id) else {
                tracing::warn!(beacon = %det.beacon_id, "detection of unknown beacon dropped");
                out.dropped.push(DroppedDetection {
                    beacon_id: det.beacon_id,
                    reason: DropReason::UnknownBeacon,
                });
                continue;
            };
            if !det.range.is_finite() || det.range < 0.0 {
                tracing::warn!(beacon = %det.beacon_id, range = det.range, "detection with invalid range dropped");
                out.dropped.push(DroppedDetection {
                    beacon_id: det.beacon_id,
                    reason: DropReason::InvalidRange,
                });
                continue;
            }
            out.measurements.push(Measurement::new(
                det.beacon_id,
                det.range,
                beacon.position,
                YawPitchRoll::from_quaternion(&det.orientation),
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::UnitQuaternion;

    fn det(id: u32, range: f64) -> Detection {
        Detection {
            beacon_id: BeaconId(id),
            range,
            orientation: UnitQuaternion::identity(),
        }
    }

    fn triangle() -> BeaconMap {
        BeaconMap::load([
            BeaconRow::new(1, 0.0, 0.0, 0.0),
            BeaconRow::new(2, 2.0, 0.0, 0.0),
            BeaconRow::new(3, 0.0, 2.0, 0.0),
        ])
        .unwrap()
    }

    #[test]
    fn lookup_known_and_unknown() {
        let map = triangle();
        assert_eq!(map.len(), 3);
        assert_eq!(map.lookup(BeaconId(2)).unwrap().position, Position::new(2.0, 0.0, 0.0));
        assert!(map.lookup(BeaconId(9)).is_none());
    }

    #[test]
    fn duplicate_id_rejected() {
        let err = BeaconMap::load([
            BeaconRow::new(4, 0.0, 0.0, 0.0),
            BeaconRow::new(4, 1.0, 0.0, 0.0),
        ])
        .unwrap_err();
        assert_eq!(err, NavError::DuplicateBeaconId(BeaconId(4)));
    }

    #[test]
    fn non_finite_position_rejected() {
        let err = BeaconMap::load([BeaconRow::new(1, f64::NAN, 0.0, 0.0)]).unwrap_err();
        assert!(matches!(err, NavError::InvalidBeacon { .. }));
    }

    #[test]
    fn unknown_id_dropped_rest_of_batch_kept() {
        let map = triangle();
        let assoc = map.associate(&[det(1, 1.0), det(42, 0.5), det(3, 1.2)]);

        let ids: Vec<_> = assoc.measurements.iter().map(|m| m.beacon_id()).collect();
        assert_eq!(ids, vec![BeaconId(1), BeaconId(3)]);
        assert_eq!(
            assoc.dropped,
            vec![DroppedDetection {
                beacon_id: BeaconId(42),
                reason: DropReason::UnknownBeacon
            }]
        );
        assert_eq!(*assoc.measurements[1].beacon_position(), Position::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn invalid_range_dropped() {
        let map = triangle();
        let assoc = map.associate(&[det(1, -0.1), det(2, f64::NAN), det(3, 0.0)]);
        assert_eq!(assoc.measurements.len(), 1);
        assert_eq!(assoc.dropped.len(), 2);
        assert!(assoc.dropped.iter().all(|d| d.reason == DropReason::InvalidRange));
    }

    #[test]
    fn rows_are_sorted_by_id() {
        let map = BeaconMap::load([
            BeaconRow::new(7, 0.0, 0.0, 0.0),
            BeaconRow::new(2, 1.0, 0.0, 0.0),
        ])
        .unwrap();
        let ids: Vec<u32> = map.rows().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 7]);
    }
}
