//! Retroactive correction of a filter's history so a delayed absolute
//! measurement is fused at the point in time it was actually sensed.
//!
//! Local measurements (a gyro heading, say) arrive with effectively zero
//! latency and are fused every tick. Absolute measurements (a vision
//! pose) are computed off-loop and arrive stamped in the past, sometimes
//! hundreds of milliseconds stale and out of order. Applying one to the
//! *current* state would mis-time the correction whenever the robot moved
//! in between; instead the filter's state is rewound to the snapshot just
//! before the measurement was sensed, corrected there, and the retained
//! local history replayed forward over it.

use crate::observer::KalmanFilter;
use nalgebra::SVector;
use std::collections::VecDeque;

/// One control tick's record: the filter's state estimate after that
/// tick's local correction, plus the input and local measurement that
/// produced it. Copied in and out; never aliased with the live filter.
#[derive(Debug, Clone, Copy)]
struct ObserverSnapshot<const STATES: usize, const INPUTS: usize, const OUTPUTS: usize> {
    timestamp_seconds: f64,
    x_hat: SVector<f64, STATES>,
    u: SVector<f64, INPUTS>,
    local_y: SVector<f64, OUTPUTS>,
}

/// Bounded, time-ordered history of observer snapshots for one filter.
///
/// The buffer stays sorted by strictly increasing timestamp; inserting at
/// a duplicate timestamp overwrites, and entries older than the retention
/// window are evicted on insert.
pub struct LatencyCompensator<const STATES: usize, const INPUTS: usize, const OUTPUTS: usize> {
    history: VecDeque<ObserverSnapshot<STATES, INPUTS, OUTPUTS>>,
}

impl<const STATES: usize, const INPUTS: usize, const OUTPUTS: usize> Default
    for LatencyCompensator<STATES, INPUTS, OUTPUTS>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const STATES: usize, const INPUTS: usize, const OUTPUTS: usize>
    LatencyCompensator<STATES, INPUTS, OUTPUTS>
{
    /// How much history is retained. A measurement pipeline that runs
    /// longer than this behind the control loop corrects against the
    /// oldest snapshot still held.
    pub const RETENTION_SECONDS: f64 = 1.5;

    pub fn new() -> Self {
        Self {
            history: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Records the observer's state after this tick's own predict and
    /// correct have run, keyed by `timestamp_seconds`.
    pub fn add_observer_state(
        &mut self,
        observer: &KalmanFilter<STATES, INPUTS, OUTPUTS>,
        u: SVector<f64, INPUTS>,
        local_y: SVector<f64, OUTPUTS>,
        timestamp_seconds: f64,
    ) {
        if let Some(back) = self.history.back() {
            if back.timestamp_seconds == timestamp_seconds {
                self.history.pop_back();
            }
        }
        self.history.push_back(ObserverSnapshot {
            timestamp_seconds,
            x_hat: *observer.x_hat(),
            u,
            local_y,
        });

        while let Some(front) = self.history.front() {
            if timestamp_seconds - front.timestamp_seconds > Self::RETENTION_SECONDS {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    /// Blends a delayed global measurement in at the correct point in
    /// history and propagates its influence forward through every local
    /// correction recorded since.
    ///
    /// The filter's point estimate is rewound to the snapshot at or
    /// before `timestamp_seconds` (the oldest retained snapshot if the
    /// measurement predates the whole buffer), `global_correct` applies
    /// the measurement there, and the newer snapshots are replayed in
    /// timestamp order with `nominal_dt_seconds` predictions and their
    /// stored local measurements. The covariance is not rewound: it
    /// keeps evolving forward from its current value, trading a small
    /// accuracy loss for not keeping a second history log.
    pub fn apply_past_global_measurement<const ROWS: usize, F>(
        &mut self,
        observer: &mut KalmanFilter<STATES, INPUTS, OUTPUTS>,
        nominal_dt_seconds: f64,
        global_y: &SVector<f64, ROWS>,
        mut global_correct: F,
        timestamp_seconds: f64,
    ) where
        F: FnMut(&mut KalmanFilter<STATES, INPUTS, OUTPUTS>, &SVector<f64, INPUTS>, &SVector<f64, ROWS>),
        nalgebra::Const<STATES>:
            nalgebra::DimMin<nalgebra::Const<STATES>, Output = nalgebra::Const<STATES>>,
        nalgebra::Const<OUTPUTS>:
            nalgebra::DimMin<nalgebra::Const<OUTPUTS>, Output = nalgebra::Const<OUTPUTS>>,
    {
        if self.history.is_empty() {
            return;
        }

        // Index of the first snapshot newer than the measurement; the one
        // before it is the state as of just before the measurement was
        // sensed. saturating_sub clamps a measurement older than the
        // whole buffer to the oldest snapshot rather than dropping it.
        let first_newer = self
            .history
            .partition_point(|snapshot| snapshot.timestamp_seconds <= timestamp_seconds);
        let anchor = first_newer.saturating_sub(1);

        let anchor_snapshot = self.history[anchor];
        observer.set_x_hat(anchor_snapshot.x_hat);
        global_correct(observer, &anchor_snapshot.u, global_y);

        for snapshot in self.history.iter().skip(anchor + 1) {
            observer.predict(&snapshot.u, nominal_dt_seconds);
            observer.correct(&snapshot.u, &snapshot.local_y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::LinearSystem;
    use nalgebra::{Matrix3, SMatrix, Vector1, Vector3};

    const DT: f64 = 0.02;

    /// Pose observer whose local heading measurement carries enormous
    /// noise, so replayed local corrections are effectively inert and the
    /// replay's effect on the estimate is pure input integration.
    fn inert_correction_observer() -> KalmanFilter<3, 3, 1> {
        let plant = LinearSystem::new(
            Matrix3::zeros(),
            Matrix3::identity(),
            SMatrix::<f64, 1, 3>::new(0.0, 0.0, 1.0),
            SMatrix::<f64, 1, 3>::zeros(),
            Box::new(|u| *u),
        );
        KalmanFilter::new(plant, &Vector3::new(0.1, 0.1, 0.1), &Vector1::new(1e9), DT)
    }

    fn identity_correct(
        observer: &mut KalmanFilter<3, 3, 1>,
        u: &Vector3<f64>,
        y: &Vector3<f64>,
    ) {
        let r = Matrix3::from_diagonal_element(1e-9);
        observer.correct_with(u, y, &Matrix3::identity(), &Matrix3::zeros(), &r);
    }

    #[test]
    fn test_eviction_keeps_buffer_bounded_by_age() {
        let observer = inert_correction_observer();
        let mut compensator = LatencyCompensator::<3, 3, 1>::new();

        let mut t = 0.0;
        while t < 4.0 {
            compensator.add_observer_state(&observer, Vector3::zeros(), Vector1::zeros(), t);
            t += DT;
        }

        // Everything older than the retention window is gone.
        let span = LatencyCompensator::<3, 3, 1>::RETENTION_SECONDS;
        assert!(compensator.len() <= (span / DT) as usize + 1);
    }

    #[test]
    fn test_duplicate_timestamp_overwrites() {
        let mut observer = inert_correction_observer();
        let mut compensator = LatencyCompensator::<3, 3, 1>::new();

        compensator.add_observer_state(&observer, Vector3::zeros(), Vector1::zeros(), 1.0);
        observer.set_x_hat(Vector3::new(9.0, 0.0, 0.0));
        compensator.add_observer_state(&observer, Vector3::zeros(), Vector1::zeros(), 1.0);
        assert_eq!(compensator.len(), 1);
    }

    #[test]
    fn test_replays_only_snapshots_after_measurement() {
        // Snapshots at t = 1, 2, 3, 5 with distinct inputs; a measurement
        // at t = 2 anchors on the snapshot at 2 and must replay exactly
        // the snapshots at 3 and 5. For the pure-integrator plant each
        // replayed snapshot adds u * dt to the estimate, so the final
        // state tells us exactly which snapshots were replayed.
        let mut observer = inert_correction_observer();
        let mut compensator = LatencyCompensator::<3, 3, 1>::new();

        let inputs = [
            (1.0, Vector3::new(100.0, 0.0, 0.0)),
            (2.0, Vector3::new(0.0, 100.0, 0.0)),
            (3.0, Vector3::new(1.0, 0.0, 0.0)),
            (5.0, Vector3::new(0.0, 1.0, 0.0)),
        ];
        for (t, u) in inputs {
            compensator.add_observer_state(&observer, u, Vector1::zeros(), t);
        }

        let anchor_state = Vector3::zeros();
        compensator.apply_past_global_measurement(
            &mut observer,
            DT,
            &anchor_state,
            identity_correct,
            2.0,
        );

        // Anchor correction pins the estimate at zero, then the replay
        // integrates the inputs stored at t = 3 and t = 5 only. Had the
        // t = 1 or t = 2 inputs been replayed, they would dominate the
        // result by two orders of magnitude.
        let expected = (Vector3::new(1.0, 0.0, 0.0) + Vector3::new(0.0, 1.0, 0.0)) * DT;
        assert!((observer.x_hat() - expected).norm() < 1e-3);
    }

    #[test]
    fn test_measurement_older_than_history_uses_oldest_snapshot() {
        let mut observer = inert_correction_observer();
        let mut compensator = LatencyCompensator::<3, 3, 1>::new();

        compensator.add_observer_state(&observer, Vector3::new(1.0, 0.0, 0.0), Vector1::zeros(), 10.0);
        compensator.add_observer_state(&observer, Vector3::new(2.0, 0.0, 0.0), Vector1::zeros(), 10.02);

        // Inflate the covariance so the anchor correction carries weight.
        observer.predict(&Vector3::zeros(), DT);

        // Timestamp far older than anything retained: the correction is
        // applied against the oldest snapshot, not discarded, so the
        // snapshot at 10.02 still replays.
        let measured = Vector3::new(0.5, 0.0, 0.0);
        compensator.apply_past_global_measurement(
            &mut observer,
            DT,
            &measured,
            identity_correct,
            3.0,
        );

        let expected = measured + Vector3::new(2.0, 0.0, 0.0) * DT;
        assert!((observer.x_hat() - expected).norm() < 1e-3);
    }

    #[test]
    fn test_agreeing_stale_measurement_leaves_estimate_unchanged() {
        // A stale global measurement that agrees with the trajectory the
        // filter already holds must not inject a spurious correction.
        let mut observer = inert_correction_observer();
        let mut compensator = LatencyCompensator::<3, 3, 1>::new();

        // Robot at rest at the origin for one second of ticks.
        let mut t = 0.0;
        while t < 1.0 {
            let u = Vector3::zeros();
            let y = Vector1::zeros();
            compensator.add_observer_state(&observer, u, y, t);
            observer.predict(&u, DT);
            observer.correct(&u, &y);
            t += DT;
        }
        let before = *observer.x_hat();

        compensator.apply_past_global_measurement(
            &mut observer,
            DT,
            &Vector3::zeros(),
            identity_correct,
            t - 0.5,
        );

        assert!((observer.x_hat() - before).norm() < 1e-6);
    }
}
