use serde::Serialize;

use crate::homography::{HomographyMatrix, HomographySolver};
use crate::{MeasureError, PixelPoint, WorldPoint};

use super::store::{Correspondence, CorrespondenceStore, MIN_CORRESPONDENCES};

/// Operating mode of the frame loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Mode {
    Calibrating,
    Measuring,
}

/// A clicked pixel that still waits for its world coordinate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PendingCorrespondence {
    pub pixel: PixelPoint,
    pub index: usize,
}

/// Outcome of completing a pending correspondence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SessionEvent {
    /// Point stored; calibration still needs `required - count` more.
    PointAdded { count: usize, required: usize },
    /// Enough points: the homography was solved and the session now measures.
    Calibrated {
        homography: HomographyMatrix,
        rmse: f64,
    },
}

enum State {
    Calibrating { pending: Option<PixelPoint> },
    Measuring { homography: HomographyMatrix },
}

/// One calibration session: the correspondence store, the pending click, and
/// the homography latch.
///
/// The session starts in `Calibrating` and moves to `Measuring` exactly once,
/// at the moment the store reaches the required count and the solver accepts
/// the points. The homography only exists inside the `Measuring` state, so it
/// is written once and read-only afterwards. A failed solve leaves the session
/// in `Calibrating`; the caller decides whether to [`restart`](Self::restart).
pub struct CalibrationSession {
    store: CorrespondenceStore,
    required_points: usize,
    solver: HomographySolver,
    state: State,
}

impl CalibrationSession {
    /// New session that measures after `required_points` correspondences (at least 4).
    pub fn new(required_points: usize) -> Result<Self, MeasureError> {
        if required_points < MIN_CORRESPONDENCES {
            return Err(MeasureError::invalid(format!(
                "calibration needs at least {} points, configured {}",
                MIN_CORRESPONDENCES, required_points
            )));
        }
        Ok(Self {
            store: CorrespondenceStore::new(),
            required_points,
            solver: HomographySolver::default(),
            state: State::Calibrating { pending: None },
        })
    }

    pub fn with_solver(mut self, solver: HomographySolver) -> Self {
        self.solver = solver;
        self
    }

    /// Seed the session with known correspondences, e.g. from a config file.
    ///
    /// Solves immediately when the seed already satisfies the required count.
    /// All or nothing: if any point is rejected or the solve fails, the store
    /// is left exactly as it was.
    pub fn preload(
        &mut self,
        points: &[Correspondence],
    ) -> Result<Option<SessionEvent>, MeasureError> {
        if let State::Measuring { .. } = self.state {
            return Err(MeasureError::invalid("calibration is already complete"));
        }
        let mut staged = self.store.clone();
        for c in points {
            staged.add(c.pixel(), c.world())?;
        }
        let previous = std::mem::replace(&mut self.store, staged);
        if self.store.count() < self.required_points {
            return Ok(None);
        }
        match self.complete() {
            Ok(event) => Ok(Some(event)),
            Err(e) => {
                self.store = previous;
                Err(e)
            }
        }
    }

    pub fn mode(&self) -> Mode {
        match self.state {
            State::Calibrating { .. } => Mode::Calibrating,
            State::Measuring { .. } => Mode::Measuring,
        }
    }

    pub fn store(&self) -> &CorrespondenceStore {
        &self.store
    }

    pub fn required_points(&self) -> usize {
        self.required_points
    }

    pub fn pending(&self) -> Option<PixelPoint> {
        match self.state {
            State::Calibrating { pending } => pending,
            State::Measuring { .. } => None,
        }
    }

    /// Cached homography, present only in `Measuring`.
    pub fn homography(&self) -> Option<&HomographyMatrix> {
        match &self.state {
            State::Measuring { homography } => Some(homography),
            State::Calibrating { .. } => None,
        }
    }

    /// Register an operator click.
    ///
    /// The world coordinate follows via [`supply_world`](Self::supply_world).
    /// A second click before the first is completed replaces it.
    pub fn on_pixel_clicked(
        &mut self,
        pixel: PixelPoint,
    ) -> Result<PendingCorrespondence, MeasureError> {
        if !pixel.is_finite() {
            return Err(MeasureError::invalid(format!(
                "clicked pixel ({}, {}) is not finite",
                pixel.x, pixel.y
            )));
        }
        let index = self.store.count();
        match &mut self.state {
            State::Calibrating { pending } => {
                *pending = Some(pixel);
                Ok(PendingCorrespondence { pixel, index })
            }
            State::Measuring { .. } => Err(MeasureError::invalid(
                "calibration is complete; clicks are ignored while measuring",
            )),
        }
    }

    /// Complete the pending click with its world coordinate.
    ///
    /// On `InvalidInput` the click stays pending so the operator can be asked
    /// again. Reaching the required count triggers the one-time solve.
    pub fn supply_world(&mut self, world: WorldPoint) -> Result<SessionEvent, MeasureError> {
        let pixel = match self.state {
            State::Calibrating {
                pending: Some(pixel),
            } => pixel,
            State::Calibrating { pending: None } => {
                return Err(MeasureError::invalid("no clicked pixel awaits a world coordinate"))
            }
            State::Measuring { .. } => {
                return Err(MeasureError::invalid("calibration is already complete"))
            }
        };

        self.store.add(pixel, world)?;
        self.state = State::Calibrating { pending: None };
        log::info!(
            "calibration point {}/{}: pixel ({:.1}, {:.1}) -> world ({:.3}, {:.3}) m",
            self.store.count(),
            self.required_points,
            pixel.x,
            pixel.y,
            world.x,
            world.y
        );

        if self.store.count() >= self.required_points {
            return self.complete();
        }
        Ok(SessionEvent::PointAdded {
            count: self.store.count(),
            required: self.required_points,
        })
    }

    /// Return the homography, solving it on first use.
    ///
    /// Idempotent: once measuring, the cached matrix is returned without re-solving.
    pub fn solve(&mut self) -> Result<&HomographyMatrix, MeasureError> {
        if let State::Calibrating { .. } = self.state {
            self.complete()?;
        }
        match &self.state {
            State::Measuring { homography } => Ok(homography),
            State::Calibrating { .. } => Err(MeasureError::InsufficientPoints {
                required: self.required_points,
                found: self.store.count(),
            }),
        }
    }

    /// Discard all collected points and start a fresh calibration.
    pub fn restart(&mut self) {
        log::warn!(
            "restarting calibration; discarding {} collected point(s)",
            self.store.count()
        );
        self.store = CorrespondenceStore::new();
        self.state = State::Calibrating { pending: None };
    }

    fn complete(&mut self) -> Result<SessionEvent, MeasureError> {
        if self.store.count() < self.required_points {
            return Err(MeasureError::InsufficientPoints {
                required: self.required_points,
                found: self.store.count(),
            });
        }
        let correspondences = self.store.correspondences();
        let homography = self.solver.solve(correspondences)?;
        let rmse = homography.reprojection_rmse(correspondences)?;
        log::info!(
            "calibration complete with {} points (rmse {:.4} m, condition {:.3e}); measuring",
            correspondences.len(),
            rmse,
            homography.condition_number()
        );
        self.state = State::Measuring { homography };
        Ok(SessionEvent::Calibrated { homography, rmse })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: [((f64, f64), (f64, f64)); 4] = [
        ((100.0, 500.0), (0.0, 0.0)),
        ((500.0, 500.0), (4.0, 0.0)),
        ((100.0, 100.0), (0.0, 4.0)),
        ((500.0, 100.0), (4.0, 4.0)),
    ];

    fn click_and_supply(
        session: &mut CalibrationSession,
        p: (f64, f64),
        w: (f64, f64),
    ) -> SessionEvent {
        session.on_pixel_clicked(PixelPoint::new(p.0, p.1)).unwrap();
        session.supply_world(WorldPoint::new(w.0, w.1)).unwrap()
    }

    #[test]
    fn transitions_to_measuring_after_fourth_point() {
        let mut session = CalibrationSession::new(4).unwrap();
        assert_eq!(session.mode(), Mode::Calibrating);
        for (i, (p, w)) in SQUARE.iter().enumerate() {
            let event = click_and_supply(&mut session, *p, *w);
            if i < 3 {
                assert_eq!(
                    event,
                    SessionEvent::PointAdded {
                        count: i + 1,
                        required: 4
                    }
                );
                assert_eq!(session.mode(), Mode::Calibrating);
                assert!(session.homography().is_none());
            } else {
                assert!(matches!(event, SessionEvent::Calibrated { .. }));
            }
        }
        assert_eq!(session.mode(), Mode::Measuring);
        let h = *session.homography().unwrap();
        let mapped = h.map(PixelPoint::new(300.0, 500.0)).unwrap();
        assert!(mapped.distance_to(&WorldPoint::new(2.0, 0.0)) < 1e-9);
    }

    #[test]
    fn solve_is_cached_once_measuring() {
        let mut session = CalibrationSession::new(4).unwrap();
        for (p, w) in SQUARE {
            click_and_supply(&mut session, p, w);
        }
        let first = *session.solve().unwrap();
        let second = *session.solve().unwrap();
        assert_eq!(first, second);
        assert_eq!(session.store().count(), 4);
    }

    #[test]
    fn solve_before_ready_is_insufficient() {
        let mut session = CalibrationSession::new(4).unwrap();
        click_and_supply(&mut session, SQUARE[0].0, SQUARE[0].1);
        assert!(matches!(
            session.solve(),
            Err(MeasureError::InsufficientPoints {
                required: 4,
                found: 1
            })
        ));
        assert_eq!(session.mode(), Mode::Calibrating);
    }

    #[test]
    fn invalid_world_keeps_click_pending() {
        let mut session = CalibrationSession::new(4).unwrap();
        session.on_pixel_clicked(PixelPoint::new(10.0, 20.0)).unwrap();
        let err = session
            .supply_world(WorldPoint::new(f64::NAN, 1.0))
            .unwrap_err();
        assert!(matches!(err, MeasureError::InvalidInput { .. }));
        assert_eq!(session.pending(), Some(PixelPoint::new(10.0, 20.0)));
        session.supply_world(WorldPoint::new(1.0, 1.0)).unwrap();
        assert_eq!(session.pending(), None);
        assert_eq!(session.store().count(), 1);
    }

    #[test]
    fn world_without_click_is_rejected() {
        let mut session = CalibrationSession::new(4).unwrap();
        assert!(matches!(
            session.supply_world(WorldPoint::new(1.0, 1.0)),
            Err(MeasureError::InvalidInput { .. })
        ));
    }

    #[test]
    fn clicks_after_calibration_are_rejected() {
        let mut session = CalibrationSession::new(4).unwrap();
        for (p, w) in SQUARE {
            click_and_supply(&mut session, p, w);
        }
        assert!(session.on_pixel_clicked(PixelPoint::new(1.0, 1.0)).is_err());
        assert_eq!(session.mode(), Mode::Measuring);
    }

    #[test]
    fn degenerate_points_stay_calibrating_until_restart() {
        let mut session = CalibrationSession::new(4).unwrap();
        for i in 0..3 {
            let v = 100.0 * (i + 1) as f64;
            click_and_supply(&mut session, (v, v), (i as f64, 0.0));
        }
        session.on_pixel_clicked(PixelPoint::new(400.0, 100.0)).unwrap();
        let err = session.supply_world(WorldPoint::new(0.0, 1.0)).unwrap_err();
        assert!(err.is_fatal_calibration());
        assert_eq!(session.mode(), Mode::Calibrating);

        session.restart();
        assert_eq!(session.store().count(), 0);
        assert_eq!(session.mode(), Mode::Calibrating);
    }

    #[test]
    fn larger_required_count_defers_transition() {
        let mut session = CalibrationSession::new(5).unwrap();
        for (p, w) in SQUARE {
            click_and_supply(&mut session, p, w);
        }
        assert_eq!(session.mode(), Mode::Calibrating);
        let event = click_and_supply(&mut session, (300.0, 300.0), (2.0, 2.0));
        assert!(matches!(event, SessionEvent::Calibrated { .. }));
    }

    #[test]
    fn preload_solves_when_complete() {
        let points: Vec<_> = SQUARE
            .iter()
            .map(|(p, w)| {
                Correspondence::new(PixelPoint::new(p.0, p.1), WorldPoint::new(w.0, w.1)).unwrap()
            })
            .collect();
        let mut session = CalibrationSession::new(4).unwrap();
        let event = session.preload(&points).unwrap();
        assert!(matches!(event, Some(SessionEvent::Calibrated { .. })));
        assert_eq!(session.mode(), Mode::Measuring);
    }

    #[test]
    fn failed_preload_leaves_store_untouched() {
        let collinear: Vec<_> = (0..4)
            .map(|k| {
                let k = f64::from(k);
                Correspondence::new(
                    PixelPoint::new(100.0 + 50.0 * k, 400.0),
                    WorldPoint::new(k, k * k),
                )
                .unwrap()
            })
            .collect();
        let mut session = CalibrationSession::new(4).unwrap();
        assert!(session.preload(&collinear).unwrap_err().is_fatal_calibration());
        assert_eq!(session.store().count(), 0);
        assert_eq!(session.mode(), Mode::Calibrating);

        click_and_supply(&mut session, SQUARE[0].0, SQUARE[0].1);
        click_and_supply(&mut session, SQUARE[1].0, SQUARE[1].1);
        let repeats: Vec<_> = SQUARE[..2]
            .iter()
            .map(|(p, w)| {
                Correspondence::new(PixelPoint::new(p.0, p.1), WorldPoint::new(w.0, w.1)).unwrap()
            })
            .collect();
        assert!(session.preload(&repeats).unwrap_err().is_fatal_calibration());
        assert_eq!(session.store().count(), 2);
        assert_eq!(
            session.store().pixel_points().collect::<Vec<_>>(),
            vec![PixelPoint::new(100.0, 500.0), PixelPoint::new(500.0, 500.0)]
        );
    }

    #[test]
    fn preload_after_calibration_is_rejected() {
        let mut session = CalibrationSession::new(4).unwrap();
        for (p, w) in SQUARE {
            click_and_supply(&mut session, p, w);
        }
        let extra =
            Correspondence::new(PixelPoint::new(1.0, 1.0), WorldPoint::new(0.0, 0.0)).unwrap();
        assert!(session.preload(&[extra]).is_err());
        assert_eq!(session.store().count(), 4);
    }

    #[test]
    fn fewer_than_four_required_is_invalid() {
        assert!(CalibrationSession::new(3).is_err());
    }
}
