use serde::{Deserialize, Serialize};

use crate::{MeasureError, PixelPoint, WorldPoint};

/// A planar homography has 8 degrees of freedom; each correspondence fixes two.
pub const MIN_CORRESPONDENCES: usize = 4;

/// One clicked pixel and the ground coordinate the operator assigned to it.
///
/// Fields are private so a recorded correspondence cannot be edited.
/// Deserialization goes through [`Correspondence::new`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCorrespondence")]
pub struct Correspondence {
    pixel: PixelPoint,
    world: WorldPoint,
}

#[derive(Deserialize)]
struct RawCorrespondence {
    pixel: PixelPoint,
    world: WorldPoint,
}

impl TryFrom<RawCorrespondence> for Correspondence {
    type Error = MeasureError;

    fn try_from(raw: RawCorrespondence) -> Result<Self, Self::Error> {
        Correspondence::new(raw.pixel, raw.world)
    }
}

impl Correspondence {
    pub fn new(pixel: PixelPoint, world: WorldPoint) -> Result<Self, MeasureError> {
        if !pixel.is_finite() {
            return Err(MeasureError::invalid(format!(
                "pixel coordinate ({}, {}) is not finite",
                pixel.x, pixel.y
            )));
        }
        if !world.is_finite() {
            return Err(MeasureError::invalid(format!(
                "world coordinate ({}, {}) is not finite",
                world.x, world.y
            )));
        }
        Ok(Self { pixel, world })
    }

    pub fn pixel(&self) -> PixelPoint {
        self.pixel
    }

    pub fn world(&self) -> WorldPoint {
        self.world
    }
}

/// Ordered set of correspondences collected during one calibration session.
///
/// Index `i` of the pixel sequence and index `i` of the world sequence always
/// describe the same physical point. There is no removal; a new calibration
/// starts from a new store.
#[derive(Clone, Debug, Default)]
pub struct CorrespondenceStore {
    entries: Vec<Correspondence>,
}

impl CorrespondenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a correspondence. Rejects non-finite coordinates with `InvalidInput`.
    pub fn add(&mut self, pixel: PixelPoint, world: WorldPoint) -> Result<(), MeasureError> {
        let entry = Correspondence::new(pixel, world)?;
        self.entries.push(entry);
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True once enough correspondences exist to solve for a homography.
    pub fn is_ready(&self) -> bool {
        self.count() >= MIN_CORRESPONDENCES
    }

    pub fn correspondences(&self) -> &[Correspondence] {
        &self.entries
    }

    pub fn pixel_points(&self) -> impl Iterator<Item = PixelPoint> + '_ {
        self.entries.iter().map(|c| c.pixel)
    }

    pub fn world_points(&self) -> impl Iterator<Item = WorldPoint> + '_ {
        self.entries.iter().map(|c| c.world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_becomes_ready_at_four_points() {
        let mut store = CorrespondenceStore::new();
        for i in 0..3 {
            store
                .add(PixelPoint::new(i as f64, 0.0), WorldPoint::new(0.0, i as f64))
                .unwrap();
            assert!(!store.is_ready());
        }
        store
            .add(PixelPoint::new(9.0, 9.0), WorldPoint::new(1.0, 1.0))
            .unwrap();
        assert_eq!(store.count(), 4);
        assert!(store.is_ready());
    }

    #[test]
    fn non_finite_coordinates_are_rejected() {
        let mut store = CorrespondenceStore::new();
        let err = store
            .add(PixelPoint::new(1.0, 2.0), WorldPoint::new(f64::NAN, 0.0))
            .unwrap_err();
        assert!(matches!(err, MeasureError::InvalidInput { .. }));
        let err = store
            .add(PixelPoint::new(f64::INFINITY, 2.0), WorldPoint::new(0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, MeasureError::InvalidInput { .. }));
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn pixel_and_world_sequences_stay_aligned() {
        let mut store = CorrespondenceStore::new();
        store
            .add(PixelPoint::new(10.0, 20.0), WorldPoint::new(1.0, 2.0))
            .unwrap();
        store
            .add(PixelPoint::new(30.0, 40.0), WorldPoint::new(3.0, 4.0))
            .unwrap();
        let pixels: Vec<_> = store.pixel_points().collect();
        let worlds: Vec<_> = store.world_points().collect();
        assert_eq!(pixels[1], PixelPoint::new(30.0, 40.0));
        assert_eq!(worlds[1], WorldPoint::new(3.0, 4.0));
        assert_eq!(pixels.len(), worlds.len());
    }

    #[test]
    fn deserialized_correspondences_are_validated() {
        let ok: Correspondence = toml::from_str(
            "[pixel]\nx = 100.0\ny = 500.0\n[world]\nx = 0.0\ny = 0.0\n",
        )
        .unwrap();
        assert_eq!(ok.pixel(), PixelPoint::new(100.0, 500.0));

        let err = toml::from_str::<Correspondence>(
            "[pixel]\nx = nan\ny = 500.0\n[world]\nx = 0.0\ny = 0.0\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("not finite"), "{err}");
        assert!(toml::from_str::<Correspondence>(
            "[pixel]\nx = 1.0\ny = 2.0\n[world]\nx = inf\ny = 0.0\n",
        )
        .is_err());
    }
}
