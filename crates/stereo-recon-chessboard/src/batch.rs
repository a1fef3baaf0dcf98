use crate::{ChessboardDetector, ChessboardError};
use log::{info, warn};
use rayon::prelude::*;
use stereo_recon_core::{CornerSet, Image};

/// Per-image outcome of a batch run, in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchDetection {
    pub results: Vec<Option<CornerSet>>,
    /// Images where the full pattern was found.
    pub found: usize,
    /// Valid images where the pattern was not found.
    pub failed: usize,
    /// Images rejected as unusable input, with the reason.
    pub errors: Vec<(usize, String)>,
}

impl BatchDetection {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CornerSet> {
        self.results.get(index).and_then(Option::as_ref)
    }
}

/// Detect the pattern on every image in parallel.
///
/// A failing image never aborts the batch; it is recorded in `errors` and
/// its slot in `results` stays `None`.
pub fn detect_batch(detector: &ChessboardDetector, images: &[Image]) -> BatchDetection {
    let outcomes: Vec<Result<Option<CornerSet>, ChessboardError>> = images
        .par_iter()
        .map(|img| detector.detect_image(img))
        .collect();

    let mut batch = BatchDetection {
        results: Vec::with_capacity(images.len()),
        ..Default::default()
    };
    for (idx, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(Some(corners)) => {
                batch.found += 1;
                batch.results.push(Some(corners));
            }
            Ok(None) => {
                batch.failed += 1;
                batch.results.push(None);
            }
            Err(err) => {
                warn!("image {}: {}", idx + 1, err);
                batch.errors.push((idx, err.to_string()));
                batch.results.push(None);
            }
        }
    }
    info!(
        "pattern found in {}/{} images ({} unusable)",
        batch.found,
        images.len(),
        batch.errors.len()
    );
    batch
}

/// Left and right detections over matching image lists.
#[derive(Debug, Clone, Default)]
pub struct StereoBatchDetection {
    pub left: BatchDetection,
    pub right: BatchDetection,
    /// Indices where both views contain the full pattern.
    pub usable: Vec<usize>,
}

impl StereoBatchDetection {
    /// Corner pairs for the usable indices, in order.
    pub fn pairs(&self) -> impl Iterator<Item = (&CornerSet, &CornerSet)> + '_ {
        self.usable
            .iter()
            .filter_map(|&i| Some((self.left.get(i)?, self.right.get(i)?)))
    }
}

/// Run [`detect_batch`] on both lists; pair `i` uses `left[i]` and `right[i]`.
pub fn detect_stereo_batch(
    detector: &ChessboardDetector,
    left: &[Image],
    right: &[Image],
) -> Result<StereoBatchDetection, ChessboardError> {
    if left.len() != right.len() {
        return Err(ChessboardError::BatchLengthMismatch {
            left: left.len(),
            right: right.len(),
        });
    }
    let (left, right) = rayon::join(
        || detect_batch(detector, left),
        || detect_batch(detector, right),
    );
    let usable: Vec<usize> = (0..left.len())
        .filter(|&i| left.get(i).is_some() && right.get(i).is_some())
        .collect();
    info!("{} of {} stereo pairs usable", usable.len(), left.len());
    Ok(StereoBatchDetection {
        left,
        right,
        usable,
    })
}
