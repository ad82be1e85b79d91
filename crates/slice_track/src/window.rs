//! Decides whether a visible window is served as exact rows or as merged buckets

use tracing::debug;

use crate::config::TrackConfig;
use crate::error::{Error, Result};
use crate::slice::TimeSpan;

/// What the renderer asks for: a visible range and how many nanoseconds one pixel covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRequest {
    pub range: TimeSpan,
    pub resolution: i64,
}

impl DataRequest {
    pub fn new(range: TimeSpan, resolution: i64) -> Self {
        Self { range, resolution }
    }
}

/// Query window for one request.
///
/// Quantized windows are snapped outwards to the quantum grid so bucket boundaries do not move
/// while the user pans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: i64,
    pub end: i64,
    pub quantized: bool,
    /// Bucket width in ns, `0` when not quantized
    pub quantum: i64,
}

impl Window {
    /// Pick the exact or quantized path for `request`.
    ///
    /// The quantum is `min(resolution * bucket_px, duration / min_quanta)`, at least 1 ns. Zoomed
    /// far out the pixel width decides; on short windows the `duration / min_quanta` cap keeps at
    /// least `min_quanta` buckets. Fails on empty or inverted ranges, non-positive resolutions,
    /// and windows whose snapped bounds do not fit in an `i64`.
    pub fn compute(request: &DataRequest, config: &TrackConfig) -> Result<Self> {
        let range = request.range.validate()?;
        if request.resolution <= 0 {
            return Err(Error::InvalidResolution(request.resolution));
        }

        if request.resolution < config.quantize_cutoff_ns {
            debug!(
                start = range.start,
                end = range.end,
                resolution = request.resolution,
                "serving exact slices"
            );
            return Ok(Self {
                start: range.start,
                end: range.end,
                quantized: false,
                quantum: 0,
            });
        }

        let by_pixels = request
            .resolution
            .saturating_mul(i64::from(config.bucket_px.max(1)));
        let by_count = range.duration() / i64::from(config.min_quanta.max(1));
        let quantum = by_pixels.min(by_count).max(1);

        let snapped = snap_to_grid(range, quantum).ok_or(Error::InvalidRange {
            start: range.start,
            end: range.end,
        })?;

        debug!(start = snapped.start, end = snapped.end, quantum, "serving quantized slices");
        Ok(Self {
            start: snapped.start,
            end: snapped.end,
            quantized: true,
            quantum,
        })
    }

    pub fn span(&self) -> TimeSpan {
        TimeSpan::new(self.start, self.end)
    }

    /// Number of buckets covering the window
    pub fn quantum_count(&self) -> i64 {
        if self.quantized {
            self.end.saturating_sub(self.start) / self.quantum
        } else {
            1
        }
    }

    /// Bucket holding `ts`, clamped to the window
    pub fn quantum_index(&self, ts: i64) -> i64 {
        if !self.quantized {
            return 0;
        }
        (ts.saturating_sub(self.start).div_euclid(self.quantum)).clamp(0, self.quantum_count() - 1)
    }

    /// Start time of bucket `index`
    pub fn quantum_start(&self, index: i64) -> i64 {
        self.start.saturating_add(index.saturating_mul(self.quantum))
    }
}

/// Widen `range` outwards to multiples of `quantum`
fn snap_to_grid(range: TimeSpan, quantum: i64) -> Option<TimeSpan> {
    let start = range.start.div_euclid(quantum).checked_mul(quantum)?;
    let mut end = range.end.div_euclid(quantum).checked_mul(quantum)?;
    if range.end.rem_euclid(quantum) != 0 {
        end = end.checked_add(quantum)?;
    }
    end.checked_sub(start)?;
    Some(TimeSpan::new(start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start: i64, end: i64, resolution: i64) -> DataRequest {
        DataRequest::new(TimeSpan::new(start, end), resolution)
    }

    #[test]
    fn test_fine_resolution_is_exact() {
        let window = Window::compute(&request(100, 900, 10), &TrackConfig::default()).unwrap();
        assert!(!window.quantized);
        assert_eq!(window.span(), TimeSpan::new(100, 900));
        assert_eq!(window.quantum_index(500), 0);
    }

    #[test]
    fn test_coarse_resolution_is_quantized() {
        // 5 px * 10_000 ns/px = 50_000 ns buckets over a 10 ms window
        let window =
            Window::compute(&request(0, 10_000_000, 10_000), &TrackConfig::default()).unwrap();
        assert!(window.quantized);
        assert_eq!(window.quantum, 50_000);
        assert_eq!(window.quantum_count(), 200);
        assert_eq!(window.quantum_index(149_999), 2);
        assert_eq!(window.quantum_start(2), 100_000);
    }

    #[test]
    fn test_quantum_capped_by_min_quanta() {
        let window = Window::compute(&request(0, 100_000, 1_000_000), &TrackConfig::default())
            .unwrap();
        assert_eq!(window.quantum, 20_000);
        assert_eq!(window.quantum_count(), 5);
    }

    #[test]
    fn test_window_snaps_to_grid() {
        let window =
            Window::compute(&request(12_345, 1_012_345, 2_000), &TrackConfig::default()).unwrap();
        assert_eq!(window.quantum, 10_000);
        assert_eq!(window.start, 10_000);
        assert_eq!(window.end, 1_020_000);
        assert_eq!(window.quantum_index(0), 0);
        assert_eq!(window.quantum_index(5_000_000), window.quantum_count() - 1);
    }

    #[test]
    fn test_negative_start_snaps_down() {
        let window = Window::compute(&request(-15, 85, 2_000), &TrackConfig::default()).unwrap();
        assert_eq!(window.quantum, 20);
        assert_eq!(window.start, -20);
        assert_eq!(window.end, 100);
    }

    #[test]
    fn test_invalid_windows() {
        for req in [request(10, 10, 1), request(10, 5, 5_000)] {
            assert!(matches!(
                Window::compute(&req, &TrackConfig::default()),
                Err(Error::InvalidRange { .. })
            ));
        }
    }

    #[test]
    fn test_quantum_is_smaller_of_pixel_and_count_limits() {
        let config = TrackConfig::default();

        // Pixel limited: 5 px * 2_000 ns/px = 10_000 ns, well under 1_000_000 / 5
        let wide = Window::compute(&request(0, 1_000_000, 2_000), &config).unwrap();
        assert_eq!(wide.quantum, 10_000);
        assert_eq!(wide.quantum_count(), 100);

        // Count limited: 5 px * 100_000 ns/px would leave a single bucket; the window is split
        // into min_quanta buckets of duration / 5 instead
        let short = Window::compute(&request(0, 1_000_000, 100_000), &config).unwrap();
        assert_eq!(short.quantum, 1_000_000 / 5);
        assert_eq!(short.quantum_count(), i64::from(config.min_quanta));
    }

    #[test]
    fn test_non_positive_resolution_rejected() {
        let config = TrackConfig {
            quantize_cutoff_ns: 0,
            ..TrackConfig::default()
        };
        for resolution in [0, -1, i64::MIN] {
            assert!(matches!(
                Window::compute(&request(0, 1_000, resolution), &config),
                Err(Error::InvalidResolution(r)) if r == resolution
            ));
        }
    }

    #[test]
    fn test_extreme_bounds_do_not_overflow() {
        let config = TrackConfig::default();

        // Span length does not fit in an i64
        assert!(matches!(
            Window::compute(&request(i64::MIN, i64::MAX, 2_000), &config),
            Err(Error::InvalidRange { .. })
        ));

        // Rounding the end up to the grid would pass i64::MAX
        assert!(matches!(
            Window::compute(&request(i64::MAX - 1_000_000, i64::MAX - 1, 2_000), &config),
            Err(Error::InvalidRange { .. })
        ));

        // Rounding the start down to the grid would pass i64::MIN
        assert!(matches!(
            Window::compute(&request(i64::MIN + 1, i64::MIN + 1_000_001, 2_000), &config),
            Err(Error::InvalidRange { .. })
        ));

        let window = Window::compute(&request(0, 1_000_000, 2_000), &config).unwrap();
        assert_eq!(window.quantum_index(i64::MIN), 0);
        assert_eq!(window.quantum_index(i64::MAX), window.quantum_count() - 1);
    }
}
