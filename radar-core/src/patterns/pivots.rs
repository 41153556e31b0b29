//! Pivot extraction shared by the structural detectors.

/// Whether a pivot is a local high or a local low.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotKind {
    Peak,
    Trough,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pivot {
    pub index: usize,
    pub price: f64,
    pub kind: PivotKind,
}

impl Pivot {
    fn peak(index: usize, price: f64) -> Self {
        Self {
            index,
            price,
            kind: PivotKind::Peak,
        }
    }

    fn trough(index: usize, price: f64) -> Self {
        Self {
            index,
            price,
            kind: PivotKind::Trough,
        }
    }
}

/// Zigzag pivots on highs and lows.
///
/// A pivot is confirmed once price reverses from it by at least
/// `threshold` (fractional, e.g. 0.03). Pivots alternate peak/trough.
/// The extreme still being tracked at the end of the data is unconfirmed
/// and not returned.
pub fn zigzag(high: &[f64], low: &[f64], threshold: f64) -> Vec<Pivot> {
    let n = high.len().min(low.len());
    let mut pivots = Vec::new();
    if n == 0 {
        return pivots;
    }

    // 0 = no direction yet, 1 = tracking a peak, -1 = tracking a trough
    let mut trend = 0i8;
    let (mut max_i, mut max_p) = (0, high[0]);
    let (mut min_i, mut min_p) = (0, low[0]);
    let mut candidate = Pivot::peak(0, high[0]);

    for i in 1..n {
        match trend {
            0 => {
                if high[i] >= min_p * (1.0 + threshold) {
                    pivots.push(Pivot::trough(min_i, min_p));
                    candidate = Pivot::peak(i, high[i]);
                    trend = 1;
                } else if low[i] <= max_p * (1.0 - threshold) {
                    pivots.push(Pivot::peak(max_i, max_p));
                    candidate = Pivot::trough(i, low[i]);
                    trend = -1;
                } else {
                    if high[i] > max_p {
                        max_i = i;
                        max_p = high[i];
                    }
                    if low[i] < min_p {
                        min_i = i;
                        min_p = low[i];
                    }
                }
            }
            1 => {
                if high[i] > candidate.price {
                    candidate = Pivot::peak(i, high[i]);
                } else if low[i] <= candidate.price * (1.0 - threshold) {
                    pivots.push(candidate);
                    candidate = Pivot::trough(i, low[i]);
                    trend = -1;
                }
            }
            _ => {
                if low[i] < candidate.price {
                    candidate = Pivot::trough(i, low[i]);
                } else if high[i] >= candidate.price * (1.0 + threshold) {
                    pivots.push(candidate);
                    candidate = Pivot::peak(i, high[i]);
                    trend = 1;
                }
            }
        }
    }
    pivots
}

/// Fixed-radius swing points within `range`.
///
/// Bar `i` is a swing high when its high is strictly above every other
/// high within `radius` bars on both sides; both sides must lie inside the
/// range, so the last `radius` bars never qualify.
pub fn swing_points(
    high: &[f64],
    low: &[f64],
    range: std::ops::Range<usize>,
    radius: usize,
) -> Vec<Pivot> {
    let mut points = Vec::new();
    let end = range.end.min(high.len()).min(low.len());
    if radius == 0 || end < range.start + 2 * radius + 1 {
        return points;
    }
    for i in (range.start + radius)..(end - radius) {
        let neighbours = (i - radius..=i + radius).filter(|&j| j != i);
        if neighbours.clone().all(|j| high[i] > high[j]) {
            points.push(Pivot::peak(i, high[i]));
        }
        if neighbours.into_iter().all(|j| low[i] < low[j]) {
            points.push(Pivot::trough(i, low[i]));
        }
    }
    points
}

/// Least-squares line through `(index, price)` points: `(slope, intercept)`.
pub fn fit_line(points: &[Pivot]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.index as f64).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.price).sum::<f64>() / n;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for p in points {
        let dx = p.index as f64 - mean_x;
        sxy += dx * (p.price - mean_y);
        sxx += dx * dx;
    }
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}
