//! Periodic cubic Hermite splines over keyframe channels.

use glam::DVec3;

use crate::keyframe::Keyframe;

/// A multi-channel cubic Hermite spline.
///
/// Each knot stores, per channel, an incoming tangent, the point value and an
/// outgoing tangent. Tangents are finite-difference slopes scaled by the
/// duration of the adjacent segment, so the curve passes through every knot.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    times: Vec<f64>,
    // [in, point, out] per channel per knot
    knots: Vec<f64>,
    dim: usize,
}

impl CubicSpline {
    /// Fits a spline through `points` (flattened, `dim` values per time).
    ///
    /// Returns `None` with fewer than two knots or mismatched lengths.
    pub fn from_points(times: &[f64], points: &[f64], tension: f64) -> Option<Self> {
        let count = times.len();
        if count < 2 || points.len() % count != 0 {
            return None;
        }
        let dim = points.len() / count;
        let scale = 1.0 - tension;
        let mut knots = vec![0.0; count * dim * 3];

        for i in 0..count {
            let t = times[i];
            for j in 0..dim {
                let idx = i * dim + j;
                let p = points[idx];

                let tangent = if i == 0 {
                    (points[idx + dim] - p) / (times[i + 1] - t)
                } else if i == count - 1 {
                    (p - points[idx - dim]) / (t - times[i - 1])
                } else {
                    0.5 * ((points[idx + dim] - p) / (times[i + 1] - t)
                        + (p - points[idx - dim]) / (t - times[i - 1]))
                };

                let in_span = if i > 0 { t - times[i - 1] } else { times[1] - times[0] };
                let out_span = if i < count - 1 { times[i + 1] - t } else { t - times[i - 1] };

                knots[idx * 3] = tangent * in_span * scale;
                knots[idx * 3 + 1] = p;
                knots[idx * 3 + 2] = tangent * out_span * scale;
            }
        }

        Some(Self {
            times: times.to_vec(),
            knots,
            dim,
        })
    }

    /// Fits a spline that wraps around a timeline of `length` frames.
    ///
    /// The last two knots are repeated before the start (shifted by `-length`)
    /// and the first two after the end (shifted by `+length`), so the segment
    /// from the last key back to the first key is smooth.
    pub fn from_points_looping(length: f64, times: &[f64], points: &[f64], tension: f64) -> Option<Self> {
        let count = times.len();
        if count < 2 || points.len() % count != 0 {
            return None;
        }
        let dim = points.len() / count;

        let mut looped_times = Vec::with_capacity(count + 4);
        looped_times.push(times[count - 2] - length);
        looped_times.push(times[count - 1] - length);
        looped_times.extend_from_slice(times);
        looped_times.push(times[0] + length);
        looped_times.push(times[1] + length);

        let mut looped_points = Vec::with_capacity(points.len() + dim * 4);
        looped_points.extend_from_slice(&points[points.len() - dim * 2..]);
        looped_points.extend_from_slice(points);
        looped_points.extend_from_slice(&points[..dim * 2]);

        Self::from_points(&looped_times, &looped_points, tension)
    }

    /// Number of channels per knot.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Knot times, including any wrap-around knots.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Evaluates all channels at `time` into `result`.
    ///
    /// Times before the first knot or after the last clamp to that knot.
    pub fn evaluate_into(&self, time: f64, result: &mut [f64]) {
        let last = self.times.len() - 1;
        if time <= self.times[0] {
            self.knot_into(0, result);
        } else if time >= self.times[last] {
            self.knot_into(last, result);
        } else {
            let segment = self.times.partition_point(|&t| t <= time) - 1;
            let span = self.times[segment + 1] - self.times[segment];
            self.segment_into(segment, (time - self.times[segment]) / span, result);
        }
    }

    /// Evaluates all channels at `time`.
    pub fn evaluate(&self, time: f64) -> Vec<f64> {
        let mut result = vec![0.0; self.dim];
        self.evaluate_into(time, &mut result);
        result
    }

    fn knot_into(&self, index: usize, result: &mut [f64]) {
        for (i, value) in result.iter_mut().enumerate().take(self.dim) {
            *value = self.knots[(index * self.dim + i) * 3 + 1];
        }
    }

    fn segment_into(&self, segment: usize, t: f64, result: &mut [f64]) {
        let t2 = t * t;
        let twot = t + t;
        let omt = 1.0 - t;
        let omt2 = omt * omt;
        let stride = self.dim * 3;

        for (i, value) in result.iter_mut().enumerate().take(self.dim) {
            let idx = (segment * self.dim + i) * 3;
            let p0 = self.knots[idx + 1];
            let m0 = self.knots[idx + 2];
            let m1 = self.knots[idx + stride];
            let p1 = self.knots[idx + stride + 1];
            *value = p0 * (1.0 + twot) * omt2 + m0 * t * omt2 + p1 * t2 * (3.0 - twot) + m1 * t2 * (t - 1.0);
        }
    }
}

/// Looping position/target spline for one pose track.
#[derive(Debug, Clone)]
pub struct PoseSpline {
    spline: CubicSpline,
    frame_count: u32,
}

impl PoseSpline {
    /// Fits the six position/target channels of `keyframes`.
    ///
    /// Keyframes at or beyond `frame_count` are ignored. Returns `None` when
    /// fewer than two keyframes remain.
    pub fn build(keyframes: &[Keyframe], frame_count: u32, tension: f64) -> Option<Self> {
        let mut ordered: Vec<&Keyframe> = keyframes.iter().filter(|k| k.frame < frame_count).collect();
        ordered.sort_by_key(|k| k.frame);

        let times: Vec<f64> = ordered.iter().map(|k| f64::from(k.frame)).collect();
        let mut points = Vec::with_capacity(ordered.len() * 6);
        for keyframe in &ordered {
            points.extend_from_slice(&keyframe.position.to_array());
            points.extend_from_slice(&keyframe.target.to_array());
        }

        let spline = CubicSpline::from_points_looping(f64::from(frame_count), &times, &points, tension)?;
        Some(Self { spline, frame_count })
    }

    /// Timeline length the spline wraps around.
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Position and target at `time` (in frames).
    pub fn evaluate(&self, time: f64) -> (DVec3, DVec3) {
        let mut result = [0.0; 6];
        self.spline.evaluate_into(time, &mut result);
        (
            DVec3::new(result[0], result[1], result[2]),
            DVec3::new(result[3], result[4], result[5]),
        )
    }
}
