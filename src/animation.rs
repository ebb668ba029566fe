//! Animation curves, animation entities and animation clips.

use slotmap::new_key_type;

use crate::tracking::InstanceKey;

new_key_type! {
    /// Handle to an `AnimationCurve` stored in its document.
    pub struct CurveId;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Interpolation {
    Step,
    Linear,
    Bezier,
}

impl Interpolation {
    pub fn from_name(name: &str) -> Interpolation {
        match name {
            "STEP" => Interpolation::Step,
            "BEZIER" => Interpolation::Bezier,
            _ => Interpolation::Linear,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Interpolation::Step => "STEP",
            Interpolation::Linear => "LINEAR",
            Interpolation::Bezier => "BEZIER",
        }
    }
}

/// One key of a curve. Bezier keys carry their tangent handles as
/// `[time, value]` pairs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keyframe {
    pub input: f32,
    pub output: f32,
    pub interpolation: Interpolation,
    pub in_tangent: Option<[f32; 2]>,
    pub out_tangent: Option<[f32; 2]>,
}

impl Keyframe {
    pub fn new(input: f32, output: f32, interpolation: Interpolation) -> Keyframe {
        Keyframe {
            input,
            output,
            interpolation,
            in_tangent: None,
            out_tangent: None,
        }
    }
}

/// A scalar function of time, sampled from keys sorted by input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimationCurve {
    keys: Vec<Keyframe>,
}

impl AnimationCurve {
    pub fn new(mut keys: Vec<Keyframe>) -> AnimationCurve {
        keys.sort_by(|a, b| a.input.partial_cmp(&b.input).unwrap_or(std::cmp::Ordering::Equal));
        AnimationCurve { keys }
    }

    pub fn keys(&self) -> &[Keyframe] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Time span covered by the keys.
    pub fn extent(&self) -> Option<(f32, f32)> {
        match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => Some((first.input, last.input)),
            _ => None,
        }
    }

    /// Sample the curve at `time`. Outside the keyed range the curve holds
    /// its first or last value.
    pub fn evaluate(&self, time: f32) -> f32 {
        let (first, last) = match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return 0.0,
        };
        if time <= first.input {
            return first.output;
        }
        if time >= last.input {
            return last.output;
        }
        let next = self.keys.iter().position(|k| k.input > time).unwrap_or(self.keys.len() - 1);
        let a = &self.keys[next - 1];
        let b = &self.keys[next];
        let span = b.input - a.input;
        if span <= 0.0 {
            return b.output;
        }
        let s = (time - a.input) / span;
        match a.interpolation {
            Interpolation::Step => a.output,
            Interpolation::Linear => a.output + (b.output - a.output) * s,
            Interpolation::Bezier => {
                let p0 = a.output;
                let p3 = b.output;
                let p1 = a.out_tangent.map_or(p0 + (p3 - p0) / 3.0, |t| t[1]);
                let p2 = b.in_tangent.map_or(p3 - (p3 - p0) / 3.0, |t| t[1]);
                let u = 1.0 - s;
                u * u * u * p0 + 3.0 * u * u * s * p1 + 3.0 * u * s * s * p2 + s * s * s * p3
            }
        }
    }
}

/// A target string and the curves that drive it.
#[derive(Clone, Debug, Default)]
pub struct AnimationChannel {
    pub target: String,
    pub curves: Vec<CurveId>,
}

/// The `<animation>` entity. Nested animations are flattened into the
/// channel list on load.
#[derive(Clone, Debug, Default)]
pub struct Animation {
    pub channels: Vec<AnimationChannel>,
}

impl Animation {
    pub fn curves(&self) -> impl Iterator<Item = CurveId> + '_ {
        self.channels.iter().flat_map(|c| c.curves.iter().copied())
    }
}

/// The `<animation_clip>` entity: a time range over instanced animations.
#[derive(Clone, Debug, Default)]
pub struct AnimationClip {
    pub start: f32,
    pub end: f32,
    pub(crate) animations: Vec<InstanceKey>,
}

impl AnimationClip {
    pub fn animations(&self) -> &[InstanceKey] {
        &self.animations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(keys: &[(f32, f32)]) -> AnimationCurve {
        AnimationCurve::new(
            keys.iter()
                .map(|&(i, o)| Keyframe::new(i, o, Interpolation::Linear))
                .collect(),
        )
    }

    #[test]
    fn test_linear_evaluation() {
        let curve = linear(&[(1.0, 10.0), (0.0, 0.0), (2.0, 0.0)]);
        assert_eq!(curve.evaluate(-1.0), 0.0);
        assert_eq!(curve.evaluate(0.5), 5.0);
        assert_eq!(curve.evaluate(1.5), 5.0);
        assert_eq!(curve.evaluate(3.0), 0.0);
        assert_eq!(curve.extent(), Some((0.0, 2.0)));
    }

    #[test]
    fn test_step_evaluation() {
        let curve = AnimationCurve::new(vec![
            Keyframe::new(0.0, 1.0, Interpolation::Step),
            Keyframe::new(1.0, 2.0, Interpolation::Step),
        ]);
        assert_eq!(curve.evaluate(0.99), 1.0);
        assert_eq!(curve.evaluate(1.0), 2.0);
    }

    #[test]
    fn test_bezier_endpoints() {
        let curve = AnimationCurve::new(vec![
            Keyframe::new(0.0, 0.0, Interpolation::Bezier),
            Keyframe::new(1.0, 3.0, Interpolation::Bezier),
        ]);
        // Default handles sit on the straight line, so the midpoint is linear.
        assert!((curve.evaluate(0.5) - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_empty_curve() {
        let curve = AnimationCurve::default();
        assert!(curve.is_empty());
        assert_eq!(curve.evaluate(1.0), 0.0);
        assert_eq!(Interpolation::from_name("STEP").name(), "STEP");
    }
}
