//! Scene node transform operations.

use vecmath::{col_mat4_mul, mat4_id, vec3_cross, vec3_normalized, vec3_sub, Matrix4, Vector3};

use crate::animated::{matrix_qualifiers, SlotKey, ValueSlots, ANGLE_AXIS, XYZ};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransformKind {
    /// `x y z`
    Translate,
    /// `axis_x axis_y axis_z angle_degrees`
    Rotate,
    /// `x y z`
    Scale,
    /// 16 values, row-major as written in the file.
    Matrix,
    /// `eye target up`, 9 values.
    LookAt,
    /// `angle_degrees rotation_axis translation_axis`, 7 values.
    Skew,
}

impl TransformKind {
    pub fn element_name(self) -> &'static str {
        match self {
            TransformKind::Translate => "translate",
            TransformKind::Rotate => "rotate",
            TransformKind::Scale => "scale",
            TransformKind::Matrix => "matrix",
            TransformKind::LookAt => "lookat",
            TransformKind::Skew => "skew",
        }
    }

    pub fn from_element_name(name: &str) -> Option<TransformKind> {
        match name {
            "translate" => Some(TransformKind::Translate),
            "rotate" => Some(TransformKind::Rotate),
            "scale" => Some(TransformKind::Scale),
            "matrix" => Some(TransformKind::Matrix),
            "lookat" => Some(TransformKind::LookAt),
            "skew" => Some(TransformKind::Skew),
            _ => None,
        }
    }

    pub fn value_count(self) -> usize {
        match self {
            TransformKind::Translate | TransformKind::Scale => 3,
            TransformKind::Rotate => 4,
            TransformKind::Matrix => 16,
            TransformKind::LookAt => 9,
            TransformKind::Skew => 7,
        }
    }

    /// Values of the identity operation of this kind.
    pub fn identity_values(self) -> Vec<f32> {
        match self {
            TransformKind::Translate => vec![0.0; 3],
            TransformKind::Scale => vec![1.0; 3],
            TransformKind::Rotate => vec![0.0, 0.0, 1.0, 0.0],
            TransformKind::Matrix => {
                let mut v = vec![0.0; 16];
                for i in 0..4 {
                    v[i * 5] = 1.0;
                }
                v
            }
            TransformKind::LookAt => vec![0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0],
            TransformKind::Skew => vec![0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        }
    }

    pub(crate) fn qualifiers(self) -> Vec<String> {
        let names: &[&str] = match self {
            TransformKind::Translate | TransformKind::Scale => XYZ,
            TransformKind::Rotate => ANGLE_AXIS,
            TransformKind::Matrix => return matrix_qualifiers(),
            TransformKind::LookAt | TransformKind::Skew => &[],
        };
        names.iter().map(|s| s.to_string()).collect()
    }
}

/// One entry of a node's ordered transform stack. Its values live in the
/// document's value slots so that animations can drive them.
#[derive(Clone, Debug)]
pub struct Transform {
    pub(crate) kind: TransformKind,
    pub(crate) sid: Option<String>,
    pub(crate) slots: Vec<SlotKey>,
}

impl Transform {
    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    pub fn slots(&self) -> &[SlotKey] {
        &self.slots
    }

    /// Sid used as the animation address. Falls back on the element name.
    pub fn animation_sid(&self) -> &str {
        self.sid.as_deref().unwrap_or_else(|| self.kind.element_name())
    }

    pub fn values(&self, slots: &ValueSlots) -> Vec<f32> {
        slots.read(&self.slots)
    }

    pub fn to_matrix(&self, slots: &ValueSlots) -> Matrix4<f32> {
        let v = self.values(slots);
        if v.len() != self.kind.value_count() {
            return mat4_id();
        }
        match self.kind {
            TransformKind::Translate => {
                let mut m = mat4_id();
                m[3] = [v[0], v[1], v[2], 1.0];
                m
            }
            TransformKind::Scale => {
                let mut m = mat4_id();
                m[0][0] = v[0];
                m[1][1] = v[1];
                m[2][2] = v[2];
                m
            }
            TransformKind::Rotate => rotation_matrix([v[0], v[1], v[2]], v[3]),
            TransformKind::Matrix => {
                let mut m = [[0.0; 4]; 4];
                for row in 0..4 {
                    for col in 0..4 {
                        m[col][row] = v[row * 4 + col];
                    }
                }
                m
            }
            TransformKind::LookAt => look_at_matrix(
                [v[0], v[1], v[2]],
                [v[3], v[4], v[5]],
                [v[6], v[7], v[8]],
            ),
            TransformKind::Skew => {
                let s = v[0].to_radians().tan();
                let r = [v[1], v[2], v[3]];
                let t = [v[4], v[5], v[6]];
                let mut m = mat4_id();
                for col in 0..3 {
                    for row in 0..3 {
                        m[col][row] += s * t[row] * r[col];
                    }
                }
                m
            }
        }
    }
}

/// Compose a transform stack, first entry outermost.
pub fn compose(transforms: &[Transform], slots: &ValueSlots) -> Matrix4<f32> {
    transforms
        .iter()
        .fold(mat4_id(), |acc, t| col_mat4_mul(acc, t.to_matrix(slots)))
}

fn rotation_matrix(axis: Vector3<f32>, degrees: f32) -> Matrix4<f32> {
    let length_sq = axis[0] * axis[0] + axis[1] * axis[1] + axis[2] * axis[2];
    if length_sq <= f32::EPSILON {
        return mat4_id();
    }
    let (w, [x, y, z]) = quaternion::axis_angle(vec3_normalized(axis), degrees.to_radians());
    [
        [1.0 - 2.0 * (y * y + z * z), 2.0 * (x * y + w * z), 2.0 * (x * z - w * y), 0.0],
        [2.0 * (x * y - w * z), 1.0 - 2.0 * (x * x + z * z), 2.0 * (y * z + w * x), 0.0],
        [2.0 * (x * z + w * y), 2.0 * (y * z - w * x), 1.0 - 2.0 * (x * x + y * y), 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// Placement of a viewer at `eye` looking at `target`.
fn look_at_matrix(eye: Vector3<f32>, target: Vector3<f32>, up: Vector3<f32>) -> Matrix4<f32> {
    let forward = vec3_sub(target, eye);
    let side = vec3_cross(forward, up);
    let degenerate = |v: Vector3<f32>| v.iter().all(|c| c.abs() <= f32::EPSILON);
    if degenerate(forward) || degenerate(side) {
        let mut m = mat4_id();
        m[3] = [eye[0], eye[1], eye[2], 1.0];
        return m;
    }
    let f = vec3_normalized(forward);
    let s = vec3_normalized(side);
    let u = vec3_cross(s, f);
    [
        [s[0], s[1], s[2], 0.0],
        [u[0], u[1], u[2], 0.0],
        [-f[0], -f[1], -f[2], 0.0],
        [eye[0], eye[1], eye[2], 1.0],
    ]
}
