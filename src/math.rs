use nalgebra::{Matrix3, Matrix4, Point3, Quaternion, Rotation3, Translation3, UnitQuaternion, Vector3};

/// Norm below which vectors and quaternions are treated as degenerate.
pub const EPSILON: f32 = 1e-6;

/// A `(position, rotation, scale)` triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn new(
        translation: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
        scale: Vector3<f32>,
    ) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn from_translation(translation: Vector3<f32>) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    pub fn from_rotation(rotation: UnitQuaternion<f32>) -> Self {
        Self {
            rotation,
            ..Self::identity()
        }
    }

    /// Homogeneous matrix `T * R * S`.
    pub fn to_matrix(&self) -> Matrix4<f32> {
        let translation_matrix = Translation3::from(self.translation).to_homogeneous();
        let rotation_matrix = self.rotation.to_homogeneous();
        let scale_matrix = Matrix4::new_nonuniform_scaling(&self.scale);
        translation_matrix * rotation_matrix * scale_matrix
    }

    /// Decomposes an affine matrix into TRS. A reflection is folded into a
    /// negative X scale.
    pub fn from_matrix(matrix: &Matrix4<f32>) -> Self {
        let translation = Vector3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);

        let basis_x = Vector3::new(matrix[(0, 0)], matrix[(1, 0)], matrix[(2, 0)]);
        let basis_y = Vector3::new(matrix[(0, 1)], matrix[(1, 1)], matrix[(2, 1)]);
        let basis_z = Vector3::new(matrix[(0, 2)], matrix[(1, 2)], matrix[(2, 2)]);

        let mut scale_x = basis_x.norm();
        let scale_y = basis_y.norm();
        let scale_z = basis_z.norm();

        let mut rot_x = if scale_x > 1e-8 {
            basis_x / scale_x
        } else {
            Vector3::x()
        };
        let rot_y = if scale_y > 1e-8 {
            basis_y / scale_y
        } else {
            Vector3::y()
        };
        let rot_z = if scale_z > 1e-8 {
            basis_z / scale_z
        } else {
            Vector3::z()
        };

        if rot_x.cross(&rot_y).dot(&rot_z) < 0.0 {
            scale_x = -scale_x;
            rot_x = -rot_x;
        }

        let rotation_matrix = Matrix3::from_columns(&[rot_x, rot_y, rot_z]);
        let rotation =
            UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation_matrix));

        Self {
            translation,
            rotation,
            scale: Vector3::new(scale_x, scale_y, scale_z),
        }
    }

    /// Inverse transform, or `None` when the scale is singular.
    pub fn try_inverse(&self) -> Option<Self> {
        self.to_matrix()
            .try_inverse()
            .map(|inverse| Self::from_matrix(&inverse))
    }

    pub fn transform_point(&self, point: &Vector3<f32>) -> Vector3<f32> {
        self.to_matrix()
            .transform_point(&Point3::from(*point))
            .coords
    }

    pub fn is_identity(&self, tolerance: f32) -> bool {
        self.translation.norm() <= tolerance
            && self.rotation.angle() <= tolerance
            && (self.scale - Vector3::new(1.0, 1.0, 1.0)).norm() <= tolerance
    }

    pub fn is_finite(&self) -> bool {
        self.translation.iter().all(|value| value.is_finite())
            && self.rotation.coords.iter().all(|value| value.is_finite())
            && self.scale.iter().all(|value| value.is_finite())
    }
}

/// Translation column of a homogeneous matrix.
pub fn matrix_translation(matrix: &Matrix4<f32>) -> Vector3<f32> {
    Vector3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)])
}

/// Computes world matrices with a single forward sweep. Parents must precede
/// their children.
pub fn compute_world_matrices(
    local_matrices: &[Matrix4<f32>],
    parents: &[Option<usize>],
) -> Vec<Matrix4<f32>> {
    let mut worlds: Vec<Matrix4<f32>> = Vec::with_capacity(local_matrices.len());
    for (index, local) in local_matrices.iter().enumerate() {
        let world = match parents.get(index).copied().flatten() {
            Some(parent) if parent < index => worlds[parent] * local,
            _ => *local,
        };
        worlds.push(world);
    }
    worlds
}

/// Reads an `(x, y, z, w)` quaternion from a flat slice.
pub fn quaternion_from_xyzw(values: &[f32]) -> Quaternion<f32> {
    Quaternion::new(values[3], values[0], values[1], values[2])
}

/// Writes a quaternion as `(x, y, z, w)`.
pub fn quaternion_to_xyzw(q: &Quaternion<f32>) -> [f32; 4] {
    [q.i, q.j, q.k, q.w]
}

/// Normalizes a raw quaternion, returning `None` when it is non-finite or its
/// norm is below [`EPSILON`].
pub fn normalize_quaternion(q: Quaternion<f32>) -> Option<UnitQuaternion<f32>> {
    if !q.coords.iter().all(|value| value.is_finite()) {
        return None;
    }
    let norm = q.norm();
    if norm < EPSILON {
        return None;
    }
    Some(UnitQuaternion::new_unchecked(q / norm))
}

/// Flips `q` onto the hemisphere of `previous` so interpolation takes the
/// short path.
pub fn align_hemisphere(previous: &Quaternion<f32>, q: Quaternion<f32>) -> Quaternion<f32> {
    if previous.coords.dot(&q.coords) < 0.0 {
        -q
    } else {
        q
    }
}

/// Why a rotation between two directions could not be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegenerateRotation {
    ZeroLength,
    Opposed,
}

/// Shortest rotation taking direction `from` onto direction `to`.
///
/// Parallel inputs yield the identity. Zero-length or opposed inputs have no
/// unique answer and are reported instead.
pub fn rotation_between(
    from: &Vector3<f32>,
    to: &Vector3<f32>,
) -> Result<UnitQuaternion<f32>, DegenerateRotation> {
    let from_len = from.norm();
    let to_len = to.norm();
    if from_len < EPSILON || to_len < EPSILON {
        return Err(DegenerateRotation::ZeroLength);
    }
    let a = from / from_len;
    let b = to / to_len;
    let cross = a.cross(&b);
    if cross.norm() < EPSILON {
        return if a.dot(&b) > 0.0 {
            Ok(UnitQuaternion::identity())
        } else {
            Err(DegenerateRotation::Opposed)
        };
    }
    UnitQuaternion::rotation_between(&a, &b).ok_or(DegenerateRotation::Opposed)
}

/// Largest absolute component difference between two quaternions, treating
/// `q` and `-q` as equal.
pub fn quaternion_distance(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>) -> f32 {
    let direct = (a.coords - b.coords).amax();
    let flipped = (a.coords + b.coords).amax();
    direct.min(flipped)
}
