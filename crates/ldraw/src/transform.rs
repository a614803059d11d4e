use glam::{DAffine3, DMat3, DVec3};

/// Affine placement of a part: a 3x3 linear part plus a translation.
///
/// LDraw writes the matrix row-major as `a b c / d e f / g h i` followed by the
/// translation `x y z`; a point `p` maps to `M * p + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform(DAffine3);

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform(DAffine3::IDENTITY);

    /// Build from the twelve numbers of a type 1 line, in file order
    /// (`x y z a b c d e f g h i`).
    pub fn from_ldraw(v: [f64; 12]) -> Self {
        let [x, y, z, a, b, c, d, e, f, g, h, i] = v;
        let linear = DMat3::from_cols(
            DVec3::new(a, d, g),
            DVec3::new(b, e, h),
            DVec3::new(c, f, i),
        );
        Transform(DAffine3::from_mat3_translation(linear, DVec3::new(x, y, z)))
    }

    pub fn from_translation(t: DVec3) -> Self {
        Transform(DAffine3::from_translation(t))
    }

    pub fn from_affine(affine: DAffine3) -> Self {
        Transform(affine)
    }

    /// The twelve coefficients in LDraw file order, inverse of [`Transform::from_ldraw`].
    pub fn to_ldraw(&self) -> [f64; 12] {
        let t = self.translation();
        let m = self.matrix();
        let (r0, r1, r2) = (m.row(0), m.row(1), m.row(2));
        [
            t.x, t.y, t.z, r0.x, r0.y, r0.z, r1.x, r1.y, r1.z, r2.x, r2.y, r2.z,
        ]
    }

    /// Transform equivalent to applying `child` first and then `self`.
    pub fn compose(&self, child: &Transform) -> Transform {
        Transform(self.0 * child.0)
    }

    pub fn apply_point(&self, p: DVec3) -> DVec3 {
        self.0.transform_point3(p)
    }

    /// Applies the linear part only, for directions and offsets.
    pub fn apply_normal(&self, v: DVec3) -> DVec3 {
        self.0.transform_vector3(v)
    }

    pub fn translation(&self) -> DVec3 {
        self.0.translation
    }

    pub fn matrix(&self) -> DMat3 {
        self.0.matrix3
    }

    pub fn affine(&self) -> DAffine3 {
        self.0
    }

    pub fn determinant(&self) -> f64 {
        self.0.matrix3.determinant()
    }

    pub fn is_identity(&self) -> bool {
        self.0 == DAffine3::IDENTITY
    }
}
