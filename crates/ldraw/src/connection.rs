use glam::DVec3;

use crate::catalog::ConnectionTypeId;
use crate::ids::{CommandId, ConnectionId, IdAllocator};
use crate::transform::Transform;

/// Coordinates closer than this on every axis are the same point.
pub const DUPLICATE_EPSILON: f64 = 1e-3;

/// Tube stud type name; declared points of this type are always checked for
/// duplicates since overlapping tubes are common in hand written files.
pub const TUBE_STUD: &str = "R_STUD";

#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    pub duplicate_epsilon: f64,
    /// Connection type names whose declared points are always deduplicated.
    pub always_checked_types: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            duplicate_epsilon: DUPLICATE_EPSILON,
            always_checked_types: vec![TUBE_STUD.to_string()],
        }
    }
}

/// Connection geometry in the local space of the part that declares it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalConnection {
    pub kind: ConnectionTypeId,
    /// Base point.
    pub p1: DVec3,
    /// Orientation point; for rails the far end of the segment.
    pub p2: DVec3,
}

impl LocalConnection {
    pub fn transformed(&self, t: &Transform) -> LocalConnection {
        LocalConnection {
            kind: self.kind,
            p1: t.apply_point(self.p1),
            p2: t.apply_point(self.p2),
        }
    }

    /// Same type and both points within `epsilon` on every axis.
    pub fn is_duplicate_of(&self, other: &LocalConnection, epsilon: f64) -> bool {
        self.kind == other.kind
            && (self.p1 - other.p1).abs().max_element() < epsilon
            && (self.p2 - other.p2).abs().max_element() < epsilon
    }

    /// Appends to `list` unless `check` is set and an equivalent point is
    /// already there.
    pub fn push_into(self, list: &mut Vec<LocalConnection>, check: bool, epsilon: f64) -> bool {
        if check && list.iter().any(|c| self.is_duplicate_of(c, epsilon)) {
            return false;
        }
        list.push(self);
        true
    }
}

/// A connection point of one placed part, in the space of the model that
/// places it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionPoint {
    pub id: ConnectionId,
    /// The reference command this point was computed for.
    pub owner: CommandId,
    pub kind: ConnectionTypeId,
    pub p1: DVec3,
    pub p2: DVec3,
    /// Offset from `p1` back to the placement origin, rotated with the part
    /// but never translated.
    pub delta: DVec3,
}

impl ConnectionPoint {
    /// Places a local connection with the owner's transform.
    pub fn place(
        local: &LocalConnection,
        owner: CommandId,
        transform: &Transform,
        ids: &IdAllocator,
    ) -> Self {
        Self {
            id: ids.connection_id(),
            owner,
            kind: local.kind,
            p1: transform.apply_point(local.p1),
            p2: transform.apply_point(local.p2),
            delta: transform.apply_normal(-local.p1),
        }
    }

    /// Moves the point with its part; `delta` turns with the linear part
    /// of `t` only.
    pub fn transformed(&self, t: &Transform, ids: &IdAllocator) -> Self {
        Self {
            id: ids.connection_id(),
            owner: self.owner,
            kind: self.kind,
            p1: t.apply_point(self.p1),
            p2: t.apply_point(self.p2),
            delta: t.apply_normal(self.delta),
        }
    }

    /// Direction from `p1` towards `p2`, zero for degenerate points.
    pub fn direction(&self) -> DVec3 {
        (self.p2 - self.p1).normalize_or_zero()
    }

    /// Placement origin this point was computed from.
    pub fn origin(&self) -> DVec3 {
        self.p1 + self.delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::catalog;

    fn local(kind: ConnectionTypeId, p1: DVec3, p2: DVec3) -> LocalConnection {
        LocalConnection { kind, p1, p2 }
    }

    #[test]
    fn duplicates_need_same_type() {
        let c = catalog();
        let stud = c.by_name("STUD").unwrap().id;
        let axle = c.by_name("AXLE").unwrap().id;
        let a = local(stud, DVec3::ZERO, DVec3::NEG_Y);
        let close = local(stud, DVec3::splat(0.0005), DVec3::NEG_Y);
        let other_type = local(axle, DVec3::ZERO, DVec3::NEG_Y);
        let far = local(stud, DVec3::new(0.002, 0.0, 0.0), DVec3::NEG_Y);

        let mut list = Vec::new();
        assert!(a.push_into(&mut list, true, DUPLICATE_EPSILON));
        assert!(!close.push_into(&mut list, true, DUPLICATE_EPSILON));
        assert!(other_type.push_into(&mut list, true, DUPLICATE_EPSILON));
        assert!(far.push_into(&mut list, true, DUPLICATE_EPSILON));
        assert!(close.push_into(&mut list, false, DUPLICATE_EPSILON));
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn placement_recomputes_delta() {
        let c = catalog();
        let stud = c.by_name("STUD").unwrap().id;
        let ids = IdAllocator::new();
        let owner = ids.command_id();
        // 90 degrees around Y, then moved
        let t = Transform::from_ldraw([
            100.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, -1.0, 0.0, 0.0,
        ]);
        let lp = local(stud, DVec3::new(10.0, 0.0, 0.0), DVec3::new(10.0, -4.0, 0.0));
        let cp = ConnectionPoint::place(&lp, owner, &t, &ids);

        assert_eq!(cp.owner, owner);
        assert!((cp.p1 - DVec3::new(100.0, 0.0, -10.0)).length() < 1e-9);
        assert!((cp.delta - DVec3::new(0.0, 0.0, 10.0)).length() < 1e-9);
        assert!((cp.origin() - t.translation()).length() < 1e-9);
        assert!((cp.direction() - DVec3::NEG_Y).length() < 1e-9);

        let moved = cp.transformed(&Transform::from_translation(DVec3::Y), &ids);
        assert_ne!(moved.id, cp.id);
        assert_eq!(moved.delta, cp.delta);
    }
}
