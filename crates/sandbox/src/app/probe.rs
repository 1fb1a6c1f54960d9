use std::rc::Rc;

use interaction::{DirectionalProbe, EntityId, ProbeHit, ProbeQuery, Vec2};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Collider {
    pub(crate) entity: EntityId,
    pub(crate) center: Vec2,
    pub(crate) radius: f32,
    pub(crate) interactive: bool,
}

/// Ray cast from the owner along its facing against circular colliders.
///
/// Colliders answer on every probe channel.
pub(crate) struct RayProbe {
    owner: EntityId,
    colliders: Rc<[Collider]>,
}

impl RayProbe {
    pub(crate) fn new(owner: EntityId, colliders: Rc<[Collider]>) -> Self {
        Self { owner, colliders }
    }
}

impl DirectionalProbe for RayProbe {
    fn probe(&self, query: &ProbeQuery) -> Vec<ProbeHit> {
        let origin = query.origin.position;
        let direction = query.origin.facing();

        let mut hits = self
            .colliders
            .iter()
            .filter(|collider| collider.entity != self.owner)
            .filter_map(|collider| {
                let distance = ray_circle_distance(origin, direction, collider)?;
                if distance > query.range {
                    return None;
                }
                Some(if collider.interactive {
                    ProbeHit::interactive(collider.entity, distance)
                } else {
                    ProbeHit::obstruction(collider.entity, distance)
                })
            })
            .collect::<Vec<_>>();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }
}

/// Distance along a unit `direction` to the first contact with `collider`.
/// An origin inside the circle reports a contact at zero.
fn ray_circle_distance(origin: Vec2, direction: Vec2, collider: &Collider) -> Option<f32> {
    let offset = Vec2::new(origin.x - collider.center.x, origin.y - collider.center.y);
    let b = offset.dot(direction);
    let c = offset.dot(offset) - collider.radius * collider.radius;
    if c <= 0.0 {
        return Some(0.0);
    }
    if b > 0.0 {
        return None;
    }
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    Some(-b - discriminant.sqrt())
}

#[cfg(test)]
mod tests {
    use interaction::{ProbeChannel, Transform};

    use super::*;

    fn collider(id: u64, x: f32, y: f32, interactive: bool) -> Collider {
        Collider {
            entity: EntityId(id),
            center: Vec2::new(x, y),
            radius: 0.5,
            interactive,
        }
    }

    fn query_from(position: Vec2, degrees: f32, range: f32) -> ProbeQuery {
        ProbeQuery {
            origin: Transform {
                position,
                rotation_radians: Some(degrees.to_radians()),
            },
            range,
            channel: ProbeChannel::Visibility,
        }
    }

    fn probe_with(colliders: Vec<Collider>) -> RayProbe {
        RayProbe::new(EntityId(0), Rc::from(colliders))
    }

    #[test]
    fn hits_come_back_nearest_first() {
        let probe = probe_with(vec![
            collider(1, 6.0, 0.0, true),
            collider(2, 3.0, 0.0, false),
        ]);
        let hits = probe.probe(&query_from(Vec2::ZERO, 0.0, 100.0));

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0], ProbeHit::obstruction(EntityId(2), 2.5));
        assert_eq!(hits[1], ProbeHit::interactive(EntityId(1), 5.5));
    }

    #[test]
    fn colliders_behind_or_beside_the_ray_are_missed() {
        let probe = probe_with(vec![
            collider(1, -3.0, 0.0, true),
            collider(2, 3.0, 2.0, true),
        ]);
        assert!(probe.probe(&query_from(Vec2::ZERO, 0.0, 100.0)).is_empty());
    }

    #[test]
    fn range_limits_hits() {
        let probe = probe_with(vec![collider(1, 10.0, 0.0, true)]);
        assert!(probe.probe(&query_from(Vec2::ZERO, 0.0, 5.0)).is_empty());
        assert_eq!(probe.probe(&query_from(Vec2::ZERO, 0.0, 10.0)).len(), 1);
    }

    #[test]
    fn owner_collider_is_skipped_and_inside_hits_at_zero() {
        let probe = probe_with(vec![
            collider(0, 0.0, 0.0, false),
            collider(4, 0.2, 0.0, true),
        ]);
        let hits = probe.probe(&query_from(Vec2::ZERO, 90.0, 100.0));
        assert_eq!(hits, vec![ProbeHit::interactive(EntityId(4), 0.0)]);
    }

    #[test]
    fn facing_turns_the_ray() {
        let probe = probe_with(vec![collider(7, 0.0, 4.0, true)]);
        assert!(probe.probe(&query_from(Vec2::ZERO, 0.0, 100.0)).is_empty());

        let hits = probe.probe(&query_from(Vec2::ZERO, 90.0, 100.0));
        assert_eq!(hits.len(), 1);
        assert!((hits[0].distance - 3.5).abs() < 1e-4);
    }
}
