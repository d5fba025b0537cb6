use super::body::Body;
use super::{tiles, PhysicsEngine, CONTACT_EPSILON, OVERLAP_EPSILON};
use crate::interpreter::{CollisionParty, TileHit};
use glam::DVec2;

fn party(body: &Body) -> CollisionParty {
    CollisionParty {
        uid: body.uid.clone(),
        actor_type: body.actor_type.clone(),
    }
}

impl PhysicsEngine {
    /// Pairs whose boxes strictly overlap, regardless of mask. Ordered by
    /// body (actor list) order.
    pub fn overlaps(&self) -> Vec<(CollisionParty, CollisionParty)> {
        self.pairs(|a, b| {
            let o = a.overlap(b);
            o.x > OVERLAP_EPSILON && o.y > OVERLAP_EPSILON
        })
    }

    /// Mutually blocking pairs touching along an edge. Direct parent/child
    /// pairs never block each other and are excluded.
    pub fn contacts(&self) -> Vec<(CollisionParty, CollisionParty)> {
        self.pairs(|a, b| {
            if !a.masks_block(b) || a.parent.as_deref() == Some(b.uid.as_str()) || b.parent.as_deref() == Some(a.uid.as_str()) {
                return false;
            }
            let o = a.overlap(b);
            o.x >= -CONTACT_EPSILON && o.y >= -CONTACT_EPSILON && (o.x > CONTACT_EPSILON || o.y > CONTACT_EPSILON)
        })
    }

    /// Every masked tile under each solid body's footprint, inflated by the
    /// contact epsilon
    pub fn tile_overlaps(&self) -> Vec<(CollisionParty, TileHit)> {
        let Some(map) = &self.map else {
            return Vec::new();
        };
        let pad = DVec2::splat(CONTACT_EPSILON);
        self.bodies
            .iter()
            .filter(|b| b.is_solid())
            .flat_map(|b| {
                tiles::masked_tiles(map, b.min() - pad, b.max() + pad)
                    .into_iter()
                    .map(move |hit| (party(b), hit))
            })
            .collect()
    }

    fn pairs<F>(&self, test: F) -> Vec<(CollisionParty, CollisionParty)>
    where
        F: Fn(&Body, &Body) -> bool,
    {
        let mut out = Vec::new();
        for (i, a) in self.bodies.iter().enumerate() {
            if !a.is_solid() {
                continue;
            }
            for b in self.bodies[i + 1..].iter().filter(|b| b.is_solid()) {
                if test(a, b) {
                    out.push((party(a), party(b)));
                }
            }
        }
        out
    }
}
