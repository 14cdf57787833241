//! Teleport facets: the particle reappears on a destination facet with the
//! same local position and the same angles relative to the facet frames.

use std::sync::Arc;

use super::source::{facet_center_uv, MAX_POINT_TRIES};
use super::{Contact, Simulation, StepOutcome};
use crate::results::HitType;

impl Simulation {
    /// Move the particle to the destination of teleport facet `c.facet`.
    ///
    /// Without a valid destination the hit counts as a reflection point and
    /// the particle flies on unchanged.
    pub(super) fn perform_teleport(&mut self, c: &Contact) -> StepOutcome {
        let model = Arc::clone(&self.model);
        let src = model.facet(c.facet);
        let dest_id = match src.props.teleport_dest {
            -1 => self.particle.teleported_from,
            d if d > 0 => Some(d as usize - 1),
            _ => None,
        };
        let Some(dest_id) = dest_id.filter(|&d| d < model.geometry.facet_count()) else {
            // nowhere to go back to: plain reflection point
            self.record_hit(HitType::Ref);
            self.particle.last_hit = Some(c.facet);
            return StepOutcome::Bounced;
        };
        let dest = model.facet(dest_id);
        if let Some(s) = dest.props.structure {
            self.particle.structure = s;
        }
        self.particle.teleported_from = Some(c.facet);

        self.record_hit(HitType::TeleportSource);
        if src.props.texture.count_transparent {
            self.record_texture(c, true, 2.0, 2.0);
        }
        if src.props.texture.count_direction {
            self.record_direction(c);
        }
        self.record_profile(c, true, 2.0, 2.0);
        self.log_hit(c, HitType::TeleportSource);
        self.record_angle_map(c.facet);

        let (theta, phi) = src.frame.cartesian_to_polar(self.particle.direction);
        self.particle.direction = dest.frame.polar_to_cartesian(theta, phi, false);
        self.particle.position = dest.frame.point_at(c.u, c.v);
        self.record_hit(HitType::TeleportDest);

        if !dest.contains(c.u, c.v) {
            // the source shape sticks out of the destination
            self.record_hit(HitType::Abs);
            let landed = (0..MAX_POINT_TRIES)
                .map(|_| (self.rnd(), self.rnd()))
                .find(|&(u, v)| dest.contains(u, v));
            let (u, v) = match landed {
                Some(uv) => uv,
                None => facet_center_uv(dest),
            };
            self.particle.position = dest.frame.point_at(u, v);
            self.record_hit(HitType::Des);
        }
        self.particle.last_hit = Some(dest_id);

        let ort = self.particle.ort_velocity(src.frame.n);
        let k = self.speed_factor();
        self.increase_facet_counter(c.facet, c.time, 1, 0, 0, 2.0 / ort, 2.0 * k * ort);
        StepOutcome::Teleported
    }
}
