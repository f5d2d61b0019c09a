//! Combat resolution for locally fired projectiles
//!
//! Only the client that fired a projectile decides whether it hit anything.
//! Each simulation tick moves every live projectile along its heading and
//! checks it against all known planes. The first plane inside the hitbox takes
//! the damage and consumes the projectile. Planes are walked in the order they
//! were given, so when two planes overlap the earlier one wins.

use shared::{
    BulletMessage, HitMessage, Orientation, PlayerId, Position, DAMAGE_PER_FIREPOWER,
    HITBOX_RADIUS,
};

/// Distance covered by a projectile every tick
pub const PROJECTILE_SPEED: f32 = 2.5;
/// Ticks a projectile stays alive without hitting anything
pub const PROJECTILE_LIFE: u32 = 60;
/// How far ahead of the plane's center a projectile appears
pub const NOSE_DISTANCE: f32 = 2.6;

/// Anything a projectile can hit
pub trait Target {
    fn target_id(&self) -> PlayerId;
    fn target_name(&self) -> &str;
    fn position(&self) -> Position;
    fn health(&self) -> i32;
    /// Applies damage and returns the remaining health
    fn take_damage(&mut self, damage: i32) -> i32;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    pub owner_id: PlayerId,
    pub position: Position,
    pub yaw: f32,
    pub pitch: f32,
    pub speed: f32,
    /// Remaining ticks; zero means consumed or expired
    pub life: u32,
    pub damage: i32,
}

impl Projectile {
    pub fn is_alive(&self) -> bool {
        self.life > 0
    }

    fn advance(&mut self) {
        let heading = Orientation {
            yaw: self.yaw,
            pitch: self.pitch,
            roll: 0.0,
        }
        .forward();
        self.position = self.position.offset(heading, self.speed);
    }
}

/// A detected hit, with the victim's name for local feedback
#[derive(Debug, Clone, PartialEq)]
pub struct HitReport {
    pub message: HitMessage,
    pub victim_name: String,
}

/// The local plane's guns and every projectile they have in flight
#[derive(Debug)]
pub struct Gunnery {
    owner_id: PlayerId,
    owner_name: String,
    firepower: i32,
    projectiles: Vec<Projectile>,
    next_event_id: u64,
}

impl Gunnery {
    pub fn new(owner_id: PlayerId, owner_name: impl Into<String>, firepower: i32) -> Self {
        Self {
            owner_id,
            owner_name: owner_name.into(),
            firepower,
            projectiles: Vec::new(),
            next_event_id: 1,
        }
    }

    pub fn damage(&self) -> i32 {
        self.firepower * DAMAGE_PER_FIREPOWER
    }

    /// Spawns a projectile at the nose and returns its announcement
    pub fn fire(&mut self, position: Position, orientation: Orientation) -> BulletMessage {
        let muzzle = position.offset(orientation.forward(), NOSE_DISTANCE);
        self.spawn(muzzle, orientation.yaw, orientation.pitch);
        BulletMessage {
            player_id: self.owner_id,
            x: muzzle.x,
            y: muzzle.y,
            z: muzzle.z,
            yaw: orientation.yaw,
            pitch: orientation.pitch,
        }
    }

    /// Places a projectile exactly at `position`
    pub fn spawn(&mut self, position: Position, yaw: f32, pitch: f32) {
        self.projectiles.push(Projectile {
            owner_id: self.owner_id,
            position,
            yaw,
            pitch,
            speed: PROJECTILE_SPEED,
            life: PROJECTILE_LIFE,
            damage: self.damage(),
        });
    }

    /// Runs one simulation tick: move, resolve hits, then expire
    pub fn tick<T: Target>(&mut self, targets: &mut [T]) -> Vec<HitReport> {
        for projectile in self.projectiles.iter_mut().filter(|p| p.is_alive()) {
            projectile.advance();
        }

        let hits = self.resolve_hits(targets);

        for projectile in &mut self.projectiles {
            projectile.life = projectile.life.saturating_sub(1);
        }
        self.projectiles.retain(Projectile::is_alive);
        hits
    }

    /// Checks every live projectile against `targets` without moving anything.
    ///
    /// A projectile that hits is consumed at once and cannot hit again.
    pub fn resolve_hits<T: Target>(&mut self, targets: &mut [T]) -> Vec<HitReport> {
        let mut hits = Vec::new();

        for projectile in self.projectiles.iter_mut().filter(|p| p.is_alive()) {
            for target in targets.iter_mut() {
                if target.target_id() == projectile.owner_id || target.health() <= 0 {
                    continue;
                }
                if projectile.position.distance_to(&target.position()) >= HITBOX_RADIUS {
                    continue;
                }

                let remaining = target.take_damage(projectile.damage);
                let event_id = self.next_event_id;
                self.next_event_id += 1;
                projectile.life = 0;

                hits.push(HitReport {
                    message: HitMessage {
                        target_id: target.target_id(),
                        damage: projectile.damage,
                        attacker_name: self.owner_name.clone(),
                        attacker_id: Some(self.owner_id),
                        is_kill: remaining <= 0,
                        event_id: Some(event_id),
                    },
                    victim_name: target.target_name().to_string(),
                });
                break;
            }
        }

        self.projectiles.retain(Projectile::is_alive);
        hits
    }

    /// Drops every projectile in flight, used on respawn
    pub fn clear(&mut self) {
        self.projectiles.clear();
    }

    pub fn active(&self) -> &[Projectile] {
        &self.projectiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[derive(Debug)]
    struct Dummy {
        id: PlayerId,
        name: String,
        position: Position,
        health: i32,
    }

    impl Dummy {
        fn at(id: PlayerId, position: Position) -> Self {
            Self {
                id,
                name: format!("Pilot {}", id),
                position,
                health: 100,
            }
        }
    }

    impl Target for Dummy {
        fn target_id(&self) -> PlayerId {
            self.id
        }
        fn target_name(&self) -> &str {
            &self.name
        }
        fn position(&self) -> Position {
            self.position
        }
        fn health(&self) -> i32 {
            self.health
        }
        fn take_damage(&mut self, damage: i32) -> i32 {
            self.health = (self.health - damage).max(0);
            self.health
        }
    }

    #[test]
    fn test_fire_spawns_at_nose() {
        let mut guns = Gunnery::new(1, "Alice", 1);
        let bullet = guns.fire(Position::new(0.0, 10.0, 0.0), Orientation::default());

        assert_eq!(bullet.player_id, 1);
        assert_approx_eq!(bullet.x, 0.0);
        assert_approx_eq!(bullet.y, 10.0);
        assert_approx_eq!(bullet.z, -NOSE_DISTANCE);
        assert_eq!(guns.active().len(), 1);
        assert_eq!(guns.active()[0].life, PROJECTILE_LIFE);
    }

    #[test]
    fn test_projectile_moves_along_heading() {
        let mut guns = Gunnery::new(1, "Alice", 1);
        guns.spawn(Position::default(), 90.0, 0.0);
        let mut nobody: Vec<Dummy> = Vec::new();

        guns.tick(&mut nobody);
        let projectile = &guns.active()[0];
        assert_approx_eq!(projectile.position.x, PROJECTILE_SPEED);
        assert_approx_eq!(projectile.position.z, 0.0, 1e-5);
        assert_eq!(projectile.life, PROJECTILE_LIFE - 1);
    }

    #[test]
    fn test_projectile_expires() {
        let mut guns = Gunnery::new(1, "Alice", 1);
        guns.spawn(Position::default(), 0.0, 0.0);
        let mut nobody: Vec<Dummy> = Vec::new();

        for _ in 0..PROJECTILE_LIFE {
            guns.tick(&mut nobody);
        }
        assert!(guns.active().is_empty());
    }

    #[test]
    fn test_direct_hit_applies_damage_once() {
        let mut guns = Gunnery::new(1, "Alice", 3);
        let spot = Position::new(5.0, 5.0, 5.0);
        guns.spawn(spot, 0.0, 0.0);
        let mut targets = vec![Dummy::at(2, spot)];

        let hits = guns.resolve_hits(&mut targets);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].message.damage, 30);
        assert_eq!(hits[0].message.target_id, 2);
        assert_eq!(hits[0].victim_name, "Pilot 2");
        assert!(!hits[0].message.is_kill);
        assert_eq!(targets[0].health, 70);
        assert!(guns.active().is_empty());

        assert!(guns.resolve_hits(&mut targets).is_empty());
        assert!(guns.tick(&mut targets).is_empty());
        assert_eq!(targets[0].health, 70);
    }

    #[test]
    fn test_first_target_in_order_wins() {
        let mut guns = Gunnery::new(1, "Alice", 1);
        let spot = Position::new(0.0, 0.0, 0.0);
        guns.spawn(spot, 0.0, 0.0);
        let mut targets = vec![Dummy::at(7, spot), Dummy::at(3, spot)];

        let hits = guns.resolve_hits(&mut targets);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].message.target_id, 7);
        assert_eq!(targets[1].health, 100);
    }

    #[test]
    fn test_owner_and_dead_planes_are_skipped() {
        let mut guns = Gunnery::new(1, "Alice", 1);
        let spot = Position::default();
        guns.spawn(spot, 0.0, 0.0);

        let mut dead = Dummy::at(4, spot);
        dead.health = 0;
        let mut targets = vec![Dummy::at(1, spot), dead];

        assert!(guns.resolve_hits(&mut targets).is_empty());
        assert_eq!(guns.active().len(), 1);
    }

    #[test]
    fn test_outside_hitbox_misses() {
        let mut guns = Gunnery::new(1, "Alice", 1);
        guns.spawn(Position::default(), 0.0, 0.0);
        let mut targets = vec![Dummy::at(2, Position::new(HITBOX_RADIUS, 0.0, 0.0))];

        assert!(guns.resolve_hits(&mut targets).is_empty());
    }

    #[test]
    fn test_kill_flagged_when_health_crosses_zero() {
        let mut guns = Gunnery::new(1, "Alice", 5);
        let spot = Position::default();
        let mut victim = Dummy::at(2, spot);
        victim.health = 40;
        let mut targets = vec![victim];

        guns.spawn(spot, 0.0, 0.0);
        let hits = guns.resolve_hits(&mut targets);
        assert!(hits[0].message.is_kill);
        assert_eq!(targets[0].health, 0);

        guns.spawn(spot, 0.0, 0.0);
        assert!(guns.resolve_hits(&mut targets).is_empty());
    }

    #[test]
    fn test_event_ids_increase() {
        let mut guns = Gunnery::new(9, "Alice", 1);
        let spot = Position::default();
        let mut targets = vec![Dummy::at(2, spot)];

        guns.spawn(spot, 0.0, 0.0);
        guns.spawn(spot, 0.0, 0.0);
        let hits = guns.resolve_hits(&mut targets);

        let keys: Vec<_> = hits.iter().map(|h| h.message.dedup_key()).collect();
        assert_eq!(keys, vec![Some((9, 1)), Some((9, 2))]);
    }

    #[test]
    fn test_clear_drops_projectiles() {
        let mut guns = Gunnery::new(1, "Alice", 1);
        guns.fire(Position::default(), Orientation::default());
        guns.clear();
        assert!(guns.active().is_empty());
    }
}
