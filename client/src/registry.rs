//! Remote entity registry
//!
//! Mirrors of other clients' planes and the bullets they announce, built
//! entirely from received messages. Players are kept in arrival order, which
//! is also the order hit detection walks them. Nothing is removed unless
//! stale eviction is enabled by the caller.

use crate::combat::Target;
use log::debug;
use shared::{
    apply_damage, BulletMessage, HitMessage, Orientation, PlayerId, Position, StateMessage,
    MAX_HEALTH,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

/// How many recent hit identifiers are remembered for duplicate detection
const HIT_LEDGER_CAPACITY: usize = 1024;

/// Local read-only mirror of another client's plane
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayer {
    pub player_id: PlayerId,
    pub name: String,
    pub position: Position,
    pub orientation: Orientation,
    pub health: i32,
    pub color: [f32; 3],
    pub score: u32,
    pub deaths: u32,
    pub last_seen: Instant,
}

impl RemotePlayer {
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            name: String::new(),
            position: Position::default(),
            orientation: Orientation::default(),
            health: MAX_HEALTH,
            color: [1.0, 1.0, 1.0],
            score: 0,
            deaths: 0,
            last_seen: Instant::now(),
        }
    }

    /// Overwrites every field present in `state`; absent fields keep their value
    pub fn merge(&mut self, state: &StateMessage) {
        if let Some(name) = &state.name {
            self.name.clone_from(name);
        }
        if let Some(x) = state.x {
            self.position.x = x;
        }
        if let Some(y) = state.y {
            self.position.y = y;
        }
        if let Some(z) = state.z {
            self.position.z = z;
        }
        if let Some(yaw) = state.yaw {
            self.orientation.yaw = yaw;
        }
        if let Some(pitch) = state.pitch {
            self.orientation.pitch = pitch;
        }
        if let Some(roll) = state.roll {
            self.orientation.roll = roll;
        }
        if let Some(health) = state.health {
            self.health = health.clamp(0, MAX_HEALTH);
        }
        if let Some(color) = state.color {
            self.color = color;
        }
        if let Some(score) = state.score {
            self.score = score;
        }
        if let Some(deaths) = state.deaths {
            self.deaths = deaths;
        }
        self.last_seen = Instant::now();
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }
}

impl Target for RemotePlayer {
    fn target_id(&self) -> PlayerId {
        self.player_id
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
        self.health = apply_damage(self.health, damage);
        self.health
    }
}

/// Bullet announced by another client, kept only as a short-lived marker
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteBullet {
    pub owner_id: PlayerId,
    pub position: Position,
    pub yaw: f32,
    pub pitch: f32,
    pub received_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    Applied { remaining_health: i32, is_kill: bool },
    Duplicate,
    UnknownTarget,
}

/// Remembers recently applied hit identifiers in a bounded window
#[derive(Debug, Default)]
struct HitLedger {
    seen: HashSet<(PlayerId, u64)>,
    order: VecDeque<(PlayerId, u64)>,
}

impl HitLedger {
    /// True the first time a hit is seen. Hits without an identifier always count.
    fn first_delivery(&mut self, hit: &HitMessage) -> bool {
        let Some(key) = hit.dedup_key() else {
            return true;
        };
        if !self.seen.insert(key) {
            return false;
        }
        self.order.push_back(key);
        if self.order.len() > HIT_LEDGER_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

#[derive(Debug, Default)]
pub struct RemoteRegistry {
    players: Vec<RemotePlayer>,
    index: HashMap<PlayerId, usize>,
    bullets: Vec<RemoteBullet>,
    ledger: HitLedger,
}

impl RemoteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the mirror for an unseen player, otherwise merges into the existing one
    pub fn upsert_state(&mut self, state: &StateMessage) -> Upsert {
        if let Some(&slot) = self.index.get(&state.player_id) {
            self.players[slot].merge(state);
            return Upsert::Updated;
        }

        let mut player = RemotePlayer::new(state.player_id);
        player.merge(state);
        debug!("Tracking remote player {} ({})", player.player_id, player.name);
        self.index.insert(state.player_id, self.players.len());
        self.players.push(player);
        Upsert::Created
    }

    /// Applies damage to a tracked player, counting a death when `is_kill` is set.
    ///
    /// Returns false when the target is not tracked.
    pub fn apply_hit(&mut self, target_id: PlayerId, damage: i32, is_kill: bool) -> bool {
        let Some(&slot) = self.index.get(&target_id) else {
            return false;
        };
        let player = &mut self.players[slot];
        player.take_damage(damage);
        if is_kill {
            player.deaths += 1;
        }
        true
    }

    /// Applies a received hit once, ignoring repeated deliveries of the same event
    pub fn apply_hit_message(&mut self, hit: &HitMessage) -> HitOutcome {
        if !self.index.contains_key(&hit.target_id) {
            return HitOutcome::UnknownTarget;
        }
        if !self.ledger.first_delivery(hit) {
            return HitOutcome::Duplicate;
        }
        self.apply_hit(hit.target_id, hit.damage, hit.is_kill);
        HitOutcome::Applied {
            remaining_health: self.get(hit.target_id).map_or(0, |p| p.health),
            is_kill: hit.is_kill,
        }
    }

    /// Records a hit aimed at someone this registry does not track (usually
    /// the local pilot). Returns false if it was already seen.
    pub fn note_hit(&mut self, hit: &HitMessage) -> bool {
        self.ledger.first_delivery(hit)
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&RemotePlayer> {
        self.index.get(&player_id).map(|&slot| &self.players[slot])
    }

    /// Players with health above zero, in arrival order
    pub fn list_active(&self) -> Vec<&RemotePlayer> {
        self.players.iter().filter(|p| p.is_alive()).collect()
    }

    pub fn players(&self) -> &[RemotePlayer] {
        &self.players
    }

    pub fn players_mut(&mut self) -> &mut [RemotePlayer] {
        &mut self.players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Drops players not heard from within `max_age`, returning their ids
    pub fn evict_stale(&mut self, now: Instant, max_age: Duration) -> Vec<PlayerId> {
        let mut evicted = Vec::new();
        self.players.retain(|p| {
            let fresh = now.saturating_duration_since(p.last_seen) <= max_age;
            if !fresh {
                evicted.push(p.player_id);
            }
            fresh
        });

        if !evicted.is_empty() {
            debug!("Evicted stale remote players {:?}", evicted);
            self.index = self
                .players
                .iter()
                .enumerate()
                .map(|(slot, p)| (p.player_id, slot))
                .collect();
        }
        evicted
    }

    pub fn spawn_bullet(&mut self, bullet: &BulletMessage) {
        self.bullets.push(RemoteBullet {
            owner_id: bullet.player_id,
            position: bullet.position(),
            yaw: bullet.yaw,
            pitch: bullet.pitch,
            received_at: Instant::now(),
        });
    }

    pub fn bullets(&self) -> &[RemoteBullet] {
        &self.bullets
    }

    /// Removes bullets older than `ttl`, returning how many were removed
    pub fn prune_bullets(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.bullets.len();
        self.bullets
            .retain(|b| now.saturating_duration_since(b.received_at) <= ttl);
        before - self.bullets.len()
    }
}
