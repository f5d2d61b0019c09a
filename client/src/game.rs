//! Local simulation state shared between the flight loop and the network session.
//!
//! [`ClientWorld`] is the only object both sides touch. The simulation calls
//! [`ClientWorld::fire`], [`ClientWorld::simulate_tick`] and
//! [`ClientWorld::send_chat`]; the session calls [`ClientWorld::apply_message`],
//! [`ClientWorld::snapshot`] and [`ClientWorld::maintain`] and drains
//! [`ClientWorld::outgoing`].
//!
//! Every piece of state sits behind its own `parking_lot` mutex. When more than
//! one is held, they are always taken in the order pilot, remotes, gunnery.

use crate::combat::{Gunnery, HitReport};
use crate::config::SessionConfig;
use crate::publisher::StatePublisher;
use crate::queue::OutgoingQueue;
use crate::registry::{HitOutcome, RemoteBullet, RemotePlayer, RemoteRegistry};
use log::{debug, info};
use parking_lot::Mutex;
use rand::Rng;
use shared::{
    apply_damage, ChatMessage, HitMessage, Message, Orientation, PlayerId, PlayerState, Position,
    MAX_HEALTH,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Ticks a destroyed plane waits before it respawns
pub const RESPAWN_TICKS: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanePreset {
    pub name: &'static str,
    pub firepower: i32,
    pub color: [f32; 3],
}

pub const PLANE_PRESETS: [PlanePreset; 3] = [
    PlanePreset {
        name: "Cessna 172",
        firepower: 1,
        color: [0.8, 0.8, 0.8],
    },
    PlanePreset {
        name: "F-16",
        firepower: 5,
        color: [0.7, 0.7, 0.9],
    },
    PlanePreset {
        name: "Cyberpink",
        firepower: 3,
        color: [1.0, 0.4, 0.7],
    },
];

impl PlanePreset {
    /// Looks a preset up by name, ignoring case
    pub fn by_name(name: &str) -> Option<PlanePreset> {
        PLANE_PRESETS
            .iter()
            .find(|preset| preset.name.eq_ignore_ascii_case(name))
            .copied()
    }
}

/// Picks the identifier this client announces for itself
pub fn random_player_id() -> PlayerId {
    rand::thread_rng().gen_range(1000..=9999)
}

/// The plane flown on this client. Its state is authoritative.
#[derive(Debug, Clone)]
pub struct LocalPilot {
    pub player_id: PlayerId,
    pub name: String,
    pub preset: PlanePreset,
    pub position: Position,
    pub orientation: Orientation,
    pub health: i32,
    pub score: u32,
    pub deaths: u32,
    pub spawn_point: Position,
    destroyed_ticks: u32,
}

impl LocalPilot {
    pub fn new(player_id: PlayerId, name: impl Into<String>, preset: PlanePreset) -> Self {
        let spawn_point = Position::new(0.0, 10.0, 0.0);
        Self {
            player_id,
            name: name.into(),
            preset,
            position: spawn_point,
            orientation: Orientation::default(),
            health: MAX_HEALTH,
            score: 0,
            deaths: 0,
            spawn_point,
            destroyed_ticks: 0,
        }
    }

    pub fn state(&self) -> PlayerState {
        PlayerState {
            player_id: self.player_id,
            name: self.name.clone(),
            position: self.position,
            orientation: self.orientation,
            health: self.health,
            color: self.preset.color,
            score: self.score,
            deaths: self.deaths,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.health <= 0
    }

    /// Counts one tick of being destroyed. Returns true when the plane respawns.
    pub fn tick_destroyed(&mut self) -> bool {
        self.destroyed_ticks += 1;
        if self.destroyed_ticks >= RESPAWN_TICKS {
            self.respawn();
            return true;
        }
        false
    }

    pub fn respawn(&mut self) {
        self.position = self.spawn_point;
        self.orientation = Orientation::default();
        self.health = MAX_HEALTH;
        self.destroyed_ticks = 0;
    }
}

/// Keeps the newest `capacity` entries
#[derive(Debug)]
pub struct BoundedLog<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> BoundedLog<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One row of the scoreboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreLine {
    pub player_id: PlayerId,
    pub name: String,
    pub score: u32,
    pub deaths: u32,
    pub is_local: bool,
}

/// What happened to a received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Applied,
    /// Our own state or bullet echoed back
    IgnoredOwn,
    DuplicateHit,
    UnknownTarget,
}

pub struct ClientWorld {
    pilot: Mutex<LocalPilot>,
    remotes: Mutex<RemoteRegistry>,
    gunnery: Mutex<Gunnery>,
    publisher: Mutex<StatePublisher>,
    chat: Mutex<BoundedLog<ChatMessage>>,
    events: Mutex<BoundedLog<String>>,
    outgoing: OutgoingQueue,
    remote_bullet_ttl: Duration,
    stale_after: Option<Duration>,
}

impl ClientWorld {
    pub fn new(pilot: LocalPilot, config: &SessionConfig) -> Self {
        let gunnery = Gunnery::new(pilot.player_id, pilot.name.clone(), pilot.preset.firepower);
        Self {
            pilot: Mutex::new(pilot),
            remotes: Mutex::new(RemoteRegistry::new()),
            gunnery: Mutex::new(gunnery),
            publisher: Mutex::new(StatePublisher::new()),
            chat: Mutex::new(BoundedLog::new(config.chat_history)),
            events: Mutex::new(BoundedLog::new(config.event_feed)),
            outgoing: OutgoingQueue::new(config.outgoing_capacity),
            remote_bullet_ttl: config.remote_bullet_ttl,
            stale_after: config.stale_after,
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.pilot.lock().player_id
    }

    /// Copy of the local pilot
    pub fn pilot(&self) -> LocalPilot {
        self.pilot.lock().clone()
    }

    /// Runs `f` with the local pilot locked, for flight controls
    pub fn with_pilot<R>(&self, f: impl FnOnce(&mut LocalPilot) -> R) -> R {
        f(&mut self.pilot.lock())
    }

    pub fn outgoing(&self) -> &OutgoingQueue {
        &self.outgoing
    }

    /// Fires one projectile from the nose and queues its announcement.
    ///
    /// A destroyed plane cannot fire; returns false in that case.
    pub fn fire(&self) -> bool {
        let pilot = self.pilot.lock();
        if pilot.is_destroyed() {
            return false;
        }
        let bullet = self
            .gunnery
            .lock()
            .fire(pilot.position, pilot.orientation);
        drop(pilot);

        self.outgoing.push(Message::Bullet(bullet));
        true
    }

    /// Advances local combat by one simulation tick.
    ///
    /// While destroyed, counts down to respawn instead. Every detected hit is
    /// queued for the network and kills are credited to the local score.
    pub fn simulate_tick(&self) -> Vec<HitReport> {
        let mut pilot = self.pilot.lock();
        if pilot.is_destroyed() {
            if pilot.tick_destroyed() {
                self.gunnery.lock().clear();
                info!("{} respawned", pilot.name);
                self.push_event("You have respawned.".to_string());
            }
            return Vec::new();
        }

        let reports = {
            let mut remotes = self.remotes.lock();
            let mut gunnery = self.gunnery.lock();
            gunnery.tick(remotes.players_mut())
        };

        for report in &reports {
            self.outgoing.push(Message::Hit(report.message.clone()));
            if report.message.is_kill {
                pilot.score += 1;
                info!("Shot down {} (score {})", report.victim_name, pilot.score);
                self.push_event(format!("You shot down {}", report.victim_name));
            }
        }
        reports
    }

    /// Appends a chat line locally and queues it for everyone else
    pub fn send_chat(&self, text: impl Into<String>) {
        let name = self.pilot.lock().name.clone();
        let chat = ChatMessage::new(name, text);
        self.chat.lock().push(chat.clone());
        self.outgoing.push(Message::Chat(chat));
    }

    /// Queues the system message announcing this pilot to the lobby
    pub fn announce_join(&self) {
        let name = self.pilot.lock().name.clone();
        self.outgoing.push(Message::Chat(ChatMessage::system(format!(
            "{} has joined the lobby.",
            name
        ))));
    }

    /// Builds this cycle's state message
    pub fn snapshot(&self) -> Message {
        let pilot = self.pilot.lock();
        self.publisher.lock().snapshot(&pilot)
    }

    /// Routes one received message to the state it affects
    pub fn apply_message(&self, message: Message) -> Dispatch {
        let own_id = self.player_id();
        match message {
            Message::State(state) => {
                if state.player_id == own_id {
                    return Dispatch::IgnoredOwn;
                }
                self.remotes.lock().upsert_state(&state);
                Dispatch::Applied
            }
            Message::Bullet(bullet) => {
                if bullet.player_id == own_id {
                    return Dispatch::IgnoredOwn;
                }
                self.remotes.lock().spawn_bullet(&bullet);
                Dispatch::Applied
            }
            Message::Chat(chat) => {
                self.chat.lock().push(chat);
                Dispatch::Applied
            }
            Message::Hit(hit) => self.receive_hit(&hit),
        }
    }

    fn receive_hit(&self, hit: &HitMessage) -> Dispatch {
        let mut pilot = self.pilot.lock();
        if hit.target_id != pilot.player_id {
            drop(pilot);
            return match self.remotes.lock().apply_hit_message(hit) {
                HitOutcome::Applied { .. } => Dispatch::Applied,
                HitOutcome::Duplicate => Dispatch::DuplicateHit,
                HitOutcome::UnknownTarget => Dispatch::UnknownTarget,
            };
        }

        if !self.remotes.lock().note_hit(hit) {
            return Dispatch::DuplicateHit;
        }

        pilot.health = apply_damage(pilot.health, hit.damage);
        if hit.is_kill {
            pilot.deaths += 1;
        }
        debug!(
            "Hit by {} for {} (health {})",
            hit.attacker_name, hit.damage, pilot.health
        );
        drop(pilot);

        self.push_event(format!("You were hit by {}", hit.attacker_name));
        Dispatch::Applied
    }

    /// Expires remote bullets and, if configured, forgets silent players
    pub fn maintain(&self, now: Instant) {
        let mut remotes = self.remotes.lock();
        remotes.prune_bullets(now, self.remote_bullet_ttl);
        if let Some(max_age) = self.stale_after {
            for player_id in remotes.evict_stale(now, max_age) {
                info!("Remote player {} went silent, removing", player_id);
            }
        }
    }

    pub fn remote_players(&self) -> Vec<RemotePlayer> {
        self.remotes.lock().players().to_vec()
    }

    /// Remote players still alive, in arrival order
    pub fn active_remote_players(&self) -> Vec<RemotePlayer> {
        self.remotes
            .lock()
            .list_active()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn remote_bullets(&self) -> Vec<RemoteBullet> {
        self.remotes.lock().bullets().to_vec()
    }

    /// Local and remote pilots, highest score first
    pub fn scoreboard(&self) -> Vec<ScoreLine> {
        let pilot = self.pilot.lock();
        let mut lines = vec![ScoreLine {
            player_id: pilot.player_id,
            name: pilot.name.clone(),
            score: pilot.score,
            deaths: pilot.deaths,
            is_local: true,
        }];
        drop(pilot);

        lines.extend(self.remotes.lock().players().iter().map(|p| ScoreLine {
            player_id: p.player_id,
            name: p.name.clone(),
            score: p.score,
            deaths: p.deaths,
            is_local: false,
        }));
        lines.sort_by(|a, b| b.score.cmp(&a.score));
        lines
    }

    pub fn chat_lines(&self) -> Vec<ChatMessage> {
        self.chat.lock().to_vec()
    }

    /// Most recent game events, oldest first
    pub fn events(&self) -> Vec<String> {
        self.events.lock().to_vec()
    }

    fn push_event(&self, event: String) {
        self.events.lock().push(event);
    }
}
