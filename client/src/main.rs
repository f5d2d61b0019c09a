use clap::Parser;
use client::config::SessionConfig;
use client::game::{random_player_id, ClientWorld, LocalPilot, PlanePreset, PLANE_PRESETS};
use client::network::{resolve_server, NetworkSession, SessionHandle, SessionStatus};
use log::{info, warn};
use shared::DEFAULT_PORT;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};

const SIMULATION_HZ: u64 = 60;
/// Degrees of yaw per tick while circling
const TURN_RATE: f32 = 0.5;
/// Distance flown per tick
const CRUISE_SPEED: f32 = 0.4;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay host to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1")]
    server: String,

    /// Relay port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Pilot name shown to other players
    #[arg(short, long, default_value = "Pilot")]
    name: String,

    /// Plane preset: "Cessna 172", "F-16" or "Cyberpink"
    #[arg(long, default_value = "Cessna 172")]
    plane: String,

    /// Fire once every this many ticks (0 disables firing)
    #[arg(short, long, default_value = "30")]
    fire_every: u64,

    /// Stop after this many seconds (0 runs until Ctrl+C)
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// Chat line to send once connected
    #[arg(long)]
    chat: Option<String>,
}

/// Flies a slow circle so other clients have something to shoot at
fn fly(world: &ClientWorld) {
    world.with_pilot(|pilot| {
        if pilot.is_destroyed() {
            return;
        }
        pilot.orientation.yaw = (pilot.orientation.yaw + TURN_RATE) % 360.0;
        pilot.position = pilot
            .position
            .offset(pilot.orientation.forward(), CRUISE_SPEED);
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let preset = PlanePreset::by_name(&args.plane).unwrap_or_else(|| {
        warn!("Unknown plane '{}', using {}", args.plane, PLANE_PRESETS[0].name);
        PLANE_PRESETS[0]
    });

    let resolved = resolve_server(&args.server, args.port);
    let config = match &resolved {
        Ok(addr) => SessionConfig::new(*addr),
        Err(_) => SessionConfig::default(),
    };
    let player_id = random_player_id();
    info!(
        "Starting client '{}' (id {}) flying a {}",
        args.name, player_id, preset.name
    );

    let world = Arc::new(ClientWorld::new(
        LocalPilot::new(player_id, args.name.clone(), preset),
        &config,
    ));

    let mut solo_status = String::new();
    let session = match resolved {
        Ok(_) => Some(NetworkSession::spawn(config, Arc::clone(&world))),
        Err(e) => {
            solo_status = SessionStatus::connect_failed(&e).status_line();
            warn!("{}, flying solo", solo_status);
            None
        }
    };
    let mut reported_end = false;

    let mut ticker = interval(Duration::from_micros(1_000_000 / SIMULATION_HZ));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let deadline = (args.duration > 0).then(|| Instant::now() + Duration::from_secs(args.duration));
    let mut chat = args.chat;
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
        tick += 1;

        fly(&world);
        if args.fire_every > 0 && tick % args.fire_every == 0 {
            world.fire();
        }
        world.simulate_tick();

        if session.as_ref().map_or(false, |s| s.status().is_connected()) {
            if let Some(text) = chat.take() {
                world.send_chat(text);
            }
        }

        if tick % SIMULATION_HZ == 0 {
            let status = session
                .as_ref()
                .map_or_else(|| solo_status.clone(), SessionHandle::status_line);
            info!("Status: {}", status);
            for line in world.scoreboard() {
                info!(
                    "  {:<16} score {:>3}  deaths {:>3}{}",
                    line.name,
                    line.score,
                    line.deaths,
                    if line.is_local { "  (you)" } else { "" }
                );
            }
        }

        if let Some(handle) = &session {
            if !reported_end && !handle.is_running() {
                warn!(
                    "Network session ended ({}), continuing solo",
                    handle.status_line()
                );
                reported_end = true;
            }
        }
        if deadline.map_or(false, |deadline| Instant::now() >= deadline) {
            break;
        }
    }

    if let Some(handle) = session {
        handle.shutdown();
        let status = handle.join().await;
        info!("Final status: {}", status.status_line());
    }

    Ok(())
}
