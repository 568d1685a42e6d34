//! Match Orchestration
//!
//! [`Game`] owns one match: the world, the event bus, the ordered system
//! pipeline, the lockstep command queue, the scheduler and the desync
//! detector. Everything gameplay-related runs on the thread that calls
//! [`Game::on_wake`]; the only other threads in the process are the timer
//! (wake signals) and whatever renders - neither touches simulation state.
//!
//! Per tick: drain the command bucket for exactly this tick, dispatch in
//! canonical order over the bus, run the systems in registry order
//! (flushing deferred destruction after each pass), then exchange and
//! reconcile checksums. Tick N completes before tick N+1 begins, always.

pub mod blueprint;
pub mod command;
pub mod config;
pub mod events;
pub mod registry;
pub mod scheduler;
pub mod systems;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::net::signing::{CommandSigner, KeyRegistry};
use crate::net::transport::{ChecksumMessage, CommandEnvelope, Transport, WireMessage};
use crate::sync::desync::{DesyncDetector, DesyncReport, RemoteDigest};
use crate::sync::merkle::build_merkle;
use crate::sync::snapshot::{SealedSnapshot, Snapshot, SnapshotError};
use crate::world::entity::PlayerId;
use crate::world::World;

use blueprint::{Blueprint, BlueprintError};
use command::{CommandKind, CommandQueue, CommandRejection, GameCommand};
use config::MatchOptions;
use events::{EventBus, GameEvent};
use registry::RegistryError;
use scheduler::{SchedulerState, TickScheduler, TimerThread, WakeSignal};

/// Ticks between automatic heartbeats in multiplayer.
const HEARTBEAT_INTERVAL: u32 = 8;

/// Mutable simulation context handed to systems and bus handlers.
pub struct SimCtx<'a> {
    /// The world store.
    pub world: &'a mut World,
    /// The lockstep command queue (AI delayed actions go through it).
    pub queue: &'a mut CommandQueue,
    /// Match options.
    pub options: &'a MatchOptions,
}

/// A simulation system. Instances are created by the registry and run in
/// topological order, once per tick. `update` must not panic; failures are
/// reported as [`GameEvent::SystemFailure`] events.
pub trait System {
    /// Unique system name (matches its registry declaration).
    fn name(&self) -> &'static str;

    /// Register command/event handlers. Called once, right after
    /// construction.
    fn subscribe(&self, _bus: &mut EventBus) {}

    /// Advance one tick.
    fn update(&mut self, ctx: &mut SimCtx<'_>, bus: &mut EventBus);
}

impl std::fmt::Debug for dyn System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System").field("name", &self.name()).finish()
    }
}

/// Match lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GamePhase {
    /// Created, not yet started.
    Lobby,
    /// Ticking.
    Playing,
    /// Over - victory, quit, or desync. No further ticks.
    Ended,
}

/// Startup and runtime failures.
#[derive(Debug, Error)]
pub enum GameError {
    /// Blueprint validation/expansion failed.
    #[error(transparent)]
    Blueprint(#[from] BlueprintError),
    /// System registry is structurally broken.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Snapshot machinery failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    /// The OS refused the timer thread.
    #[error("timer thread spawn failed: {0}")]
    Timer(#[from] std::io::Error),
}

type Inbox = Rc<RefCell<VecDeque<(PlayerId, WireMessage)>>>;

/// One running match. See module docs.
pub struct Game {
    options: MatchOptions,
    world: World,
    bus: EventBus,
    systems: Vec<Box<dyn System>>,
    queue: CommandQueue,
    scheduler: TickScheduler,
    timer: Option<TimerThread>,
    detector: DesyncDetector,
    transport: Option<Box<dyn Transport>>,
    inbox: Inbox,
    signer: Option<CommandSigner>,
    peer_keys: KeyRegistry,
    phase: GamePhase,
    last_desync: Option<DesyncReport>,
    desync_dump: Option<SealedSnapshot>,
    transport_down: bool,
}

impl Game {
    /// Build a match from a blueprint and options. The RNG seed derives
    /// deterministically from the blueprint id and player slots.
    pub fn new(blueprint: &Blueprint, options: MatchOptions) -> Result<Self, GameError> {
        let slots: Vec<u8> = (0..blueprint.meta.players).collect();
        let seed = crate::core::rng::derive_match_seed(&blueprint.meta.id, &slots);
        let world = blueprint.expand_world(&options, seed)?;

        let systems = registry::build_pipeline(&systems::system_specs(), &options)?;
        let mut bus = EventBus::new();
        for system in &systems {
            system.subscribe(&mut bus);
        }

        let scheduler = TickScheduler::new(options.tick_rate);
        info!(
            blueprint = %blueprint.meta.id,
            players = blueprint.meta.players,
            multiplayer = options.is_multiplayer,
            "match created"
        );

        Ok(Self {
            options,
            world,
            bus,
            systems,
            queue: CommandQueue::new(),
            scheduler,
            timer: None,
            detector: DesyncDetector::new(),
            transport: None,
            inbox: Rc::new(RefCell::new(VecDeque::new())),
            signer: None,
            peer_keys: KeyRegistry::new(),
            phase: GamePhase::Lobby,
            last_desync: None,
            desync_dump: None,
            transport_down: false,
        })
    }

    /// Attach the transport port. Inbound messages queue in the game's
    /// inbox and are consumed between ticks.
    pub fn attach_transport(&mut self, mut transport: Box<dyn Transport>) {
        let inbox = self.inbox.clone();
        transport.register_handler(Box::new(move |sender, message| {
            inbox.borrow_mut().push_back((sender, message.clone()));
        }));
        self.transport = Some(transport);
    }

    /// Enable command signing with the local key.
    pub fn set_signer(&mut self, signer: CommandSigner) {
        self.signer = Some(signer);
    }

    /// Register a peer's verifying key (exchanged during connection setup).
    pub fn register_peer_key(&mut self, peer: PlayerId, key: [u8; 32]) -> bool {
        self.peer_keys.register(peer, key).is_ok()
    }

    /// Start ticking now. Spawns the match's timing source on first start.
    pub fn start(&mut self) -> Result<(), GameError> {
        self.spawn_timer()?;
        if self.phase == GamePhase::Lobby {
            self.phase = GamePhase::Playing;
        }
        self.scheduler.start();
        Ok(())
    }

    /// Start ticking at an agreed wall-clock instant (multiplayer start
    /// coordination - all peers pass the same instant).
    pub fn start_at(&mut self, instant: Instant) -> Result<(), GameError> {
        self.spawn_timer()?;
        if self.phase == GamePhase::Lobby {
            self.phase = GamePhase::Playing;
        }
        self.scheduler.start_at(instant);
        Ok(())
    }

    fn spawn_timer(&mut self) -> Result<(), GameError> {
        if self.timer.is_none() {
            self.timer = Some(TimerThread::spawn(self.options.tick_period_ms())?);
        }
        Ok(())
    }

    /// Block until the timing source fires again. `None` once the timer is
    /// gone (match over or never started).
    pub fn wait_for_wake(&self) -> Option<WakeSignal> {
        self.timer.as_ref().and_then(TimerThread::wait)
    }

    /// Pause (menu, transport trouble).
    pub fn pause(&mut self) {
        self.scheduler.pause();
    }

    /// Resume from pause.
    pub fn resume(&mut self) {
        self.scheduler.resume();
    }

    /// Current phase.
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Read access to the world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The desync report, if the match died that way.
    pub fn last_desync(&self) -> Option<&DesyncReport> {
        self.last_desync.as_ref()
    }

    /// The automatic snapshot captured at desync time.
    pub fn desync_dump(&self) -> Option<&SealedSnapshot> {
        self.desync_dump.as_ref()
    }

    /// Scheduler state (tests, UI).
    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    /// Issue a local player command.
    ///
    /// Multiplayer: stamped `current + D`, enqueued locally and transmitted
    /// (signed when a signer is attached). Single-player (no transport):
    /// dispatched immediately on the current tick - there is nobody to keep
    /// in lockstep with.
    pub fn issue_command(&mut self, kind: CommandKind) {
        if self.phase != GamePhase::Playing {
            return;
        }
        let player = self.options.player_id;

        if self.transport.is_none() {
            let command = GameCommand {
                tick: self.world.tick,
                player,
                kind,
            };
            let mut ctx = SimCtx {
                world: &mut self.world,
                queue: &mut self.queue,
                options: &self.options,
            };
            self.bus.emit(&mut ctx, &GameEvent::Command(command));
            return;
        }

        let command = GameCommand {
            tick: self.world.tick + self.options.command_delay_ticks,
            player,
            kind,
        };
        let signature = self
            .signer
            .as_ref()
            .and_then(|s| s.sign(&command).ok());
        let envelope = WireMessage::Command(CommandEnvelope {
            payload: command.clone(),
            signature,
        });
        if let Some(transport) = self.transport.as_mut() {
            if let Err(err) = transport.send(&envelope) {
                warn!(%err, "command send failed");
                self.on_transport_failure();
            }
        }
        // Local enqueue can only fail if time ran backwards.
        let _ = self.queue.enqueue(command, self.world.tick);
    }

    /// Process every queued inbound message. Called between ticks.
    pub fn pump_network(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        match transport.pump() {
            Ok(()) => {
                if self.transport_down {
                    self.transport_down = false;
                    self.detector.resume();
                    self.scheduler.resume();
                    info!("transport recovered");
                }
            }
            Err(err) => {
                warn!(%err, "transport pump failed");
                self.on_transport_failure();
                return;
            }
        }

        let messages: Vec<(PlayerId, WireMessage)> = self.inbox.borrow_mut().drain(..).collect();
        for (sender, message) in messages {
            self.handle_message(sender, message);
            if self.phase == GamePhase::Ended {
                break;
            }
        }
    }

    fn on_transport_failure(&mut self) {
        // Gameplay waits: the detector pauses, the scheduler stops
        // advancing, and the match resumes or is quit by the user.
        self.transport_down = true;
        self.detector.pause();
        self.scheduler.pause();
    }

    fn handle_message(&mut self, sender: PlayerId, message: WireMessage) {
        match &message {
            WireMessage::Command(_) | WireMessage::LegacyCommand(_) => {
                let Some((command, signature)) = message.as_command() else {
                    return;
                };
                self.receive_remote_command(sender, command.clone(), signature);
            }
            WireMessage::Checksum(digest) => {
                let remote = RemoteDigest {
                    tick: digest.tick,
                    checksum: digest.checksum,
                    peer: digest.peer_id,
                    merkle: digest.merkle.clone(),
                };
                if let Some(report) = self.detector.record_remote(remote) {
                    self.declare_desync(report);
                }
            }
            WireMessage::Quit { player_id } => {
                info!(player = %player_id, "peer quit");
                self.end_match(None);
            }
        }
    }

    fn receive_remote_command(
        &mut self,
        sender: PlayerId,
        command: GameCommand,
        signature: Option<&str>,
    ) {
        // Signed matches verify before anything else touches the command.
        if self.options.is_multiplayer && self.peer_keys.has_key(sender) {
            let valid = signature
                .map(|s| self.peer_keys.verify(sender, &command, s))
                .unwrap_or(false);
            if !valid {
                self.audit(CommandRejection::BadSignature, sender);
                return;
            }
        }

        // Stale beats everything: a command for a tick that already ran is
        // lockstep failure, never a routine drop.
        if command.tick < self.world.tick {
            error!(
                command_tick = command.tick,
                current_tick = self.world.tick,
                "stale command received"
            );
            let tick = self.world.tick;
            self.declare_desync(DesyncReport::stale_commands(tick, command.tick));
            return;
        }

        if let Err(rejection) = command::authorize(
            &command,
            sender,
            &self.world,
            self.options.command_delay_ticks,
        ) {
            self.audit(rejection, sender);
            return;
        }

        if let Err(stale) = self.queue.enqueue(command, self.world.tick) {
            error!(%stale, "stale command slipped past the gate");
            self.declare_desync(DesyncReport::stale_commands(
                self.world.tick,
                stale.command_tick,
            ));
        }
    }

    fn audit(&mut self, rejection: CommandRejection, sender: PlayerId) {
        warn!(%rejection, sender = %sender, "command rejected");
        let event = GameEvent::SecurityAudit { rejection, sender };
        let mut ctx = SimCtx {
            world: &mut self.world,
            queue: &mut self.queue,
            options: &self.options,
        };
        self.bus.emit(&mut ctx, &event);
    }

    // =========================================================================
    // TICKING
    // =========================================================================

    /// Handle a timer wakeup: pump the transport, then let the scheduler
    /// decide how many ticks are due. Returns the tick count executed.
    pub fn on_wake(&mut self, now: Instant) -> u32 {
        self.pump_network();

        // The scheduler is driven with the callback borrowing `self`, so it
        // steps out of the struct for the duration.
        let mut sched = std::mem::replace(
            &mut self.scheduler,
            TickScheduler::new(self.options.tick_rate),
        );
        let ran = sched.on_wake(now, || self.step());
        self.scheduler = sched;
        ran
    }

    /// Run exactly one tick. Public so tests and headless drivers can march
    /// the simulation without a timer.
    pub fn step(&mut self) {
        if self.phase != GamePhase::Playing {
            return;
        }

        self.world.tick += 1;
        let tick = self.world.tick;

        // Stale bucket check before dispatch: anything older than this tick
        // means delivery diverged.
        if let Some(oldest) = self.queue.oldest_pending_tick() {
            if oldest < tick {
                self.declare_desync(DesyncReport::stale_commands(tick, oldest));
                return;
            }
        }

        // Multiplayer presence marker.
        if self.options.is_multiplayer && tick % HEARTBEAT_INTERVAL == 0 {
            self.send_heartbeat();
        }

        // Dispatch this tick's commands in the canonical order. Ownership
        // is re-validated at dispatch on every peer - an entity that died
        // or changed hands since receipt drops the command identically
        // everywhere.
        let commands = self.queue.drain_tick(tick);
        for command in commands {
            if self.options.is_multiplayer {
                if let Err(rejection) = command::authorize(
                    &command,
                    command.player,
                    &self.world,
                    self.options.command_delay_ticks,
                ) {
                    self.audit(rejection, command.player);
                    continue;
                }
            }
            let mut ctx = SimCtx {
                world: &mut self.world,
                queue: &mut self.queue,
                options: &self.options,
            };
            self.bus.emit(&mut ctx, &GameEvent::Command(command));
        }

        // Systems in registry order; deferred destruction flushes after
        // each pass so no system sees a half-removed entity.
        for system in self.systems.iter_mut() {
            let mut ctx = SimCtx {
                world: &mut self.world,
                queue: &mut self.queue,
                options: &self.options,
            };
            system.update(&mut ctx, &mut self.bus);
            self.world.flush_destroyed();
        }

        self.queue.retire_receipts_before(tick.saturating_sub(64));

        // Checksum exchange, when the checksum system produced one.
        if let Some((digest_tick, checksum)) = self.world.checksum_history.latest() {
            if digest_tick == tick {
                let tree = build_merkle(&self.world);
                let compact = tree.compact();
                self.detector.record_local(tick, checksum, tree);

                if let Some(transport) = self.transport.as_mut() {
                    let (units, buildings, _) = self.world.category_counts();
                    let message = WireMessage::Checksum(ChecksumMessage {
                        tick,
                        checksum,
                        unit_count: units,
                        building_count: buildings,
                        resource_sum: self.world.resource_sum(),
                        peer_id: self.options.player_id,
                        merkle: Some(compact),
                    });
                    if let Err(err) = transport.send(&message) {
                        warn!(%err, "checksum send failed");
                        self.on_transport_failure();
                    }
                }
            }
        }

        // Victory ends the match cleanly.
        if let Some(outcome) = self.world.outcome {
            self.end_match(outcome.winner);
        }
    }

    fn send_heartbeat(&mut self) {
        let command = GameCommand {
            tick: self.world.tick + self.options.command_delay_ticks,
            player: self.options.player_id,
            kind: CommandKind::Heartbeat,
        };
        let signature = self.signer.as_ref().and_then(|s| s.sign(&command).ok());
        if let Some(transport) = self.transport.as_mut() {
            let _ = transport.send(&WireMessage::Command(CommandEnvelope {
                payload: command.clone(),
                signature,
            }));
        }
        let _ = self.queue.enqueue(command, self.world.tick);
    }

    // =========================================================================
    // ENDINGS
    // =========================================================================

    /// Desync is unrecoverable: stop ticking, dump a snapshot, surface the
    /// report, end the match.
    fn declare_desync(&mut self, report: DesyncReport) {
        if self.phase == GamePhase::Ended {
            return;
        }
        error!(tick = report.tick, reason = ?report.reason, "desync - ending match");

        self.desync_dump = Snapshot::capture(&self.world, &self.queue).seal().ok();
        if let Some(dump) = &self.desync_dump {
            info!(
                capture = %dump.snapshot.capture_id,
                digest = %hex::encode(dump.digest),
                "desync snapshot captured"
            );
        }

        let event = GameEvent::Desync(report.clone());
        let mut ctx = SimCtx {
            world: &mut self.world,
            queue: &mut self.queue,
            options: &self.options,
        };
        self.bus.emit(&mut ctx, &event);

        self.last_desync = Some(report);
        self.phase = GamePhase::Ended;
        self.scheduler.stop();
        self.timer = None;
    }

    fn end_match(&mut self, winner: Option<PlayerId>) {
        if self.phase == GamePhase::Ended {
            return;
        }
        info!(winner = ?winner, tick = self.world.tick, "match over");
        self.phase = GamePhase::Ended;
        self.scheduler.stop();
        self.timer = None;
    }

    /// Announce departure and end the match locally.
    pub fn quit(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            let _ = transport.send(&WireMessage::Quit {
                player_id: self.options.player_id,
            });
        }
        self.end_match(None);
    }

    /// Capture a snapshot of the current state on demand.
    pub fn snapshot(&self) -> Result<SealedSnapshot, GameError> {
        Ok(Snapshot::capture(&self.world, &self.queue).seal()?)
    }

    /// Reset match-scoped state so a following match starts clean: handlers
    /// dropped, queues cleared, scheduler stopped. The world itself is
    /// rebuilt by constructing the next `Game`.
    pub fn reset(&mut self) {
        self.bus.clear();
        self.queue.clear();
        self.scheduler.stop();
        self.timer = None;
        self.phase = GamePhase::Ended;
    }
}
