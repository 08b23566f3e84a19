//! Demo world: a root node, an optional human player and a handful of
//! wandering units born at jittered times.
//!
//! Units steer on logic ticks ([`Wander`], attached to the world root) and
//! move on physics ticks ([`Kinematics`]). Every unit and the player are
//! streamed, so the snapshot stream carries their positions.

use cadence_core::config::DemoConfig;
use cadence_core::entity::{Entity, EntityRef};
use cadence_core::physics::Physics;
use cadence_core::scene::{Behaviour, FrameContext, SceneTree};
use cadence_core::scheduler::{Scheduler, SchedulerError};
use cadence_types::{Controller, EntityId, EntityKind, EntityState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

/// Id of the world root node.
pub const WORLD_ROOT: &str = "world";

/// Half-width of the square the units wander in.
const ARENA_HALF_WIDTH: f64 = 100.0;

/// Top unit speed, in units per second.
const MAX_SPEED: f64 = 20.0;

/// Entities created by [`build`], shared with the demo behaviours.
#[derive(Debug, Clone, Default)]
pub struct DemoWorld {
    /// Every unit, born or not.
    pub units: Vec<EntityRef>,
    /// The human player, if one was created.
    pub player: Option<EntityRef>,
}

impl DemoWorld {
    /// Entities the physics step moves.
    pub fn movers(&self) -> Vec<EntityRef> {
        self.units.iter().chain(self.player.iter()).cloned().collect()
    }
}

/// Populate `scheduler` with the demo world.
///
/// # Errors
///
/// Returns [`SchedulerError`] if an entity cannot be registered or queued.
pub fn build(
    scheduler: &mut Scheduler<SceneTree>,
    config: &DemoConfig,
) -> Result<DemoWorld, SchedulerError> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let root = EntityId::from(WORLD_ROOT);
    scheduler.add_root(Entity::with_id(WORLD_ROOT).kind(EntityKind::Scene).build())?;

    let mut world = DemoWorld::default();
    let jitter_cap = u32::try_from(config.spawn_jitter_ms).unwrap_or(u32::MAX);

    if config.human_player {
        let player = Entity::with_id("player-1")
            .category("player")
            .group("humans")
            .controller(Controller::Human)
            .streamed(true)
            .state(position(0.0, 0.0))
            .build();
        scheduler.spawn(EntityRef::clone(&player), 0.0, root.clone())?;
        world.player = Some(player);
    }

    for _ in 0..config.units {
        let birth_ms = if jitter_cap == 0 {
            0.0
        } else {
            f64::from(rng.random_range(0..jitter_cap))
        };
        let unit = Entity::builder()
            .category("unit")
            .group("wanderers")
            .controller(Controller::Ai)
            .streamed(true)
            .state(position(
                rng.random_range(-ARENA_HALF_WIDTH..ARENA_HALF_WIDTH),
                rng.random_range(-ARENA_HALF_WIDTH..ARENA_HALF_WIDTH),
            ))
            .build();
        debug!(id = %unit.id(), birth_ms, "Queueing demo unit");
        scheduler.spawn(EntityRef::clone(&unit), birth_ms, root.clone())?;
        world.units.push(unit);
    }

    let wander = Wander::new(world.units.clone(), rng);
    scheduler.scene_mut().set_behaviour(&root, Box::new(wander))?;

    info!(
        units = world.units.len(),
        human_player = world.player.is_some(),
        "Demo world built"
    );
    Ok(world)
}

fn position(x: f64, y: f64) -> EntityState {
    EntityState::new()
        .with("x", x)
        .with("y", y)
        .with("vx", 0.0)
        .with("vy", 0.0)
}

fn set_number(state: &mut EntityState, name: &str, value: f64) {
    state
        .attributes
        .insert(name.to_owned(), serde_json::json!(value));
}

// ---------------------------------------------------------------------------
// Steering
// ---------------------------------------------------------------------------

/// Picks a new random heading for each born unit on every logic tick.
pub struct Wander {
    units: Vec<EntityRef>,
    rng: StdRng,
}

impl Wander {
    /// Steer `units` with `rng`.
    pub const fn new(units: Vec<EntityRef>, rng: StdRng) -> Self {
        Self { units, rng }
    }
}

impl Behaviour for Wander {
    fn update(&mut self, _root: &Entity, _ctx: &FrameContext<'_>) {
        for unit in &self.units {
            if !unit.is_born() || unit.is_being_removed() {
                continue;
            }
            let vx = self.rng.random_range(-MAX_SPEED..MAX_SPEED);
            let vy = self.rng.random_range(-MAX_SPEED..MAX_SPEED);
            unit.update_state(|state| {
                set_number(state, "vx", vx);
                set_number(state, "vy", vy);
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Physics
// ---------------------------------------------------------------------------

/// Integrates velocity into position, bouncing off the arena walls.
pub struct Kinematics {
    bodies: Vec<EntityRef>,
}

impl Kinematics {
    /// Move `bodies`.
    pub const fn new(bodies: Vec<EntityRef>) -> Self {
        Self { bodies }
    }
}

impl Physics for Kinematics {
    fn update(&mut self, elapsed_ms: f64) {
        let dt = elapsed_ms / 1000.0;
        for body in &self.bodies {
            if !body.is_born() || body.is_being_removed() {
                continue;
            }
            body.update_state(|state| {
                let (x, vx) = step_axis(state.number("x"), state.number("vx"), dt);
                let (y, vy) = step_axis(state.number("y"), state.number("vy"), dt);
                set_number(state, "x", x);
                set_number(state, "y", y);
                set_number(state, "vx", vx);
                set_number(state, "vy", vy);
            });
        }
    }
}

fn step_axis(position: Option<f64>, velocity: Option<f64>, dt: f64) -> (f64, f64) {
    let v = velocity.unwrap_or(0.0);
    let p = v.mul_add(dt, position.unwrap_or(0.0));
    if p.abs() > ARENA_HALF_WIDTH {
        (p.clamp(-ARENA_HALF_WIDTH, ARENA_HALF_WIDTH), -v)
    } else {
        (p, v)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use cadence_core::clock::{ClockSource, ManualClock};
    use cadence_core::config::EngineConfig;
    use cadence_types::ProcessRole;

    use super::*;

    fn scheduler() -> (Scheduler, Arc<ManualClock>) {
        let mut config = EngineConfig::default();
        config.watchdog.idle_timeout_ms = 0;
        let clock = Arc::new(ManualClock::new(0.0));
        let scheduler = Scheduler::new(
            &config,
            ProcessRole::Authoritative,
            SceneTree::new(),
            Arc::clone(&clock) as Arc<dyn ClockSource>,
        )
        .unwrap();
        (scheduler, clock)
    }

    #[test]
    fn builds_units_and_player() {
        let (mut scheduler, _clock) = scheduler();
        let world = build(&mut scheduler, &DemoConfig::default()).unwrap();

        assert_eq!(world.units.len(), 8);
        assert!(world.player.is_some());
        assert_eq!(scheduler.status().unborn, 9);
        let root = scheduler.scene().get(WORLD_ROOT).unwrap();
        assert_eq!(root.kind(), EntityKind::Scene);
        assert_eq!(
            scheduler
                .registry()
                .count_controlled_by("player", Controller::Human),
            1
        );
    }

    #[test]
    fn same_seed_same_world() {
        let (mut a, _) = scheduler();
        let (mut b, _) = scheduler();
        let config = DemoConfig::default();
        let wa = build(&mut a, &config).unwrap();
        let wb = build(&mut b, &config).unwrap();
        let xs = |w: &DemoWorld| -> Vec<Option<f64>> {
            w.units.iter().map(|u| u.state().number("x")).collect()
        };
        assert_eq!(xs(&wa), xs(&wb));
    }

    #[tokio::test]
    async fn units_move_once_born() {
        let (mut scheduler, clock) = scheduler();
        let config = DemoConfig {
            spawn_jitter_ms: 0,
            human_player: false,
            ..DemoConfig::default()
        };
        let world = build(&mut scheduler, &config).unwrap();
        let mut scheduler = scheduler.with_physics(Box::new(Kinematics::new(world.movers())));
        scheduler.start().await.unwrap();

        let unit = world.units.first().unwrap();
        let before = unit.state();
        for _ in 0..10 {
            clock.advance_ms(50.0);
            scheduler.step_frame().unwrap();
        }
        assert!(unit.is_born());
        assert_ne!(unit.state(), before);
        let x = unit.state().number("x").unwrap();
        assert!(x.abs() <= ARENA_HALF_WIDTH);
    }

    #[test]
    fn walls_reflect_velocity() {
        let (p, v) = step_axis(Some(99.0), Some(20.0), 0.1);
        assert!((p - ARENA_HALF_WIDTH).abs() < f64::EPSILON);
        assert!((v + 20.0).abs() < f64::EPSILON);
    }
}
