// simulation.rs - Bodies bouncing around a square arena
//
// The runtime owns exactly one database. Each tick runs the systems below
// in order: physics, aging, culling.

use crate::time::{SimulationTime, TICK_DURATION_SECS};
use glam::Vec2;
use latch_db::{ComponentInfo, Database, DatabaseConfig, DbError, Entity, Not, Tag};
use tracing::{debug, info};

// ============================================================================
// Components
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position(pub Vec2);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Velocity(pub Vec2);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Name(pub String);

/// Ticks left before the body expires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lifetime(pub u32);

/// Tag: physics leaves the body alone.
pub struct Frozen;

/// Tag: lifetime ran out; removed on the next cull.
pub struct Expired;

/// Bodies stay within `[-ARENA_HALF_EXTENT, ARENA_HALF_EXTENT]` on both axes.
pub const ARENA_HALF_EXTENT: f32 = 1.0;

// ============================================================================
// Systems
// ============================================================================

/// Integrate velocity into position, bouncing off the arena walls.
pub fn physics_system(db: &mut Database, dt: f32) -> usize {
    db.visit::<(&mut Position, &mut Velocity, Not<Tag<Frozen>>), _>(|(position, velocity, _)| {
        let mut next = position.0 + velocity.0 * dt;

        if next.x.abs() > ARENA_HALF_EXTENT {
            velocity.0.x = -velocity.0.x;
            next.x = next.x.clamp(-ARENA_HALF_EXTENT, ARENA_HALF_EXTENT);
        }
        if next.y.abs() > ARENA_HALF_EXTENT {
            velocity.0.y = -velocity.0.y;
            next.y = next.y.clamp(-ARENA_HALF_EXTENT, ARENA_HALF_EXTENT);
        }

        position.0 = next;
    })
}

/// Count down lifetimes and tag bodies whose lifetime reached zero.
pub fn age_system(db: &mut Database) -> Result<usize, DbError> {
    let mut expired = Vec::new();
    db.visit::<(Entity, ComponentInfo<Lifetime>, Not<Tag<Expired>>), _>(
        |(entity, mut lifetime, _)| {
            lifetime.0 = lifetime.0.saturating_sub(1);
            if lifetime.0 == 0 {
                debug!(component = %lifetime.handle(), "lifetime expired");
                expired.push(entity);
            }
        },
    );

    for &entity in &expired {
        db.create_tag::<Expired>(entity)?;
    }
    Ok(expired.len())
}

/// Erase every expired body.
pub fn cull_system(db: &mut Database) -> Result<usize, DbError> {
    let doomed = db.query::<(Entity, Tag<Expired>)>();
    for &(entity, _) in &doomed {
        db.erase_entity(entity)?;
    }
    Ok(doomed.len())
}

// ============================================================================
// Simulation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub ticks: u64,
    pub alive: usize,
    pub frozen: usize,
    pub culled: usize,
}

pub struct Simulation {
    db: Database,
    time: SimulationTime,
    culled: usize,
}

impl Simulation {
    pub fn new(config: DatabaseConfig) -> Result<Self, DbError> {
        Ok(Self {
            db: Database::with_config(config)?,
            time: SimulationTime::new(),
            culled: 0,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn time(&self) -> &SimulationTime {
        &self.time
    }

    /// Spawn `count` bodies on a ring, circling counter-clockwise.
    ///
    /// Every fourth body is frozen and every odd body gets a finite lifetime.
    pub fn spawn_ring(&mut self, count: usize) -> Result<Vec<Entity>, DbError> {
        use std::f32::consts::PI;

        let mut spawned = Vec::with_capacity(count);
        for i in 0..count {
            let t = i as f32 / count.max(1) as f32;
            let angle = t * 2.0 * PI;
            let radius = 0.5 + t * 0.3;

            let entity = self.db.create_entity();
            self.db
                .create_component(entity, Position(Vec2::from_angle(angle) * radius))?;
            self.db
                .create_component(entity, Velocity(Vec2::from_angle(angle + PI / 2.0) * 0.2))?;
            self.db.create_component(entity, Name(format!("body-{i}")))?;
            if i % 4 == 0 {
                self.db.create_tag::<Frozen>(entity)?;
            }
            if i % 2 == 1 {
                self.db.create_component(entity, Lifetime(30 + 7 * i as u32))?;
            }
            spawned.push(entity);
        }

        info!(count, "spawned bodies");
        Ok(spawned)
    }

    pub fn tick(&mut self) -> Result<(), DbError> {
        physics_system(&mut self.db, TICK_DURATION_SECS);
        let expired = age_system(&mut self.db)?;
        let culled = cull_system(&mut self.db)?;
        self.culled += culled;
        self.time.advance_tick();

        if expired > 0 || culled > 0 {
            debug!(tick = self.time.tick_count(), expired, culled, "tick");
        }
        Ok(())
    }

    pub fn run(&mut self, ticks: u64) -> Result<Summary, DbError> {
        for _ in 0..ticks {
            self.tick()?;
        }
        Ok(self.summary())
    }

    pub fn summary(&mut self) -> Summary {
        let frozen = self.db.query::<Tag<Frozen>>().len();
        Summary {
            ticks: self.time.tick_count(),
            alive: self.db.len(),
            frozen,
            culled: self.culled,
        }
    }

    /// Name and position of every body, in spawn order.
    pub fn report(&mut self) -> Vec<(Name, Position)> {
        self.db.query::<(&Name, &Position)>()
    }
}
