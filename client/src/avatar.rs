//! The local player as seen by the session.
//!
//! Rendering and local physics live outside this crate, so the session only
//! needs something that can report the current [`PlayerState`] and be moved
//! forward in time. [`WanderingAvatar`] is a headless stand-in that walks back
//! and forth at random.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{MapId, PlayerId, PlayerState, Stance};
use std::time::Duration;

/// Source of the local player's state
pub trait LocalAvatar: Send {
    fn state(&self) -> &PlayerState;

    fn advance(&mut self, dt: Duration);
}

const WALK_SPEED: f32 = 125.0;
const FRAME_DURATION: Duration = Duration::from_millis(180);
const WALK_FRAMES: u32 = 4;
const STAND_FRAMES: u32 = 3;

pub struct WanderingAvatar {
    state: PlayerState,
    rng: StdRng,
    /// -1 left, 0 idle, 1 right
    heading: i8,
    until_turn: Duration,
    frame_elapsed: Duration,
    min_x: f32,
    max_x: f32,
}

impl WanderingAvatar {
    pub fn new(name: &str, map: MapId, seed: u64) -> Self {
        let mut state = PlayerState::new(PlayerId::default(), map);
        state.name = name.to_string();

        let mut avatar = Self {
            state,
            rng: StdRng::seed_from_u64(seed),
            heading: 0,
            until_turn: Duration::ZERO,
            frame_elapsed: Duration::ZERO,
            min_x: -400.0,
            max_x: 400.0,
        };
        avatar.pick_heading();
        avatar
    }

    /// Limits wandering to `[min_x, max_x]`.
    pub fn with_bounds(mut self, min_x: f32, max_x: f32) -> Self {
        self.min_x = min_x.min(max_x);
        self.max_x = max_x.max(min_x);
        self.state.x = self.state.x.clamp(self.min_x, self.max_x);
        self
    }

    /// Moves the avatar to another map, as a portal would.
    pub fn enter_map(&mut self, map: MapId, x: f32, y: f32) {
        self.state.map_id = map;
        self.state.x = x.clamp(self.min_x, self.max_x);
        self.state.y = y;
    }

    pub fn state_mut(&mut self) -> &mut PlayerState {
        &mut self.state
    }

    fn pick_heading(&mut self) {
        self.heading = self.rng.gen_range(-1..=1);
        self.until_turn = Duration::from_millis(self.rng.gen_range(500..3000));
    }

    fn set_heading(&mut self, heading: i8) {
        self.heading = heading;
        let stance = if heading == 0 { Stance::Stand1 } else { Stance::Walk1 };
        if self.state.stance != stance {
            self.state.stance = stance;
            self.state.frame = 0;
            self.frame_elapsed = Duration::ZERO;
        }
        if heading != 0 {
            self.state.flipped = heading > 0;
        }
    }
}

impl LocalAvatar for WanderingAvatar {
    fn state(&self) -> &PlayerState {
        &self.state
    }

    fn advance(&mut self, dt: Duration) {
        match self.until_turn.checked_sub(dt) {
            Some(left) if !left.is_zero() => self.until_turn = left,
            _ => self.pick_heading(),
        }
        self.set_heading(self.heading);

        let x = self.state.x + f32::from(self.heading) * WALK_SPEED * dt.as_secs_f32();
        if x <= self.min_x {
            self.state.x = self.min_x;
            self.set_heading(1);
        } else if x >= self.max_x {
            self.state.x = self.max_x;
            self.set_heading(-1);
        } else {
            self.state.x = x;
        }

        self.frame_elapsed += dt;
        let frames = if self.heading == 0 { STAND_FRAMES } else { WALK_FRAMES };
        while self.frame_elapsed >= FRAME_DURATION {
            self.frame_elapsed -= FRAME_DURATION;
            self.state.frame = (self.state.frame + 1) % frames;
        }
    }
}
