use std::ops::{Add, Mul, Sub};

/// A point or direction in the plane
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn norm(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(&self, other: &Vec2) -> f32 {
        (*self - *other).norm()
    }

    /// Unit vector in the same direction, or zero for a zero vector
    pub fn normalized(&self) -> Vec2 {
        let norm = self.norm();
        if norm > 0.0 {
            Vec2::new(self.x / norm, self.y / norm)
        } else {
            Vec2::default()
        }
    }

    pub fn clamp(&self, min: f32, max: f32) -> Vec2 {
        Vec2::new(self.x.clamp(min, max), self.y.clamp(min, max))
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Kinematic state of one agent: position and velocity
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AgentState {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl AgentState {
    /// An agent at rest at the given position
    pub fn at_rest(position: Vec2) -> Self {
        Self {
            x: position.x,
            y: position.y,
            vx: 0.0,
            vy: 0.0,
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn velocity(&self) -> Vec2 {
        Vec2::new(self.vx, self.vy)
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.x = position.x;
        self.y = position.y;
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.x, self.y, self.vx, self.vy]
    }
}

/// Flatten agent states row-major into `[n * 4]`
pub fn flatten_states(states: &[AgentState]) -> Vec<f32> {
    states.iter().flat_map(|s| s.to_array()).collect()
}

/// Flatten goal positions row-major into `[n * 2]`
pub fn flatten_goals(goals: &[Vec2]) -> Vec<f32> {
    goals.iter().flat_map(|g| [g.x, g.y]).collect()
}

/// Mean distance between each agent and its goal
pub fn mean_goal_distance(states: &[AgentState], goals: &[Vec2]) -> f32 {
    if states.is_empty() {
        return 0.0;
    }
    let total: f32 = states
        .iter()
        .zip(goals)
        .map(|(s, g)| s.position().distance(g))
        .sum();
    total / states.len() as f32
}
