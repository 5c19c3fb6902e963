use serde::{Deserialize, Serialize};

use crate::{
    entity::Body,
    game::{level::Level, run, EntityId, PlayerId, Point, Vector},
    geom, GameTime,
};

/// Length of the state vector produced by `BotEntity::observe`.
pub const OBSERVATION_LEN: usize = crate::game::level::SURROUNDINGS_LEN + 5;

pub type Observation = Vec<f32>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entity {
    Player(PlayerEntity),
    Bot(BotEntity),
    Bullet(Bullet),
}

impl Entity {
    pub fn body(&self) -> &Body {
        match self {
            Entity::Player(e) => &e.tank.body,
            Entity::Bot(e) => &e.tank.body,
            Entity::Bullet(e) => &e.body,
        }
    }

    pub fn pos(&self) -> Point {
        self.body().pos
    }

    pub fn tank(&self) -> Option<&Tank> {
        match self {
            Entity::Player(e) => Some(&e.tank),
            Entity::Bot(e) => Some(&e.tank),
            Entity::Bullet(_) => None,
        }
    }

    pub fn tank_mut(&mut self) -> Option<&mut Tank> {
        match self {
            Entity::Player(e) => Some(&mut e.tank),
            Entity::Bot(e) => Some(&mut e.tank),
            Entity::Bullet(_) => None,
        }
    }

    pub fn bot(&self) -> Option<&BotEntity> {
        if let Entity::Bot(e) = self {
            Some(e)
        } else {
            None
        }
    }

    pub fn bot_mut(&mut self) -> Option<&mut BotEntity> {
        if let Entity::Bot(e) = self {
            Some(e)
        } else {
            None
        }
    }

    pub fn bullet(&self) -> Option<&Bullet> {
        if let Entity::Bullet(e) = self {
            Some(e)
        } else {
            None
        }
    }

    pub fn is_destroyed(&self) -> bool {
        match self {
            Entity::Player(e) => e.tank.destroyed,
            Entity::Bot(e) => e.tank.destroyed,
            Entity::Bullet(e) => e.destroyed,
        }
    }

    pub fn update(&mut self, dt: GameTime, level: &Level) {
        match self {
            Entity::Player(e) => e.update(dt, level),
            Entity::Bot(e) => e.update(dt, level),
            Entity::Bullet(e) => e.update(dt, level),
        }
    }
}

/// Things that integrate their velocity every tick and resolve contact with
/// walls and the world edge.
pub trait Movable {
    fn body(&self) -> &Body;

    fn update(&mut self, dt: GameTime, level: &Level);
}

/// Things that fire bullets.
pub trait Shooter {
    fn tank(&self) -> &Tank;

    fn tank_mut(&mut self) -> &mut Tank;

    /// Cooldown and ammo gate shared by all shooters.
    fn is_ready(&self, time: GameTime) -> bool {
        let tank = self.tank();
        let since_last = tank.last_shot_time.map_or(std::f32::INFINITY, |t| time - t);

        since_last >= tank.shot_cooldown && tank.ammo > 0
    }

    /// Fires one bullet from the turret muzzle. Does not check the gate.
    fn shoot(&mut self, owner: EntityId, time: GameTime) -> Bullet {
        let tank = self.tank_mut();
        tank.ammo = tank.ammo.saturating_sub(1);
        tank.last_shot_time = Some(time);

        Bullet::new(owner, tank.body.pos, tank.turret_angle)
    }
}

/// Things that track the nearest other actor.
pub trait TargetSeeker {
    fn target(&self) -> Option<EntityId>;

    /// Picks the closest candidate, or none if there are no candidates.
    fn retarget<I>(&mut self, candidates: I)
    where
        I: IntoIterator<Item = (EntityId, Point)>;

    /// Distance to the target's position, infinite without a target.
    fn distance_to_target(&self, target_pos: Option<Point>) -> f32;
}

/// State shared by human and bot tanks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tank {
    pub body: Body,
    pub tank_angle: f32,
    pub turret_angle: f32,
    pub turn_rate: f32,
    pub speed: f32,
    pub shot_cooldown: GameTime,
    pub last_shot_time: Option<GameTime>,
    pub ammo: u32,
    pub kills: u32,
    pub deaths: u32,
    pub destroyed: bool,
}

impl Tank {
    pub fn new(pos: Point, speed: f32, shot_cooldown: GameTime) -> Self {
        Self {
            body: Body::new(pos, run::TANK_HITBOX),
            tank_angle: 0.0,
            turret_angle: 0.0,
            turn_rate: 0.0,
            speed,
            shot_cooldown,
            last_shot_time: None,
            ammo: run::TANK_AMMO,
            kills: 0,
            deaths: 0,
            destroyed: false,
        }
    }

    pub fn update(&mut self, dt: GameTime, level: &Level) {
        let prev_pos = self.body.pos;

        self.body.pos += self.body.vel * dt;
        self.body.bound_to_world(level.canvas());
        self.resolve_walls(level, prev_pos);
        self.tank_angle = geom::normalize_angle(self.tank_angle + self.turn_rate * dt);
    }

    /// Slides along wall faces instead of passing through them.
    fn resolve_walls(&mut self, level: &Level, prev_pos: Point) {
        let pos = &mut self.body.pos;

        for wall in level.walls() {
            let rect = wall.aa_rect().inflate(self.body.hitbox);
            let (min, max) = (rect.min(), rect.max());

            if geom::in_bound(pos.y, min.y, max.y) {
                pos.x = geom::reverse_bound(pos.x, prev_pos.x, min.x, max.x);
            }
            if geom::in_bound(pos.x, min.x, max.x) {
                pos.y = geom::reverse_bound(pos.y, prev_pos.y, min.y, max.y);
            }
        }
    }
}

/// Last action reported by a client. Missing fields decode as not pressed
/// and, for the turret, as unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Input {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub shoot: bool,
    pub turret_angle: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerEntity {
    pub owner: PlayerId,
    pub tank: Tank,
}

impl PlayerEntity {
    pub fn new(owner: PlayerId, pos: Point) -> Self {
        Self {
            owner,
            tank: Tank::new(pos, run::PLAYER_MOVE_SPEED, run::PLAYER_SHOOT_PERIOD),
        }
    }

    pub fn apply_input(&mut self, input: &Input) {
        let tank = &mut self.tank;

        tank.body.vel = if input.up && !input.down {
            geom::from_polar(tank.speed, tank.tank_angle)
        } else if input.down && !input.up {
            geom::from_polar(-tank.speed, tank.tank_angle)
        } else {
            Vector::zeros()
        };

        tank.turn_rate = if input.right && !input.left {
            run::TANK_TURN_RATE
        } else if input.left && !input.right {
            -run::TANK_TURN_RATE
        } else {
            0.0
        };

        if let Some(turret_angle) = input.turret_angle {
            tank.turret_angle = turret_angle;
        }
    }
}

impl Movable for PlayerEntity {
    fn body(&self) -> &Body {
        &self.tank.body
    }

    fn update(&mut self, dt: GameTime, level: &Level) {
        self.tank.update(dt, level);
    }
}

impl Shooter for PlayerEntity {
    fn tank(&self) -> &Tank {
        &self.tank
    }

    fn tank_mut(&mut self) -> &mut Tank {
        &mut self.tank
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotAction {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
}

impl BotAction {
    pub const ALL: [BotAction; 4] = [
        BotAction::Forward,
        BotAction::Backward,
        BotAction::TurnLeft,
        BotAction::TurnRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<BotAction> {
        Self::ALL.get(index).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotEntity {
    pub tank: Tank,
    pub target: Option<EntityId>,
    pub target_angle: f32,
}

impl BotEntity {
    pub fn new(pos: Point, tank_angle: f32) -> Self {
        let mut tank = Tank::new(pos, run::BOT_MOVE_SPEED, run::BOT_SHOOT_PERIOD);
        tank.tank_angle = tank_angle;

        Self {
            tank,
            target: None,
            target_angle: 0.0,
        }
    }

    /// Applies exactly one discrete action. Turning stops translation and
    /// translating stops turning.
    pub fn move_agent(&mut self, action: BotAction) {
        let tank = &mut self.tank;

        match action {
            BotAction::TurnLeft => {
                tank.body.vel = Vector::zeros();
                tank.turn_rate = -run::TANK_TURN_RATE;
            }
            BotAction::TurnRight => {
                tank.body.vel = Vector::zeros();
                tank.turn_rate = run::TANK_TURN_RATE;
            }
            BotAction::Forward => {
                tank.body.vel = geom::from_polar(tank.speed, tank.tank_angle);
                tank.turn_rate = 0.0;
            }
            BotAction::Backward => {
                tank.body.vel = geom::from_polar(-tank.speed, tank.tank_angle);
                tank.turn_rate = 0.0;
            }
        }
    }

    /// Remembers the angle towards the target position.
    pub fn aim_at(&mut self, target_pos: Option<Point>) {
        if let Some(target_pos) = target_pos {
            self.target_angle = geom::normalize_angle(geom::angle(target_pos - self.tank.body.pos));
        }
    }

    /// Nudges the turret by a fixed step towards `target_angle`, going the
    /// short way around at +-PI.
    pub fn update_turret_angle(&mut self, target_angle: f32) {
        let current = self.tank.turret_angle;
        let positive = geom::normalize_angle(current + run::TURRET_NUDGE);
        let negative = geom::normalize_angle(current - run::TURRET_NUDGE);
        let half_turn = std::f32::consts::PI;

        self.tank.turret_angle = if target_angle < 0.0 {
            if current < 0.0 {
                if current < target_angle {
                    positive
                } else {
                    negative
                }
            } else if current - target_angle <= half_turn {
                negative
            } else {
                positive
            }
        } else if current < 0.0 {
            if target_angle - current <= half_turn {
                positive
            } else {
                negative
            }
        } else if current < target_angle {
            positive
        } else {
            negative
        };
    }

    pub fn is_target_in_sight(&self) -> bool {
        geom::angle_dist(self.target_angle, self.tank.turret_angle).abs() <= run::BOT_AIM_TOLERANCE
    }

    /// Line of sight, alignment, cooldown and ammo.
    pub fn can_shoot(&self, time: GameTime, level: &Level, target_pos: Option<Point>) -> bool {
        match target_pos {
            Some(target_pos) => {
                level.is_reachable(self.tank.body.pos, self.tank.turret_angle, target_pos)
                    && self.is_target_in_sight()
                    && self.is_ready(time)
            }
            None => false,
        }
    }

    /// Position one hitbox diameter ahead in the direction of travel.
    pub fn projected_pos(&self) -> Point {
        let body = &self.tank.body;
        body.pos + geom::normalize_or_zero(body.vel) * body.hitbox * 2.0
    }

    pub fn is_next_pos_in_wall(&self, level: &Level) -> bool {
        level.is_point_in_wall(self.projected_pos())
    }

    pub fn is_moving_toward(&self, target_pos: Option<Point>) -> bool {
        let body = &self.tank.body;

        match target_pos {
            Some(target_pos) => body.vel.norm_squared() > 0.0 && body.vel.dot(&(target_pos - body.pos)) > 0.0,
            None => false,
        }
    }

    pub fn observe(&self, level: &Level, target_pos: Option<Point>) -> Observation {
        let pos = self.tank.body.pos;
        let mut observation: Observation = level
            .surroundings(pos)
            .iter()
            .map(|&cell| cell as f32)
            .collect();

        let normalized = level.coordinates_normalized(pos);
        observation.push(normalized.x);
        observation.push(normalized.y);

        match target_pos {
            Some(target_pos) => {
                let heading = geom::angle_dist(geom::angle(target_pos - pos), self.tank.tank_angle);
                let diagonal = level.canvas().norm();

                observation.push(heading / std::f32::consts::PI);
                observation.push((geom::distance(pos, target_pos) / diagonal).min(1.0));
                observation.push(1.0);
            }
            None => {
                observation.push(0.0);
                observation.push(1.0);
                observation.push(0.0);
            }
        }

        observation
    }
}

impl Movable for BotEntity {
    fn body(&self) -> &Body {
        &self.tank.body
    }

    fn update(&mut self, dt: GameTime, level: &Level) {
        self.tank.update(dt, level);
    }
}

impl Shooter for BotEntity {
    fn tank(&self) -> &Tank {
        &self.tank
    }

    fn tank_mut(&mut self) -> &mut Tank {
        &mut self.tank
    }
}

impl TargetSeeker for BotEntity {
    fn target(&self) -> Option<EntityId> {
        self.target
    }

    fn retarget<I>(&mut self, candidates: I)
    where
        I: IntoIterator<Item = (EntityId, Point)>,
    {
        let pos = self.tank.body.pos;

        self.target = candidates
            .into_iter()
            .map(|(id, other_pos)| (id, (other_pos - pos).norm_squared()))
            .min_by(|(_, d1), (_, d2)| d1.partial_cmp(d2).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(id, _)| id);
    }

    fn distance_to_target(&self, target_pos: Option<Point>) -> f32 {
        target_pos.map_or(std::f32::INFINITY, |target_pos| {
            geom::distance(self.tank.body.pos, target_pos)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bullet {
    pub owner: EntityId,
    pub body: Body,
    pub angle: f32,
    pub bounces_left: i32,
    pub distance_traveled: f32,
    pub destroyed: bool,
}

impl Bullet {
    pub fn new(owner: EntityId, shooter_pos: Point, angle: f32) -> Self {
        let dir = geom::from_polar(1.0, angle);
        let mut body = Body::new(shooter_pos + dir * run::BULLET_SPAWN_OFFSET, run::BULLET_HITBOX);
        body.vel = dir * run::BULLET_MOVE_SPEED;

        Self {
            owner,
            body,
            angle,
            bounces_left: run::BULLET_BOUNCES,
            distance_traveled: 0.0,
            destroyed: false,
        }
    }

    fn bounce(&mut self, angle: f32) {
        self.angle = geom::normalize_angle(angle);
        self.body.vel = geom::from_polar(run::BULLET_MOVE_SPEED, self.angle);
        self.bounces_left -= 1;

        if self.bounces_left <= 0 {
            self.destroyed = true;
        }
    }

    /// Bounces off the first wall face the hitbox crossed this tick.
    fn resolve_walls(&mut self, level: &Level, prev_pos: Point) {
        for wall in level.walls() {
            if self.destroyed {
                return;
            }

            let rect = wall.aa_rect().inflate(self.body.hitbox);
            if !rect.contains_point(self.body.pos) {
                continue;
            }

            let (min, max) = (rect.min(), rect.max());
            if geom::reverse_bounce(self.body.pos.x, prev_pos.x, min.x, max.x) {
                self.body.pos = prev_pos;
                self.bounce(std::f32::consts::PI - self.angle);
            } else if geom::reverse_bounce(self.body.pos.y, prev_pos.y, min.y, max.y) {
                self.body.pos = prev_pos;
                self.bounce(-self.angle);
            }
        }
    }

    fn resolve_world_edges(&mut self, size: Vector) {
        if !self.destroyed && !geom::in_bound(self.body.pos.x, 0.0, size.x) {
            self.body.pos.x = geom::bound(self.body.pos.x, 0.0, size.x);
            self.bounce(std::f32::consts::PI - self.angle);
        }
        if !self.destroyed && !geom::in_bound(self.body.pos.y, 0.0, size.y) {
            self.body.pos.y = geom::bound(self.body.pos.y, 0.0, size.y);
            self.bounce(-self.angle);
        }
    }
}

impl Movable for Bullet {
    fn body(&self) -> &Body {
        &self.body
    }

    fn update(&mut self, dt: GameTime, level: &Level) {
        if self.destroyed {
            return;
        }

        let prev_pos = self.body.pos;
        let step = self.body.vel * dt;

        self.body.pos += step;
        self.distance_traveled += step.norm();

        self.resolve_walls(level, prev_pos);
        self.resolve_world_edges(level.canvas());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::level::parse_levels;

    fn open_level() -> Level {
        let grids = parse_levels("...\n...\n...\n").unwrap();
        Level::new(grids, Vector::new(1200.0, 700.0)).unwrap()
    }

    fn bot_with_turret(turret_angle: f32) -> BotEntity {
        let mut bot = BotEntity::new(Point::new(0.0, 0.0), 0.0);
        bot.tank.turret_angle = turret_angle;
        bot
    }

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 0.005, "{} is not close to {}", a, b);
    }

    #[test]
    fn turret_steers_the_short_way() {
        let mut bot = bot_with_turret(-3.1);
        bot.update_turret_angle(3.1);
        assert_close(bot.tank.turret_angle, -3.12);

        let mut bot = bot_with_turret(-3.14);
        bot.update_turret_angle(3.1);
        assert_close(bot.tank.turret_angle, 3.12);

        let mut bot = bot_with_turret(3.14);
        bot.update_turret_angle(-3.1);
        assert_close(bot.tank.turret_angle, -3.12);

        let mut bot = bot_with_turret(3.1);
        bot.update_turret_angle(-3.1);
        assert_close(bot.tank.turret_angle, 3.12);
    }

    #[test]
    fn turret_steers_directly_on_same_side() {
        let mut bot = bot_with_turret(0.5);
        bot.update_turret_angle(1.0);
        assert_close(bot.tank.turret_angle, 0.52);

        let mut bot = bot_with_turret(-0.5);
        bot.update_turret_angle(-1.0);
        assert_close(bot.tank.turret_angle, -0.52);

        let mut bot = bot_with_turret(-0.1);
        bot.update_turret_angle(0.1);
        assert_close(bot.tank.turret_angle, -0.08);
    }

    #[test]
    fn distance_to_target() {
        let bot = BotEntity::new(Point::new(0.0, 0.0), 0.0);

        assert_close(bot.distance_to_target(Some(Point::new(0.0, 0.0))), 0.0);
        assert_close(bot.distance_to_target(Some(Point::new(0.0, 100.0))), 100.0);
        assert_close(bot.distance_to_target(Some(Point::new(-100.0, 0.0))), 100.0);
        assert_eq!(bot.distance_to_target(None), std::f32::INFINITY);
    }

    #[test]
    fn retarget_picks_nearest() {
        let mut bot = BotEntity::new(Point::new(0.0, 0.0), 0.0);

        bot.retarget(vec![
            (EntityId(1), Point::new(300.0, 0.0)),
            (EntityId(2), Point::new(0.0, 50.0)),
            (EntityId(3), Point::new(-100.0, -100.0)),
        ]);
        assert_eq!(bot.target(), Some(EntityId(2)));

        bot.retarget(Vec::new());
        assert_eq!(bot.target(), None);
    }

    #[test]
    fn move_agent_is_exclusive() {
        let mut bot = BotEntity::new(Point::new(100.0, 100.0), 0.0);

        bot.move_agent(BotAction::Forward);
        assert!(bot.tank.body.vel.x > 0.0);
        assert_eq!(bot.tank.turn_rate, 0.0);

        bot.move_agent(BotAction::TurnLeft);
        assert_eq!(bot.tank.body.vel, Vector::zeros());
        assert!(bot.tank.turn_rate < 0.0);

        bot.move_agent(BotAction::Backward);
        assert!(bot.tank.body.vel.x < 0.0);
        assert_eq!(bot.tank.turn_rate, 0.0);

        bot.move_agent(BotAction::TurnRight);
        assert_eq!(bot.tank.body.vel, Vector::zeros());
        assert!(bot.tank.turn_rate > 0.0);
    }

    #[test]
    fn action_indices_round_trip() {
        for (i, action) in BotAction::ALL.iter().enumerate() {
            assert_eq!(action.index(), i);
            assert_eq!(BotAction::from_index(i), Some(*action));
        }
        assert_eq!(BotAction::from_index(4), None);
    }

    #[test]
    fn shooter_gate_needs_cooldown_and_ammo() {
        let mut player = PlayerEntity::new(PlayerId(1), Point::new(100.0, 100.0));
        assert!(player.is_ready(0.0));

        let bullet = player.shoot(EntityId(7), 0.0);
        assert_eq!(bullet.owner, EntityId(7));
        assert_eq!(player.tank.ammo, run::TANK_AMMO - 1);
        assert!(!player.is_ready(run::PLAYER_SHOOT_PERIOD / 2.0));
        assert!(player.is_ready(run::PLAYER_SHOOT_PERIOD));

        player.tank.ammo = 0;
        assert!(!player.is_ready(100.0));
    }

    #[test]
    fn missing_input_fields_leave_turret_alone() {
        let mut player = PlayerEntity::new(PlayerId(1), Point::new(100.0, 100.0));
        player.tank.turret_angle = 1.0;

        player.apply_input(&Input::default());
        assert_eq!(player.tank.turret_angle, 1.0);
        assert_eq!(player.tank.body.vel, Vector::zeros());
        assert_eq!(player.tank.turn_rate, 0.0);

        player.apply_input(&Input {
            up: true,
            down: true,
            right: true,
            turret_angle: Some(-2.0),
            ..Input::default()
        });
        assert_eq!(player.tank.body.vel, Vector::zeros());
        assert_eq!(player.tank.turn_rate, run::TANK_TURN_RATE);
        assert_eq!(player.tank.turret_angle, -2.0);
    }

    #[test]
    fn tank_slides_along_wall_face() {
        let grids = parse_levels("...\n.W.\n...\n").unwrap();
        let level = Level::new(grids, Vector::new(1200.0, 700.0)).unwrap();
        let wall = level.walls()[0].clone();

        // Approach the left face while also moving down.
        let start = Point::new(wall.min_x() - run::TANK_HITBOX - 1.0, wall.pos().y);
        let mut tank = Tank::new(start, 100.0, 0.2);
        tank.body.vel = Vector::new(600.0, 300.0);
        tank.update(1.0 / 60.0, &level);

        assert_close(tank.body.pos.x, wall.min_x() - run::TANK_HITBOX);
        assert!(tank.body.pos.y > start.y);
    }

    #[test]
    fn bullet_bounces_off_world_edge_until_budget_runs_out() {
        let level = open_level();
        let mut bullet = Bullet::new(EntityId(1), Point::new(1190.0, 350.0), 0.0);
        let start_budget = bullet.bounces_left;

        let mut last_budget = start_budget;
        for _ in 0..2000 {
            bullet.update(1.0 / 60.0, &level);
            assert!(bullet.bounces_left <= last_budget);
            if bullet.bounces_left < last_budget {
                assert_eq!(bullet.bounces_left, last_budget - 1);
                last_budget = bullet.bounces_left;
            }
            assert_eq!(bullet.destroyed, bullet.bounces_left <= 0);
            if bullet.destroyed {
                break;
            }
        }

        assert!(bullet.destroyed);
        assert_eq!(bullet.bounces_left, 0);
    }

    fn walled_level() -> Level {
        let grids = parse_levels("...\n.W.\n...\n").unwrap();
        Level::new(grids, Vector::new(1200.0, 700.0)).unwrap()
    }

    fn bullet_at(pos: Point, angle: f32) -> Bullet {
        let mut bullet = Bullet::new(EntityId(1), pos, angle);
        bullet.body.pos = pos;
        bullet
    }

    #[test]
    fn bullet_reflects_off_vertical_wall_face() {
        let level = walled_level();
        let wall = level.walls()[0].clone();
        let start = Point::new(wall.min_x() - run::BULLET_HITBOX - 3.0, wall.pos().y);
        let mut bullet = bullet_at(start, 0.0);

        bullet.update(1.0 / 60.0, &level);

        assert_eq!(bullet.body.pos, start);
        assert_close(bullet.angle.abs(), std::f32::consts::PI);
        assert!(bullet.body.vel.x < 0.0);
        assert_eq!(bullet.bounces_left, run::BULLET_BOUNCES - 1);
        assert!(!bullet.destroyed);
    }

    #[test]
    fn bullet_reflects_off_horizontal_wall_face() {
        let level = walled_level();
        let wall = level.walls()[0].clone();
        let start = Point::new(wall.pos().x, wall.min_y() - run::BULLET_HITBOX - 3.0);
        let mut bullet = bullet_at(start, std::f32::consts::FRAC_PI_2);

        bullet.update(1.0 / 60.0, &level);

        assert_eq!(bullet.body.pos, start);
        assert_close(bullet.angle, -std::f32::consts::FRAC_PI_2);
        assert!(bullet.body.vel.y < 0.0);
        assert_eq!(bullet.bounces_left, run::BULLET_BOUNCES - 1);
    }

    #[test]
    fn bullet_hitbox_touches_wall_before_centre() {
        let level = walled_level();
        let wall = level.walls()[0].clone();
        // After one step the centre is still short of the wall face.
        let start = Point::new(wall.min_x() - run::BULLET_HITBOX - 4.0, wall.pos().y);
        let mut bullet = bullet_at(start, 0.0);

        bullet.update(1.0 / 60.0, &level);

        assert_eq!(bullet.bounces_left, run::BULLET_BOUNCES - 1);
        assert!(bullet.body.pos.x < wall.min_x());
    }

    #[test]
    fn tank_touching_wall_fires_outside_of_it() {
        let level = walled_level();
        let wall = level.walls()[0].clone();
        let mut player = PlayerEntity::new(PlayerId(1), Point::new(100.0, wall.pos().y));
        player.tank.body.vel = Vector::new(run::PLAYER_MOVE_SPEED, 0.0);
        for _ in 0..120 {
            player.update(1.0 / 60.0, &level);
        }
        assert_close(player.tank.body.pos.x, wall.min_x() - run::TANK_HITBOX);

        let mut bullet = player.shoot(EntityId(1), 0.0);
        assert!(!wall.aa_rect().inflate(bullet.body.hitbox).contains_point(bullet.body.pos));

        for _ in 0..30 {
            bullet.update(1.0 / 60.0, &level);
            assert!(bullet.body.pos.x < wall.min_x());
        }
        assert_eq!(bullet.bounces_left, run::BULLET_BOUNCES - 1);
        assert!(bullet.body.vel.x < 0.0);
    }

    #[test]
    fn observation_has_fixed_length() {
        let level = open_level();
        let bot = BotEntity::new(Point::new(600.0, 350.0), 0.0);

        assert_eq!(bot.observe(&level, None).len(), OBSERVATION_LEN);
        assert_eq!(
            bot.observe(&level, Some(Point::new(100.0, 100.0))).len(),
            OBSERVATION_LEN
        );
    }

    #[test]
    fn moving_toward_target() {
        let mut bot = BotEntity::new(Point::new(100.0, 100.0), 0.0);
        let target = Some(Point::new(500.0, 100.0));

        assert!(!bot.is_moving_toward(target));
        bot.move_agent(BotAction::Forward);
        assert!(bot.is_moving_toward(target));
        bot.move_agent(BotAction::Backward);
        assert!(!bot.is_moving_toward(target));
        assert!(!bot.is_moving_toward(None));
    }
}
