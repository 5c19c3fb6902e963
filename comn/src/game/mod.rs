pub mod entities;
pub mod level;
pub mod run;

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use nalgebra as na;

use entities::{BotEntity, Bullet, PlayerEntity};
use level::{Level, LevelError};

use crate::GameTime;

pub use entities::{Entity, Input};

pub type Time = f32;
pub type Vector = na::Vector2<f32>;
pub type Point = na::Point2<f32>;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    InvalidEntityId(EntityId),
    InvalidPlayerId(PlayerId),
    UnexpectedEntityType,
    InvalidLevel(LevelError),
}

impl From<LevelError> for Error {
    fn from(err: LevelError) -> Self {
        Error::InvalidLevel(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub max_num_players: usize,
    pub ticks_per_second: usize,
    pub size: Vector,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_num_players: 16,
            ticks_per_second: 60,
            size: Vector::new(1200.0, 700.0),
        }
    }
}

impl Settings {
    pub fn tick_period(&self) -> GameTime {
        1.0 / (self.ticks_per_second as f32)
    }

    pub fn tick_game_time(&self, tick_num: TickNum) -> GameTime {
        self.tick_period() * tick_num.0 as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl PlayerId {
    pub fn next(&self) -> PlayerId {
        PlayerId(self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl EntityId {
    pub fn next(&self) -> EntityId {
        EntityId(self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TickNum(pub u32);

impl TickNum {
    pub fn next(&self) -> TickNum {
        TickNum(self.0 + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    TankDestroyed { victim: EntityId, killer: EntityId },
    PlayerDied { player_id: PlayerId, killer: EntityId },
    LevelStarted { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerState {
    Alive,
    Dead,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub state: PlayerState,
}

pub type PlayerMap = BTreeMap<PlayerId, Player>;
pub type EntityMap = BTreeMap<EntityId, Entity>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankView {
    pub id: EntityId,
    pub name: Option<String>,
    pub pos: Point,
    pub tank_angle: f32,
    pub turret_angle: f32,
    pub ammo: u32,
    pub kills: u32,
    pub deaths: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletView {
    pub id: EntityId,
    pub owner: EntityId,
    pub pos: Point,
    pub angle: f32,
}

/// Authoritative state of one arena: the players that joined, every live
/// entity and the current level.
#[derive(Debug, Clone)]
pub struct Game {
    pub settings: Settings,
    pub tick_num: TickNum,
    pub players: PlayerMap,
    pub entities: EntityMap,
    pub level: Level,
    pub inputs: BTreeMap<PlayerId, Input>,
    pub level_transition_time: Option<GameTime>,
    /// Bots shot down since the current level started.
    pub bots_destroyed: u32,
    next_player_id: PlayerId,
    next_entity_id: EntityId,
}

impl Game {
    pub fn new(settings: Settings, level: Level) -> Self {
        Self {
            settings,
            tick_num: TickNum(0),
            players: BTreeMap::new(),
            entities: BTreeMap::new(),
            level,
            inputs: BTreeMap::new(),
            level_transition_time: None,
            bots_destroyed: 0,
            next_player_id: PlayerId(0),
            next_entity_id: EntityId(0),
        }
    }

    pub fn tick_game_time(&self, tick_num: TickNum) -> GameTime {
        self.settings.tick_game_time(tick_num)
    }

    pub fn current_game_time(&self) -> GameTime {
        self.tick_game_time(self.tick_num)
    }

    pub fn add_entity(&mut self, entity: Entity) -> EntityId {
        let entity_id = self.next_entity_id;
        self.next_entity_id = entity_id.next();
        self.entities.insert(entity_id, entity);

        entity_id
    }

    pub fn add_player(&mut self, name: String) -> PlayerId {
        let player_id = self.next_player_id;
        self.next_player_id = player_id.next();

        self.players.insert(
            player_id,
            Player {
                name,
                state: PlayerState::Alive,
            },
        );
        self.spawn_player(player_id);

        player_id
    }

    /// Removes the player together with its tank. Bullets already in flight
    /// stay.
    pub fn remove_player(&mut self, player_id: PlayerId) -> Result<Player> {
        let entity_id = self.get_player_entity(player_id)?.map(|(id, _)| id);
        let player = self
            .players
            .remove(&player_id)
            .ok_or(Error::InvalidPlayerId(player_id))?;

        if let Some(entity_id) = entity_id {
            self.entities.remove(&entity_id);
        }
        self.inputs.remove(&player_id);

        Ok(player)
    }

    pub fn set_input(&mut self, player_id: PlayerId, input: Input) -> Result<()> {
        if !self.players.contains_key(&player_id) {
            return Err(Error::InvalidPlayerId(player_id));
        }

        self.inputs.insert(player_id, input);
        Ok(())
    }

    pub fn get_player_entity(
        &self,
        player_id: PlayerId,
    ) -> Result<Option<(EntityId, &PlayerEntity)>> {
        if !self.players.contains_key(&player_id) {
            return Err(Error::InvalidPlayerId(player_id));
        }

        Ok(self.entities.iter().find_map(|(&id, e)| match e {
            Entity::Player(player) if player.owner == player_id => Some((id, player)),
            _ => None,
        }))
    }

    pub fn get_player_entity_mut(
        &mut self,
        player_id: PlayerId,
    ) -> Result<Option<(EntityId, &mut PlayerEntity)>> {
        if !self.players.contains_key(&player_id) {
            return Err(Error::InvalidPlayerId(player_id));
        }

        Ok(self.entities.iter_mut().find_map(|(&id, e)| match e {
            Entity::Player(player) if player.owner == player_id => Some((id, player)),
            _ => None,
        }))
    }

    pub fn get_bot(&self, entity_id: EntityId) -> Result<&BotEntity> {
        self.entities
            .get(&entity_id)
            .ok_or(Error::InvalidEntityId(entity_id))?
            .bot()
            .ok_or(Error::UnexpectedEntityType)
    }

    pub fn get_bot_mut(&mut self, entity_id: EntityId) -> Result<&mut BotEntity> {
        self.entities
            .get_mut(&entity_id)
            .ok_or(Error::InvalidEntityId(entity_id))?
            .bot_mut()
            .ok_or(Error::UnexpectedEntityType)
    }

    pub fn bot_ids(&self) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, e)| e.bot().is_some())
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn num_alive_players(&self) -> usize {
        self.entities
            .values()
            .filter(|e| matches!(e, Entity::Player(_)))
            .count()
    }

    pub fn entity_pos(&self, entity_id: Option<EntityId>) -> Option<Point> {
        entity_id
            .and_then(|id| self.entities.get(&id))
            .map(Entity::pos)
    }

    /// Tanks other than `entity_id`, as targeting candidates.
    pub fn other_tanks(&self, entity_id: EntityId) -> Vec<(EntityId, Point)> {
        self.entities
            .iter()
            .filter(|(&id, e)| id != entity_id && e.tank().is_some() && !e.is_destroyed())
            .map(|(&id, e)| (id, e.pos()))
            .collect()
    }

    /// Fires one bullet from the bot's turret if its gate allows it.
    pub fn try_bot_shoot(&mut self, entity_id: EntityId) -> Result<Option<EntityId>> {
        use entities::Shooter;

        let time = self.current_game_time();
        let bot = self.get_bot(entity_id)?;
        let target_pos = self.entity_pos(bot.target);

        if !bot.can_shoot(time, &self.level, target_pos) {
            return Ok(None);
        }

        let bullet = self.get_bot_mut(entity_id)?.shoot(entity_id, time);
        Ok(Some(self.add_entity(Entity::Bullet(bullet))))
    }

    fn spawn_player(&mut self, player_id: PlayerId) {
        let spawns = self.level.player_spawns();
        let num_spawned = self.num_alive_players();
        let pos = if spawns.is_empty() {
            Point::from(self.settings.size / 2.0)
        } else {
            spawns[num_spawned % spawns.len()]
        };

        self.add_entity(Entity::Player(PlayerEntity::new(player_id, pos)));

        if let Some(player) = self.players.get_mut(&player_id) {
            player.state = PlayerState::Alive;
        }
    }

    pub fn spawn_bots<R: Rng>(&mut self, rng: &mut R) -> Vec<EntityId> {
        let spawns = self.level.bot_spawns().to_vec();

        spawns
            .into_iter()
            .map(|pos| {
                let tank_angle = rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI);
                self.add_entity(Entity::Bot(BotEntity::new(pos, tank_angle)))
            })
            .collect()
    }

    /// Clears the arena and repopulates it from the current grid.
    fn restart_level<R: Rng>(&mut self, rng: &mut R) {
        self.entities.clear();
        self.level_transition_time = None;
        self.bots_destroyed = 0;

        let player_ids: Vec<PlayerId> = self.players.keys().copied().collect();
        for player_id in player_ids {
            self.spawn_player(player_id);
        }

        self.spawn_bots(rng);
    }

    pub fn advance_level<R: Rng>(&mut self, rng: &mut R) -> Event {
        self.level.advance();
        self.restart_level(rng);

        Event::LevelStarted {
            index: self.level.current_index(),
        }
    }

    pub fn make_level<R: Rng>(&mut self, index: usize, rng: &mut R) -> Result<Event> {
        self.level.make_level(index)?;
        self.restart_level(rng);

        Ok(Event::LevelStarted { index })
    }

    pub fn tank_views(&self) -> (Vec<TankView>, Vec<TankView>) {
        let mut players = Vec::new();
        let mut bots = Vec::new();

        for (&id, entity) in self.entities.iter() {
            let tank = match entity.tank() {
                Some(tank) => tank,
                None => continue,
            };
            let name = match entity {
                Entity::Player(player) => self.players.get(&player.owner).map(|p| p.name.clone()),
                _ => None,
            };
            let view = TankView {
                id,
                name,
                pos: tank.body.pos,
                tank_angle: tank.tank_angle,
                turret_angle: tank.turret_angle,
                ammo: tank.ammo,
                kills: tank.kills,
                deaths: tank.deaths,
            };

            if entity.bot().is_some() {
                bots.push(view);
            } else {
                players.push(view);
            }
        }

        (players, bots)
    }

    pub fn bullet_views(&self) -> Vec<BulletView> {
        self.entities
            .iter()
            .filter_map(|(&id, e)| e.bullet().map(|b| (id, b)))
            .map(|(id, bullet): (EntityId, &Bullet)| BulletView {
                id,
                owner: bullet.owner,
                pos: bullet.body.pos,
                angle: bullet.angle,
            })
            .collect()
    }
}
