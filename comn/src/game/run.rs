use log::debug;
use rand::Rng;

use crate::entities::{Shooter, TargetSeeker};
use crate::{Entity, EntityId, Event, Game, GameResult, GameTime, Input, PlayerId, PlayerState};

pub const PLAYER_MOVE_SPEED: f32 = 200.0;
pub const PLAYER_SHOOT_PERIOD: GameTime = 0.2;
pub const BOT_MOVE_SPEED: f32 = 100.0;
pub const BOT_SHOOT_PERIOD: GameTime = 0.4;
pub const BOT_AIM_TOLERANCE: f32 = 0.1;
pub const TANK_TURN_RATE: f32 = 5.0;
pub const TANK_HITBOX: f32 = 20.0;
pub const TANK_AMMO: u32 = 5;
pub const TURRET_NUDGE: f32 = 0.02;
pub const BULLET_MOVE_SPEED: f32 = 400.0;
pub const BULLET_HITBOX: f32 = 5.0;
pub const BULLET_BOUNCES: i32 = 2;
/// Muzzle distance from the tank centre. Kept below `TANK_HITBOX -
/// BULLET_HITBOX` so a tank touching a wall never spawns a bullet in it.
pub const BULLET_SPAWN_OFFSET: f32 = 8.0;
pub const LEVEL_TRANSITION_DELAY: GameTime = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Interaction {
    Hit {
        bullet: EntityId,
        victim: EntityId,
        shooter: EntityId,
    },
    BulletsCollided {
        bullets: [EntityId; 2],
        owners: [EntityId; 2],
    },
}

impl Game {
    pub fn run_tick(&mut self) -> GameResult<Vec<Event>> {
        let dt = self.settings.tick_period();
        let time = self.current_game_time();

        let mut events = Vec::new();

        self.run_player_inputs(time)?;
        self.run_bot_steering()?;
        self.run_movement(dt);
        self.run_interactions(&mut events);
        self.remove_destroyed();

        self.tick_num = self.tick_num.next();

        Ok(events)
    }

    /// Schedules a level change once the arena is cleared and performs it
    /// after `LEVEL_TRANSITION_DELAY` seconds of game time.
    pub fn update_level_transition<R: Rng>(&mut self, rng: &mut R) -> Option<Event> {
        let time = self.current_game_time();

        match self.level_transition_time {
            None => {
                if self.is_level_cleared() {
                    self.level_transition_time = Some(time + LEVEL_TRANSITION_DELAY);
                }
                None
            }
            Some(transition_time) if time >= transition_time => Some(self.advance_level(rng)),
            Some(_) => None,
        }
    }

    /// All bots are gone, or the last bot has won a fight and nobody is left
    /// for it to face. A level that starts with a single bot and no humans
    /// keeps running.
    pub fn is_level_cleared(&self) -> bool {
        let num_bots = self.bot_ids().len();
        let fought = !self.players.is_empty() || self.bots_destroyed > 0;

        num_bots == 0 || (fought && self.num_alive_players() == 0 && num_bots <= 1)
    }

    fn run_player_inputs(&mut self, time: GameTime) -> GameResult<()> {
        let inputs: Vec<(PlayerId, Input)> = self
            .inputs
            .iter()
            .map(|(&player_id, input)| (player_id, input.clone()))
            .collect();

        for (player_id, input) in inputs {
            let bullet = match self.get_player_entity_mut(player_id)? {
                Some((entity_id, player)) => {
                    player.apply_input(&input);

                    if input.shoot && player.is_ready(time) {
                        Some(player.shoot(entity_id, time))
                    } else {
                        None
                    }
                }
                None => None,
            };

            if let Some(bullet) = bullet {
                self.add_entity(Entity::Bullet(bullet));
            }
        }

        Ok(())
    }

    fn run_bot_steering(&mut self) -> GameResult<()> {
        for bot_id in self.bot_ids() {
            let candidates = self.other_tanks(bot_id);
            let target = {
                let bot = self.get_bot_mut(bot_id)?;
                bot.retarget(candidates);
                bot.target()
            };
            let target_pos = self.entity_pos(target);

            let bot = self.get_bot_mut(bot_id)?;
            bot.aim_at(target_pos);
            if target_pos.is_some() {
                bot.update_turret_angle(bot.target_angle);
            }
        }

        Ok(())
    }

    fn run_movement(&mut self, dt: GameTime) {
        let level = &self.level;
        let mut returned_shots = Vec::new();

        for entity in self.entities.values_mut() {
            let was_destroyed = entity.is_destroyed();
            entity.update(dt, level);

            if let Entity::Bullet(bullet) = entity {
                if bullet.destroyed && !was_destroyed {
                    returned_shots.push(bullet.owner);
                }
            }
        }

        for owner in returned_shots {
            self.return_shot(owner);
        }
    }

    fn run_interactions(&mut self, events: &mut Vec<Event>) {
        let ids: Vec<EntityId> = self.entities.keys().copied().collect();

        for (i, &id_a) in ids.iter().enumerate() {
            for &id_b in &ids[i + 1..] {
                let interaction = match (self.entities.get(&id_a), self.entities.get(&id_b)) {
                    (Some(a), Some(b)) => Self::interaction((id_a, a), (id_b, b)),
                    _ => None,
                };

                if let Some(interaction) = interaction {
                    self.apply_interaction(interaction, events);
                }
            }
        }
    }

    fn interaction(
        (id_a, a): (EntityId, &Entity),
        (id_b, b): (EntityId, &Entity),
    ) -> Option<Interaction> {
        if a.is_destroyed() || b.is_destroyed() || !a.body().collided(b.body()) {
            return None;
        }

        match (a, b) {
            (Entity::Bullet(x), Entity::Bullet(y)) => Some(Interaction::BulletsCollided {
                bullets: [id_a, id_b],
                owners: [x.owner, y.owner],
            }),
            (Entity::Bullet(x), _) if b.tank().is_some() && x.owner != id_b => {
                Some(Interaction::Hit {
                    bullet: id_a,
                    victim: id_b,
                    shooter: x.owner,
                })
            }
            (_, Entity::Bullet(y)) if a.tank().is_some() && y.owner != id_a => {
                Some(Interaction::Hit {
                    bullet: id_b,
                    victim: id_a,
                    shooter: y.owner,
                })
            }
            _ => None,
        }
    }

    fn apply_interaction(&mut self, interaction: Interaction, events: &mut Vec<Event>) {
        match interaction {
            Interaction::Hit {
                bullet,
                victim,
                shooter,
            } => {
                debug!("{:?} destroyed by {:?}", victim, shooter);

                self.destroy(bullet);
                self.destroy(victim);

                if let Some(tank) = self.entities.get_mut(&victim).and_then(Entity::tank_mut) {
                    tank.deaths += 1;
                }
                if self.entities.get(&victim).and_then(Entity::bot).is_some() {
                    self.bots_destroyed += 1;
                }
                if let Some(tank) = self.entities.get_mut(&shooter).and_then(Entity::tank_mut) {
                    tank.kills += 1;
                    tank.ammo += 1;
                }

                events.push(Event::TankDestroyed {
                    victim,
                    killer: shooter,
                });
                if let Some(Entity::Player(player)) = self.entities.get(&victim) {
                    events.push(Event::PlayerDied {
                        player_id: player.owner,
                        killer: shooter,
                    });
                }
            }
            Interaction::BulletsCollided { bullets, owners } => {
                for &bullet in bullets.iter() {
                    self.destroy(bullet);
                }
                for &owner in owners.iter() {
                    self.return_shot(owner);
                }
            }
        }
    }

    fn destroy(&mut self, entity_id: EntityId) {
        match self.entities.get_mut(&entity_id) {
            Some(Entity::Player(e)) => e.tank.destroyed = true,
            Some(Entity::Bot(e)) => e.tank.destroyed = true,
            Some(Entity::Bullet(e)) => e.destroyed = true,
            None => (),
        }
    }

    /// Gives a shot back to its owner, if the owner is still around.
    fn return_shot(&mut self, owner: EntityId) {
        if let Some(tank) = self.entities.get_mut(&owner).and_then(Entity::tank_mut) {
            tank.ammo += 1;
        }
    }

    fn remove_destroyed(&mut self) {
        let destroyed: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|(_, e)| e.is_destroyed())
            .map(|(&id, _)| id)
            .collect();

        for entity_id in destroyed {
            if let Some(Entity::Player(player)) = self.entities.remove(&entity_id) {
                if let Some(player) = self.players.get_mut(&player.owner) {
                    player.state = PlayerState::Dead;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{
        entities::{BotEntity, Bullet},
        game::level::{parse_levels, Level},
        Point, Settings,
    };

    fn open_game(grids: &str) -> Game {
        let settings = Settings::default();
        let level = Level::new(parse_levels(grids).unwrap(), settings.size).unwrap();
        Game::new(settings, level)
    }

    fn add_bot(game: &mut Game, pos: Point) -> EntityId {
        game.add_entity(Entity::Bot(BotEntity::new(pos, 0.0)))
    }

    fn add_bullet(game: &mut Game, owner: EntityId, pos: Point, angle: f32) -> EntityId {
        let mut bullet = Bullet::new(owner, pos, angle);
        bullet.body.pos = pos;
        game.add_entity(Entity::Bullet(bullet))
    }

    fn tank(game: &Game, id: EntityId) -> &crate::entities::Tank {
        game.entities[&id].tank().unwrap()
    }

    #[test]
    fn bullet_kills_tank_and_credits_shooter() {
        let mut game = open_game("...\n...\n...\n");
        let shooter = add_bot(&mut game, Point::new(100.0, 100.0));
        let victim = add_bot(&mut game, Point::new(600.0, 350.0));
        let bullet = add_bullet(&mut game, shooter, Point::new(597.0, 350.0), 0.0);

        let events = game.run_tick().unwrap();

        assert_eq!(events, vec![Event::TankDestroyed { victim, killer: shooter }]);
        assert!(!game.entities.contains_key(&victim));
        assert!(!game.entities.contains_key(&bullet));
        assert_eq!(tank(&game, shooter).kills, 1);
        assert_eq!(tank(&game, shooter).ammo, TANK_AMMO + 1);
    }

    #[test]
    fn own_bullets_do_not_hit() {
        let mut game = open_game("...\n...\n...\n");
        let shooter = add_bot(&mut game, Point::new(600.0, 350.0));
        let bullet = add_bullet(&mut game, shooter, Point::new(597.0, 350.0), 0.0);

        assert!(game.run_tick().unwrap().is_empty());
        assert!(game.entities.contains_key(&shooter));
        assert!(game.entities.contains_key(&bullet));
    }

    #[test]
    fn one_victim_is_only_credited_once() {
        let mut game = open_game("...\n...\n...\n");
        let shooter = add_bot(&mut game, Point::new(100.0, 100.0));
        let victim = add_bot(&mut game, Point::new(600.0, 350.0));
        add_bullet(&mut game, shooter, Point::new(590.0, 350.0), 0.0);
        add_bullet(&mut game, shooter, Point::new(590.0, 350.0), 0.0);

        let events = game.run_tick().unwrap();

        assert_eq!(events.len(), 1);
        assert!(!game.entities.contains_key(&victim));
        assert_eq!(tank(&game, shooter).kills, 1);
    }

    #[test]
    fn colliding_bullets_return_shots() {
        let mut game = open_game("...\n...\n...\n");
        let a = add_bot(&mut game, Point::new(100.0, 100.0));
        let b = add_bot(&mut game, Point::new(1100.0, 600.0));
        let bullet_a = add_bullet(&mut game, a, Point::new(600.0, 350.0), 0.0);
        let bullet_b = add_bullet(&mut game, b, Point::new(610.0, 350.0), std::f32::consts::PI);

        assert!(game.run_tick().unwrap().is_empty());

        assert!(!game.entities.contains_key(&bullet_a));
        assert!(!game.entities.contains_key(&bullet_b));
        assert_eq!(tank(&game, a).ammo, TANK_AMMO + 1);
        assert_eq!(tank(&game, b).ammo, TANK_AMMO + 1);
    }

    #[test]
    fn exhausted_bullet_returns_shot() {
        let mut game = open_game("...\n...\n...\n");
        let owner = add_bot(&mut game, Point::new(100.0, 100.0));
        let bullet = add_bullet(&mut game, owner, Point::new(1199.0, 350.0), 0.0);
        if let Some(Entity::Bullet(b)) = game.entities.get_mut(&bullet) {
            b.bounces_left = 1;
        }

        game.run_tick().unwrap();

        assert!(!game.entities.contains_key(&bullet));
        assert_eq!(tank(&game, owner).ammo, TANK_AMMO + 1);
    }

    #[test]
    fn player_input_fires_once_per_cooldown() {
        let mut game = open_game("...\n.P.\n...\n");
        let player_id = game.add_player("erin".to_string());
        game.set_input(
            player_id,
            Input {
                shoot: true,
                ..Input::default()
            },
        )
        .unwrap();

        game.run_tick().unwrap();
        game.run_tick().unwrap();
        assert_eq!(game.bullet_views().len(), 1);

        let (_, player) = game.get_player_entity(player_id).unwrap().unwrap();
        assert_eq!(player.tank.ammo, TANK_AMMO - 1);
    }

    #[test]
    fn dead_player_is_marked() {
        let mut game = open_game("...\n.P.\n...\n");
        let player_id = game.add_player("frank".to_string());
        let (player_entity, _) = game.get_player_entity(player_id).unwrap().unwrap();
        let shooter = add_bot(&mut game, Point::new(100.0, 100.0));
        let pos = game.entities[&player_entity].pos();
        add_bullet(&mut game, shooter, pos, 0.0);

        let events = game.run_tick().unwrap();

        assert!(events.contains(&Event::PlayerDied {
            player_id,
            killer: shooter
        }));
        assert_eq!(game.players[&player_id].state, PlayerState::Dead);
        assert_eq!(game.num_alive_players(), 0);
    }

    #[test]
    fn bots_target_nearest_tank() {
        let mut game = open_game("...\n...\n...\n");
        let a = add_bot(&mut game, Point::new(100.0, 100.0));
        let b = add_bot(&mut game, Point::new(200.0, 100.0));
        let c = add_bot(&mut game, Point::new(1100.0, 600.0));

        game.run_tick().unwrap();

        assert_eq!(game.get_bot(a).unwrap().target, Some(b));
        assert_eq!(game.get_bot(b).unwrap().target, Some(a));
        assert_eq!(game.get_bot(c).unwrap().target, Some(b));
    }

    #[test]
    fn player_against_wall_cannot_shoot_through_it() {
        let mut game = open_game("...\nPW.\n...\n");
        let wall = game.level.walls()[0].clone();
        let player_id = game.add_player("hank".to_string());
        {
            let (_, player) = game.get_player_entity_mut(player_id).unwrap().unwrap();
            player.tank.body.pos = Point::new(wall.min_x() - TANK_HITBOX, wall.pos().y);
        }
        game.set_input(
            player_id,
            Input {
                shoot: true,
                turret_angle: Some(0.0),
                ..Input::default()
            },
        )
        .unwrap();

        game.run_tick().unwrap();
        game.set_input(player_id, Input::default()).unwrap();
        assert_eq!(game.bullet_views().len(), 1);

        for _ in 0..120 {
            game.run_tick().unwrap();
            assert!(game.bullet_views().iter().all(|b| b.pos.x < wall.min_x()));
        }

        let (_, player) = game.get_player_entity(player_id).unwrap().unwrap();
        assert!(game.bullet_views().is_empty());
        assert_eq!(player.tank.ammo, TANK_AMMO);
    }

    #[test]
    fn lone_bot_without_players_keeps_its_level() {
        let mut game = open_game("...\n.B.\n...\n");
        let mut rng = StdRng::seed_from_u64(2);
        game.spawn_bots(&mut rng);

        assert!(!game.is_level_cleared());

        let player_id = game.add_player("iris".to_string());
        assert!(!game.is_level_cleared());

        let (entity_id, _) = game.get_player_entity(player_id).unwrap().unwrap();
        game.entities.remove(&entity_id);
        assert!(game.is_level_cleared());
    }

    #[test]
    fn last_bot_standing_clears_level() {
        let mut game = open_game(".B.\n...\n.B.\n");
        let mut rng = StdRng::seed_from_u64(3);
        let bots = game.spawn_bots(&mut rng);
        assert!(!game.is_level_cleared());

        let victim_pos = game.entities[&bots[1]].pos();
        add_bullet(&mut game, bots[0], victim_pos, 0.0);
        game.run_tick().unwrap();

        assert_eq!(game.bots_destroyed, 1);
        assert_eq!(game.bot_ids(), vec![bots[0]]);
        assert!(game.is_level_cleared());
    }

    #[test]
    fn level_transition_is_deferred() {
        let mut game = open_game("P..\n...\n..B\n\n...\n.P.\n.B.\n");
        let mut rng = StdRng::seed_from_u64(1);
        game.add_player("gina".to_string());
        game.spawn_bots(&mut rng);

        assert_eq!(game.update_level_transition(&mut rng), None);

        for bot_id in game.bot_ids() {
            game.entities.remove(&bot_id);
        }

        let mut fired_at = None;
        for tick in 0..120 {
            if let Some(event) = game.update_level_transition(&mut rng) {
                assert_eq!(event, Event::LevelStarted { index: 1 });
                fired_at = Some(tick);
                break;
            }
            game.run_tick().unwrap();
        }

        let fired_at = fired_at.unwrap();
        assert!(fired_at >= 59 && fired_at <= 61, "fired at {}", fired_at);
        assert_eq!(game.bot_ids().len(), 1);
        assert_eq!(game.level_transition_time, None);
        assert_eq!(game.entities[&game.bot_ids()[0]].pos(), game.level.bot_spawns()[0]);
    }
}
