use comn::{
    entities::{BotEntity, TargetSeeker},
    game::run::TANK_TURN_RATE,
    geom, Entity, EntityId, Game, GameResult, Point, Vector,
};

/// Bullets further away than this are not worth dodging.
pub const EVADE_RADIUS: f32 = 400.0;
pub const CIRCLE_RADIUS: f32 = 400.0;
pub const APPROACH_RADIUS: f32 = 700.0;

/// Hand-written brains used instead of the learned policy.
#[derive(Debug, Clone)]
pub enum Bot {
    /// Dodges incoming bullets, otherwise drives at the nearest tank.
    Chaser,
}

impl Bot {
    pub fn update(&self, bot_id: EntityId, game: &mut Game) -> GameResult<()> {
        match self {
            Bot::Chaser => {
                let threat = Self::incoming_bullet(bot_id, game)?;
                let target_pos = {
                    let bot = game.get_bot(bot_id)?;
                    game.entity_pos(bot.target())
                };
                let bot = game.get_bot_mut(bot_id)?;

                match threat {
                    Some(bullet_angle) => Self::evade(bot, bullet_angle),
                    None => Self::chase(bot, target_pos),
                }
            }
        }

        game.try_bot_shoot(bot_id)?;

        Ok(())
    }

    /// Angle of a foreign bullet whose path will cross the bot, if any.
    fn incoming_bullet(bot_id: EntityId, game: &Game) -> GameResult<Option<f32>> {
        let bot = game.get_bot(bot_id)?;
        let pos = bot.tank.body.pos;

        Ok(game
            .entities
            .values()
            .filter_map(Entity::bullet)
            .filter(|bullet| bullet.owner != bot_id)
            .find(|bullet| {
                let dist = geom::distance(pos, bullet.body.pos);
                if dist > EVADE_RADIUS {
                    return false;
                }

                let projected: Point =
                    bullet.body.pos + geom::normalize_or_zero(bullet.body.vel) * dist;
                bot.tank.body.collided_at(&bullet.body, projected)
            })
            .map(|bullet| bullet.angle))
    }

    fn evade(bot: &mut BotEntity, bullet_angle: f32) {
        let tank = &mut bot.tank;

        if (tank.tank_angle - bullet_angle).abs() > std::f32::consts::FRAC_PI_2 {
            tank.turn_rate = 0.0;
            tank.body.vel = geom::from_polar(tank.speed, tank.tank_angle);
        } else {
            tank.turn_rate = TANK_TURN_RATE;
            tank.body.vel = geom::from_polar(-tank.speed, tank.tank_angle);
        }
    }

    fn chase(bot: &mut BotEntity, target_pos: Option<Point>) {
        let distance = bot.distance_to_target(target_pos);
        let tank = &mut bot.tank;

        if target_pos.is_none() {
            tank.body.vel = Vector::zeros();
            tank.turn_rate = 0.0;
            return;
        }

        tank.body.vel = geom::from_polar(tank.speed, tank.tank_angle);
        tank.turn_rate = if distance < CIRCLE_RADIUS {
            TANK_TURN_RATE
        } else if distance > APPROACH_RADIUS
            && geom::angle_dist(tank.tank_angle, tank.turret_angle).abs() > 0.1
        {
            -TANK_TURN_RATE
        } else {
            0.0
        };
    }
}
