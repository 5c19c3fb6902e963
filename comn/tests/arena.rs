use comn::{
    entities::BotEntity,
    game::level::{parse_levels, Level},
    Entity, Event, Game, Point, Settings,
};

fn open_arena() -> Game {
    let settings = Settings::default();
    let level = Level::new(parse_levels("...\n...\n...\n").unwrap(), settings.size).unwrap();

    Game::new(settings, level)
}

#[test]
fn far_corner_sees_border_cells() {
    let game = open_arena();
    let corner = Point::new(game.settings.size.x, game.settings.size.y);

    assert_eq!(game.level.surroundings(corner), [0, 0, 1, 0, 0, 1, 1, 1, 1]);
}

#[test]
fn bot_shoots_down_stationary_bot() {
    let mut game = open_arena();
    let shooter = game.add_entity(Entity::Bot(BotEntity::new(Point::new(200.0, 350.0), 0.0)));
    let victim = game.add_entity(Entity::Bot(BotEntity::new(Point::new(800.0, 350.0), 0.0)));

    game.run_tick().unwrap();
    assert_eq!(game.get_bot(shooter).unwrap().target, Some(victim));

    let bullet = game.try_bot_shoot(shooter).unwrap();
    assert!(bullet.is_some());

    // Cooldown holds the next shot back.
    assert_eq!(game.try_bot_shoot(shooter).unwrap(), None);

    let mut destroyed = false;
    for _ in 0..200 {
        let events = game.run_tick().unwrap();

        if events.contains(&Event::TankDestroyed {
            victim,
            killer: shooter,
        }) {
            destroyed = true;
            break;
        }
    }

    assert!(destroyed);
    assert_eq!(game.bot_ids(), vec![shooter]);
    assert_eq!(game.get_bot(shooter).unwrap().tank.kills, 1);
    assert!(game.is_level_cleared());
}

#[test]
fn wall_blocks_the_shot() {
    let settings = Settings::default();
    let level = Level::new(parse_levels("...\n.W.\n...\n").unwrap(), settings.size).unwrap();
    let mut game = Game::new(settings, level);

    let shooter = game.add_entity(Entity::Bot(BotEntity::new(Point::new(100.0, 350.0), 0.0)));
    game.add_entity(Entity::Bot(BotEntity::new(Point::new(1100.0, 350.0), 0.0)));

    game.run_tick().unwrap();

    assert_eq!(game.try_bot_shoot(shooter).unwrap(), None);
}
