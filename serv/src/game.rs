use std::collections::BTreeMap;

use comn::{ClientId, GameResult, Input, PlayerId, ServerMessage};

/// Connected clients on top of the simulation state.
pub struct Game {
    pub state: comn::Game,
    clients: BTreeMap<ClientId, PlayerId>,
}

impl Game {
    pub fn new(state: comn::Game) -> Self {
        Self {
            state,
            clients: BTreeMap::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.state.players.len() >= self.state.settings.max_num_players
    }

    pub fn settings(&self) -> &comn::Settings {
        &self.state.settings
    }

    /// Adds a player for the client unless it already has one or the game
    /// is full.
    pub fn join(&mut self, client_id: ClientId, player_name: String) -> Option<PlayerId> {
        if self.clients.contains_key(&client_id) || self.is_full() {
            return None;
        }

        let player_id = self.state.add_player(player_name);
        self.clients.insert(client_id, player_id);

        Some(player_id)
    }

    pub fn leave(&mut self, client_id: ClientId) -> GameResult<Option<comn::Player>> {
        match self.clients.remove(&client_id) {
            Some(player_id) => self.state.remove_player(player_id).map(Some),
            None => Ok(None),
        }
    }

    pub fn player_id(&self, client_id: ClientId) -> Option<PlayerId> {
        self.clients.get(&client_id).copied()
    }

    pub fn player_name(&self, client_id: ClientId) -> Option<&str> {
        self.player_id(client_id)
            .and_then(|player_id| self.state.players.get(&player_id))
            .map(|player| player.name.as_str())
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.keys().copied().collect()
    }

    /// Input from unknown clients is dropped.
    pub fn set_input(&mut self, client_id: ClientId, input: Input) -> GameResult<()> {
        match self.player_id(client_id) {
            Some(player_id) => self.state.set_input(player_id, input),
            None => Ok(()),
        }
    }

    pub fn map_update(&self) -> ServerMessage {
        ServerMessage::MapUpdate {
            walls: self.state.level.walls().to_vec(),
        }
    }

    /// One `Update` per client, each with the client's own tank filled in.
    pub fn updates(&self) -> Vec<(ClientId, ServerMessage)> {
        let (players, bots) = self.state.tank_views();
        let projectiles = self.state.bullet_views();

        self.clients
            .iter()
            .map(|(&client_id, &player_id)| {
                let you = self
                    .state
                    .get_player_entity(player_id)
                    .ok()
                    .flatten()
                    .and_then(|(entity_id, _)| players.iter().find(|view| view.id == entity_id))
                    .cloned();

                let message = ServerMessage::Update {
                    you,
                    players: players.clone(),
                    bots: bots.clone(),
                    projectiles: projectiles.clone(),
                };

                (client_id, message)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use comn::{Level, Settings};

    use super::*;

    fn game(max_num_players: usize) -> Game {
        let settings = Settings {
            max_num_players,
            ..Settings::default()
        };
        let level = Level::builtin(settings.size).unwrap();

        Game::new(comn::Game::new(settings, level))
    }

    #[test]
    fn join_respects_capacity() {
        let mut game = game(1);
        let alice = ClientId::new_v4();

        assert!(game.join(alice, "alice".to_string()).is_some());
        assert!(game.join(alice, "alice again".to_string()).is_none());
        assert!(game.join(ClientId::new_v4(), "bob".to_string()).is_none());
        assert_eq!(game.player_name(alice), Some("alice"));
    }

    #[test]
    fn leave_removes_player() {
        let mut game = game(4);
        let client = ClientId::new_v4();
        let player_id = game.join(client, "carol".to_string()).unwrap();

        let player = game.leave(client).unwrap().unwrap();

        assert_eq!(player.name, "carol");
        assert!(!game.state.players.contains_key(&player_id));
        assert!(game.leave(client).unwrap().is_none());
    }

    #[test]
    fn updates_carry_own_tank() {
        let mut game = game(4);
        let client = ClientId::new_v4();
        game.join(client, "dave".to_string());

        let updates = game.updates();

        assert_eq!(updates.len(), 1);
        match &updates[0].1 {
            ServerMessage::Update { you, players, .. } => {
                assert_eq!(players.len(), 1);
                assert_eq!(you.as_ref(), players.first());
                assert_eq!(you.as_ref().and_then(|v| v.name.as_deref()), Some("dave"));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }
}
