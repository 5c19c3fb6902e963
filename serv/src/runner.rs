use std::time::Duration;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use tokio::{
    signal,
    sync::mpsc::{self, error::TryRecvError},
    time,
};

use comn::{ClientId, ClientMessage, Event, ServerMessage};

use crate::{ai::Orchestrator, bot::Bot, game::Game};

pub type RecvMessageRx = mpsc::UnboundedReceiver<(ClientId, ClientMessage)>;
pub type SendMessageTx = mpsc::UnboundedSender<(ClientId, ServerMessage)>;

#[derive(Debug, Clone)]
pub struct Config {
    /// Bots decide once every this many ticks.
    pub ai_period_ticks: u32,
    pub scripted_bots: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ai_period_ticks: 3,
            scripted_bots: false,
        }
    }
}

pub struct Runner {
    config: Config,
    game: Game,
    orchestrator: Orchestrator,
    rng: StdRng,

    recv_message_rx: RecvMessageRx,
    send_message_tx: SendMessageTx,
    inbound_closed: bool,
}

impl Runner {
    pub fn new(
        config: Config,
        game: Game,
        orchestrator: Orchestrator,
        rng: StdRng,
        recv_message_rx: RecvMessageRx,
        send_message_tx: SendMessageTx,
    ) -> Self {
        Runner {
            config,
            game,
            orchestrator,
            rng,
            recv_message_rx,
            send_message_tx,
            inbound_closed: false,
        }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Ticks at the configured rate until ctrl-c, then saves the model.
    pub async fn run(mut self) {
        let period = Duration::from_secs_f32(self.game.settings().tick_period());
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        let ctrl_c = signal::ctrl_c();
        tokio::pin!(ctrl_c);

        if self.game.state.bot_ids().is_empty() {
            self.game.state.spawn_bots(&mut self.rng);
        }

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick(),
                _ = &mut ctrl_c => {
                    info!("Shutting down");
                    self.orchestrator.save_model();
                    return;
                }
            }
        }
    }

    pub fn tick(&mut self) {
        self.process_messages();

        if self.game.state.tick_num.0 % self.config.ai_period_ticks.max(1) == 0 {
            if let Err(err) = self.run_bots() {
                warn!("Bot update failed: {:?}", err);
            }
        }

        match self.game.state.run_tick() {
            Ok(events) => self.log_events(&events),
            Err(err) => warn!("Tick {:?} failed: {:?}", self.game.state.tick_num, err),
        }

        if let Some(event) = self.game.state.update_level_transition(&mut self.rng) {
            self.log_events(&[event]);
            self.orchestrator.on_level_transition();
            self.broadcast(self.game.map_update());
        }

        for (client_id, message) in self.game.updates() {
            self.send(client_id, message);
        }

        if let Some(loss) = self.orchestrator.run_pending_training() {
            debug!("Training loss {:.5}", loss);
        }
    }

    fn run_bots(&mut self) -> comn::GameResult<()> {
        if self.config.scripted_bots {
            for bot_id in self.game.state.bot_ids() {
                Bot::Chaser.update(bot_id, &mut self.game.state)?;
            }
            Ok(())
        } else {
            self.orchestrator.step(&mut self.game.state)
        }
    }

    fn process_messages(&mut self) {
        while !self.inbound_closed {
            match self.recv_message_rx.try_recv() {
                Ok((client_id, message)) => self.handle_message(client_id, message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("recv_message_rx closed, continuing without clients");
                    self.inbound_closed = true;
                }
            }
        }
    }

    fn handle_message(&mut self, client_id: ClientId, message: ClientMessage) {
        match message {
            ClientMessage::NewPlayer { name } => match self.game.join(client_id, name.clone()) {
                Some(player_id) => {
                    info!("{:?} joined as {:?} ({:?})", name, player_id, client_id);
                    self.send(client_id, self.game.map_update());
                }
                None => {
                    let message = ServerMessage::Message {
                        message: "Could not join: game is full or already joined".to_string(),
                    };
                    self.send(client_id, message);
                }
            },
            ClientMessage::PlayerAction(input) => {
                if let Err(err) = self.game.set_input(client_id, input) {
                    warn!("Ignoring input from {:?}: {:?}", client_id, err);
                }
            }
            ClientMessage::DebugInfo {
                level,
                toggle_training,
            } => {
                if let Some(index) = level {
                    match self.game.state.make_level(index, &mut self.rng) {
                        Ok(event) => {
                            self.log_events(&[event]);
                            self.orchestrator.on_level_transition();
                            self.broadcast(self.game.map_update());
                        }
                        Err(err) => warn!("Cannot switch to level {}: {:?}", index, err),
                    }
                }
                if toggle_training == Some(true) {
                    let learning = !self.orchestrator.is_learning();
                    self.orchestrator.set_learning(learning);
                }
            }
            ClientMessage::Message { socket_id, message } => {
                if socket_id != client_id {
                    debug!("{:?} sent a message as {:?}", client_id, socket_id);
                }

                let name = self.game.player_name(client_id).unwrap_or("anonymous");
                let text = format!("{}: {}", name, message);
                self.broadcast(ServerMessage::Message { message: text });
            }
            ClientMessage::Disconnect => match self.game.leave(client_id) {
                Ok(Some(player)) => info!("{:?} left", player.name),
                Ok(None) => (),
                Err(err) => warn!("Failed to remove {:?}: {:?}", client_id, err),
            },
        }
    }

    fn log_events(&self, events: &[Event]) {
        for event in events {
            match event {
                Event::PlayerDied { player_id, killer } => {
                    let name = self
                        .game
                        .state
                        .players
                        .get(player_id)
                        .map_or("?", |player| player.name.as_str());
                    info!("{} was destroyed by {:?}", name, killer);
                }
                Event::LevelStarted { index } => info!("Starting level {}", index),
                Event::TankDestroyed { victim, killer } => {
                    debug!("{:?} destroyed by {:?}", victim, killer)
                }
            }
        }
    }

    fn broadcast(&self, message: ServerMessage) {
        for client_id in self.game.client_ids() {
            self.send(client_id, message.clone());
        }
    }

    fn send(&self, client_id: ClientId, message: ServerMessage) {
        if self.send_message_tx.send((client_id, message)).is_err() {
            debug!("send_message_tx closed, dropping message for {:?}", client_id);
        }
    }
}
