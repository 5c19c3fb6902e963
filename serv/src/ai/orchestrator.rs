use std::{collections::BTreeMap, path::PathBuf};

use log::{debug, info, warn};
use rand::rngs::StdRng;

use comn::{
    entities::{BotAction, BotEntity, Observation, TargetSeeker},
    util::stats,
    EntityId, Game, GameResult, Level, Point,
};

use crate::ai::{Model, Params, TrainingContext, Transition};

pub const WALL_PENALTY: f32 = -0.1;
pub const IDLE_PENALTY: f32 = -0.01;

/// Shaped reward for the action a bot just took.
pub fn reward(bot: &BotEntity, level: &Level, target_pos: Option<Point>) -> f32 {
    if bot.is_next_pos_in_wall(level) {
        WALL_PENALTY
    } else if bot.is_moving_toward(target_pos) {
        let distance = bot.distance_to_target(target_pos);
        (100.0 - distance / 10.0).ceil().max(-100.0).min(100.0) / 100.0
    } else {
        IDLE_PENALTY
    }
}

#[derive(Debug, Clone)]
pub struct AgentState {
    pub model: Model,
    pub epsilon: f32,
    pub steps: usize,
    pub total_reward: f32,
    pub recent_rewards: stats::Var,
    pub retired: bool,
    prev: Option<(Observation, BotAction, f32)>,
}

impl AgentState {
    fn new(model: Model, epsilon: f32) -> Self {
        Self {
            model,
            epsilon,
            steps: 0,
            total_reward: 0.0,
            recent_rewards: stats::Var::default(),
            retired: false,
            prev: None,
        }
    }

    pub fn mean_reward(&self) -> Option<f32> {
        if self.steps == 0 {
            None
        } else {
            Some(self.total_reward / self.steps as f32)
        }
    }

    fn reset_episode(&mut self, epsilon: f32) {
        self.epsilon = epsilon;
        self.steps = 0;
        self.total_reward = 0.0;
        self.recent_rewards.clear();
    }
}

/// Drives every bot in the arena with its own copy of the policy, feeds the
/// shared replay memory and periodically trains and promotes.
pub struct Orchestrator {
    context: TrainingContext,
    agents: BTreeMap<EntityId, AgentState>,
    learning: bool,
    decay_step: usize,
    steps_since_train: usize,
    steps_since_promote: usize,
    training_pending: bool,
    model_path: Option<PathBuf>,
    rng: StdRng,
}

impl Orchestrator {
    pub fn new(context: TrainingContext, model_path: Option<PathBuf>, rng: StdRng) -> Self {
        Self {
            context,
            agents: BTreeMap::new(),
            learning: true,
            decay_step: 0,
            steps_since_train: 0,
            steps_since_promote: 0,
            training_pending: false,
            model_path,
            rng,
        }
    }

    pub fn params(&self) -> &Params {
        &self.context.params
    }

    pub fn best_model(&self) -> &Model {
        &self.context.model
    }

    pub fn memory_len(&self) -> usize {
        self.context.memory.len()
    }

    pub fn agent(&self, entity_id: EntityId) -> Option<&AgentState> {
        self.agents.get(&entity_id)
    }

    pub fn is_learning(&self) -> bool {
        self.learning
    }

    pub fn set_learning(&mut self, learning: bool) {
        if learning != self.learning {
            info!("Training {}", if learning { "enabled" } else { "disabled" });
        }
        self.learning = learning;
    }

    pub fn is_training_pending(&self) -> bool {
        self.training_pending
    }

    /// One decision for every bot: observe, act, reward, store, decay.
    pub fn step(&mut self, game: &mut Game) -> GameResult<()> {
        let bot_ids = game.bot_ids();
        self.retire_missing(&bot_ids);

        let epsilon = self.context.params.epsilon(self.decay_step);

        for bot_id in bot_ids {
            if !self.agents.contains_key(&bot_id) {
                let model = self
                    .context
                    .model
                    .copy_perturbed(self.context.params.perturbation, &mut self.rng);
                self.agents.insert(bot_id, AgentState::new(model, epsilon));
            }

            let (state, target_pos) = {
                let bot = game.get_bot(bot_id)?;
                let target_pos = game.entity_pos(bot.target());
                (bot.observe(&game.level, target_pos), target_pos)
            };

            let learning = self.learning;
            let agent = match self.agents.get_mut(&bot_id) {
                Some(agent) => agent,
                None => continue,
            };

            if let Some((prev_state, prev_action, prev_reward)) = agent.prev.take() {
                if learning {
                    self.context.memory.add(Transition {
                        agent: bot_id,
                        state: prev_state,
                        action: prev_action,
                        reward: prev_reward,
                        next_state: state.clone(),
                    });
                }
            }

            let action_index = if learning {
                agent.model.choose_action(&state, agent.epsilon, &mut self.rng)
            } else {
                agent.model.greedy_action(&state)
            };
            let action = BotAction::from_index(action_index).unwrap_or(BotAction::Forward);

            game.get_bot_mut(bot_id)?.move_agent(action);
            game.try_bot_shoot(bot_id)?;

            let reward = reward(game.get_bot(bot_id)?, &game.level, target_pos);

            agent.steps += 1;
            agent.total_reward += reward;
            agent.recent_rewards.record(reward);
            agent.epsilon = epsilon;
            agent.prev = Some((state, action, reward));

            if learning {
                self.steps_since_train += 1;
                self.steps_since_promote += 1;
            }
        }

        if self.learning {
            self.decay_step += 1;

            if self.steps_since_train >= self.context.params.train_every {
                self.steps_since_train = 0;
                self.training_pending = true;
            }
            if self.steps_since_promote >= self.context.params.promote_every {
                self.steps_since_promote = 0;
                self.promote();
            }
        }

        Ok(())
    }

    /// Runs a training step scheduled by `step`, if any. Meant to be called
    /// after the frame has gone out so that physics never waits on it.
    pub fn run_pending_training(&mut self) -> Option<f32> {
        if !self.training_pending {
            return None;
        }
        self.training_pending = false;

        let context = &self.context;
        let rng = &mut self.rng;
        let losses: Vec<f32> = self
            .agents
            .values_mut()
            .filter(|agent| !agent.retired)
            .filter_map(|agent| context.train_model(&mut agent.model, rng))
            .collect();

        if losses.is_empty() {
            return None;
        }

        let loss = losses.iter().sum::<f32>() / losses.len() as f32;
        debug!(
            "Trained {} agents on batches of {} (memory {}), mean loss {:.5}",
            losses.len(),
            self.context.params.batch_size.min(self.context.memory.len()),
            self.context.memory.len(),
            loss,
        );

        Some(loss)
    }

    /// Copies the best agent's weights to every agent, perturbing all but
    /// the winner, and saves them.
    pub fn promote(&mut self) -> Option<EntityId> {
        let (winner_id, mean_reward) = self
            .agents
            .iter()
            .filter_map(|(&id, agent)| agent.mean_reward().map(|r| (id, r)))
            .fold(None, |best: Option<(EntityId, f32)>, (id, r)| match best {
                Some((_, best_r)) if best_r >= r => best,
                _ => Some((id, r)),
            })?;

        let winner_state = self.agents.get(&winner_id)?;
        let winner = winner_state.model.clone();
        info!(
            "Promoting agent {:?} with mean reward {:.4} (recent {:.4})",
            winner_id,
            mean_reward,
            winner_state.recent_rewards.mean().unwrap_or(0.0),
        );

        let max_epsilon = self.context.params.max_epsilon;
        let perturbation = self.context.params.perturbation;
        for (&id, agent) in self.agents.iter_mut() {
            if id != winner_id {
                agent.model = winner.copy_perturbed(perturbation, &mut self.rng);
            }
            agent.reset_episode(max_epsilon);
        }

        self.context.model = winner;
        self.decay_step = 0;
        self.save_model();

        Some(winner_id)
    }

    /// Ends the episode: promotes, forgets the level's agents and their
    /// transitions.
    pub fn on_level_transition(&mut self) {
        if self.learning {
            self.promote();
        }

        self.agents.clear();
        self.context.memory.clear();
        self.training_pending = false;
        self.steps_since_train = 0;
        self.steps_since_promote = 0;
        self.decay_step = 0;
    }

    pub fn save_model(&self) {
        if let Some(path) = self.model_path.as_ref() {
            match self.context.model.save(path) {
                Ok(()) => info!("Saved model to {:?}", path),
                Err(err) => warn!("Failed to save model to {:?}: {:?}", path, err),
            }
        }
    }

    fn retire_missing(&mut self, bot_ids: &[EntityId]) {
        for (id, agent) in self.agents.iter_mut() {
            if !agent.retired && !bot_ids.contains(id) {
                agent.retired = true;
                agent.prev = None;
                self.context.memory.purge_agent(*id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use comn::{
        entities::BotEntity,
        game::level::{parse_levels, Level},
        Entity, Settings, Vector,
    };

    use super::*;
    use crate::ai::Optimizer;

    fn small_params() -> Params {
        Params {
            hidden_layers: vec![8],
            batch_size: 4,
            memory_capacity: 64,
            optimizer: Optimizer::Sgd,
            train_every: 4,
            promote_every: 1000,
            ..Params::default()
        }
    }

    fn orchestrator(params: Params) -> Orchestrator {
        let mut rng = StdRng::seed_from_u64(5);
        let model = params.new_model(&mut rng);

        Orchestrator::new(TrainingContext::new(params, model), None, rng)
    }

    fn arena() -> Game {
        let settings = Settings::default();
        let level = Level::new(
            parse_levels("B....\n.....\n....B\n").unwrap(),
            settings.size,
        )
        .unwrap();
        let mut game = Game::new(settings, level);
        let mut rng = StdRng::seed_from_u64(9);
        game.spawn_bots(&mut rng);

        game
    }

    #[test]
    fn reward_follows_shaping_rules() {
        let level = Level::new(parse_levels("...\n...\n...\n").unwrap(), Vector::new(1200.0, 700.0))
            .unwrap();
        let mut bot = BotEntity::new(Point::new(600.0, 350.0), 0.0);
        let target = Some(Point::new(800.0, 350.0));

        assert_eq!(reward(&bot, &level, target), IDLE_PENALTY);

        bot.move_agent(BotAction::Forward);
        assert!((reward(&bot, &level, target) - 0.8).abs() < 1e-6);

        bot.move_agent(BotAction::Backward);
        assert_eq!(reward(&bot, &level, target), IDLE_PENALTY);

        let mut edge_bot = BotEntity::new(Point::new(1190.0, 350.0), 0.0);
        edge_bot.move_agent(BotAction::Forward);
        assert_eq!(reward(&edge_bot, &level, target), WALL_PENALTY);
    }

    #[test]
    fn far_targets_clamp_the_reward() {
        let level = Level::new(parse_levels("...\n...\n...\n").unwrap(), Vector::new(5000.0, 5000.0))
            .unwrap();
        let mut bot = BotEntity::new(Point::new(100.0, 100.0), 0.0);
        bot.move_agent(BotAction::Forward);

        let r = reward(&bot, &level, Some(Point::new(4900.0, 100.0)));
        assert!((r - (-1.0)).abs() < 1e-6);
    }

    #[test]
    fn steps_fill_memory_and_schedule_training() {
        let mut orchestrator = orchestrator(small_params());
        let mut game = arena();

        orchestrator.step(&mut game).unwrap();
        assert_eq!(orchestrator.memory_len(), 0);
        assert!(!orchestrator.is_training_pending());

        game.run_tick().unwrap();
        orchestrator.step(&mut game).unwrap();
        assert_eq!(orchestrator.memory_len(), 2);
        assert!(orchestrator.is_training_pending());

        assert!(orchestrator.run_pending_training().is_some());
        assert!(!orchestrator.is_training_pending());
        assert_eq!(orchestrator.run_pending_training(), None);
    }

    #[test]
    fn play_mode_stores_nothing() {
        let mut orchestrator = orchestrator(small_params());
        orchestrator.set_learning(false);
        let mut game = arena();

        for _ in 0..5 {
            orchestrator.step(&mut game).unwrap();
            game.run_tick().unwrap();
        }

        assert_eq!(orchestrator.memory_len(), 0);
        assert!(!orchestrator.is_training_pending());
    }

    #[test]
    fn removed_bot_is_retired_and_forgotten() {
        let mut orchestrator = orchestrator(small_params());
        let mut game = arena();
        let bot_ids = game.bot_ids();

        for _ in 0..3 {
            orchestrator.step(&mut game).unwrap();
            game.run_tick().unwrap();
        }
        game.entities.remove(&bot_ids[0]);
        orchestrator.step(&mut game).unwrap();

        assert!(orchestrator.agent(bot_ids[0]).unwrap().retired);
        assert!(!orchestrator.agent(bot_ids[1]).unwrap().retired);
        assert!(orchestrator
            .context
            .memory
            .iter()
            .all(|t| t.agent == bot_ids[1]));
    }

    #[test]
    fn promotion_copies_the_best_agent() {
        let mut orchestrator = orchestrator(Params {
            perturbation: 0.0,
            ..small_params()
        });
        let mut game = arena();
        orchestrator.step(&mut game).unwrap();

        let bot_ids = game.bot_ids();
        orchestrator.agents.get_mut(&bot_ids[0]).unwrap().total_reward = -5.0;
        orchestrator.agents.get_mut(&bot_ids[1]).unwrap().total_reward = 5.0;
        let best = orchestrator.agent(bot_ids[1]).unwrap().model.clone();

        assert_eq!(orchestrator.promote(), Some(bot_ids[1]));

        assert_eq!(orchestrator.best_model().layers(), best.layers());
        for id in bot_ids {
            let agent = orchestrator.agent(id).unwrap();
            assert_eq!(agent.model.layers(), best.layers());
            assert_eq!(agent.steps, 0);
            assert_eq!(agent.epsilon, orchestrator.params().max_epsilon);
        }
    }

    #[test]
    fn promotion_without_experience_does_nothing() {
        let mut orchestrator = orchestrator(small_params());

        assert_eq!(orchestrator.promote(), None);
    }

    #[test]
    fn level_transition_resets_bookkeeping() {
        let mut orchestrator = orchestrator(small_params());
        let mut game = arena();

        for _ in 0..3 {
            orchestrator.step(&mut game).unwrap();
            game.run_tick().unwrap();
        }
        orchestrator.on_level_transition();

        assert_eq!(orchestrator.memory_len(), 0);
        assert!(orchestrator.agents.is_empty());
        assert!(!orchestrator.is_training_pending());

        game.entities.clear();
        game.add_entity(Entity::Bot(BotEntity::new(Point::new(100.0, 100.0), 0.0)));
        orchestrator.step(&mut game).unwrap();
        assert_eq!(orchestrator.agents.len(), 1);
    }
}
