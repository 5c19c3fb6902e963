mod ai;
mod bot;
mod game;
mod runner;

use std::path::{Path, PathBuf};

use clap::{value_t, Arg};
use log::{debug, info, warn};
use rand::{rngs::StdRng, SeedableRng};
use tokio::sync::mpsc;

use comn::{game::level::parse_levels, Level, Settings};

use crate::ai::{Model, Orchestrator, Params, TrainingContext};

#[derive(Clone, Debug)]
pub struct Config {
    pub model_path: PathBuf,
    pub levels_path: Option<PathBuf>,
    pub train: bool,
    pub seed: Option<u64>,
    pub params: Params,
    pub runner: runner::Config,
}

fn parse_config() -> Config {
    let matches = clap::App::new("serv")
        .arg(
            Arg::with_name("model_path")
                .long("model_path")
                .takes_value(true)
                .default_value("best_model.json")
                .help("File the best model weights are loaded from and saved to"),
        )
        .arg(
            Arg::with_name("levels")
                .long("levels")
                .takes_value(true)
                .help("Text file with level grids separated by blank lines (default: built-in levels)"),
        )
        .arg(
            Arg::with_name("train")
                .long("train")
                .help("Start with training enabled instead of playing greedily"),
        )
        .arg(
            Arg::with_name("scripted_bots")
                .long("scripted_bots")
                .help("Drive bots by the hand-written chaser instead of the learned policy"),
        )
        .arg(
            Arg::with_name("ai_period_ticks")
                .long("ai_period_ticks")
                .takes_value(true)
                .default_value("3")
                .help("Number of ticks between two bot decisions"),
        )
        .arg(
            Arg::with_name("train_every")
                .long("train_every")
                .takes_value(true)
                .default_value("50")
                .help("Agent steps between two training steps"),
        )
        .arg(
            Arg::with_name("promote_every")
                .long("promote_every")
                .takes_value(true)
                .default_value("500")
                .help("Agent steps between two promotions"),
        )
        .arg(
            Arg::with_name("batch_size")
                .long("batch_size")
                .takes_value(true)
                .default_value("128")
                .help("Number of transitions per training step"),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .takes_value(true)
                .help("Seed for spawning and exploration"),
        )
        .get_matches();

    let params = Params {
        train_every: value_t!(matches, "train_every", usize).unwrap_or_else(|e| e.exit()),
        promote_every: value_t!(matches, "promote_every", usize).unwrap_or_else(|e| e.exit()),
        batch_size: value_t!(matches, "batch_size", usize).unwrap_or_else(|e| e.exit()),
        ..Params::default()
    };

    let seed = if matches.is_present("seed") {
        Some(value_t!(matches, "seed", u64).unwrap_or_else(|e| e.exit()))
    } else {
        None
    };

    Config {
        model_path: PathBuf::from(matches.value_of("model_path").unwrap_or("best_model.json")),
        levels_path: matches.value_of("levels").map(PathBuf::from),
        train: matches.is_present("train"),
        seed,
        params,
        runner: runner::Config {
            ai_period_ticks: value_t!(matches, "ai_period_ticks", u32)
                .unwrap_or_else(|e| e.exit()),
            scripted_bots: matches.is_present("scripted_bots"),
        },
    }
}

fn load_level(path: Option<&Path>, settings: &Settings) -> Result<Level, String> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|err| format!("could not read {:?}: {}", path, err))?;
            let grids = parse_levels(&text).map_err(|err| format!("invalid levels: {:?}", err))?;

            Level::new(grids, settings.size).map_err(|err| format!("invalid levels: {:?}", err))
        }
        None => Level::builtin(settings.size).map_err(|err| format!("invalid built-in levels: {:?}", err)),
    }
}

fn load_model(config: &Config, rng: &mut StdRng) -> Model {
    let params = &config.params;

    match params.load_model(&config.model_path) {
        Ok(model) => {
            info!("Loaded model from {:?}", config.model_path);
            model
        }
        Err(err) => {
            warn!(
                "Could not load model from {:?} ({:?}), starting from scratch",
                config.model_path, err
            );
            params.new_model(rng)
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = parse_config();
    let settings = Settings::default();

    let level = match load_level(config.levels_path.as_deref(), &settings) {
        Ok(level) => level,
        Err(err) => {
            log::error!("{}", err);
            std::process::exit(1);
        }
    };
    info!("Loaded {} levels", level.num_levels());

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let model = load_model(&config, &mut rng);
    let mut orchestrator = Orchestrator::new(
        TrainingContext::new(config.params.clone(), model),
        Some(config.model_path.clone()),
        StdRng::from_rng(&mut rng).unwrap_or_else(|_| StdRng::from_entropy()),
    );
    orchestrator.set_learning(config.train);

    let game = game::Game::new(comn::Game::new(settings, level));

    let (recv_msg_tx, recv_msg_rx) = mpsc::unbounded_channel();
    let (send_msg_tx, mut send_msg_rx) = mpsc::unbounded_channel::<(comn::ClientId, comn::ServerMessage)>();

    // Stands in for the transport: encodes outbound messages as they would
    // go on the wire.
    tokio::spawn(async move {
        while let Some((client_id, message)) = send_msg_rx.recv().await {
            match message.serialize() {
                Ok(data) => debug!("{} bytes for {:?}", data.len(), client_id),
                Err(err) => warn!("Failed to encode message for {:?}: {:?}", client_id, err),
            }
        }
    });

    let runner = runner::Runner::new(
        config.runner.clone(),
        game,
        orchestrator,
        rng,
        recv_msg_rx,
        send_msg_tx,
    );
    runner.run().await;

    drop(recv_msg_tx);
}
