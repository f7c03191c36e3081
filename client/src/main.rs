use clap::Parser;
use client::game::{ClientConfig, ClientGameState};
use client::input::InputManager;
use client::interpolation::InterpolationConfig;
use client::network::{NetworkClient, NetworkEvent};
use client::prediction::PredictorConfig;
use client::rendering::{Renderer, UiConfig};
use log::{error, info};
use macroquad::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Render delay for remote entities in milliseconds
    #[arg(long, default_value = "75")]
    interp_delay: f64,

    /// Position history kept per remote entity in milliseconds
    #[arg(long, default_value = "200")]
    history_window: f64,

    /// Reconciliation errors above this many pixels snap instantly
    #[arg(long, default_value = "64")]
    teleport_threshold: f32,

    /// Decay rate of the smoothed correction offset, per second
    #[arg(long, default_value = "10")]
    error_decay: f32,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    width: usize,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    height: usize,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Kitchen".to_string(),
        window_width: args.width as i32,
        window_height: args.height as i32,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    info!("Controls: WASD/arrows to move, E/Space to interact");
    info!("Press 1/2 to toggle Prediction/Interpolation");

    let config = ClientConfig {
        prediction: PredictorConfig {
            teleport_threshold: args.teleport_threshold,
            error_decay_rate: args.error_decay,
            ..PredictorConfig::default()
        },
        interpolation: InterpolationConfig {
            delay_ms: args.interp_delay,
            window_ms: args.history_window,
            ..InterpolationConfig::default()
        },
    };

    let mut network = match NetworkClient::connect(&args.server) {
        Ok(network) => network,
        Err(e) => {
            error!("Failed to start network thread: {}", e);
            return;
        }
    };
    let mut renderer = match Renderer::new(args.width, args.height) {
        Ok(renderer) => renderer,
        Err(e) => {
            error!("Failed to create renderer: {}", e);
            return;
        }
    };
    let mut game = ClientGameState::new(config);
    let mut input = InputManager::new();
    let mut status: Option<String> = Some("Connecting...".to_string());

    loop {
        let now_ms = get_time() * 1000.0;
        for event in network.poll() {
            match event {
                NetworkEvent::Connected => status = None,
                NetworkEvent::Frame(frame) => game.handle_frame(frame, now_ms),
                NetworkEvent::Disconnected(reason) => {
                    game.reset();
                    status = Some(format!("Disconnected: {}", reason));
                }
            }
        }
        if let Some(reason) = game.rejection() {
            status = Some(format!("Rejected: {}", reason));
        }

        let frame_input = input.update();
        if frame_input.toggles.prediction {
            game.prediction_enabled = !game.prediction_enabled;
            info!("Client-side prediction: {}", game.prediction_enabled);
        }
        if frame_input.toggles.interpolation {
            game.interpolation_enabled = !game.interpolation_enabled;
            info!("Interpolation: {}", game.interpolation_enabled);
        }

        let dt = get_frame_time();
        if network.is_connected() {
            // Sent every frame, which also keeps the connection from idling out.
            if let Some(command) = game.apply_local_input(frame_input.flags, dt * 1000.0) {
                network.send(command);
            }
            if frame_input.interact {
                if let Some(command) = game.request_interact() {
                    network.send(command);
                }
            }
        }
        game.update(dt);

        let entities = game.render_entities(now_ms);
        let ui = UiConfig {
            connected: network.is_connected(),
            prediction_enabled: game.prediction_enabled,
            interpolation_enabled: game.interpolation_enabled,
            pending_inputs: game.predictor().pending_len(),
            correction_px: game.predictor().error_offset().length(),
            status: status.clone(),
        };
        renderer.render(&entities, &game.orders(), ui);

        next_frame().await;
    }
}
