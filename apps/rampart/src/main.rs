mod cli;
mod config;
mod demo;
mod handlers;
mod websocket;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use clap::Parser;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use rampart_core::{Clock, GameClock, Session, WallClock};

use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::demo::{DemoHooks, DemoInput, DemoScreen};
use crate::websocket::{log_events, websocket_handler, GatewayState};

#[tokio::main]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "rampart=info,tower_http=warn");
    }
    tracing_subscriber::fmt::init();

    let args = Cli::parse();
    if let Some(Commands::Probe { url, name }) = &args.command {
        if let Err(err) = cli::run_probe(url, name).await {
            error!("probe failed: {err:#}");
            std::process::exit(1);
        }
        return;
    }

    let mut config = Config::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }

    let screen = DemoScreen::new(config.grid_width, config.grid_height);
    let game_clock = config.use_game_clock.then(GameClock::default);
    let clock: Box<dyn Clock> = match &game_clock {
        Some(game_clock) => Box::new(game_clock.clone()),
        None => Box::new(WallClock),
    };

    let session = Session::new(
        config.session_config(),
        screen.clone(),
        Box::new(DemoInput::new(screen.clone())),
        Box::new(DemoHooks),
        clock,
    );
    let state = GatewayState::new(session);

    tokio::spawn(tick_driver(
        state.clone(),
        screen,
        game_clock,
        config.tick_ms,
    ));

    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/status.json", get(handlers::status))
        .route("/", get(websocket_handler))
        .route("/*path", get(websocket_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "rampart listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%addr, "failed to bind: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        error!("server error: {err}");
    }
}

/// Advances the demo screen and the game clock, then runs the session
/// tick and fans the resulting frames out to their connections.
async fn tick_driver(
    state: GatewayState,
    screen: Arc<DemoScreen>,
    game_clock: Option<GameClock>,
    tick_ms: u64,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(tick_ms.max(10)));
    loop {
        interval.tick().await;
        let changed = screen.advance();
        if let Some(game_clock) = &game_clock {
            game_clock.advance(1);
        }

        let frames = {
            let mut session = state.session.lock().await;
            session.invalidate_cells(&changed);
            let frames = session.tick();
            log_events(session.drain_events());
            frames
        };
        for (id, frame) in frames {
            if let Some(sender) = state.senders.get(&id) {
                let _ = sender.send(frame);
            }
        }
    }
}
