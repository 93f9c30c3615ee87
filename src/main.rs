//! Headless draughts relay server and CLI.
//!
//! `draughtsd serve` starts the HTTP + WebSocket relay; `draughtsd notation`
//! exports archived games to Portable Numeric Notation text for offline
//! analysis.

use actix::Actor;
use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use clap::{Parser, Subcommand};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use draughts_core::api::{self, ApiDoc, AppState};
use draughts_core::notation::{self, Headers};
use draughts_core::relay::{self, RoomRegistry};
use draughts_core::storage::GameStorage;

#[derive(Parser, Debug)]
#[command(name = "draughtsd")]
#[command(about = "Headless draughts relay server — sixteen rule variants over WebSocket")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the WebSocket relay server.
    Serve {
        #[arg(short, long, default_value_t = 8443)]
        port: u16,

        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Directory for game storage (active + archive).
        #[arg(long, default_value = "data")]
        data_dir: String,
    },

    /// Render archived games as Portable Numeric Notation text.
    Notation {
        #[arg(long, default_value = "data")]
        data_dir: String,

        /// Render a specific game by UUID; omit to render every archived game.
        #[arg(short, long)]
        game_id: Option<String>,

        /// List archived game ids without rendering.
        #[arg(short, long)]
        list: bool,

        /// Write output to a file instead of stdout.
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host, data_dir } => run_server(&host, port, &data_dir).await,
        Commands::Notation { data_dir, game_id, list, output } => run_notation(&data_dir, game_id.as_deref(), list, output.as_deref()).map_err(std::io::Error::other),
    }
}

async fn run_server(host: &str, port: u16, data_dir: &str) -> std::io::Result<()> {
    let openapi = ApiDoc::openapi();
    let storage = GameStorage::new(data_dir)?;
    let app_state = web::Data::new(AppState::new(storage));
    let registry = RoomRegistry::new().start();
    let registry_data = web::Data::new(registry);

    log::info!("starting the draughts relay on {host}:{port}");
    log::info!("game storage directory: {data_dir}");
    log::info!("websocket endpoint: ws://{host}:{port}/ws");
    log::info!("swagger ui: http://{host}:{port}/swagger-ui/");

    HttpServer::new(move || {
        let cors = Cors::default().allow_any_origin().allow_any_method().allow_any_header().max_age(3600);
        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(app_state.clone())
            .app_data(registry_data.clone())
            .configure(api::configure_routes)
            .route("/ws", web::get().to(relay::ws_connect))
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()))
    })
    .bind((host, port))?
    .run()
    .await
}

fn run_notation(data_dir: &str, game_id: Option<&str>, list: bool, output: Option<&str>) -> Result<(), String> {
    let storage = GameStorage::new(data_dir).map_err(|e| e.to_string())?;
    let ids = if let Some(id) = game_id {
        vec![uuid::Uuid::parse_str(id).map_err(|e| e.to_string())?]
    } else {
        storage.list_archived().map_err(|e| e.to_string())?
    };

    if list {
        for id in &ids {
            println!("{id}");
        }
        return Ok(());
    }

    let mut rendered = String::new();
    for id in &ids {
        let archive = storage.load_archive(id).map_err(|e| e.to_string())?;
        let variant = archive.variant();
        let headers = Headers { event: Some(format!("Archived game {id}")), date: None, white: None, black: None, gametype: None, result: None };
        rendered.push_str(&notation::render_game(&variant, &headers, &archive.moves));
        rendered.push('\n');
    }

    match output {
        Some(path) => std::fs::write(path, rendered).map_err(|e| e.to_string()),
        None => {
            print!("{rendered}");
            Ok(())
        }
    }
}
