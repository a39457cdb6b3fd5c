//! Controller of the JUG community site
//!
//! Owns the HTTP API around events and their registrations, the database and
//! the RabbitMQ channel towards the mail worker.
//!
//! # Example
//!
//! ```no_run
//! use jugsite_controller_core::Controller;
//! use anyhow::Result;
//!
//! #[actix_web::main]
//! async fn main() {
//!     jugsite_controller_core::try_or_exit(run()).await;
//! }
//!
//! async fn run() -> Result<()> {
//!     if let Some(controller) = Controller::create("JUG Site Controller").await? {
//!         controller.run().await?;
//!     }
//!
//!     Ok(())
//! }
//! ```
use crate::api::v1::response::json_error_handler;
use crate::cli::Args;
use crate::services::{MailService, RegistrationService, SystemClock};
use crate::settings::{Settings, SharedSettings};
use actix_cors::Cors;
use actix_web::web::{self, Data};
use actix_web::{App, HttpServer, Scope};
use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use database::Db;
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing_actix_web::TracingLogger;

pub mod api;
pub mod settings;

mod cli;
mod jobs;
mod services;
mod trace;

pub use actix_web::error::BlockingError;

/// Controller struct representation containing all fields required to extend and drive the controller
pub struct Controller {
    /// Settings loaded on [Controller::create]
    pub startup_settings: Arc<Settings>,

    /// Cloneable shared settings, can be used to reload settings from, when receiving the `reload` signal
    pub shared_settings: SharedSettings,

    args: Args,

    /// Cloneable database connection pool
    pub db: Arc<Db>,

    rabbitmq_connection: lapin::Connection,
    rabbitmq_channel: Arc<lapin::Channel>,

    /// Cloneable broadcast channel to signal a graceful shutdown to all worker tasks
    pub shutdown: broadcast::Sender<()>,

    /// Cloneable broadcast channel to signal all configuration consumers to reload
    pub reload: broadcast::Sender<()>,
}

impl Controller {
    /// Tries to create a controller from CLI arguments and the settings file
    ///
    /// Returns `Ok(None)` when the program should exit early, e.g. after
    /// running a cli subcommand.
    pub async fn create(program_name: &str) -> Result<Option<Self>> {
        let args = cli::parse_args().await?;

        // Some args run commands by them self and thus should not start the controller
        if !args.controller_should_start() {
            return Ok(None);
        }

        let settings = settings::load_settings(&args)?;
        trace::init(&settings.logging)?;

        log::info!("Starting {}", program_name);

        let controller = Self::init(settings, args).await?;

        Ok(Some(controller))
    }

    async fn init(settings: Settings, args: Args) -> Result<Self> {
        let startup_settings = Arc::new(settings.clone());
        let shared_settings: SharedSettings = Arc::new(ArcSwap::from(Arc::new(settings)));

        db_storage::migrations::migrate_from_url(&startup_settings.database.url)
            .await
            .context("Failed to migrate database")?;

        let rabbitmq_connection = lapin::Connection::connect(
            &startup_settings.rabbit_mq.url,
            lapin::ConnectionProperties::default()
                .with_executor(tokio_executor_trait::Tokio::current())
                .with_reactor(tokio_reactor_trait::Tokio),
        )
        .await
        .context("failed to connect to RabbitMQ")?;

        let rabbitmq_channel = Arc::new(
            rabbitmq_connection
                .create_channel()
                .await
                .context("Could not create rabbitmq channel")?,
        );

        // Connect to database
        let db = Arc::new(
            Db::connect_url(
                &startup_settings.database.url,
                startup_settings.database.max_connections,
                Some(startup_settings.database.min_idle_connections),
            )
            .context("Failed to connect to database")?,
        );

        let (shutdown, _) = broadcast::channel::<()>(1);
        let (reload, _) = broadcast::channel::<()>(4);

        Ok(Self {
            startup_settings,
            shared_settings,
            args,
            db,
            rabbitmq_connection,
            rabbitmq_channel,
            shutdown,
            reload,
        })
    }

    /// Runs the controller until a fatal error occurred or a shutdown is requested (e.g. SIGTERM)
    pub async fn run(self) -> Result<()> {
        let registration_service = Arc::new(RegistrationService::new(
            self.db.clone(),
            self.db.clone(),
            Arc::new(SystemClock),
        ));

        let mail_service = Arc::new(MailService::new(
            self.shared_settings.clone(),
            self.rabbitmq_channel.clone(),
        ));

        jobs::start_cleanup_job(
            registration_service.clone(),
            self.startup_settings.registration_cleanup.clone(),
            self.shutdown.subscribe(),
        );

        // Start HTTP Server
        let http_server = {
            let shared_settings = Data::from(self.shared_settings.clone());
            let db = Data::from(self.db.clone());
            let registration_service = Data::from(registration_service);
            let mail_service = Data::from(mail_service);

            let cors = self.startup_settings.http.cors.clone();

            HttpServer::new(move || {
                let cors = setup_cors(&cors);

                App::new()
                    .wrap(cors)
                    .wrap(TracingLogger::<trace::ReducedSpanBuilder>::new())
                    .app_data(web::JsonConfig::default().error_handler(json_error_handler))
                    .app_data(shared_settings.clone())
                    .app_data(db.clone())
                    .app_data(registration_service.clone())
                    .app_data(mail_service.clone())
                    .service(v1_scope())
            })
        };

        let address = (Ipv6Addr::UNSPECIFIED, self.startup_settings.http.port);
        let http_server = http_server.bind(address).with_context(|| {
            format!("Failed to bind http server to {}:{}", address.0, address.1)
        })?;

        log::info!("Startup finished");

        let http_server = http_server.disable_signals().run();
        let http_server_handle = http_server.handle();

        actix_rt::spawn(http_server);

        let mut reload_signal =
            signal(SignalKind::hangup()).context("Failed to register SIGHUP signal handler")?;

        // Wait for either SIGTERM/SIGINT or SIGHUP, the latter reloads the
        // reloadable part of the configuration and keeps running
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Got termination signal, exiting");
                    break;
                }
                _ = reload_signal.recv() => {
                    log::info!("Got reload signal, reloading");

                    if let Err(e) =
                        settings::reload_settings(self.shared_settings.clone(), &self.args.config)
                    {
                        log::error!("Failed to reload settings, {}", e);
                        continue;
                    }

                    // discard result, might fail if no one is subscribed
                    let _ = self.reload.send(());
                }
            }
        }

        // ==== Begin shutdown sequence ====

        // first stop all background tasks
        let _ = self.shutdown.send(());

        // then stop HTTP server
        http_server_handle.stop(true).await;

        // Check in a 1 second interval for 10 seconds if all tasks have exited
        let mut timeout_interval = interval(Duration::from_secs(1));

        for _ in 0..10 {
            timeout_interval.tick().await;

            if self.shutdown.receiver_count() == 0 {
                break;
            }
        }

        if self.shutdown.receiver_count() > 0 {
            log::error!(
                "Not all tasks stopped within the timeout, exiting with {} tasks left",
                self.shutdown.receiver_count()
            );
        }

        if let Err(e) = self.rabbitmq_connection.close(0, "shutting down").await {
            log::error!("Failed to close RabbitMQ connection, {}", e);
        }

        log::info!("Shutdown complete");

        Ok(())
    }
}

fn v1_scope() -> Scope {
    web::scope("/v1")
        .service(api::v1::events::new_event)
        .service(api::v1::events::get_events)
        .service(api::v1::events::get_event)
        .service(api::v1::events::patch_event)
        .service(api::v1::events::get_registrations)
        .service(api::v1::events::register)
        .service(api::v1::events::delete_registrations)
}

fn setup_cors(settings: &settings::HttpCors) -> Cors {
    let mut cors = Cors::default()
        .allow_any_header()
        .allow_any_method()
        .max_age(3600);

    for origin in &settings.allowed_origin {
        cors = cors.allowed_origin(origin)
    }

    cors
}

/// Helper function to run a future to completion, logging and exiting the
/// process on error. Used as the outermost error handler in `main`.
pub async fn try_or_exit<T, F>(f: F) -> T
where
    F: std::future::Future<Output = Result<T>>,
{
    match f.await {
        Ok(ok) => ok,
        Err(err) => {
            log::error!("Crashed with error: {:?}", err);

            std::process::exit(-1);
        }
    }
}

/// Runs a closure on the blocking thread pool while retaining the current
/// tracing span
pub async fn block<F, R>(f: F) -> Result<R, BlockingError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let span = tracing::Span::current();

    actix_web::web::block(move || span.in_scope(f)).await
}
