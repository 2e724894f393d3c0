use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use taskhub_be::config::AppConfig;
use taskhub_be::database::Database;
use taskhub_be::docs::ApiDoc;
use taskhub_be::handlers::health;
use taskhub_be::notifications::Notifier;
use taskhub_be::storage::FileStore;
use taskhub_be::{configure_routes, json_config, path_config, query_config};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    log::info!("Starting TaskHub Backend API on port {}", config.port);
    log::info!("Environment: {}", config.environment);
    log::info!("Allowed frontend URLs: {}", config.frontend_urls.join(", "));

    let database = Database::new(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;

    database.health_check().await?;
    database.check_tables().await?;
    database.get_stats().await?.log_stats();

    let store = FileStore::new(config.attachments_dir.clone(), config.images_dir.clone());
    store
        .ensure_dirs()
        .map_err(|e| anyhow::anyhow!("Failed to prepare upload directories: {}", e))?;

    let notifier = Notifier::new(config.notification_webhook_url.clone());
    if config.notification_webhook_url.is_none() {
        log::info!("NOTIFICATION_WEBHOOK_URL not set, notifications are only logged");
    }

    let port = config.port;
    let serve_docs = config.is_development();
    let allowed_origins = config.frontend_urls.clone();

    let config_data = web::Data::new(config);
    let db_data = web::Data::new(database);
    let store_data = web::Data::new(store);
    let notifier_data = web::Data::new(notifier);

    if serve_docs {
        log::info!("Swagger UI available at http://localhost:{}/swagger-ui/", port);
    } else {
        log::info!("Swagger UI disabled outside development");
    }

    HttpServer::new(move || {
        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                "Authorization",
                "Content-Type",
                "Accept",
                "Origin",
                "X-Requested-With",
            ])
            .expose_headers(vec!["Content-Disposition"])
            .supports_credentials();

        for origin in &allowed_origins {
            cors = cors.allowed_origin(origin);
        }

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(config_data.clone())
            .app_data(db_data.clone())
            .app_data(store_data.clone())
            .app_data(notifier_data.clone())
            .app_data(json_config())
            .app_data(query_config())
            .app_data(path_config())
            .configure(|cfg| {
                if serve_docs {
                    cfg.service(
                        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
                    );
                }
            })
            .configure(health::configure)
            .configure(configure_routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    Ok(())
}
