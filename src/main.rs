use actix_cors::Cors;
use actix_web::{middleware::Logger, App, HttpServer};
use env_logger::Env;

use todo_api::config::Config;
use todo_api::{configure, connect_database, AppServices};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    tokio::fs::create_dir_all(&config.upload_dir).await?;
    let pool = connect_database(&config).await?;

    let bind_addr = (config.server_host.clone(), config.server_port);
    log::info!("starting server at {}", config.server_url());
    let services = AppServices::new(config, pool)?;

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .configure(|cfg| configure(cfg, &services))
    })
    .bind(bind_addr)?
    .run()
    .await?;

    Ok(())
}
