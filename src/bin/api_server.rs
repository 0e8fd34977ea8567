use entra_vm_api::server;
use entra_vm_api::ServerConfig;
use log::{debug, info};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    pretty_env_logger::init();
    info!("Starting server");

    let config = ServerConfig::from_env();
    debug!("Server config: {:#?}", config);

    server::run(config).await?;

    Ok(())
}
