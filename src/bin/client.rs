use std::error::Error;

use entra_vm_api::report::{describe_failure, describe_response};
use entra_vm_api::{ApiClient, ClientConfig};
use log::{debug, error};
use serde_json::Value;

const ENDPOINT: &str = "/api/hello";

async fn run() -> entra_vm_api::Result<Value> {
    let config = ClientConfig::from_env()?;
    debug!("Client config: {:#?}", config);

    let client = ApiClient::from_config(&config)?;
    client.get(ENDPOINT).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    pretty_env_logger::init();

    match run().await {
        Ok(result) => println!("{}", describe_response(&result)),
        Err(err) => {
            error!("{:?}", err);
            println!("{}", describe_failure(&err));
        }
    }

    Ok(())
}
