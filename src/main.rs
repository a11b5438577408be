mod access;
mod actors;
mod collaboration;
mod credentials;
mod db;
mod documents;
mod error;
mod models;
mod notifications;
mod protocol;
mod schema;
mod scriba;
mod store;
mod types;
mod users;

#[cfg(test)]
mod testing;

use std::env;

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    env_logger::init();

    let Ok(config_str) = &env::var("SCRIBA_CONFIG") else {
        log::error!("Config not found! Set env variable \"SCRIBA_CONFIG\"");
        return;
    };

    let config = match serde_json::from_str::<scriba::ScribaConfig>(config_str)
    {
        Ok(config) => config,
        Err(err) => {
            log::error!("Error parsing config:\n{}", err);
            return;
        }
    };

    let scriba = match scriba::Scriba::new(config).await {
        Ok(scriba) => scriba,
        Err(err) => {
            log::error!("Couldn't start: {}", err);
            return;
        }
    };
    if let Err(err) = scriba.run().await {
        log::error!("Server error: {}", err);
    }
}
