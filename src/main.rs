mod config;
mod core;
mod interfaces;
mod logging;

use tracing::error;

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(e) = interfaces::web::run().await {
        error!("Server exited with error: {}", e);
        std::process::exit(1);
    }
}
