use vljepa_server_lib::config::ServiceConfig;

#[tokio::main]
async fn main() {
    vljepa_server_lib::logging::init_tracing();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(2);
        }
    };

    if let Err(e) = vljepa_server_lib::run(config).await {
        tracing::error!(error = %e, "Server stopped");
        std::process::exit(1);
    }
}
