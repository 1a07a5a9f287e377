use clap::{Parser, Subcommand};
use log::{debug, error, info, LevelFilter};
use pa_agent::auth::{BearerValidator, OAuthClient};
use pa_agent::{server, setup_logging, Config};

#[derive(Parser)]
#[clap(name = "PA Agent API")]
#[clap(version)]
#[clap(about = "Backend for the PA Agent web app", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Log to stderr instead of a file
    #[clap(long, global = true, action)]
    stderr: bool,

    /// Log file path (default: pa_agent_<YYYYMMDD_HH>.log)
    #[clap(long, global = true)]
    log_file: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API (default if no command specified)
    #[clap(name = "serve")]
    Serve {
        /// Address to bind, overrides BIND_ADDRESS
        #[clap(long)]
        bind: Option<String>,
    },

    /// Print a Google consent URL
    #[clap(name = "login-url")]
    LoginUrl,

    /// Resolve an access token to the account it belongs to
    #[clap(name = "check-token")]
    CheckToken {
        /// Access token, with or without a "Bearer " prefix
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_target = if cli.stderr {
        env_logger::builder().filter_level(LevelFilter::Info).init();
        String::from("stderr")
    } else {
        setup_logging(LevelFilter::Debug, cli.log_file.as_deref())?
    };
    debug!("Logging to {}", log_target);

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::LoginUrl) => {
            let oauth = OAuthClient::new(reqwest::Client::new(), &config);
            match oauth.build_login_url() {
                Ok(url) => println!("{}", url),
                Err(e) => {
                    eprintln!("Cannot build login URL: {}", e);
                    std::process::exit(1);
                }
            }
            Ok(())
        }
        Some(Commands::CheckToken { token }) => {
            let http = reqwest::Client::new();
            let validator = BearerValidator::new(http.clone(), OAuthClient::new(http, &config));
            match validator.resolve(&token, None).await {
                Ok(user) => {
                    println!("Token is valid for {}", user.identity.email);
                    if let Some(name) = user.identity.name {
                        println!("Name: {}", name);
                    }
                }
                Err(e) => {
                    eprintln!("Token check failed: {}", e);
                    std::process::exit(1);
                }
            }
            Ok(())
        }
        Some(Commands::Serve { bind }) => {
            if let Some(bind) = bind {
                config.bind_address = bind;
            }
            run_server(config).await
        }
        None => run_server(config).await,
    }
}

async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("PA Agent API starting on {}", config.bind_address);
    if let Err(e) = config.client_credentials() {
        info!("Sign-in is unavailable until configured: {}", e);
    }
    if config.gemini_api_key.is_none() {
        info!("GEMINI_API_KEY is not set; text generation requests will fail");
    }

    let result = server::serve(config).await;
    if let Err(ref e) = result {
        error!("Server stopped with error: {}", e);
    }
    result.map_err(|e| e.into())
}
