use anyhow::Result;
use callcenter::cli::{App, Cli, Commands, ConfigCommand, Config, OutputFormat};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Listen { url, token, json } => {
            let mut app = App::new(cli.config)?;
            if let Err(e) = app
                .handle_listen(url, token, OutputFormat::from_json_flag(json))
                .await
            {
                error!("{:#}", e);
                std::process::exit(1);
            }
        }
        Commands::Config { command } => match command {
            ConfigCommand::Path => match cli.config {
                Some(path) => println!("{}", path.display()),
                None => println!("{}", Config::default_config_file()?.display()),
            },
            ConfigCommand::Show => {
                let app = App::new(cli.config)?;
                app.handle_config_show()?;
            }
            ConfigCommand::Init { force } => {
                let path = match cli.config {
                    Some(path) => path,
                    None => Config::default_config_file()?,
                };
                let app = App {
                    config: Config::default(),
                    config_path: path,
                };
                app.handle_config_init(force)?;
            }
        },
    }

    Ok(())
}
