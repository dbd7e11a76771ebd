//! Shader Farm daemon CLI
//!
//! Entry point for the `shaderfarmd` command-line tool.

use clap::{Parser, Subcommand};
use shaderfarm::{Server, ServerEnvironment};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shaderfarmd")]
#[command(about = "Shader compile-farm coordination server", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server
    Serve {
        /// Path to config file (default: built-in defaults)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Override the listen port from the config
        #[arg(long, short = 'p')]
        port: Option<u16>,
    },

    /// Load the configuration, print the resolved environment, and exit
    CheckConfig {
        /// Path to config file (default: built-in defaults)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port } => {
            run_serve(config, port);
        }
        Commands::CheckConfig { config } => {
            run_check_config(config);
        }
    }
}

fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) {
    let mut env = match ServerEnvironment::load(config_path.as_deref()) {
        Ok(env) => env,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };
    if let Some(port) = port {
        env.port = port;
    }

    let server = match Server::bind(env) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Error starting server: {}", e);
            process::exit(1);
        }
    };

    let ctx = server.context();
    if let Err(e) = ctrlc::set_handler(move || {
        ctx.state.request_shutdown();
    }) {
        eprintln!("Error installing signal handler: {}", e);
        process::exit(1);
    }

    if let Err(e) = server.run() {
        eprintln!("Server error: {}", e);
        process::exit(1);
    }
}

fn run_check_config(config_path: Option<PathBuf>) {
    match ServerEnvironment::load(config_path.as_deref()) {
        Ok(env) => {
            println!("Configuration valid");
            println!();
            println!("  Port: {}", env.port);
            println!("  Max connections: {}", env.max_connections);
            println!("  Caching: {}", env.caching);
            println!("  Root: {}", env.root_dir.display());
            println!("  Compiler: {}", env.compiler_dir.display());
            println!("  Cache: {}", env.cache_dir.display());
            println!("  Errors: {}", env.error_dir.display());
            println!("  Shader lists: {}", env.shader_dir.display());
            if !env.whitelist.is_empty() {
                println!("  Whitelisted peers: {}", env.whitelist.len());
            }
            println!("  Platforms: {}", env.platform_folders.len());
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    }
}
