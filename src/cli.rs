//! Command-line interface definition for oidc-fetch
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// oidc-fetch - fetch OAuth-protected resources
///
/// Requests are authenticated by discovering the resource's authorization
/// server, registering a client dynamically, and obtaining a client
/// credentials token.
#[derive(Parser, Debug, Clone)]
#[command(name = "oidc-fetch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "OIDC_INTERCEPTOR_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the client name from config
    #[arg(long)]
    pub client_name: Option<String>,

    /// Override the registry file location from config
    #[arg(long)]
    pub registry: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Fetch a URL, authenticating if the resource demands it
    Get {
        /// URL of the protected resource
        url: String,

        /// Also print response headers (to stderr)
        #[arg(short = 'i', long)]
        include: bool,
    },

    /// Inspect or edit the client registry
    Clients {
        /// Registry subcommand
        #[command(subcommand)]
        command: ClientsCommand,
    },
}

/// Registry management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ClientsCommand {
    /// List stored client registrations
    List {
        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },

    /// Forget the registration of a client at an issuer
    Forget {
        /// Issuer URL the client is registered with
        issuer: String,

        /// Client name; defaults to the configured name
        name: Option<String>,
    },
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
