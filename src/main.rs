//! oidc-fetch - fetch OAuth-protected resources from the command line

use anyhow::Result;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use oidc_interceptor::cli::{Cli, ClientsCommand, Commands};
use oidc_interceptor::config::Config;
use oidc_interceptor::registry::{ClientRepository, YamlClientRepository};
use oidc_interceptor::{AuthError, OidcInterceptor};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let mut config = Config::load(config_path)?;
    config.apply_cli_overrides(&cli);
    config.validate()?;

    match cli.command {
        Commands::Get { url, include } => fetch(&config, &url, include).await,
        Commands::Clients { command } => match command {
            ClientsCommand::List { json } => list_clients(&config, json).await,
            ClientsCommand::Forget { issuer, name } => {
                let name = name.unwrap_or_else(|| config.client.client_name.clone());
                forget_client(&config, &issuer, &name).await
            }
        },
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "oidc_interceptor=debug,oidc_fetch=debug"
    } else {
        "oidc_interceptor=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn fetch(config: &Config, url: &str, include: bool) -> Result<()> {
    let interceptor = OidcInterceptor::from_config(config)?;
    tracing::info!("Fetching {}", url);

    let response = interceptor.get(url).await?;
    let status = response.status();

    eprintln!("{:?} {}", response.version(), status);
    if include {
        for (name, value) in response.headers() {
            eprintln!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
        }
        eprintln!();
    }

    let body = response.bytes().await?;
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&body).await?;
    stdout.flush().await?;

    if !status.is_success() {
        anyhow::bail!("{} responded with {}", url, status);
    }
    Ok(())
}

/// Registry entry as shown to the user; secrets are never printed.
#[derive(Serialize)]
struct ClientSummary {
    key: String,
    client_name: String,
    issuer: String,
    client_id: String,
    manageable: bool,
}

async fn list_clients(config: &Config, json: bool) -> Result<()> {
    let repository = YamlClientRepository::new(&config.registry.path)?;
    let clients: Vec<ClientSummary> = repository
        .list()
        .await?
        .into_iter()
        .map(|c| ClientSummary {
            key: c.key(),
            manageable: c.registration_client_uri.is_some() && c.registration_access_token.is_some(),
            client_name: c.client_name,
            issuer: c.issuer,
            client_id: c.client_id,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&clients).map_err(AuthError::from)?);
        return Ok(());
    }

    if clients.is_empty() {
        println!("No client registrations in {}", config.registry.path.display());
        return Ok(());
    }

    println!("{:<60} {:<40} {}", "KEY", "ISSUER", "CLIENT ID");
    for client in &clients {
        println!("{:<60} {:<40} {}", client.key, client.issuer, client.client_id);
    }
    Ok(())
}

async fn forget_client(config: &Config, issuer: &str, name: &str) -> Result<()> {
    // Registrations are stored under the issuer's parsed form.
    let issuer = url::Url::parse(issuer).map_err(AuthError::from)?;
    let repository = YamlClientRepository::new(&config.registry.path)?;

    if repository.get_by_name(issuer.as_str(), name).await?.is_none() {
        println!("No registration of {} at {}", name, issuer);
        return Ok(());
    }

    repository.delete_by_name(issuer.as_str(), name).await?;
    println!("Forgot registration of {} at {}", name, issuer);
    Ok(())
}
