use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pantry::auth::{TokenGenerator, hash_password};
use pantry::config::ServerConfig;
use pantry::error::Error;
use pantry::server::validation::{normalize_email, validate_email, validate_password};
use pantry::server::{AppState, create_router};
use pantry::store::{SqliteStore, Store};
use pantry::types::NewUser;

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "pantry")]
#[command(about = "A recipe API server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// TOML config file; flags given here override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Host to bind to [default: 127.0.0.1]
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to [default: 8080]
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the database and uploaded media [default: ./data]
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Public base URL for external access (e.g., "https://recipes.example.com").
        /// Used for image URLs. If not set, URLs are derived from request headers.
        #[arg(long)]
        public_base_url: Option<String>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the data directory (create the database and media directory)
    Init {
        /// Data directory for the database and uploaded media
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },

    /// Create a staff superuser and print an API token for it
    CreateSuperuser {
        /// Data directory for the database and uploaded media
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,

        #[arg(long, default_value = "")]
        name: String,
    },
}

fn open_store(data_dir: &Path) -> anyhow::Result<SqliteStore> {
    let config = ServerConfig {
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    };
    let db_path = config.db_path();
    if !db_path.exists() {
        bail!(
            "Server not initialized. Run 'pantry admin init --data-dir {}' first to create the database.",
            data_dir.display()
        );
    }

    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;
    Ok(store)
}

fn run_init(data_dir: PathBuf) -> anyhow::Result<()> {
    let config = ServerConfig {
        data_dir,
        ..Default::default()
    };
    fs::create_dir_all(&config.data_dir)?;
    fs::create_dir_all(config.media_dir())?;

    let db_path = config.db_path();
    let existed = db_path.exists();

    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    #[cfg(unix)]
    set_restrictive_permissions(&db_path);

    if existed {
        println!("Database already initialized at {}", db_path.display());
    } else {
        println!("Initialized database at {}", db_path.display());
    }

    if !store.has_superuser()? {
        println!();
        println!("Create an administrator with:");
        println!(
            "  pantry admin create-superuser --data-dir {} --email <email> --password <password>",
            config.data_dir.display()
        );
    }

    Ok(())
}

fn run_create_superuser(
    data_dir: PathBuf,
    email: String,
    password: String,
    name: String,
) -> anyhow::Result<()> {
    let email = normalize_email(&email);
    if let Err(msg) = validate_email(&email) {
        bail!("Invalid email: {msg}");
    }
    if let Err(msg) = validate_password(&password) {
        bail!("Invalid password: {msg}");
    }

    let store = open_store(&data_dir)?;

    let user = match store.create_user(&NewUser {
        email: email.clone(),
        name,
        password_hash: hash_password(&password)?,
        is_staff: true,
        is_superuser: true,
    }) {
        Ok(user) => user,
        Err(Error::AlreadyExists) => bail!("A user with email '{email}' already exists"),
        Err(e) => return Err(e.into()),
    };

    let (token, raw_token) = TokenGenerator::new().issue(user.id)?;
    store
        .create_token(&token)
        .context("Failed to store token")?;

    println!();
    println!("========================================");
    println!("Created superuser '{}' with token:", user.email);
    println!();
    println!("  {raw_token}");
    println!();
    println!("Save this token - it will not be shown again!");
    println!("========================================");
    println!();

    Ok(())
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;

    let store = open_store(&config.data_dir)?;
    fs::create_dir_all(config.media_dir())?;

    if !store.has_superuser()? {
        info!("No superuser exists yet; create one with 'pantry admin create-superuser'");
    }

    let state = Arc::new(AppState::new(Arc::new(store), &config));

    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);
    info!("Serving data from {}", config.data_dir.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pantry=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init { data_dir } => run_init(data_dir)?,
            AdminCommands::CreateSuperuser {
                data_dir,
                email,
                password,
                name,
            } => run_create_superuser(data_dir, email, password, name)?,
        },
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
            public_base_url,
        } => {
            let mut server_config = match &config {
                Some(path) => ServerConfig::load(path)
                    .with_context(|| format!("Failed to load config file {}", path.display()))?,
                None => ServerConfig::default(),
            };
            if let Some(host) = host {
                server_config.host = host;
            }
            if let Some(port) = port {
                server_config.port = port;
            }
            if let Some(data_dir) = data_dir {
                server_config.data_dir = data_dir;
            }
            if public_base_url.is_some() {
                server_config.public_base_url = public_base_url;
            }

            run_serve(server_config).await?;
        }
    }

    Ok(())
}
