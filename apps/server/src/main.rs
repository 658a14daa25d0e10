use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use curalink_backend_runtime::{telemetry, BackendServices};
use curalink_config::{load as load_config, AppConfig};
use curalink_database::{CreateUserRequest, ListOrder, SessionRepository, UserRepository};
use curalink_gateway::{build_router, GatewayState};
use curalink_realtime::NotificationStore;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "curalink-backend")]
#[command(about = "Curalink realtime notification backend (serves by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server
    Serve,
    /// Create a session token for a user, creating the user by name if needed
    IssueToken(IssueTokenArgs),
    /// Print a user's stored notifications, oldest first
    DumpNotifications {
        #[arg(long)]
        user_id: i64,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct IssueTokenArgs {
    #[arg(long)]
    user_id: Option<i64>,
    #[arg(long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing().context("failed to initialise tracing")?;
    let config = load_config().context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config).await,
        Commands::IssueToken(args) => issue_token(config, args).await,
        Commands::DumpNotifications { user_id } => dump_notifications(config, user_id).await,
    }
}

async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    info!("starting Curalink backend");

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let state = GatewayState::new(
        services.db_pool.clone(),
        services.registry.clone(),
        config.realtime.clone(),
    );
    let app = build_router(state);

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    // live sockets keep graceful shutdown waiting, so release them as soon as the signal fires
    let registry = services.registry.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            curalink_backend_runtime::shutdown_signal().await;
            let released = registry.shutdown().await;
            info!(released, "stopped accepting websocket connections");
        })
        .await
        .context("http server error")?;

    services.shutdown().await;
    info!("backend shut down");
    Ok(())
}

async fn issue_token(config: AppConfig, args: IssueTokenArgs) -> anyhow::Result<()> {
    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;
    let users = UserRepository::new(services.db_pool.clone());

    let user = match (args.user_id, args.name) {
        (Some(user_id), _) => users
            .find_by_id(user_id)
            .await?
            .with_context(|| format!("user {user_id} does not exist"))?,
        (None, Some(name)) => match users.find_by_name(&name).await? {
            Some(user) => user,
            None => {
                let user = users
                    .create(&CreateUserRequest {
                        full_name: name,
                        email: None,
                        role: None,
                    })
                    .await?;
                info!(user_id = user.id, "created user");
                user
            }
        },
        (None, None) => bail!("either --user-id or --name is required"),
    };

    let session = SessionRepository::new(services.db_pool.clone())
        .create(user.id, config.auth.session_ttl_seconds)
        .await?;

    println!("user_id:    {}", user.id);
    println!("name:       {}", user.full_name);
    println!("token:      {}", session.token);
    println!("expires_at: {}", session.expires_at);

    services.shutdown().await;
    Ok(())
}

async fn dump_notifications(config: AppConfig, user_id: i64) -> anyhow::Result<()> {
    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let notifications = NotificationStore::from_pool(services.db_pool.clone())
        .collect_for_user(user_id, ListOrder::OldestFirst)
        .await
        .context("failed to fetch notifications")?;

    println!("=== NOTIFICATIONS FOR USER {user_id} ===");
    if notifications.is_empty() {
        println!("No notifications found");
    } else {
        println!(
            "{:<6} {:<18} {:<6} {:<8} {:<28} {:<25}",
            "ID", "Type", "Read", "Sender", "Title", "Created At"
        );
        println!("{}", "-".repeat(96));
        for notification in notifications {
            println!(
                "{:<6} {:<18} {:<6} {:<8} {:<28} {:<25}",
                notification.id,
                notification.notification_type.to_string(),
                notification.is_read,
                notification
                    .sender_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                notification.title,
                notification.created_at,
            );
            println!("       {}", notification.message);
        }
    }

    services.shutdown().await;
    Ok(())
}
