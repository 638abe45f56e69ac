pub mod cli;
pub mod clock;
pub mod config;
pub mod constants;
pub mod db;
pub mod entities;
pub mod services;
pub mod state;

use clap::CommandFactory;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub use cli::Cli;
use cli::{Commands, KeyCommands, UserCommands};
pub use config::Config;
pub use state::SharedState;

fn init_tracing(config: &Config) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.general.log_format.eq_ignore_ascii_case("json") {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    config.validate()?;
    init_tracing(&config);

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    if matches!(command, Commands::Init) {
        return cli::cmd_init();
    }

    let state = SharedState::new(config).await?;

    if state
        .user_service
        .ensure_bootstrap_admin(&state.config.bootstrap)
        .await?
    {
        info!(
            username = %state.config.bootstrap.admin_username,
            "Created bootstrap administrator"
        );
    }

    let actor = cli.actor.as_deref();
    let json = cli.json;

    match command {
        Commands::Init => Ok(()),

        Commands::User { command } => match command {
            UserCommands::Add {
                username,
                email,
                admin,
            } => cli::cmd_user_add(&state, actor, &username, &email, admin).await,
            UserCommands::List => cli::cmd_user_list(&state, actor, json).await,
            UserCommands::Show { username } => {
                cli::cmd_user_show(&state, actor, &username, json).await
            }
            UserCommands::Delete { username } => {
                cli::cmd_user_delete(&state, actor, &username).await
            }
            UserCommands::Unlock { username } => {
                cli::cmd_user_unlock(&state, actor, &username).await
            }
            UserCommands::SetActive { username, active } => {
                cli::cmd_user_set_active(&state, actor, &username, active).await
            }
            UserCommands::SetAdmin { username, admin } => {
                cli::cmd_user_set_admin(&state, actor, &username, admin).await
            }
            UserCommands::Passwd { username } => cli::cmd_user_passwd(&state, &username).await,
        },

        Commands::Key { command } => match command {
            KeyCommands::Issue {
                username,
                label,
                expires_in_days,
            } => cli::cmd_key_issue(&state, &username, &label, expires_in_days).await,
            KeyCommands::List { username } => cli::cmd_key_list(&state, &username, json).await,
            KeyCommands::Revoke { username, key_id } => {
                cli::cmd_key_revoke(&state, &username, key_id).await
            }
        },

        Commands::Login {
            identifier,
            issue_key,
            session,
            remember,
        } => cli::cmd_login(&state, &identifier, issue_key, session, remember, json).await,

        Commands::Whoami { token, session } => cli::cmd_whoami(&state, &token, session).await,
    }
}
