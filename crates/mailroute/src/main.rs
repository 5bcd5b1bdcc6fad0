//! `mailroute` - command line front end for transport selection and sending.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{AccountCommand, Cli, Command, DefaultCommand, ProviderArgs, ProviderCommand, SendArgs};
use mailroute_core::{
    Account, AccountId, AccountRepository, AccountStore, Config, Database, OutgoingMessage,
    Provider, ProviderId, ProviderRepository, SendRouter, SmtpDescriptor, SmtpTransportFactory,
};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailroute=info,mailroute_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Core errors carry a kind callers can branch on.
            let failure = e
                .downcast_ref::<mailroute_core::Error>()
                .map(mailroute_core::Error::to_failure);
            match failure {
                Some(failure) => eprintln!("{}", json!({ "error": failure })),
                None => eprintln!("Error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

/// Application handles shared by every command.
struct App {
    accounts: AccountRepository,
    providers: ProviderRepository,
    router: SendRouter,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config_from(&cli)?;
    debug!("Using database {}", config.database_path);

    let db = Database::open(&config.database_path)
        .await
        .with_context(|| format!("opening database {}", config.database_path))?;
    let accounts = db.accounts();
    let providers = db.providers();
    let router = SendRouter::new(
        config,
        Arc::new(accounts.clone()),
        Arc::new(providers.clone()),
        Arc::new(SmtpTransportFactory),
    );

    let app = App {
        accounts,
        providers,
        router,
    };

    let result = execute(&app, cli.command).await;
    // Demotions started by failed validations must land before the runtime goes away.
    app.router.shutdown().await;
    result
}

async fn execute(app: &App, command: Command) -> anyhow::Result<()> {
    if app.router.boot().await? {
        info!("Default account selected at startup");
    }

    match command {
        Command::Provider(cmd) => provider_command(app, cmd).await,
        Command::Account(cmd) => account_command(app, cmd).await,
        Command::Default(cmd) => default_command(app, cmd).await,
        Command::Send(args) => send_command(app, args).await,
    }
}

fn config_from(cli: &Cli) -> anyhow::Result<Config> {
    let database = match &cli.database {
        Some(path) => path.clone(),
        None => default_database_path()?,
    };
    let mut config = Config {
        database_path: database.to_string_lossy().into_owned(),
        set_default_on_mount: cli.set_default_on_mount,
        ..Config::default()
    };
    if let Some(secs) = cli.timeout_secs {
        config.timeout_secs = secs;
    }
    Ok(config)
}

fn default_database_path() -> anyhow::Result<PathBuf> {
    let dir = dirs::data_dir()
        .context("no data directory for this platform; pass --database")?
        .join("mailroute");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating data directory {}", dir.display()))?;
    Ok(dir.join("mailroute.db"))
}

async fn provider_command(app: &App, cmd: ProviderCommand) -> anyhow::Result<()> {
    match cmd {
        ProviderCommand::Add(args) => {
            let mut provider = provider_from(args)?;
            app.providers.save(&mut provider).await?;
            info!("Added provider {}", provider.label());
            print_json(&provider_json(&provider))
        }
        ProviderCommand::List => {
            let providers = app.providers.list().await?;
            print_json(&providers.iter().map(provider_json).collect::<Vec<_>>())
        }
        ProviderCommand::Delete { id } => {
            let id = ProviderId::new(id);
            if !app.providers.delete(id).await? {
                bail!(mailroute_core::Error::NotFound(format!("provider {id}")));
            }
            info!("Deleted provider {id}");
            if let Some(bound) = app.router.binding().get().await
                && bound.account.provider_id == id
            {
                app.router.reset_default(bound.account.id).await?;
            }
            print_json(&app.router.default_info().await)
        }
    }
}

fn provider_from(args: ProviderArgs) -> anyhow::Result<Provider> {
    let mode = args.mode.into();
    let mut provider = match (&args.preset, &args.host) {
        (Some(email), _) => Provider::preset_for(email, mode)
            .with_context(|| format!("no preset known for {email}"))?,
        (None, Some(host)) => Provider::new(
            host.clone(),
            mode,
            SmtpDescriptor::new(host.clone(), args.security.into()),
        ),
        (None, None) => bail!("either --host or --preset is required"),
    };

    if let Some(name) = args.name {
        provider.name = name;
    }
    if let Some(smtp) = provider.smtp.as_mut() {
        if let Some(port) = args.port {
            smtp.port = port;
        }
        smtp.timeout_secs = args.timeout_secs;
        if let Some(hello) = args.hello_name {
            smtp.extra.insert("helloName".to_string(), hello);
        }
        if args.accept_invalid_certs {
            smtp.extra
                .insert("acceptInvalidCerts".to_string(), "true".to_string());
        }
    }
    if let Some(secret) = args.secret {
        provider = provider.with_secret(secret);
    }
    Ok(provider)
}

async fn account_command(app: &App, cmd: AccountCommand) -> anyhow::Result<()> {
    match cmd {
        AccountCommand::Add {
            email,
            provider,
            secret,
        } => {
            let mut account = Account::new(email, ProviderId::new(provider));
            if let Some(secret) = secret {
                account = account.with_auth_override(secret);
            }
            app.accounts.save(&mut account).await?;
            info!("Added account {}", account.label());
            print_json(&account_json(&account))
        }
        AccountCommand::List => {
            let accounts = app.accounts.list().await?;
            print_json(&accounts.iter().map(account_json).collect::<Vec<_>>())
        }
        AccountCommand::Delete { id } => {
            let id = AccountId::new(id);
            if !app.accounts.delete(id).await? {
                bail!(mailroute_core::Error::NotFound(format!("account {id}")));
            }
            info!("Deleted account {id}");
            app.router.reset_default(Some(id)).await?;
            print_json(&app.router.default_info().await)
        }
    }
}

async fn default_command(app: &App, cmd: DefaultCommand) -> anyhow::Result<()> {
    match cmd {
        DefaultCommand::Show => {}
        DefaultCommand::Select => {
            app.router.select_default().await?;
        }
        DefaultCommand::Set { id } => {
            let id = AccountId::new(id);
            let account = app
                .accounts
                .find_by_id(id, true)
                .await?
                .ok_or_else(|| mailroute_core::Error::NotFound(format!("account {id}")))?;
            app.router.set_default(account).await?;
        }
        DefaultCommand::Reset { id } => {
            app.router.reset_default(id.map(AccountId::new)).await?;
        }
    }
    print_json(&app.router.default_info().await)
}

async fn send_command(app: &App, args: SendArgs) -> anyhow::Result<()> {
    let mut message = OutgoingMessage::new(args.subject);
    message.to = args.to;
    message.cc = args.cc;
    message.bcc = args.bcc;
    message.text = args.text;
    message.html = args.html;
    message.from = args.from;
    message.reply_to = args.reply_to;
    message.account_id = args.account.map(AccountId::new);

    for path in &args.attach {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading attachment {}", path.display()))?;
        let filename = path
            .file_name()
            .map_or_else(|| "attachment".to_string(), |n| n.to_string_lossy().into_owned());
        message = message.attach(filename, content_type_for(path), content);
    }

    let receipt = app.router.send(&message).await?;
    print_json(&receipt)
}

/// Guesses a MIME type from the file extension.
fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "html" | "htm" => "text/html",
        "csv" => "text/csv",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

fn provider_json(provider: &Provider) -> serde_json::Value {
    json!({
        "id": provider.id,
        "name": provider.name,
        "mode": provider.mode,
        "status": provider.status,
        "endpoint": provider.smtp.as_ref().map(|smtp| format!(
            "{}:{} ({})",
            smtp.host,
            smtp.effective_port(),
            smtp.security.label()
        )),
        "smtp": provider.smtp,
        "hasSecret": provider.secret.is_some(),
    })
}

fn account_json(account: &Account) -> serde_json::Value {
    json!({
        "id": account.id,
        "email": account.email,
        "providerId": account.provider_id,
        "provider": account.provider.as_ref().map(|p| p.name.clone()),
        "hasOverride": account.auth_override.is_some(),
        "createdAt": account.created_at.to_rfc3339(),
    })
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
