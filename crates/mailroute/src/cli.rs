//! Command line definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use mailroute_core::{ConnectionMode, Security};

/// Keeps one working outbound mail transport and sends through it.
#[derive(Parser, Debug)]
#[command(name = "mailroute", version, about)]
pub struct Cli {
    /// Path of the provider/account database.
    #[arg(long, global = true, env = "MAILROUTE_DATABASE")]
    pub database: Option<PathBuf>,

    /// Pick a default account before running the command.
    #[arg(long, global = true, env = "SET_DEFAULT_ACCOUNT_ON_MOUNT")]
    pub set_default_on_mount: bool,

    /// Verify/send timeout in seconds for providers without their own.
    #[arg(long, global = true, env = "MAILROUTE_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage providers
    #[command(subcommand)]
    Provider(ProviderCommand),

    /// Manage accounts
    #[command(subcommand)]
    Account(AccountCommand),

    /// Inspect or change the default account
    #[command(subcommand)]
    Default(DefaultCommand),

    /// Send a message
    Send(SendArgs),
}

#[derive(Subcommand, Debug)]
pub enum ProviderCommand {
    /// Add a provider
    Add(ProviderArgs),
    /// List providers
    List,
    /// Delete a provider; its accounts stay but can no longer send
    Delete {
        /// Provider id
        id: i64,
    },
}

#[derive(clap::Args, Debug)]
pub struct ProviderArgs {
    /// Display name (defaults to the preset name or the host)
    #[arg(long)]
    pub name: Option<String>,

    /// SMTP host
    #[arg(long, required_unless_present = "preset")]
    pub host: Option<String>,

    /// SMTP port (defaults to the security mode's port)
    #[arg(long)]
    pub port: Option<u16>,

    /// Connection security
    #[arg(long, value_enum, default_value_t = SecurityArg::Tls)]
    pub security: SecurityArg,

    /// Authentication mode
    #[arg(long, value_enum, default_value_t = ModeArg::Password)]
    pub mode: ModeArg,

    /// Password or `OAuth2` access token
    #[arg(long, env = "MAILROUTE_PROVIDER_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Provider-specific timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Client name sent in EHLO
    #[arg(long)]
    pub hello_name: Option<String>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub accept_invalid_certs: bool,

    /// Fill host settings from a well-known email domain
    #[arg(long, value_name = "EMAIL", conflicts_with = "host")]
    pub preset: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum AccountCommand {
    /// Add an account
    Add {
        /// Email address
        #[arg(long)]
        email: String,
        /// Owning provider id
        #[arg(long)]
        provider: i64,
        /// Secret replacing the provider's for this mailbox
        #[arg(long, env = "MAILROUTE_ACCOUNT_SECRET", hide_env_values = true)]
        secret: Option<String>,
    },
    /// List accounts
    List,
    /// Delete an account, replacing the default if it was bound
    Delete {
        /// Account id
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum DefaultCommand {
    /// Show the bound default
    Show,
    /// Pick a default from the candidates (for this invocation only)
    Select,
    /// Bind an account without validating it
    ///
    /// The binding lives in process memory and ends when the command exits;
    /// later invocations start unbound unless --set-default-on-mount is given.
    Set {
        /// Account id
        id: i64,
    },
    /// Re-run selection after the default went away (for this invocation only)
    Reset {
        /// Only reset if this account is the default
        id: Option<i64>,
    },
}

#[derive(clap::Args, Debug)]
pub struct SendArgs {
    /// Recipient (repeatable)
    #[arg(long, required = true)]
    pub to: Vec<String>,

    /// CC recipient (repeatable)
    #[arg(long)]
    pub cc: Vec<String>,

    /// BCC recipient (repeatable)
    #[arg(long)]
    pub bcc: Vec<String>,

    /// Subject line
    #[arg(long)]
    pub subject: String,

    /// Plain text body
    #[arg(long)]
    pub text: Option<String>,

    /// HTML body
    #[arg(long)]
    pub html: Option<String>,

    /// File to attach (repeatable)
    #[arg(long)]
    pub attach: Vec<PathBuf>,

    /// Sender override
    #[arg(long)]
    pub from: Option<String>,

    /// Reply-To address
    #[arg(long)]
    pub reply_to: Option<String>,

    /// Account to send through instead of the default
    #[arg(long)]
    pub account: Option<i64>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecurityArg {
    None,
    Tls,
    Starttls,
}

impl From<SecurityArg> for Security {
    fn from(arg: SecurityArg) -> Self {
        match arg {
            SecurityArg::None => Self::None,
            SecurityArg::Tls => Self::Tls,
            SecurityArg::Starttls => Self::StartTls,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    Password,
    Oauth2,
}

impl From<ModeArg> for ConnectionMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Password => Self::Password,
            ModeArg::Oauth2 => Self::OAuth2,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_with_repeated_recipients() {
        let cli = Cli::try_parse_from([
            "mailroute", "send", "--to", "a@example.com", "--to", "b@example.com", "--subject",
            "Hi", "--account", "3",
        ])
        .unwrap();
        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.to.len(), 2);
        assert_eq!(args.account, Some(3));
    }

    #[test]
    fn provider_add_needs_host_or_preset() {
        assert!(Cli::try_parse_from(["mailroute", "provider", "add"]).is_err());
        assert!(
            Cli::try_parse_from(["mailroute", "provider", "add", "--preset", "me@gmail.com"])
                .is_ok()
        );
    }

    #[test]
    fn reset_id_is_optional() {
        let cli = Cli::try_parse_from(["mailroute", "default", "reset"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Default(DefaultCommand::Reset { id: None })
        ));
    }

    #[test]
    fn provider_delete_takes_an_id() {
        let cli = Cli::try_parse_from(["mailroute", "provider", "delete", "7"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Provider(ProviderCommand::Delete { id: 7 })
        ));
    }

    #[test]
    fn default_set_help_says_binding_is_per_invocation() {
        use clap::CommandFactory;
        let mut command = Cli::command();
        let set = command
            .find_subcommand_mut("default")
            .unwrap()
            .find_subcommand_mut("set")
            .unwrap();
        let help = set.render_long_help().to_string();
        assert!(help.contains("ends when the command exits"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
