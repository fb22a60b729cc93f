//! # CLI Interface
//!
//! Defines the command-line argument structure for `aospace-agent` using
//! `clap` derive. Every subcommand operates on the identity database in
//! `--data-dir`.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// AO.space agent identity operator.
///
/// Issues and inspects the `did:aospace` documents of the accounts held
/// on this device, and manages their password-protected keys.
#[derive(Parser, Debug)]
#[command(
    name = "aospace-agent",
    about = "AO.space agent identity operator",
    version,
    propagate_version = true
)]
pub struct AospaceAgentCli {
    /// Directory holding the identity database.
    #[arg(
        long,
        short = 'd',
        global = true,
        env = "AOSPACE_DATA_DIR",
        default_value = "/var/lib/aospace"
    )]
    pub data_dir: PathBuf,

    /// Log output format.
    #[arg(long, global = true, env = "AOSPACE_LOG_FORMAT", value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,

    /// RSA modulus size for newly generated keys.
    #[arg(long, global = true, env = "AOSPACE_RSA_BITS", default_value_t = 2048)]
    pub rsa_bits: usize,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory and open the identity database.
    Init,
    /// Issue (or re-issue) the space DID document of an account.
    Create(CreateArgs),
    /// Print an account's document.
    Show(LookupArgs),
    /// Re-wrap an account's password key under a new password.
    RotatePassword(RotatePasswordArgs),
    /// Replace an account's password credential with a fresh key.
    ResetPassword(ResetPasswordArgs),
    /// Resolve between aoId and DID.
    Lookup(LookupArgs),
    /// List every indexed account.
    List,
    /// Print version information and exit.
    Version,
}

/// Identifies one account, by aoId or by DID.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct AccountArgs {
    /// Account id.
    #[arg(long)]
    pub ao_id: Option<String>,

    /// Any DID URL of the account. Query and fragment are ignored.
    #[arg(long)]
    pub did: Option<String>,
}

/// Arguments for `create`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Account id.
    #[arg(long)]
    pub ao_id: String,

    /// Password protecting the password-on-device key.
    #[arg(long, env = "AOSPACE_PASSWORD")]
    pub password: String,

    /// JSON file with the client's public keys: an array of
    /// `{"id", "type", "publicKeyPem"}` objects.
    #[arg(long)]
    pub binder_keys: PathBuf,
}

/// Arguments for `show` and `lookup`.
#[derive(Args, Debug)]
pub struct LookupArgs {
    #[command(flatten)]
    pub account: AccountArgs,
}

/// Arguments for `rotate-password`.
#[derive(Args, Debug)]
pub struct RotatePasswordArgs {
    /// Account id.
    #[arg(long)]
    pub ao_id: String,

    /// Current password.
    #[arg(long)]
    pub old_password: String,

    /// Replacement password.
    #[arg(long)]
    pub new_password: String,
}

/// Arguments for `reset-password`.
#[derive(Args, Debug)]
pub struct ResetPasswordArgs {
    #[command(flatten)]
    pub account: AccountArgs,

    /// Password for the freshly generated key.
    #[arg(long)]
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        AospaceAgentCli::command().debug_assert();
    }

    #[test]
    fn account_requires_exactly_one_selector() {
        assert!(AospaceAgentCli::try_parse_from(["aospace-agent", "show"]).is_err());
        assert!(AospaceAgentCli::try_parse_from([
            "aospace-agent",
            "show",
            "--ao-id",
            "a",
            "--did",
            "did:aospace:x",
        ])
        .is_err());

        let cli = AospaceAgentCli::try_parse_from(["aospace-agent", "show", "--ao-id", "a"])
            .expect("valid");
        match cli.command {
            Commands::Show(args) => assert_eq!(args.account.ao_id.as_deref(), Some("a")),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = AospaceAgentCli::try_parse_from([
            "aospace-agent",
            "list",
            "--data-dir",
            "/tmp/aospace",
            "--log-format",
            "json",
            "--rsa-bits",
            "1024",
        ])
        .expect("valid");
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/aospace"));
        assert_eq!(cli.log_format, LogFormatArg::Json);
        assert_eq!(cli.rsa_bits, 1024);
    }
}
