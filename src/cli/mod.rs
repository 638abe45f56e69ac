//! CLI module - operator command line for Warden
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

/// Warden - account security core
/// Lockout tracking, credential checks, and API key management
#[derive(Parser)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default search path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Administrator account that admin commands act as
    /// (defaults to the bootstrap admin)
    #[arg(long = "as", global = true)]
    pub actor: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load_from_path(path),
            None => Config::load(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create default config file
    Init,

    /// Manage user accounts
    #[command(alias = "u")]
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Manage a user's API keys
    #[command(alias = "k")]
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },

    /// Check a password, optionally minting an API key or session
    Login {
        /// Username or email address
        identifier: String,
        /// Issue an API key with this label on success
        #[arg(long, value_name = "LABEL", conflicts_with = "session")]
        issue_key: Option<String>,
        /// Start a session on success
        #[arg(long)]
        session: bool,
        /// Use the long "remember me" session lifetime
        #[arg(long, requires = "session")]
        remember: bool,
    },

    /// Resolve a bearer token to the account it belongs to
    Whoami {
        token: String,
        /// Treat the token as a session token instead of an API key
        #[arg(long)]
        session: bool,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a new account (password is read from stdin)
    Add {
        username: String,
        email: String,
        /// Grant administrator privileges
        #[arg(long)]
        admin: bool,
    },
    /// List all accounts
    #[command(alias = "ls")]
    List,
    /// Show one account, including lockout state
    Show { username: String },
    /// Delete an account with its keys and sessions
    #[command(alias = "rm")]
    Delete { username: String },
    /// Clear a lockout
    Unlock { username: String },
    /// Enable or disable an account
    SetActive {
        username: String,
        #[arg(action = clap::ArgAction::Set)]
        active: bool,
    },
    /// Grant or revoke administrator privileges
    SetAdmin {
        username: String,
        #[arg(action = clap::ArgAction::Set)]
        admin: bool,
    },
    /// Change an account's password (current and new read from stdin)
    Passwd { username: String },
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Issue a new API key; the token is printed once
    Issue {
        username: String,
        label: String,
        /// Expire the key after this many days
        #[arg(long)]
        expires_in_days: Option<u32>,
    },
    /// List a user's keys
    #[command(alias = "ls")]
    List { username: String },
    /// Revoke one of a user's keys
    #[command(alias = "rm")]
    Revoke { username: String, key_id: i32 },
}

pub use commands::*;
