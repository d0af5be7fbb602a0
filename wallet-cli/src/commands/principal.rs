//! Principal command - manage the tokens the static resolver accepts

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use uuid::Uuid;
use wallet_core::config::Config;
use wallet_core::{Error, Principal};

use super::get_wallet_dir;
use crate::output;

#[derive(Subcommand)]
pub enum PrincipalCommands {
    /// Map a token to a principal (replaces an existing mapping)
    Add {
        /// Bearer token the principal authenticates with
        token: String,
        /// Account email
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        /// Principal id (generated when omitted)
        #[arg(long)]
        id: Option<Uuid>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List configured principals
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl PrincipalCommands {
    pub fn json(&self) -> bool {
        match self {
            PrincipalCommands::Add { json, .. } | PrincipalCommands::List { json } => *json,
        }
    }
}

#[derive(Serialize)]
struct PrincipalRow {
    token: String,
    #[serde(flatten)]
    principal: Principal,
}

/// Rows sorted by email, tokens masked
fn rows(config: &Config) -> Vec<PrincipalRow> {
    let mut rows: Vec<PrincipalRow> = config
        .principals
        .iter()
        .map(|(token, principal)| PrincipalRow {
            token: output::mask_token(token),
            principal: principal.clone(),
        })
        .collect();
    rows.sort_by(|a, b| a.principal.email.cmp(&b.principal.email));
    rows
}

pub fn run(command: PrincipalCommands) -> Result<()> {
    let wallet_dir = get_wallet_dir()?;
    std::fs::create_dir_all(&wallet_dir)?;
    let mut config = Config::load(&wallet_dir)?;

    match command {
        PrincipalCommands::Add {
            token,
            email,
            first_name,
            last_name,
            id,
            json,
        } => {
            let token = token.trim().to_string();
            if token.is_empty() {
                return Err(Error::validation("token cannot be empty").into());
            }
            let principal = Principal::new(id.unwrap_or_else(Uuid::new_v4), email.trim())
                .with_name(first_name, last_name);
            principal.validate().map_err(Error::validation)?;

            let replaced = config.principals.contains_key(&token);
            let row = PrincipalRow {
                token: output::mask_token(&token),
                principal: principal.clone(),
            };
            config.add_principal(token, principal);
            config.save(&wallet_dir)?;

            if json {
                return output::json(&row);
            }
            if replaced {
                output::warning("Replaced the principal previously mapped to this token");
            }
            output::success(&format!(
                "Added {} ({})",
                row.principal.email, row.principal.id
            ));
        }
        PrincipalCommands::List { json } => {
            let rows = rows(&config);
            if json {
                return output::json(&rows);
            }
            if rows.is_empty() {
                println!("No principals configured.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Token", "Email", "Name", "ID"]);
            for row in rows {
                let name = format!("{} {}", row.principal.first_name, row.principal.last_name);
                table.add_row(vec![
                    row.token,
                    row.principal.email,
                    name.trim().to_string(),
                    row.principal.id.to_string(),
                ]);
            }
            println!("{}", table);
        }
    }

    Ok(())
}
