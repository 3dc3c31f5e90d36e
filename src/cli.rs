use clap::{Parser, Subcommand};

use connector::models::PropertyKind;

/// Google Connector: per-website Search Console and Analytics credentials
#[derive(Parser)]
#[command(name = "connector", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the connector HTTP service
    Serve {
        /// Port to bind (defaults to CONNECTOR_PORT)
        #[arg(short, long)]
        port: Option<u16>,
        /// Keep connections in memory instead of PostgreSQL
        #[arg(long)]
        memory: bool,
    },

    /// Inspect and manage stored Google connections
    Connection {
        #[command(subcommand)]
        command: ConnectionCommands,
    },

    /// Issue and verify short-lived signed tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand)]
pub enum ConnectionCommands {
    /// Show connection metadata for a website (tokens are never printed)
    Show {
        #[arg(long)]
        website_id: String,
    },
    /// Attach a Search Console or Analytics property to a website
    LinkProperty {
        #[arg(long)]
        website_id: String,
        /// search-console | analytics
        #[arg(long)]
        kind: PropertyKind,
        #[arg(long)]
        property_id: String,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Sign a token valid for five minutes
    Issue {
        /// Extra claim as key=value (repeatable)
        #[arg(long = "claim", value_parser = parse_claim)]
        claims: Vec<(String, String)>,
    },
    /// Verify a token and print its claims
    Verify { token: String },
}

fn parse_claim(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid claim '{}': expected key=value", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid claim '{}': empty key", s));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_claim() {
        assert_eq!(
            parse_claim("website_id=site-1"),
            Ok(("website_id".to_string(), "site-1".to_string()))
        );
        assert_eq!(
            parse_claim("q=a=b"),
            Ok(("q".to_string(), "a=b".to_string()))
        );
        assert!(parse_claim("novalue").is_err());
        assert!(parse_claim("=x").is_err());
    }

    #[test]
    fn test_link_property_args() {
        let cli = Cli::try_parse_from([
            "connector",
            "connection",
            "link-property",
            "--website-id",
            "site-1",
            "--kind",
            "analytics",
            "--property-id",
            "properties/123",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Connection {
                command: ConnectionCommands::LinkProperty { kind, .. },
            }) => assert_eq!(kind, PropertyKind::Analytics),
            _ => panic!("unexpected parse"),
        }
    }
}
