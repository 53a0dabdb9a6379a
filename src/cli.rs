//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged on top of
//! the configuration from `alertcast.toml` and environment variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Tag, Value},
    Error, Metadata, Profile, Provider,
};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Pushes disaster alerts to every device registered in a city.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address for the alert endpoint to listen on.
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,

    /// Path to the Firebase service-account key.
    #[arg(long, value_name = "FILE")]
    pub credentials: Option<PathBuf>,

    /// Firebase project id, overriding the one in the key file.
    #[arg(long, value_name = "ID")]
    pub project_id: Option<String>,

    /// Number of messages per gateway call (1 to 500).
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Logging level (e.g. info, debug).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

/// Inserts `value` at `section.key`, creating the section table if needed.
fn insert_nested(dict: &mut Dict, section: &str, key: &str, value: Value) {
    let entry = dict
        .entry(section.to_string())
        .or_insert_with(|| Value::Dict(Tag::Default, Dict::new()));
    if let Value::Dict(_, table) = entry {
        table.insert(key.to_string(), value);
    }
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(addr) = self.listen {
            insert_nested(&mut dict, "server", "listen_address", Value::from(addr.to_string()));
        }

        if let Some(path) = &self.credentials {
            insert_nested(
                &mut dict,
                "firebase",
                "credentials_path",
                Value::from(path.to_string_lossy().into_owned()),
            );
        }

        if let Some(project_id) = &self.project_id {
            insert_nested(&mut dict, "firebase", "project_id", Value::from(project_id.clone()));
        }

        if let Some(batch_size) = self.batch_size {
            insert_nested(&mut dict, "dispatch", "batch_size", Value::from(batch_size));
        }

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
