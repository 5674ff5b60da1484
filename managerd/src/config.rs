//! Configuration loading: a search-path TOML file, overridable from
//! the command line, mirroring `drmemd::config`'s `find_cfg`/
//! `from_cmdline` split. `-c/--config` names a file to load directly,
//! bypassing the search path entirely.

use manager_api::{Error, Result};
use serde::Deserialize;
use std::env;
use tracing::Level;

fn def_log_level() -> String {
    String::from("warn")
}

fn def_http_port() -> u16 {
    3000
}

fn def_health_check_interval() -> u64 {
    30
}

fn def_batch_size() -> usize {
    64
}

#[derive(Deserialize, Clone)]
pub struct Config {
    #[serde(default = "def_log_level")]
    pub log_level: String,
    #[serde(default = "def_http_port")]
    pub http_port: u16,
    #[serde(default = "def_health_check_interval")]
    pub health_check_interval: u64,
    #[serde(default)]
    pub metastore: MetaStoreConfig,
    #[serde(default)]
    pub datastore: DataStoreConfig,
    #[serde(default)]
    pub bus: BusConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: def_log_level(),
            http_port: def_http_port(),
            health_check_interval: def_health_check_interval(),
            metastore: MetaStoreConfig::default(),
            datastore: DataStoreConfig::default(),
            bus: BusConfig::default(),
        }
    }
}

impl Config {
    pub fn get_log_level(&self) -> Level {
        match self.log_level.as_str() {
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::WARN,
        }
    }
}

#[derive(Deserialize, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetaStoreConfig {
    File {
        #[serde(default = "def_meta_root")]
        root: String,
    },
}

fn def_meta_root() -> String {
    String::from("./meta")
}

impl Default for MetaStoreConfig {
    fn default() -> Self {
        MetaStoreConfig::File { root: def_meta_root() }
    }
}

#[derive(Deserialize, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataStoreConfig {
    Influxdb {
        #[serde(default = "def_db_name")]
        database: String,
        #[serde(default = "def_batch_size")]
        batch_size: usize,
        #[serde(default = "def_influxdb_url")]
        url: String,
        username: Option<String>,
        password: Option<String>,
        #[serde(default = "def_timeout_secs")]
        timeout_secs: u64,
    },
    Tdengine {
        #[serde(default = "def_db_name")]
        database: String,
        #[serde(default = "def_batch_size")]
        batch_size: usize,
        #[serde(default = "def_tdengine_url")]
        url: String,
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
        #[serde(default = "def_timeout_secs")]
        timeout_secs: u64,
    },
}

fn def_db_name() -> String {
    String::from("manager")
}

fn def_influxdb_url() -> String {
    String::from("http://127.0.0.1:8086")
}

fn def_tdengine_url() -> String {
    String::from("http://127.0.0.1:6041")
}

fn def_timeout_secs() -> u64 {
    10
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        DataStoreConfig::Influxdb {
            database: def_db_name(),
            batch_size: def_batch_size(),
            url: def_influxdb_url(),
            username: None,
            password: None,
            timeout_secs: def_timeout_secs(),
        }
    }
}

#[derive(Deserialize, Clone, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BusConfig {
    #[default]
    Local,
    Nats {
        #[serde(default = "def_nats_url")]
        url: String,
    },
}

fn def_nats_url() -> String {
    String::from("nats://127.0.0.1:4222")
}

struct CmdLine {
    config: Option<String>,
    verbose: u8,
    print_cfg: bool,
}

fn parse_cmdline() -> CmdLine {
    use clap::{crate_version, Arg, ArgAction, Command};

    let matches = Command::new("Edge Device Manager")
        .version(crate_version!())
        .about("Mediates between field-device drivers and operators over a bus and HTTP/WebSocket surface.")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .action(ArgAction::Set)
                .value_name("FILE")
                .help("Specifies the configuration file"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Sets verbosity of log; can be used more than once"),
        )
        .arg(
            Arg::new("print_cfg")
                .long("print-config")
                .action(ArgAction::SetTrue)
                .help("Displays the configuration and exits"),
        )
        .get_matches();

    CmdLine {
        config: matches.get_one::<String>("config").cloned(),
        verbose: matches.get_count("verbose"),
        print_cfg: matches.get_flag("print_cfg"),
    }
}

fn apply_verbosity(mut cfg: Config, verbose: u8) -> Config {
    match verbose {
        0 => (),
        1 => cfg.log_level = String::from("info"),
        2 => cfg.log_level = String::from("debug"),
        _ => cfg.log_level = String::from("trace"),
    };
    cfg
}

fn parse_config(contents: &str) -> Result<Config> {
    toml::from_str(contents).map_err(|e| Error::internal(format!("parsing config: {e}")))
}

async fn from_file(path: &str) -> Option<Result<Config>> {
    use tokio::fs;

    if let Ok(contents) = fs::read(path).await {
        Some(parse_config(&String::from_utf8_lossy(&contents)))
    } else {
        None
    }
}

async fn find_cfg() -> Result<Config> {
    const CFG_FILE: &str = "manager.toml";

    let mut dirs = vec![String::from("./")];

    if let Ok(home) = env::var("HOME") {
        dirs.push(format!("{home}/."))
    }

    dirs.push(String::from("/usr/local/etc/"));
    dirs.push(String::from("/etc/"));

    for dir in dirs {
        let file = format!("{dir}{CFG_FILE}");

        if let Some(cfg) = from_file(&file).await {
            return cfg;
        }
    }
    Ok(Config::default())
}

fn dump_config(cfg: &Config) {
    println!("Configuration:");
    println!("    log level: {}", cfg.get_log_level());
    println!("    http port: {}", cfg.http_port);
    println!("    health check interval: {}s", cfg.health_check_interval);
}

#[tracing::instrument(name = "loading config")]
pub async fn get() -> Option<Config> {
    let cmdline = parse_cmdline();

    let loaded = match &cmdline.config {
        Some(path) => match from_file(path).await {
            Some(cfg) => cfg,
            None => Err(Error::internal(format!("configuration file not found: {path}"))),
        },
        None => find_cfg().await,
    };

    match loaded {
        Ok(cfg) => {
            let cfg = apply_verbosity(cfg, cmdline.verbose);

            if cmdline.print_cfg {
                dump_config(&cfg);
                None
            } else {
                Some(cfg)
            }
        }
        Err(e) => {
            println!("{e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_an_empty_document() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.get_log_level(), Level::WARN);
        assert_eq!(cfg.http_port, 3000);
        assert_eq!(cfg.health_check_interval, 30);
    }

    #[test]
    fn log_level_escalates_from_the_document() {
        let cfg: Config = toml::from_str("log_level = \"debug\"").unwrap();
        assert_eq!(cfg.get_log_level(), Level::DEBUG);
    }

    #[test]
    fn metastore_section_selects_the_file_backend() {
        let cfg: Config = toml::from_str(
            r#"
[metastore]
type = "file"
root = "/var/lib/manager/meta"
"#,
        )
        .unwrap();

        match cfg.metastore {
            MetaStoreConfig::File { root } => assert_eq!(root, "/var/lib/manager/meta"),
        }
    }

    #[test]
    fn datastore_section_selects_tdengine() {
        let cfg: Config = toml::from_str(
            r#"
[datastore]
type = "tdengine"
database = "telemetry"
batch_size = 128
"#,
        )
        .unwrap();

        match cfg.datastore {
            DataStoreConfig::Tdengine { database, batch_size, .. } => {
                assert_eq!(database, "telemetry");
                assert_eq!(batch_size, 128);
            }
            _ => panic!("expected tdengine config"),
        }
    }
}
