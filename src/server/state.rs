use std::net::TcpStream;
use std::path::PathBuf;

use crate::common;
use crate::index::MessageIndex;

/// Server startup configuration. Compiled defaults live in `common`; the
/// binary may override them from the command line.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub data_dir: PathBuf,
    pub corpus: PathBuf,
    pub numerals: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: common::DEFAULT_ADDR.to_string(),
            data_dir: PathBuf::from(common::DEFAULT_DATA_DIR),
            corpus: PathBuf::from(common::DEFAULT_CORPUS),
            numerals: PathBuf::from(common::DEFAULT_NUMERALS),
        }
    }
}

impl ServerConfig {
    pub fn stats_file(&self) -> PathBuf {
        self.data_dir.join("tictactoe_stats.json")
    }

    pub fn perf_log(&self) -> PathBuf {
        self.data_dir.join("server_performance.log")
    }
}

/// One logged-in user: the live connection, profile info, and the in-memory
/// message history index (flushed to disk at logout).
#[derive(Debug)]
pub struct Session {
    pub stream: TcpStream,
    pub pfp_url: Option<String>,
    pub index: MessageIndex,
}

impl Session {
    pub fn new(stream: TcpStream, index: MessageIndex) -> Self {
        Self {
            stream,
            pfp_url: None,
            index,
        }
    }
}
