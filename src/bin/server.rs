use std::path::PathBuf;

use salotto::server::{Server, ServerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("🦀 Salotto Chat Server");
    println!("======================");

    // Positional overrides: [addr] [data-dir] [corpus] [numerals]
    let mut args = std::env::args().skip(1);
    let mut config = ServerConfig::default();
    if let Some(addr) = args.next() {
        config.addr = addr;
    }
    if let Some(dir) = args.next() {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(corpus) = args.next() {
        config.corpus = PathBuf::from(corpus);
    }
    if let Some(numerals) = args.next() {
        config.numerals = PathBuf::from(numerals);
    }

    let mut server = Server::bind(config)?;
    println!("✅ Server listening on {}", server.local_addr()?);

    server.run()?;
    Ok(())
}
