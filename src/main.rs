use std::path::PathBuf;

use anyhow::anyhow;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use babytrack::config::Config;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--http-port <port>] [--data-dir <dir>]\n\nFlags:\n  --http-port <port>   Port for the HTTP API (env BABYTRACK_HTTP_PORT, default 8000)\n  --data-dir <dir>     Directory holding the JSON collections and cache snapshot (env BABYTRACK_DATA_DIR, default data)\n  -h, --help           Show this help\n\nSecrets come from ACCESS_TOKEN_SECRET, REFRESH_TOKEN_SECRET and ACTIVATION_SECRET (a .env file is read if present)."
    );
}

fn parse_port_arg(args: &[String], i: usize) -> anyhow::Result<u16> {
    let v = args.get(i).ok_or_else(|| anyhow!("--http-port needs a value"))?;
    v.parse::<u16>().map_err(|_| anyhow!("invalid --http-port value: {}", v))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().cloned().unwrap_or_else(|| "babytrack".to_string());

    let mut http_port: Option<u16> = None;
    let mut data_dir: Option<PathBuf> = None;
    let mut i = 1usize;
    while i < args.len() {
        match args[i].as_str() {
            "--http-port" => { i += 1; http_port = Some(parse_port_arg(&args, i)?); }
            "--data-dir" => {
                i += 1;
                data_dir = Some(args.get(i).map(PathBuf::from).ok_or_else(|| anyhow!("--data-dir needs a value"))?);
            }
            "-h" | "--help" => { print_usage(&program); return Ok(()); }
            other => {
                print_usage(&program);
                return Err(anyhow!("unknown argument: {}", other));
            }
        }
        i += 1;
    }

    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(target: "startup", "babytrack {} starting: RUST_LOG='{}'", env!("CARGO_PKG_VERSION"), rust_log);

    let mut config = Config::load()?;
    if let Some(p) = http_port { config.http_port = p; }
    if let Some(d) = data_dir { config.data_dir = d; }

    let mailer = babytrack::mail::mailer_from_config(config.mail.as_ref())?;
    babytrack::server::run(config, mailer).await
}
