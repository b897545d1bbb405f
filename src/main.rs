use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use wsterm::{Bridge, Config, ConnectionId, Interpreter, Server, StaticAssets};

const BANNER: &str = concat!(
    "\x1b[1;32m",
    "                 _                    \r\n",
    " __      _____| |_ ___ _ __ _ __ ___  \r\n",
    " \\ \\ /\\ / / __| __/ _ \\ '__| '_ ` _ \\ \r\n",
    "  \\ V  V /\\__ \\ ||  __/ |  | | | | | |\r\n",
    "   \\_/\\_/ |___/\\__\\___|_|  |_| |_| |_|\r\n",
    "\x1b[0m\r\n",
);

const PROMPT: &str = "$ ";

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>wsterm</title></head>
<body style="background:#000;color:#0f0;font-family:monospace">
<pre id="out"></pre>
<script>
const out = document.getElementById("out");
const ws = new WebSocket(`ws://${location.host}/ws`);
ws.onmessage = (e) => { out.textContent += e.data.replace(/\r/g, ""); };
document.addEventListener("keydown", (e) => {
  if (e.key === "Enter") ws.send("\r");
  else if (e.key === "Backspace") ws.send("\x7f");
  else if (e.key.length === 1) ws.send(e.key);
  e.preventDefault();
});
</script>
</body>
</html>
"#;

#[derive(Debug, Parser)]
#[command(name = "wsterm", about = "WebSocket terminal bridge", version)]
struct Args {
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration.
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

/// Line-editing echo shell used when no real interpreter is plugged in.
#[derive(Debug, Default)]
struct EchoShell {
    line: String,
}

impl Interpreter for EchoShell {
    fn feed(&mut self, input: &[u8]) -> Vec<u8> {
        let mut out = String::new();
        for ch in String::from_utf8_lossy(input).chars() {
            match ch {
                '\r' | '\n' => {
                    out.push_str("\r\n");
                    if !self.line.trim().is_empty() {
                        out.push_str(&self.line);
                        out.push_str("\r\n");
                    }
                    self.line.clear();
                    out.push_str(PROMPT);
                }
                '\x7f' | '\x08' => {
                    if self.line.pop().is_some() {
                        out.push_str("\x08 \x08");
                    }
                }
                c if c.is_control() => {}
                c => {
                    self.line.push(c);
                    out.push(c);
                }
            }
        }
        out.into_bytes()
    }

    fn greeting(&mut self) -> Vec<u8> {
        format!("{BANNER}{PROMPT}").into_bytes()
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let config = match &args.config {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    let mut config = config
        .apply_env_overrides()
        .context("applying environment overrides")?;
    if let Some(bind) = args.bind {
        config = config.with_bind_addr(bind);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    tracing::info!(
        bind = %config.bind_addr,
        max_connections = config.max_connections,
        idle_threshold = config.keep_alive.idle_threshold,
        probe_interval = config.keep_alive.probe_interval,
        "starting wsterm"
    );

    let bridge = Arc::new(Bridge::new(config).context("invalid configuration")?);
    let assets = StaticAssets::new().with_index(INDEX_HTML);
    let server = Server::new(bridge, assets);
    let listener = server.bind().await.context("binding listener")?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutting down");
                shutdown.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "ctrl-c handler unavailable"),
        }
    });

    let factory = |_: ConnectionId| Box::new(EchoShell::default()) as Box<dyn Interpreter>;
    server.run(listener, factory, cancel).await?;
    Ok(())
}
