//! Bridge server on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wsterm::{Bridge, Config, ConnectionId, Interpreter, Server, StaticAssets};

/// Echoes input back, prefixed with `> ` once at session start.
pub struct Echo;

impl Interpreter for Echo {
    fn feed(&mut self, input: &[u8]) -> Vec<u8> {
        input.to_vec()
    }

    fn greeting(&mut self) -> Vec<u8> {
        b"> ".to_vec()
    }
}

pub struct TestServer {
    pub bridge: Arc<Bridge>,
    pub addr: SocketAddr,
    cancel: CancellationToken,
    handle: JoinHandle<wsterm::Result<()>>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(Config::default()).await
    }

    pub async fn spawn_with(config: Config) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let bridge = Arc::new(Bridge::new(config).unwrap());
        let assets = StaticAssets::new()
            .with_index("<html>terminal</html>")
            .with_file("/xterm.js", "// xterm");
        let server = Server::new(Arc::clone(&bridge), assets);
        let cancel = CancellationToken::new();
        let factory = |_: ConnectionId| Box::new(Echo) as Box<dyn Interpreter>;
        let handle = tokio::spawn(server.run(listener, factory, cancel.clone()));
        Self {
            bridge,
            addr,
            cancel,
            handle,
        }
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.handle.await.unwrap().unwrap();
    }
}
