//! TCP echo server: one detached task per client, 128-byte chunks.
//!
//! Listens on 0.0.0.0:8888 by default; pass a port as the first argument.
//! Diagnostics go to standard error (set `RUST_LOG=info` to see them).

use evio::{Address, Loop, PollPoller, PollerHandle, Socket, Task};

fn main() -> evio::Result<()> {
    pretty_env_logger::init();

    // Writes to closed peers must fail with EPIPE instead of killing us.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }

    let port = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(8888);
    let address = Address::new("0.0.0.0", port)?;

    let mut lp = Loop::<PollPoller>::new()?;
    let poller = lp.poller();

    lp.spawn(async move {
        if let Err(err) = serve(address, poller).await {
            log::error!("server failed: {err}");
        }
    });

    lp.run()
}

async fn serve(address: Address, poller: PollerHandle) -> evio::Result<()> {
    let socket = Socket::new(address, &poller)?;
    socket.bind()?;
    socket.listen()?;
    log::info!("listening on {}", socket.addr());

    loop {
        let client = socket.accept().await?;
        log::info!("client connected: {}", client.addr());
        Task::spawn(handle_client(client));
    }
}

async fn handle_client(client: Socket) {
    let mut buffer = [0u8; 128];

    loop {
        match client.read_some(&mut buffer).await {
            Ok(0) => {
                log::info!("client disconnected: {}", client.addr());
                return;
            }
            Ok(size) => {
                log::info!("received: {}", String::from_utf8_lossy(&buffer[..size]));
                if let Err(err) = client.write_all(&buffer[..size]).await {
                    log::error!("write failed: {err}");
                    return;
                }
            }
            Err(err) => {
                log::error!("read failed: {err}");
                return;
            }
        }
    }
}
