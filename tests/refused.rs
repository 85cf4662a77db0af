use evio::{Address, Error, Loop, Poller, Socket};

use std::cell::Cell;
use std::rc::Rc;

mod common;
use common::for_each_poller;

/// Binds an ephemeral listener, notes its port, and frees it again, leaving
/// a local port with nothing listening on it.
fn free_local_port() -> u16 {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").expect("probe bind");
    probe.local_addr().expect("probe addr").port()
}

fn refusal_surfaces_on_connect_or_write<P: Poller>() {
    let mut lp = Loop::<P>::new().expect("loop");
    let poller = lp.poller();
    let port = free_local_port();

    let code = Rc::new(Cell::new(0));
    let code_slot = code.clone();

    let handle = lp.spawn(async move {
        let client =
            Socket::new(Address::new("127.0.0.1", port).unwrap(), &poller).expect("socket");
        let outcome = async {
            client.connect().await?;
            client.write_some(b"test").await?;
            Ok::<_, Error>(())
        }
        .await;

        match outcome {
            Err(err) => code_slot.set(err.errno().expect("system error with errno")),
            Ok(()) => panic!("expected the connection to be refused"),
        }
    });

    while !handle.is_finished() {
        lp.step().expect("step");
    }

    let code = code.get();
    // The refusal reaches the write as EPIPE on platforms that mask it
    // until then.
    assert!(
        code == libc::ECONNREFUSED || code == libc::EPIPE,
        "unexpected errno {code}"
    );
}

fn refusal_surfaces_on_connect_or_read<P: Poller>() {
    let mut lp = Loop::<P>::new().expect("loop");
    let poller = lp.poller();
    let port = free_local_port();

    let code = Rc::new(Cell::new(0));
    let code_slot = code.clone();

    let handle = lp.spawn(async move {
        let client =
            Socket::new(Address::new("127.0.0.1", port).unwrap(), &poller).expect("socket");
        let outcome = async {
            let mut buf = [0u8; 16];
            client.connect().await?;
            client.read_some(&mut buf).await?;
            Ok::<_, Error>(())
        }
        .await;

        match outcome {
            Err(err) => code_slot.set(err.errno().expect("system error with errno")),
            Ok(()) => panic!("expected the connection to be refused"),
        }
    });

    while !handle.is_finished() {
        lp.step().expect("step");
    }

    assert_eq!(code.get(), libc::ECONNREFUSED);
}

for_each_poller!(
    refusal_surfaces_on_connect_or_write,
    refusal_surfaces_on_connect_or_read
);
