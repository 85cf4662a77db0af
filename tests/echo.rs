use evio::{Address, Loop, Poller, Socket};

use std::cell::RefCell;
use std::rc::Rc;

mod common;
use common::for_each_poller;

const MESSAGE_LEN: usize = 128;

fn message() -> [u8; MESSAGE_LEN] {
    let mut buf = [0u8; MESSAGE_LEN];
    buf[..5].copy_from_slice(b"Hello");
    buf
}

async fn read_exactly(socket: &Socket, want: usize) -> Vec<u8> {
    let mut buf = vec![0u8; want];
    let mut total = 0;
    while total < want {
        let received = socket.read_some(&mut buf[total..]).await.expect("read");
        if received == 0 {
            break;
        }
        total += received;
    }
    buf.truncate(total);

    buf
}

fn client_writes_server_reads<P: Poller>() {
    let mut lp = Loop::<P>::new().expect("loop");
    let poller = lp.poller();

    let server = Socket::new(Address::new("127.0.0.1", 0).unwrap(), &poller).expect("socket");
    server.bind().expect("bind");
    server.listen().expect("listen");
    let addr = server.local_addr().expect("local addr");

    let received = Rc::new(RefCell::new(Vec::new()));
    let received_slot = received.clone();

    let serve = lp.spawn(async move {
        let client = server.accept().await.expect("accept");
        *received_slot.borrow_mut() = read_exactly(&client, MESSAGE_LEN).await;
    });

    let send = lp.spawn(async move {
        let client = Socket::new(addr, &poller).expect("socket");
        client.connect().await.expect("connect");
        client.write_all(&message()).await.expect("write_all");
    });

    while !(serve.is_finished() && send.is_finished()) {
        lp.step().expect("step");
    }

    assert_eq!(received.borrow().as_slice(), message().as_slice());
}

fn server_writes_client_reads<P: Poller>() {
    let mut lp = Loop::<P>::new().expect("loop");
    let poller = lp.poller();

    let server = Socket::new(Address::new("127.0.0.1", 0).unwrap(), &poller).expect("socket");
    server.bind().expect("bind");
    server.listen().expect("listen");
    let addr = server.local_addr().expect("local addr");

    let received = Rc::new(RefCell::new(Vec::new()));
    let received_slot = received.clone();

    let serve = lp.spawn(async move {
        let client = server.accept().await.expect("accept");
        client.write_all(&message()).await.expect("write_all");
    });

    let fetch = lp.spawn(async move {
        let client = Socket::new(addr, &poller).expect("socket");
        client.connect().await.expect("connect");
        *received_slot.borrow_mut() = read_exactly(&client, MESSAGE_LEN).await;
    });

    while !(serve.is_finished() && fetch.is_finished()) {
        lp.step().expect("step");
    }

    assert_eq!(received.borrow().as_slice(), message().as_slice());
}

for_each_poller!(client_writes_server_reads, server_writes_client_reads);
