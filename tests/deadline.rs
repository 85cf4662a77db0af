use evio::{Address, Loop, Poller, Socket};

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

mod common;
use common::for_each_poller;

fn read_deadline_fires_when_peer_stays_silent<P: Poller>() {
    let mut lp = Loop::<P>::new().expect("loop");
    let poller = lp.poller();

    let server = Socket::new(Address::new("127.0.0.1", 0).unwrap(), &poller).expect("socket");
    server.bind().expect("bind");
    server.listen().expect("listen");
    let addr = server.local_addr().expect("local addr");

    // Accepts but never writes, so the client's read can only time out.
    let _serve = lp.spawn(async move {
        let client = server.accept().await.expect("accept");
        let mut buf = [0u8; 1];
        // Parks here until the peer closes at test end.
        let _ = client.read_some(&mut buf).await;
    });

    let timed_out = Rc::new(Cell::new(false));
    let flag = timed_out.clone();
    let started = Instant::now();
    let fetch = lp.spawn(async move {
        let client = Socket::new(addr, &poller).expect("socket");
        client.connect().await.expect("connect");

        let mut buf = [0u8; 16];
        let deadline = Instant::now() + Duration::from_millis(100);
        match client.read_some(&mut buf).deadline(deadline).await {
            Err(err) if err.is_timeout() => flag.set(true),
            other => panic!("expected timeout, got {other:?}"),
        }
    });

    while !fetch.is_finished() {
        lp.step().expect("step");
    }

    assert!(timed_out.get());
    assert!(
        started.elapsed() >= Duration::from_millis(100),
        "deadline fired early"
    );
}

fn connect_deadline_fires_on_saturated_backlog<P: Poller>() {
    let mut lp = Loop::<P>::new().expect("loop");
    let poller = lp.poller();

    // A backlog-1 listener that never accepts: once the queue is full the
    // kernel stops answering handshakes and further connects hang.
    let server = Socket::new(Address::new("127.0.0.1", 0).unwrap(), &poller).expect("socket");
    server.bind().expect("bind");
    server.listen_backlog(1).expect("listen");
    let addr = server.local_addr().expect("local addr");

    let mut fillers = Vec::new();
    for _ in 0..4 {
        let target = addr.clone();
        let poller = poller.clone();
        fillers.push(lp.spawn(async move {
            let filler = Socket::new(target, &poller).expect("filler socket");
            let _ = filler.connect().await;
        }));
    }

    let timed_out = Rc::new(Cell::new(false));
    let flag = timed_out.clone();
    let connect = lp.spawn(async move {
        let client = Socket::new(addr, &poller).expect("socket");
        let deadline = Instant::now() + Duration::from_millis(100);
        match client.connect().deadline(deadline).await {
            Err(err) if err.is_timeout() => flag.set(true),
            other => panic!("expected timeout, got {other:?}"),
        }
    });

    while !connect.is_finished() {
        lp.step().expect("step");
    }

    assert!(timed_out.get());
    drop(server);
}

fn early_completion_cancels_the_deadline_timer<P: Poller>() {
    let mut lp = Loop::<P>::new().expect("loop");
    let poller = lp.poller();

    let server = Socket::new(Address::new("127.0.0.1", 0).unwrap(), &poller).expect("socket");
    server.bind().expect("bind");
    server.listen().expect("listen");
    let addr = server.local_addr().expect("local addr");

    let serve = lp.spawn(async move {
        let client = server.accept().await.expect("accept");
        client.write_all(b"ping").await.expect("write_all");
    });

    let fetch = lp.spawn(async move {
        let client = Socket::new(addr, &poller).expect("socket");
        client.connect().await.expect("connect");

        let mut buf = [0u8; 4];
        let deadline = Instant::now() + Duration::from_secs(1);
        let received = client
            .read_some(&mut buf)
            .deadline(deadline)
            .await
            .expect("read well before the deadline");
        assert_eq!(&buf[..received], b"ping");
    });

    while !(serve.is_finished() && fetch.is_finished()) {
        lp.step().expect("step");
    }

    // The won race must have canceled the timer twin: with nothing left
    // registered the loop goes idle at once instead of waiting out the
    // stale one-second deadline.
    let drained = Instant::now();
    lp.run().expect("run");
    assert!(
        drained.elapsed() < Duration::from_millis(500),
        "a leaked deadline timer kept the loop alive"
    );
}

for_each_poller!(
    read_deadline_fires_when_peer_stays_silent,
    connect_deadline_fires_on_saturated_backlog,
    early_completion_cancels_the_deadline_timer
);
