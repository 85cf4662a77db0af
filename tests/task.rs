use evio::{Loop, Poller, Task};

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

mod common;
use common::for_each_poller;

fn spawn_runs_to_first_suspension_immediately<P: Poller>() {
    let lp = Loop::<P>::new().expect("loop");

    let ran = Rc::new(Cell::new(false));
    let ran_slot = ran.clone();
    let handle = lp.spawn(async move {
        ran_slot.set(true);
    });

    // No step yet: a task with no suspension points already finished.
    assert!(ran.get());
    assert!(handle.is_finished());
}

fn tasks_spawned_inside_tasks_run<P: Poller>() {
    let mut lp = Loop::<P>::new().expect("loop");
    let poller = lp.poller();

    let count = Rc::new(Cell::new(0));
    let outer_count = count.clone();
    let handle = lp.spawn(async move {
        for _ in 0..3 {
            let inner_count = outer_count.clone();
            let poller = poller.clone();
            Task::spawn(async move {
                poller.sleep(Duration::from_millis(1)).await;
                inner_count.set(inner_count.get() + 1);
            });
        }
    });

    while count.get() < 3 {
        lp.step().expect("step");
    }
    assert!(handle.is_finished());
}

fn join_handle_delivers_the_task_result<P: Poller>() {
    let mut lp = Loop::<P>::new().expect("loop");
    let poller = lp.poller();

    let result = Rc::new(Cell::new(0));
    let result_slot = result.clone();
    let handle = lp.spawn(async move {
        let inner = Task::spawn(async move {
            poller.sleep(Duration::from_millis(10)).await;
            21
        });
        result_slot.set(inner.await * 2);
    });

    while !handle.is_finished() {
        lp.step().expect("step");
    }
    assert_eq!(result.get(), 42);
}

fn run_returns_once_all_tasks_finish<P: Poller>() {
    let mut lp = Loop::<P>::new().expect("loop");
    let poller = lp.poller();

    let handle = lp.spawn(async move {
        poller.sleep(Duration::from_millis(20)).await;
    });

    lp.run().expect("run");
    assert!(handle.is_finished());
}

for_each_poller!(
    spawn_runs_to_first_suspension_immediately,
    tasks_spawned_inside_tasks_run,
    join_handle_delivers_the_task_result,
    run_returns_once_all_tasks_finish
);
