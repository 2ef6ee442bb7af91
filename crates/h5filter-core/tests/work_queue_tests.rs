use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use h5filter_core::{EnqueueStatus, WorkItem, WorkQueue};

#[test]
fn delivers_items_in_fifo_order() {
    let queue = WorkQueue::new();
    for value in ["a", "b", "c"] {
        assert_eq!(queue.enqueue(WorkItem::Item(value)), EnqueueStatus::Queued);
    }

    assert_eq!(queue.dequeue(), WorkItem::Item("a"));
    assert_eq!(queue.dequeue(), WorkItem::Item("b"));
    assert_eq!(queue.dequeue(), WorkItem::Item("c"));
    assert_eq!(queue.lifetime_count(), 3);
}

#[test]
fn close_is_observed_by_every_later_dequeue() {
    let queue: WorkQueue<u32> = WorkQueue::new();
    queue.push(7);
    assert_eq!(queue.enqueue(WorkItem::EndOfStream), EnqueueStatus::Closed);
    assert!(queue.is_closed());

    assert_eq!(queue.dequeue(), WorkItem::Item(7));
    for _ in 0..16 {
        assert_eq!(queue.dequeue(), WorkItem::EndOfStream);
    }
}

#[test]
fn close_wakes_all_blocked_consumers() -> Result<(), Box<dyn std::error::Error>> {
    let queue: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::new());
    let finished = Arc::new(AtomicUsize::new(0));

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let finished = Arc::clone(&finished);
            thread::spawn(move || {
                assert_eq!(queue.dequeue(), WorkItem::EndOfStream);
                finished.fetch_add(1, Ordering::AcqRel);
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    assert_eq!(finished.load(Ordering::Acquire), 0);
    queue.close();

    for consumer in consumers {
        consumer.join().map_err(|_| "consumer panicked")?;
    }
    assert_eq!(finished.load(Ordering::Acquire), 4);
    Ok(())
}

#[test]
fn concurrent_consumers_see_each_item_exactly_once() -> Result<(), Box<dyn std::error::Error>> {
    const ITEMS: usize = 10_000;
    const WORKERS: usize = 8;

    let queue: Arc<WorkQueue<usize>> = Arc::new(WorkQueue::new());
    let sum = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(BTreeSet::new()));

    let workers: Vec<_> = (0..WORKERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let sum = Arc::clone(&sum);
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                while let WorkItem::Item(value) = queue.dequeue() {
                    sum.fetch_add(value, Ordering::AcqRel);
                    let fresh = seen.lock().expect("seen set mutex poisoned").insert(value);
                    assert!(fresh, "item {value} delivered twice");
                }
            })
        })
        .collect();

    let producers: Vec<_> = (0..2)
        .map(|producer| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for value in (producer..ITEMS).step_by(2) {
                    queue.push(value);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().map_err(|_| "producer panicked")?;
    }
    queue.close();

    for worker in workers {
        worker.join().map_err(|_| "worker panicked")?;
    }

    assert_eq!(sum.load(Ordering::Acquire), (0..ITEMS).sum::<usize>());
    assert_eq!(seen.lock().expect("seen set mutex poisoned").len(), ITEMS);
    assert_eq!(queue.lifetime_count(), ITEMS as u64);
    assert!(queue.is_empty());
    Ok(())
}
