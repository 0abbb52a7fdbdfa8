//! Microbenchmark for the priority message queue.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use uuid::Uuid;

use mail::domain::models::{Address, MailMessage, MessageQueue};

fn mixed_messages(count: usize) -> Vec<MailMessage> {
    let task_id = Uuid::new_v4();
    (0..count)
        .map(|i| match i % 3 {
            0 => MailMessage::request(
                task_id,
                Address::user("user_1"),
                Address::agent("supervisor"),
                "subject",
                "body",
            ),
            1 => MailMessage::broadcast(
                task_id,
                Address::agent("supervisor"),
                vec![Address::agent("all")],
                "subject",
                "body",
            ),
            _ => MailMessage::interrupt(
                task_id,
                Address::agent("supervisor"),
                vec![Address::agent("math")],
                "subject",
                "body",
            ),
        })
        .collect()
}

fn bench_enqueue_dequeue(c: &mut Criterion) {
    let messages = mixed_messages(1_000);

    c.bench_function("queue_enqueue_dequeue_1000_mixed", |b| {
        b.iter(|| {
            let mut queue = MessageQueue::new();
            for message in &messages {
                queue.push(black_box(message.clone()));
            }
            while let Some(message) = queue.pop() {
                black_box(message);
            }
        });
    });
}

fn bench_enqueue_only(c: &mut Criterion) {
    let messages = mixed_messages(1_000);

    c.bench_function("queue_enqueue_1000_mixed", |b| {
        b.iter(|| {
            let mut queue = MessageQueue::new();
            for message in &messages {
                queue.push(black_box(message.clone()));
            }
            black_box(queue.len())
        });
    });
}

criterion_group!(benches, bench_enqueue_dequeue, bench_enqueue_only);
criterion_main!(benches);
