//! Property tests for the reliable channel.
//!
//! A sender and receiver exchange packets through a simulated link that
//! drops, duplicates, and reorders according to a generated fate list. Once
//! the chaos phase ends the link turns lossless so every run terminates.
//! Whatever the link does, the receiver must hand out exactly the sent
//! messages, in order, once each.

use std::time::{Duration, Instant};

use proptest::prelude::*;
use udp_connect::reliable::sequence::{seq_gt, seq_le, seq_lt};
use udp_connect::reliable::{Receipt, ReliableReceiver, ReliableSender};

const RTO: Duration = Duration::from_millis(100);

/// Each round is long enough for any entry's backoff to expire.
const ROUND: Duration = Duration::from_secs(4);

const CHAOS_ROUNDS: u32 = 60;
const MAX_ROUNDS: u32 = 200;

/// Run the exchange and return what the receiver delivered.
fn exchange(messages: &[Vec<u8>], fates: &[u8]) -> (Vec<Vec<u8>>, ReliableSender) {
    let start = Instant::now();
    let mut sender = ReliableSender::new();
    let mut receiver = ReliableReceiver::new();
    for message in messages {
        sender.push(message.clone());
    }

    let mut fate = fates.iter().copied().cycle();
    let mut delivered = Vec::new();

    for round in 0..MAX_ROUNDS {
        let now = start + ROUND * round;
        let chaotic = round < CHAOS_ROUNDS;

        let mut wire: Vec<(u32, Vec<u8>)> = Vec::new();
        sender.transmit_due(now, RTO, |sequence, payload| {
            wire.push((sequence, payload.to_vec()));
        });

        if chaotic && !wire.is_empty() {
            let mut mangled = Vec::with_capacity(wire.len());
            for packet in wire {
                match fate.next().unwrap_or(2) % 4 {
                    0 => {}
                    1 => {
                        mangled.push(packet.clone());
                        mangled.push(packet);
                    }
                    _ => mangled.push(packet),
                }
            }
            if !mangled.is_empty() {
                let shift = usize::from(fate.next().unwrap_or(0)) % mangled.len();
                mangled.rotate_left(shift);
            }
            if fate.next().unwrap_or(0) % 2 == 0 {
                mangled.reverse();
            }
            wire = mangled;
        }

        for (sequence, payload) in wire {
            if let Receipt::Deliver { released } = receiver.on_message(sequence, &payload) {
                delivered.push(payload);
                delivered.extend(released);
            }
        }

        let ack_lost = chaotic && fate.next().unwrap_or(1) % 3 == 0;
        if !ack_lost {
            sender.on_ack(receiver.ack(), now);
        }

        if sender.is_idle() {
            break;
        }
    }

    (delivered, sender)
}

fn messages_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 1..120)
}

fn fates_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..64)
}

#[test]
fn prop_delivered_in_order_exactly_once() {
    proptest!(|(messages in messages_strategy(), fates in fates_strategy())| {
        let (delivered, sender) = exchange(&messages, &fates);
        prop_assert_eq!(&delivered, &messages);
        prop_assert!(sender.is_idle());
    });
}

#[test]
fn prop_serial_order_is_consistent() {
    proptest!(|(a in any::<u32>(), step in 1u32..(1 << 31))| {
        let b = a.wrapping_add(step);
        prop_assert!(seq_lt(a, b));
        prop_assert!(seq_gt(b, a));
        prop_assert!(!seq_lt(b, a));
        prop_assert!(seq_le(a, a));
    });
}

#[test]
fn test_more_messages_than_the_send_window() {
    let messages: Vec<Vec<u8>> = (0u32..700).map(|i| i.to_be_bytes().to_vec()).collect();
    let (delivered, sender) = exchange(&messages, &[2, 3, 0, 5, 1, 7]);
    assert_eq!(delivered, messages);
    assert!(sender.is_idle());
}
