// Attribute side-channel: anchoring, ordering, routing, bounded budget,
// drain accounting.

use std::thread;
use std::time::Duration;

use ringio::{Acquired, Error, RingBuilder};

#[test]
fn attribute_at_frontier_interrupts_acquire() {
    let (mut w, mut r) = RingBuilder::new().capacity(64).build().unwrap();
    w.set_attribute(9, 1234).unwrap();

    // Not Empty: an attribute sits exactly at the read frontier.
    match r.acquire(16).unwrap() {
        Acquired::PendingAttribute(bytes) => assert!(bytes.is_empty()),
        other => panic!("expected pending attribute, got {other:?}"),
    }
    assert_eq!(r.get_attribute().unwrap(), (9, 1234));
}

#[test]
fn grant_truncates_at_attribute_anchor() {
    let (mut w, mut r) = RingBuilder::new().capacity(128).build().unwrap();

    let buf = w.acquire(10).unwrap();
    buf.fill(0x11);
    w.release(10).unwrap();
    w.set_attribute(5, 0).unwrap();
    let buf = w.acquire(10).unwrap();
    buf.fill(0x22);
    w.release(10).unwrap();

    // The grant stops at the anchor even though more data is published.
    match r.acquire(128).unwrap() {
        Acquired::PendingAttribute(bytes) => {
            assert_eq!(bytes.len(), 10);
            assert!(bytes.iter().all(|&b| b == 0x11));
        }
        other => panic!("expected pending attribute, got {other:?}"),
    }
    r.release(10).unwrap();
    assert_eq!(r.get_attribute().unwrap(), (5, 0));

    match r.acquire(128).unwrap() {
        Acquired::Data(bytes) => {
            assert_eq!(bytes.len(), 10);
            assert!(bytes.iter().all(|&b| b == 0x22));
        }
        other => panic!("expected data, got {other:?}"),
    }
}

#[test]
fn attribute_unreachable_until_data_consumed() {
    let (mut w, mut r) = RingBuilder::new().capacity(64).build().unwrap();

    let buf = w.acquire(10).unwrap();
    buf.fill(1);
    w.release(10).unwrap();
    w.set_attribute(2, 0).unwrap();

    let err = r.get_attribute().unwrap_err();
    assert_eq!(err, Error::PendingData { ahead: 10 });
    assert!(err.is_transient());

    let n = r.acquire(10).unwrap().bytes().len();
    r.release(n).unwrap();
    assert_eq!(r.get_attribute().unwrap(), (2, 0));
}

#[test]
fn variable_attribute_routing() {
    let (mut w, mut r) = RingBuilder::new().capacity(64).build().unwrap();
    w.set_var_attribute(4, 77, &600u32.to_le_bytes()).unwrap();

    assert_eq!(r.get_attribute().unwrap_err(), Error::VariableAttribute);

    let mut buf = [0u8; 4];
    let attr = r.get_var_attribute(&mut buf).unwrap();
    assert_eq!((attr.tag, attr.param, attr.len), (4, 77, 4));
    assert_eq!(u32::from_le_bytes(buf), 600);
}

#[test]
fn fixed_attribute_routing() {
    let (mut w, mut r) = RingBuilder::new().capacity(64).build().unwrap();
    w.set_attribute(4, 0).unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(r.get_var_attribute(&mut buf).unwrap_err(), Error::FixedAttribute);
    assert_eq!(r.get_attribute().unwrap(), (4, 0));
}

#[test]
fn oversize_payload_is_a_contract_violation() {
    let (mut w, _r) = RingBuilder::new().capacity(64).build().unwrap();
    let err = w.set_var_attribute(1, 0, &[0u8; 5]).unwrap_err();
    assert_eq!(err, Error::PayloadTooLarge { len: 5, max: 4 });
    assert!(!err.is_transient());
}

#[test]
fn undersized_receive_buffer_is_fatal() {
    let (mut w, mut r) = RingBuilder::new()
        .capacity(64)
        .max_attr_payload(8)
        .build()
        .unwrap();
    w.set_var_attribute(1, 0, &[9u8; 8]).unwrap();

    let mut small = [0u8; 2];
    let err = r.get_var_attribute(&mut small).unwrap_err();
    assert_eq!(
        err,
        Error::BufferTooSmall {
            needed: 8,
            provided: 2
        }
    );
    assert!(!err.is_transient());

    // Sized to the declared maximum, the same record retrieves fine.
    let mut right = vec![0u8; r.max_attr_payload()];
    assert_eq!(r.get_var_attribute(&mut right).unwrap().len, 8);
}

#[test]
fn bounded_queue_reports_full_and_recovers() {
    // Budget fits exactly two fixed records.
    let (mut w, mut r) = RingBuilder::new().capacity(64).attr_capacity(32).build().unwrap();

    w.set_attribute(1, 0).unwrap();
    w.set_attribute(2, 0).unwrap();
    let err = w.set_attribute(3, 0).unwrap_err();
    assert!(matches!(err, Error::AttrQueueFull { .. }));
    assert!(err.is_transient());

    // Consuming a record frees budget for the retry.
    assert_eq!(r.get_attribute().unwrap(), (1, 0));
    w.set_attribute(3, 0).unwrap();
    assert_eq!(r.get_attribute().unwrap(), (2, 0));
    assert_eq!(r.get_attribute().unwrap(), (3, 0));
    assert_eq!(r.get_attribute().unwrap_err(), Error::NoAttribute);
}

#[test]
fn pending_size_tracks_drain() {
    let (mut w, mut r) = RingBuilder::new().capacity(64).build().unwrap();
    assert_eq!(w.pending_attr_size(), 0);

    w.set_attribute(1, 0).unwrap();
    w.set_var_attribute(2, 0, &[0u8; 4]).unwrap();
    let queued = w.pending_attr_size();
    assert!(queued > 0);

    r.get_attribute().unwrap();
    assert!(r.pending_attr_size() < queued);
    let mut buf = [0u8; 4];
    r.get_var_attribute(&mut buf).unwrap();
    assert_eq!(w.pending_attr_size(), 0);
}

#[test]
fn writer_close_times_out_with_undrained_records() {
    let (mut w, _r) = RingBuilder::new().capacity(64).build().unwrap();
    w.set_attribute(1, 0).unwrap();
    assert_eq!(
        w.close(Some(Duration::from_millis(30))).unwrap_err(),
        Error::TimedOut
    );
}

#[test]
fn writer_close_blocks_until_reader_drains() {
    let (mut w, mut r) = RingBuilder::new().capacity(64).build().unwrap();
    w.set_attribute(1, 0).unwrap();
    w.set_attribute(2, 0).unwrap();

    let drainer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        r.get_attribute().unwrap();
        r.get_attribute().unwrap();
        r
    });

    // Wakes on the reader's consumption, not a spin.
    w.close(None).unwrap();
    assert_eq!(w.pending_attr_size(), 0);
    drainer.join().unwrap();
}

// A randomized interleaving of payload writes with fixed and variable
// records replays on the reader in exactly the producer's emission order
// and boundaries.
#[test]
fn emission_order_is_reproduced_exactly() {
    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Data(Vec<u8>),
        Fixed(u16, u32),
        Variable(u16, u32, Vec<u8>),
    }

    // Merge adjacent data runs so both sides compare on boundaries drawn
    // only by attribute records.
    fn normalize(events: Vec<Event>) -> Vec<Event> {
        let mut out: Vec<Event> = Vec::new();
        for ev in events {
            match (&ev, out.last_mut()) {
                (Event::Data(b), Some(Event::Data(acc))) => acc.extend_from_slice(b),
                _ => out.push(ev),
            }
        }
        out.retain(|e| !matches!(e, Event::Data(b) if b.is_empty()));
        out
    }

    let mut rng = fastrand::Rng::with_seed(0xA77);
    let (mut w, mut r) = RingBuilder::new()
        .capacity(1 << 16)
        .attr_capacity(1 << 16)
        .build()
        .unwrap();

    let mut emitted = Vec::new();
    let mut counter: u32 = 0;
    for _ in 0..200 {
        match rng.u8(0..3) {
            0 => {
                let len = rng.usize(1..=40);
                let chunk: Vec<u8> = (0..len).map(|_| rng.u8(..)).collect();
                let mut sent = 0;
                while sent < chunk.len() {
                    let buf = w.acquire(chunk.len() - sent).unwrap();
                    let n = buf.len();
                    buf.copy_from_slice(&chunk[sent..sent + n]);
                    w.release(n).unwrap();
                    sent += n;
                }
                emitted.push(Event::Data(chunk));
            }
            1 => {
                let tag = rng.u16(1..100);
                w.set_attribute(tag, counter).unwrap();
                emitted.push(Event::Fixed(tag, counter));
                counter += 1;
            }
            _ => {
                let tag = rng.u16(100..200);
                let payload: Vec<u8> = (0..rng.usize(0..=4)).map(|_| rng.u8(..)).collect();
                w.set_var_attribute(tag, counter, &payload).unwrap();
                emitted.push(Event::Variable(tag, counter, payload));
                counter += 1;
            }
        }
    }

    let mut observed = Vec::new();
    loop {
        match r.acquire(1 << 16) {
            Ok(grant) => {
                let bytes = grant.bytes().to_vec();
                let pending = grant.is_pending_attribute();
                if !bytes.is_empty() {
                    r.release(bytes.len()).unwrap();
                    observed.push(Event::Data(bytes));
                }
                if pending {
                    match r.get_attribute() {
                        Ok((tag, param)) => observed.push(Event::Fixed(tag, param)),
                        Err(Error::VariableAttribute) => {
                            let mut buf = [0u8; 4];
                            let attr = r.get_var_attribute(&mut buf).unwrap();
                            observed.push(Event::Variable(
                                attr.tag,
                                attr.param,
                                buf[..attr.len].to_vec(),
                            ));
                        }
                        Err(Error::PendingData { .. }) => {}
                        Err(e) => panic!("attribute retrieval failed: {e}"),
                    }
                }
            }
            Err(Error::Empty) => break,
            Err(e) => panic!("reader acquire failed: {e}"),
        }
    }

    assert_eq!(normalize(observed), normalize(emitted));
}
