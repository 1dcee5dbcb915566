use parking_lot::Mutex;
use proptest::prelude::*;
use robokit::hal::mock::MockI2cBus;
use robokit::hal::{I2cBus, MockFilesystem};
use robokit::prelude::*;
use std::sync::Arc;

fn eeprom_board(bus: MockI2cBus) -> BoardAdaptor {
    BoardAdaptor::builder()
        .filesystem(Arc::new(MockFilesystem::new()))
        .i2c_buses([1])
        .i2c_factory(move |_| Ok(Box::new(bus.clone()) as Box<dyn I2cBus>))
        .build()
}

proptest! {
    #[test]
    fn prop_delivery_follows_publication_order(
        payloads in proptest::collection::vec(any::<i64>(), 0..20),
        subscribers in 1usize..5,
    ) {
        let eventer = Eventer::new("prop");
        eventer.add_event("e");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _subs: Vec<_> = (0..subscribers)
            .map(|idx| {
                let seen = seen.clone();
                eventer
                    .on("e", move |p| seen.lock().push((p.as_int().unwrap_or_default(), idx)))
                    .unwrap()
            })
            .collect();

        for &p in &payloads {
            eventer.publish("e", p);
        }

        let expected: Vec<_> = payloads
            .iter()
            .flat_map(|&p| (0..subscribers).map(move |idx| (p, idx)))
            .collect();
        prop_assert_eq!(seen.lock().clone(), expected);
    }

    #[test]
    fn prop_register_write_then_read(register in any::<u8>(), value in any::<u8>()) {
        let bus = MockI2cBus::new().with_device(0x50);
        let board = eeprom_board(bus);
        board.connect().unwrap();

        let handle = board.i2c_open(1, 0x50).unwrap();
        handle.write_register(register, &[value]).unwrap();
        prop_assert_eq!(handle.read_register(register).unwrap(), value);
        board.finalize().unwrap();
    }

    #[test]
    fn prop_cancelled_subscription_never_fires(before in 0usize..5, after in 1usize..5) {
        let eventer = Eventer::new("prop");
        eventer.add_event("e");
        let count = Arc::new(Mutex::new(0usize));
        let sink = count.clone();
        let sub = eventer.on("e", move |_| *sink.lock() += 1).unwrap();

        for _ in 0..before {
            eventer.publish("e", Payload::Empty);
        }
        sub.cancel();
        sub.cancel();
        for _ in 0..after {
            eventer.publish("e", Payload::Empty);
        }
        prop_assert_eq!(*count.lock(), before);
    }
}
