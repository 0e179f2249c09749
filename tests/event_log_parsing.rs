//! End-to-end event-log parsing over a heterogeneous log stream: known
//! event types are decoded, everything else (unknown signature, no topics)
//! is silently skipped.

use ethabi::Token;
use ethereum_types::H160;
use ethrpc_client::codec::{EventParser, EventSpec};
use ethrpc_client::wire::{Address, Hash32, LogData};

fn h160(a: Address) -> H160 {
    H160::from_slice(a.as_bytes())
}

fn transfer_event() -> EventSpec {
    EventSpec::new(
        "Transfer",
        &[
            ("from", "address", true),
            ("to", "address", true),
            ("value", "uint256", false),
        ],
    )
    .unwrap()
}

fn swap_event() -> EventSpec {
    EventSpec::new(
        "Swap",
        &[
            ("sender", "address", true),
            ("amount0In", "uint256", false),
            ("amount1In", "uint256", false),
            ("amount0Out", "uint256", false),
            ("amount1Out", "uint256", false),
            ("to", "address", true),
        ],
    )
    .unwrap()
}

fn sync_event() -> EventSpec {
    EventSpec::new("Sync", &[("reserve0", "uint112", false), ("reserve1", "uint112", false)]).unwrap()
}

fn addr(s: &str) -> Address {
    Address::parse(s).unwrap()
}

fn u256_word(v: u128) -> String {
    format!("{:064x}", v)
}

fn transfer_log(ev: &EventSpec, from: Address, to: Address, value: u128) -> LogData {
    LogData {
        address: addr("0x1111111111111111111111111111111111111111"),
        topics: vec![
            Hash32::from_bytes(ev.signature_hash().0),
            Hash32::parse(&from.to_event_topic()).unwrap(),
            Hash32::parse(&to.to_event_topic()).unwrap(),
        ],
        data: format!("0x{}", u256_word(value)),
        block_number: None,
        transaction_hash: None,
        transaction_index: None,
        block_hash: None,
        log_index: None,
        removed: false,
    }
}

fn sync_log(ev: &EventSpec, reserve0: u128, reserve1: u128) -> LogData {
    LogData {
        address: addr("0x2222222222222222222222222222222222222222"),
        topics: vec![Hash32::from_bytes(ev.signature_hash().0)],
        data: format!("0x{}{}", u256_word(reserve0), u256_word(reserve1)),
        block_number: None,
        transaction_hash: None,
        transaction_index: None,
        block_hash: None,
        log_index: None,
        removed: false,
    }
}

/// The last Swap event of a real pair's log stream, used verbatim as the
/// decode-correctness fixture.
fn last_swap_log(ev: &EventSpec) -> (LogData, Address, Address) {
    let sender = addr("0x10ed43c718714eb63d5aa57b78b54704e256024e");
    let to = addr("0x91411a761431484f6fbaef3d9eea6d62d8f391c4");
    let data = format!(
        "0x{}{}{}{}",
        u256_word(0),                   // amount0In
        format!("{:064x}", 159014267657368539u128), // amount1In
        format!("{:064x}", 9674758874794323778u128), // amount0Out
        u256_word(0),                   // amount1Out
    );
    let log = LogData {
        address: addr("0x3333333333333333333333333333333333333333"),
        topics: vec![
            Hash32::from_bytes(ev.signature_hash().0),
            Hash32::parse(&sender.to_event_topic()).unwrap(),
            Hash32::parse(&to.to_event_topic()).unwrap(),
        ],
        data,
        block_number: None,
        transaction_hash: None,
        transaction_index: None,
        block_hash: None,
        log_index: None,
        removed: false,
    };
    (log, sender, to)
}

fn noise_log() -> LogData {
    LogData {
        address: addr("0x4444444444444444444444444444444444444444"),
        topics: vec![Hash32::from_bytes([0xffu8; 32])],
        data: "0x".to_string(),
        block_number: None,
        transaction_hash: None,
        transaction_index: None,
        block_hash: None,
        log_index: None,
        removed: false,
    }
}

fn topicless_log() -> LogData {
    LogData {
        address: addr("0x5555555555555555555555555555555555555555"),
        topics: vec![],
        data: "0x".to_string(),
        block_number: None,
        transaction_hash: None,
        transaction_index: None,
        block_hash: None,
        log_index: None,
        removed: false,
    }
}

#[test]
fn parses_known_events_and_skips_the_rest() {
    let transfer = transfer_event();
    let swap = swap_event();
    let sync = sync_event();

    let alice = addr("0x18c2ccd3e937bb5b1560a6f70de9bdb1340d849d");
    let bob = addr("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed");
    let (last_swap, swap_sender, swap_to) = last_swap_log(&swap);

    let logs = vec![
        transfer_log(&transfer, alice, bob, 1_000_000_000_000_000_000),
        transfer_log(&transfer, bob, alice, 500_000_000_000_000_000),
        sync_log(&sync, 42_000_000, 84_000_000),
        noise_log(),
        topicless_log(),
        last_swap.clone(),
    ];

    let parser = EventParser::with_events([transfer, swap, sync]);
    let parsed = parser.parse_all(&logs);

    // The noise log (unrecognized signature) and the topic-less log are
    // both silently skipped; only the four well-formed events survive.
    assert_eq!(parsed.len(), 4);

    let swap_events: Vec<_> = parsed.iter().filter(|e| e.event.name() == "Swap").collect();
    assert_eq!(swap_events.len(), 1);
    let decoded = swap_events[0];

    assert_eq!(decoded.fields["amount0In"], Token::Uint(0u8.into()));
    assert_eq!(
        decoded.fields["amount1In"],
        Token::Uint(159014267657368539u128.into())
    );
    assert_eq!(
        decoded.fields["amount0Out"],
        Token::Uint(9674758874794323778u128.into())
    );
    assert_eq!(decoded.fields["amount1Out"], Token::Uint(0u8.into()));
    assert_eq!(decoded.fields["sender"], Token::Address(h160(swap_sender)));
    assert_eq!(decoded.fields["to"], Token::Address(h160(swap_to)));

    let transfer_events: Vec<_> = parsed.iter().filter(|e| e.event.name() == "Transfer").collect();
    assert_eq!(transfer_events.len(), 2);

    let sync_events: Vec<_> = parsed.iter().filter(|e| e.event.name() == "Sync").collect();
    assert_eq!(sync_events.len(), 1);
}
