//! Transition tests for the Channel State Machine.

use proptest::prelude::*;

use crate::{
    account::IcaAccountType,
    channel::{
        ChannelDuty, ChannelError, ChannelEvent, ChannelOutput, ChannelResult, ChannelSM,
        ChannelSMCfg, ChannelState,
    },
    signals::{ChannelSignal, ChannelToRegistry},
};

const TEST_OWNER: &str = "cosmoshub-4.DELEGATION";
const TEST_CONNECTION: &str = "connection-0";
const TEST_CHANNEL: &str = "channel-1";
/// Channel opened when the account is restored.
const RESTORED_CHANNEL: &str = "channel-2";
const TEST_ADDRESS: &str = "cosmos1delegation";

fn sm_in(state: ChannelState) -> ChannelSM {
    let mut sm = ChannelSM::new(TEST_OWNER, TEST_CONNECTION).expect("valid owner");
    sm.state = state;
    sm
}

/// Applies `event` to a machine in `from` and returns the machine with the outcome.
fn apply(from: ChannelState, event: ChannelEvent) -> (ChannelSM, ChannelResult<ChannelOutput>) {
    let mut sm = sm_in(from);
    let result = sm.process_event(&ChannelSMCfg::default(), event);
    (sm, result)
}

fn open(channel_id: &str) -> ChannelState {
    ChannelState::Open {
        channel_id: channel_id.to_string(),
        address: TEST_ADDRESS.to_string(),
    }
}

fn closed_after(channel_id: &str) -> ChannelState {
    ChannelState::Closed {
        last_channel_id: Some(channel_id.to_string()),
    }
}

fn ack(channel_id: &str) -> ChannelEvent {
    ChannelEvent::OpenAck {
        channel_id: channel_id.to_string(),
        address: TEST_ADDRESS.to_string(),
    }
}

fn timeout(channel_id: &str) -> ChannelEvent {
    ChannelEvent::PacketTimeout {
        channel_id: channel_id.to_string(),
    }
}

fn open_duty() -> ChannelDuty {
    ChannelDuty::OpenChannel {
        owner: TEST_OWNER.to_string(),
        port_id: format!("icacontroller-{TEST_OWNER}"),
        connection_id: TEST_CONNECTION.to_string(),
        version: ChannelSMCfg::default().version,
    }
}

fn closed_signal() -> ChannelSignal {
    ChannelSignal::ToRegistry(ChannelToRegistry::AccountClosed {
        owner: TEST_OWNER.to_string(),
        account_type: IcaAccountType::Delegation,
    })
}

#[test]
fn test_open_init_from_closed() {
    let (sm, result) = apply(ChannelState::new(), ChannelEvent::OpenInit);
    let output = result.expect("closed channel must open");

    assert_eq!(sm.state, ChannelState::Opening);
    assert_eq!(output.duties, vec![open_duty()]);
    assert!(output.signals.is_empty());
}

#[test]
fn test_open_ack_binds_address() {
    let (sm, result) = apply(ChannelState::Opening, ack(TEST_CHANNEL));
    let output = result.expect("ack must bind");

    assert_eq!(sm.state, open(TEST_CHANNEL));
    assert_eq!(sm.address(), Some(TEST_ADDRESS));
    assert!(output.duties.is_empty());
    assert_eq!(
        output.signals,
        vec![ChannelSignal::ToRegistry(ChannelToRegistry::AccountBound {
            owner: TEST_OWNER.to_string(),
            account_type: IcaAccountType::Delegation,
            channel_id: TEST_CHANNEL.to_string(),
            address: TEST_ADDRESS.to_string(),
        })]
    );
}

#[test]
fn test_packet_timeout_closes_channel() {
    let (sm, result) = apply(open(TEST_CHANNEL), timeout(TEST_CHANNEL));

    assert_eq!(sm.state, closed_after(TEST_CHANNEL));
    assert_eq!(result.expect("timeout must close").signals, vec![closed_signal()]);
}

#[test]
fn test_close_handshake() {
    let closing = ChannelState::Closing {
        channel_id: TEST_CHANNEL.to_string(),
    };

    let (sm, result) = apply(
        open(TEST_CHANNEL),
        ChannelEvent::CloseInit {
            channel_id: TEST_CHANNEL.to_string(),
        },
    );
    assert_eq!(sm.state, closing);
    assert!(result.expect("close init must apply").is_empty());

    let (sm, result) = apply(
        closing,
        ChannelEvent::CloseConfirm {
            channel_id: TEST_CHANNEL.to_string(),
        },
    );
    assert_eq!(sm.state, closed_after(TEST_CHANNEL));
    assert_eq!(result.expect("close confirm must apply").signals, vec![closed_signal()]);
}

#[test]
fn test_refused_events_keep_state() {
    let cases: Vec<(ChannelState, ChannelEvent, fn(&ChannelError) -> bool)> = vec![
        (ChannelState::Opening, ChannelEvent::OpenInit, |e| {
            matches!(e, ChannelError::Duplicate { .. })
        }),
        (open(TEST_CHANNEL), ChannelEvent::OpenInit, |e| {
            matches!(e, ChannelError::Rejected { .. })
        }),
        (ChannelState::new(), ack(TEST_CHANNEL), |e| {
            matches!(e, ChannelError::InvalidEvent { .. })
        }),
        (open(TEST_CHANNEL), timeout(RESTORED_CHANNEL), |e| {
            matches!(e, ChannelError::Rejected { .. })
        }),
        (closed_after(TEST_CHANNEL), timeout(TEST_CHANNEL), |e| {
            matches!(e, ChannelError::Duplicate { .. })
        }),
    ];

    for (from, event, expected) in cases {
        let label = format!("{from} on {event}");
        let (sm, result) = apply(from.clone(), event);

        let err = result.expect_err(&label);
        assert!(expected(&err), "{label}: unexpected error {err:?}");
        assert_eq!(sm.state, from, "{label}: state changed");
    }
}

#[test]
fn test_restore_after_timeout() {
    let cfg = ChannelSMCfg::default();
    let mut sm = sm_in(ChannelState::new());

    let events = [
        ChannelEvent::OpenInit,
        ack(TEST_CHANNEL),
        timeout(TEST_CHANNEL),
        // a second timeout for the same channel is refused
        timeout(TEST_CHANNEL),
        ChannelEvent::OpenInit,
        ack(RESTORED_CHANNEL),
    ];

    let mut duties = Vec::new();
    let mut signals = Vec::new();
    let mut refused = 0;
    for event in events {
        match sm.process_event(&cfg, event) {
            Ok(output) => {
                duties.extend(output.duties);
                signals.extend(output.signals);
            }
            Err(_) => refused += 1,
        }
    }

    assert_eq!(sm.state, open(RESTORED_CHANNEL));
    assert_eq!(sm.state().open_channel(), Some(RESTORED_CHANNEL));
    assert_eq!(duties, vec![open_duty(), open_duty()]);
    assert_eq!(signals.len(), 3);
    assert_eq!(refused, 1);
}

fn arb_channel_id() -> impl Strategy<Value = String> {
    prop_oneof![Just(TEST_CHANNEL.to_string()), Just(RESTORED_CHANNEL.to_string())]
}

fn arb_state() -> impl Strategy<Value = ChannelState> {
    prop_oneof![
        proptest::option::of(arb_channel_id())
            .prop_map(|last_channel_id| ChannelState::Closed { last_channel_id }),
        Just(ChannelState::Opening),
        arb_channel_id().prop_map(|channel_id| ChannelState::Open {
            channel_id,
            address: TEST_ADDRESS.to_string(),
        }),
        arb_channel_id().prop_map(|channel_id| ChannelState::Closing { channel_id }),
    ]
}

fn arb_event() -> impl Strategy<Value = ChannelEvent> {
    prop_oneof![
        Just(ChannelEvent::OpenInit),
        arb_channel_id().prop_map(|channel_id| ChannelEvent::OpenAck {
            channel_id,
            address: TEST_ADDRESS.to_string(),
        }),
        arb_channel_id().prop_map(|channel_id| ChannelEvent::PacketTimeout { channel_id }),
        arb_channel_id().prop_map(|channel_id| ChannelEvent::CloseInit { channel_id }),
        arb_channel_id().prop_map(|channel_id| ChannelEvent::CloseConfirm { channel_id }),
    ]
}

proptest! {
    #[test]
    fn test_transitions_are_deterministic(state in arb_state(), event in arb_event()) {
        let (sm1, result1) = apply(state.clone(), event.clone());
        let (sm2, result2) = apply(state, event);

        prop_assert_eq!(sm1.state, sm2.state);
        prop_assert_eq!(result1, result2);
    }

    #[test]
    fn test_accepted_events_have_an_effect(state in arb_state(), event in arb_event()) {
        let (sm, result) = apply(state.clone(), event);

        match result {
            Ok(output) => prop_assert!(sm.state != state || !output.is_empty()),
            Err(_) => prop_assert_eq!(sm.state, state),
        }
    }
}
